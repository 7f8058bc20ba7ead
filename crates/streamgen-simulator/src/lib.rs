//! Synthetic telemetry generator.
//!
//! Simulates organizations full of devices (heartbeats, error reporters,
//! temperature sensors, contact records) and feeds their events into one
//! stream per organization, or into local files.
//!
//! # Usage
//! ```bash
//! # Write a config file to start from
//! streamgen generate-config --path streamgen.yml
//!
//! # Two tiny orgs against a local stream service for five minutes
//! streamgen run --config streamgen.yml --endpoint http://localhost:4566 \
//!     --case heartbeat_message --case temperature_reading -D 300 --cleanup
//!
//! # Files instead of streams
//! streamgen run --output file --output-dir ./events --interval 5
//! ```

pub mod cli;
pub mod config;
pub mod devices;
pub mod error;
pub mod org;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod stats;

pub use cli::{Cli, Command, RunArgs};
pub use config::{GeneratorConfig, LoggingSettings, OutputKind};
pub use error::{ConfigError, Result, RunError};
pub use org::Org;
pub use pipeline::{Pipeline, PipelineState};
pub use report::Report;
pub use runner::{publisher_factory, Runner};
pub use stats::StatsRecorder;
