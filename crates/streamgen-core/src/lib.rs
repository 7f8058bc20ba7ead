//! streamgen core - shared types for the event generator
//!
//! This crate provides the types every other streamgen crate agrees on:
//! - `Event`: a unit of synthetic telemetry with a partition key
//! - `Record`: a serialized event ready to be shipped
//! - `OrgSize`, `CaseId`, `OrgLabels`: organization identity and the
//!   stream naming / shard sizing derived from it
//! - `MetricsSink`: the injected observability interface

pub mod error;
pub mod event;
pub mod metrics;
pub mod org;

pub use error::{CoreError, Result};
pub use event::{Event, Record};
pub use metrics::{DeliveryReport, MetricsSink, NoopSink};
pub use org::{stream_name, CaseId, OrgLabels, OrgSize};
