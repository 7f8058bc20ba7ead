//! Command line interface.

use crate::config::{GeneratorConfig, OutputKind};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use streamgen_core::{CaseId, OrgSize};
use tracing::warn;

#[derive(Debug, Parser)]
#[command(name = "streamgen")]
#[command(about = "Synthetic telemetry generator for sharded streams")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate events until interrupted
    Run(RunArgs),

    /// Write a default configuration file
    GenerateConfig {
        /// Output path
        #[arg(short, long, default_value = "streamgen.yml")]
        path: PathBuf,
    },
}

/// Overrides for values from the configuration file
#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// Configuration file (YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Seconds between generation cycles
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Organizations per case
    #[arg(long)]
    pub orgs_count: Option<usize>,

    /// Organization size when one org per case is generated
    #[arg(long)]
    pub org_size: Option<OrgSize>,

    /// Workload model to run (repeatable)
    #[arg(long = "case")]
    pub cases: Vec<CaseId>,

    /// Destination for events
    #[arg(short, long, value_enum)]
    pub output: Option<OutputKind>,

    /// Directory for file output
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Stream service URL
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Tag for created streams as key=value (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Delete streams on exit
    #[arg(long)]
    pub cleanup: bool,

    /// Plan organizations without publishing
    #[arg(long)]
    pub dry_run: bool,

    /// Log every device decision
    #[arg(long)]
    pub debug_events: bool,

    /// Stop after this many seconds
    #[arg(short = 'D', long)]
    pub duration: Option<u64>,

    /// Save the report to this path (markdown + JSON)
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl RunArgs {
    /// Applies the command line overrides on top of `config`.
    pub fn apply(&self, config: &mut GeneratorConfig) {
        if let Some(interval) = self.interval {
            config.interval_secs = interval;
        }
        if let Some(count) = self.orgs_count {
            config.orgs_count = count;
        }
        if let Some(size) = self.org_size {
            config.org_size = size;
        }
        if !self.cases.is_empty() {
            config.cases = self.cases.clone();
        }
        if let Some(kind) = self.output {
            config.output.kind = kind;
        }
        if let Some(dir) = &self.output_dir {
            config.output.dir = dir.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.stream.endpoint = Some(endpoint.clone());
        }
        for tag in &self.tags {
            match parse_tag(tag) {
                Some((key, value)) => {
                    config.stream.tags.insert(key, value);
                }
                None => warn!(tag = %tag, "Ignoring malformed tag, expected key=value"),
            }
        }
        if self.cleanup {
            config.cleanup_on_exit = true;
        }
        if self.dry_run {
            config.dry_run = true;
        }
        if self.debug_events {
            config.debug_events = true;
        }
        if let Some(duration) = self.duration {
            config.run_for_secs = Some(duration);
        }
        if let Some(report) = &self.report {
            config.report_file = Some(report.clone());
        }
    }
}

/// Splits `key=value`. The key must be non-empty.
pub fn parse_tag(tag: &str) -> Option<(String, String)> {
    let (key, value) = tag.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.trim().to_string()))
}
