//! Generator configuration, loadable from YAML.

use crate::error::ConfigError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use streamgen_core::{CaseId, OrgLabels, OrgSize};
use streamgen_output::{
    Batcher, Credentials, HttpClientConfig, LifecycleTimings, StreamPublisherSettings,
    MAX_BYTES_PER_REQUEST, MAX_RECORDS_PER_REQUEST,
};
use tracing::Level;

/// Complete generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// First component of every stream name
    pub global_prefix: String,
    /// Seconds between generation cycles
    pub interval_secs: u64,
    /// Organizations per case
    pub orgs_count: usize,
    /// Size used when only one org per case is generated
    pub org_size: OrgSize,
    /// Workload models to run
    pub cases: Vec<CaseId>,
    /// Delete streams on shutdown
    pub cleanup_on_exit: bool,
    /// Plan organizations and exit without publishing
    pub dry_run: bool,
    /// Log every device decision
    pub debug_events: bool,
    /// Stop after this many seconds
    pub run_for_secs: Option<u64>,
    /// Time in-flight deliveries get to finish on shutdown
    pub drain_timeout_secs: u64,
    /// Seed for org planning and device simulation
    pub seed: Option<u64>,
    /// Where to save the end-of-run report (markdown + JSON)
    pub report_file: Option<PathBuf>,
    pub output: OutputSettings,
    pub stream: StreamSettings,
    pub lifecycle: LifecycleSettings,
    pub logging: LoggingSettings,
}

/// Where events go
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Kinesis-compatible stream service
    #[default]
    Stream,
    /// Newline-delimited files, one per stream name
    File,
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputKind::Stream => write!(f, "stream"),
            OutputKind::File => write!(f, "file"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub kind: OutputKind,
    /// Directory for file output
    pub dir: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            kind: OutputKind::Stream,
            dir: PathBuf::from("."),
        }
    }
}

/// Remote stream service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Service URL; derived from `region` when unset
    pub endpoint: Option<String>,
    pub region: String,
    /// SigV4-sign requests with credentials from the environment
    pub sign_requests: bool,
    /// Headers added to every request
    pub headers: BTreeMap<String, String>,
    pub request_timeout_secs: u64,
    pub max_records: usize,
    pub max_bytes: usize,
    pub throttle_backoff_ms: u64,
    pub max_in_flight: usize,
    /// Tags applied to created streams
    pub tags: BTreeMap<String, String>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "us-east-1".to_string(),
            sign_requests: true,
            headers: BTreeMap::new(),
            request_timeout_secs: 30,
            max_records: MAX_RECORDS_PER_REQUEST,
            max_bytes: MAX_BYTES_PER_REQUEST,
            throttle_backoff_ms: 250,
            max_in_flight: 64,
            tags: BTreeMap::new(),
        }
    }
}

/// Retry and poll intervals for stream lifecycle operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
    pub describe_retry_ms: u64,
    pub create_retry_ms: u64,
    pub poll_interval_ms: u64,
    pub tag_retry_ms: u64,
    pub delete_retry_ms: u64,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            describe_retry_ms: 1000,
            create_retry_ms: 100,
            poll_interval_ms: 1000,
            tag_retry_ms: 1000,
            delete_retry_ms: 100,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Include target in logs
    pub show_target: bool,
    /// Include thread IDs in logs
    pub show_thread_ids: bool,
    /// Include file and line numbers
    pub show_location: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_target: true,
            show_thread_ids: false,
            show_location: false,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            global_prefix: "streamgen".to_string(),
            interval_secs: 60,
            orgs_count: 1,
            org_size: OrgSize::Tiny,
            cases: vec![CaseId::HeartbeatMessage],
            cleanup_on_exit: false,
            dry_run: false,
            debug_events: false,
            run_for_secs: None,
            drain_timeout_secs: 10,
            seed: None,
            report_file: None,
            output: OutputSettings::default(),
            stream: StreamSettings::default(),
            lifecycle: LifecycleSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl GeneratorConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Write default config to a file (for generating example config)
    pub fn write_default(path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(&Self::default())?;
        std::fs::write(path, yaml).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid("interval_secs must be at least 1".into()));
        }
        if self.orgs_count == 0 {
            return Err(ConfigError::Invalid("orgs_count must be at least 1".into()));
        }
        if self.cases.is_empty() {
            return Err(ConfigError::Invalid("at least one case is required".into()));
        }
        if self.stream.max_records == 0 {
            return Err(ConfigError::Invalid("stream.max_records must be at least 1".into()));
        }
        if self.stream.max_bytes == 0 {
            return Err(ConfigError::Invalid("stream.max_bytes must be at least 1".into()));
        }
        if self.global_prefix.is_empty() {
            return Err(ConfigError::Invalid("global_prefix must not be empty".into()));
        }
        Ok(())
    }

    pub fn log_level(&self) -> Level {
        match self.logging.level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn run_for(&self) -> Option<Duration> {
        self.run_for_secs.map(Duration::from_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    /// Configured cases in order, without repeats.
    pub fn unique_cases(&self) -> Vec<CaseId> {
        let mut cases = Vec::with_capacity(self.cases.len());
        for case in &self.cases {
            if !cases.contains(case) {
                cases.push(*case);
            }
        }
        cases
    }

    /// Lays out the organizations to simulate.
    ///
    /// Ids are sequential from 1 across all cases. A single org per case
    /// uses the configured size; otherwise sizes are drawn at random.
    pub fn plan_orgs<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<OrgLabels> {
        let mut orgs = Vec::with_capacity(self.orgs_count * self.cases.len());
        let mut next_id = 1;

        for case in self.unique_cases() {
            for _ in 0..self.orgs_count {
                let size = if self.orgs_count == 1 {
                    self.org_size
                } else {
                    OrgSize::guess(rng)
                };
                orgs.push(OrgLabels::new(next_id.to_string(), case, size));
                next_id += 1;
            }
        }

        orgs
    }

    /// Stream service URL.
    pub fn endpoint(&self) -> String {
        match &self.stream.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://kinesis.{}.amazonaws.com", self.stream.region),
        }
    }

    /// HTTP client settings, signing with `AWS_*` environment credentials.
    pub fn http_client_config(&self) -> HttpClientConfig {
        self.http_client_config_with(Credentials::from_env())
    }

    pub fn http_client_config_with(&self, credentials: Option<Credentials>) -> HttpClientConfig {
        HttpClientConfig {
            endpoint: self.endpoint(),
            headers: self.stream.headers.clone(),
            timeout: Duration::from_secs(self.stream.request_timeout_secs),
            region: self.stream.region.clone(),
            credentials: credentials.filter(|_| self.stream.sign_requests),
        }
    }

    pub fn lifecycle_timings(&self) -> LifecycleTimings {
        LifecycleTimings {
            describe_retry: Duration::from_millis(self.lifecycle.describe_retry_ms),
            create_retry: Duration::from_millis(self.lifecycle.create_retry_ms),
            poll_interval: Duration::from_millis(self.lifecycle.poll_interval_ms),
            tag_retry: Duration::from_millis(self.lifecycle.tag_retry_ms),
            delete_retry: Duration::from_millis(self.lifecycle.delete_retry_ms),
        }
    }

    pub fn publisher_settings(&self) -> StreamPublisherSettings {
        StreamPublisherSettings {
            batcher: Batcher::new(self.stream.max_records, self.stream.max_bytes),
            throttle_backoff: Duration::from_millis(self.stream.throttle_backoff_ms),
            max_in_flight: self.stream.max_in_flight,
            tags: self.stream.tags.clone(),
            timings: self.lifecycle_timings(),
        }
    }
}
