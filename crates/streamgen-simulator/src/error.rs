//! Error types for the generator

use std::path::PathBuf;
use streamgen_output::{PublishError, StreamError};
use thiserror::Error;

/// Problems loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Reasons a run stops early
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create stream client: {0}")]
    Client(#[from] StreamError),

    #[error("Initialization aborted: {0}")]
    InitAborted(#[source] PublishError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type alias for generator operations
pub type Result<T> = std::result::Result<T, RunError>;
