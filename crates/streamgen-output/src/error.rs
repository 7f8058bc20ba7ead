//! Error types for streamgen-output

use std::path::PathBuf;
use thiserror::Error;

/// Classified failure of a stream service request
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Stream not found: {0}")]
    NotFound(String),

    #[error("Resource in use: {0}")]
    InUse(String),

    #[error("Request throttled: {0}")]
    Throttled(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Service error: {code} - {message}")]
    Service { code: String, message: String },

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl StreamError {
    /// Whether the request was rejected because of a rate limit.
    pub fn is_throttle(&self) -> bool {
        matches!(self, StreamError::Throttled(_))
    }

    /// Short classification used in log fields.
    pub fn code(&self) -> &str {
        match self {
            StreamError::NotFound(_) => "ResourceNotFoundException",
            StreamError::InUse(_) => "ResourceInUseException",
            StreamError::Throttled(_) => "LimitExceededException",
            StreamError::InvalidArgument(_) => "InvalidArgumentException",
            StreamError::Service { code, .. } => code,
            StreamError::Transport(_) => "Transport",
            StreamError::Malformed(_) => "MalformedResponse",
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(e: serde_json::Error) -> Self {
        StreamError::Malformed(e.to_string())
    }
}

/// Publisher errors
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to provision stream {stream} ({shards} shards): {source}")]
    Init {
        stream: String,
        shards: u32,
        #[source]
        source: StreamError,
    },
}

/// Result type for stream service calls
pub type Result<T> = std::result::Result<T, StreamError>;
