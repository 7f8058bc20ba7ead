//! Stream service interface

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use streamgen_core::Record;

/// Per-record error code meaning the shard's write throughput was exceeded.
pub const THROUGHPUT_EXCEEDED: &str = "ProvisionedThroughputExceededException";

/// Stream status as reported by describe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StreamStatus {
    Creating,
    Deleting,
    Active,
    Updating,
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamStatus::Creating => "CREATING",
            StreamStatus::Deleting => "DELETING",
            StreamStatus::Active => "ACTIVE",
            StreamStatus::Updating => "UPDATING",
        };
        f.write_str(s)
    }
}

/// Summary returned by describe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescription {
    pub name: String,
    pub status: StreamStatus,
    pub open_shard_count: u32,
}

/// Per-record outcome of a put-records request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutRecordResult {
    Delivered {
        shard_id: String,
        sequence_number: String,
    },
    Failed {
        error_code: String,
        error_message: String,
    },
}

impl PutRecordResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self, PutRecordResult::Delivered { .. })
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, PutRecordResult::Failed { error_code, .. } if error_code == THROUGHPUT_EXCEEDED)
    }
}

/// Response of a put-records request, positionally aligned with the request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutRecordsOutput {
    pub failed_record_count: u32,
    pub records: Vec<PutRecordResult>,
}

/// Remote stream service.
///
/// Errors are classified into [`crate::StreamError`] variants so callers can
/// tell throttling and "not found" apart from hard failures.
#[async_trait]
pub trait StreamClient: Send + Sync {
    async fn describe_stream(&self, stream: &str) -> Result<StreamDescription>;

    async fn create_stream(&self, stream: &str, shard_count: u32) -> Result<()>;

    async fn add_tags(&self, stream: &str, tags: &BTreeMap<String, String>) -> Result<()>;

    async fn delete_stream(&self, stream: &str, enforce_consumer_deletion: bool) -> Result<()>;

    async fn put_records(&self, stream: &str, records: &[Record]) -> Result<PutRecordsOutput>;
}
