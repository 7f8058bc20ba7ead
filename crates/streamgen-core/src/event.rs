//! Events and their serialized form

use crate::error::Result;

/// One unit of synthetic telemetry.
///
/// Workload models hand out boxed events; publishers only ever need the
/// partition key and the serialized bytes.
pub trait Event: Send + Sync + std::fmt::Debug {
    /// Key used by the remote service to route the record to a shard.
    fn partition_key(&self) -> String;

    /// Serialized payload.
    fn to_bytes(&self) -> Result<Vec<u8>>;

    /// Serializes the event into a [`Record`].
    fn to_record(&self) -> Result<Record> {
        Ok(Record::new(self.to_bytes()?, self.partition_key()))
    }
}

/// A serialized event ready to be shipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub data: Vec<u8>,
    pub partition_key: String,
}

impl Record {
    /// Create a new record
    pub fn new(data: Vec<u8>, partition_key: impl Into<String>) -> Self {
        Self {
            data,
            partition_key: partition_key.into(),
        }
    }

    /// Size counted against the service request limit (payload + key)
    pub fn size(&self) -> usize {
        self.data.len() + self.partition_key.len()
    }
}
