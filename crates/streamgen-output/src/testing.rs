//! In-memory [`StreamClient`] for tests and offline runs.
//!
//! Without scripted responses it behaves like a well-behaved service holding
//! a set of streams: create makes a stream ACTIVE immediately, delete removes
//! it, and put-records accepts everything. Queued responses take precedence
//! over that behaviour, one per call, in order.

use crate::client::{
    PutRecordResult, PutRecordsOutput, StreamClient, StreamDescription, StreamStatus,
    THROUGHPUT_EXCEEDED,
};
use crate::error::{Result, StreamError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use streamgen_core::Record;

/// A call observed by the scripted client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Describe(String),
    Create { stream: String, shard_count: u32 },
    AddTags { stream: String, tags: BTreeMap<String, String> },
    Delete { stream: String, force: bool },
    PutRecords { stream: String, records: Vec<Record> },
}

#[derive(Default)]
struct Script {
    describe: VecDeque<Result<StreamDescription>>,
    create: VecDeque<Result<()>>,
    add_tags: VecDeque<Result<()>>,
    delete: VecDeque<Result<()>>,
    put_records: VecDeque<Result<PutRecordsOutput>>,
}

#[derive(Default)]
struct Inner {
    streams: HashMap<String, u32>,
    script: Script,
    calls: Vec<Call>,
    next_sequence: u64,
}

#[derive(Default)]
pub struct ScriptedStreamClient {
    inner: Mutex<Inner>,
}

impl ScriptedStreamClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with an existing ACTIVE stream.
    pub fn with_stream(self, stream: &str, shard_count: u32) -> Self {
        self.inner.lock().streams.insert(stream.to_string(), shard_count);
        self
    }

    pub fn push_describe(&self, response: Result<StreamDescription>) {
        self.inner.lock().script.describe.push_back(response);
    }

    pub fn push_create(&self, response: Result<()>) {
        self.inner.lock().script.create.push_back(response);
    }

    pub fn push_add_tags(&self, response: Result<()>) {
        self.inner.lock().script.add_tags.push_back(response);
    }

    pub fn push_delete(&self, response: Result<()>) {
        self.inner.lock().script.delete.push_back(response);
    }

    pub fn push_put_records(&self, response: Result<PutRecordsOutput>) {
        self.inner.lock().script.put_records.push_back(response);
    }

    /// Queues a put-records response where every record is throttled.
    pub fn push_throttled(&self, records: usize) {
        let results = (0..records)
            .map(|_| PutRecordResult::Failed {
                error_code: THROUGHPUT_EXCEEDED.to_string(),
                error_message: "Rate exceeded for shard".to_string(),
            })
            .collect();
        self.push_put_records(Ok(PutRecordsOutput {
            failed_record_count: records as u32,
            records: results,
        }));
    }

    pub fn has_stream(&self, stream: &str) -> bool {
        self.inner.lock().streams.contains_key(stream)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().calls.clone()
    }

    /// Record sets submitted through put-records, in call order.
    pub fn put_requests(&self) -> Vec<Vec<Record>> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::PutRecords { records, .. } => Some(records.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of records acknowledged with a shard id.
    pub fn delivered_count(&self) -> u64 {
        self.inner.lock().next_sequence
    }
}

fn not_found(stream: &str) -> StreamError {
    StreamError::NotFound(format!("Stream {} not found", stream))
}

#[async_trait]
impl StreamClient for ScriptedStreamClient {
    async fn describe_stream(&self, stream: &str) -> Result<StreamDescription> {
        let mut inner = self.inner.lock();
        inner.calls.push(Call::Describe(stream.to_string()));
        if let Some(response) = inner.script.describe.pop_front() {
            return response;
        }
        match inner.streams.get(stream) {
            Some(&open_shard_count) => Ok(StreamDescription {
                name: stream.to_string(),
                status: StreamStatus::Active,
                open_shard_count,
            }),
            None => Err(not_found(stream)),
        }
    }

    async fn create_stream(&self, stream: &str, shard_count: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.calls.push(Call::Create {
            stream: stream.to_string(),
            shard_count,
        });
        if let Some(response) = inner.script.create.pop_front() {
            if response.is_ok() {
                inner.streams.insert(stream.to_string(), shard_count);
            }
            return response;
        }
        if inner.streams.contains_key(stream) {
            return Err(StreamError::InUse(format!("Stream {} already exists", stream)));
        }
        inner.streams.insert(stream.to_string(), shard_count);
        Ok(())
    }

    async fn add_tags(&self, stream: &str, tags: &BTreeMap<String, String>) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.calls.push(Call::AddTags {
            stream: stream.to_string(),
            tags: tags.clone(),
        });
        if let Some(response) = inner.script.add_tags.pop_front() {
            return response;
        }
        if inner.streams.contains_key(stream) {
            Ok(())
        } else {
            Err(not_found(stream))
        }
    }

    async fn delete_stream(&self, stream: &str, enforce_consumer_deletion: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.calls.push(Call::Delete {
            stream: stream.to_string(),
            force: enforce_consumer_deletion,
        });
        if let Some(response) = inner.script.delete.pop_front() {
            if response.is_ok() {
                inner.streams.remove(stream);
            }
            return response;
        }
        match inner.streams.remove(stream) {
            Some(_) => Ok(()),
            None => Err(not_found(stream)),
        }
    }

    async fn put_records(&self, stream: &str, records: &[Record]) -> Result<PutRecordsOutput> {
        let mut inner = self.inner.lock();
        inner.calls.push(Call::PutRecords {
            stream: stream.to_string(),
            records: records.to_vec(),
        });

        let output = match inner.script.put_records.pop_front() {
            Some(response) => response?,
            None => PutRecordsOutput {
                failed_record_count: 0,
                records: records
                    .iter()
                    .map(|_| PutRecordResult::Delivered {
                        shard_id: "shardId-000000000000".to_string(),
                        sequence_number: String::new(),
                    })
                    .collect(),
            },
        };

        let delivered = output.records.iter().filter(|r| r.is_delivered()).count() as u64;
        inner.next_sequence += delivered;
        Ok(output)
    }
}
