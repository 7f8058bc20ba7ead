//! Stream provisioning and teardown.

use crate::client::{StreamClient, StreamStatus};
use crate::error::{Result, StreamError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Observable provisioning state of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Unknown,
    Missing,
    Creating,
    Active,
    Tagged,
    Deleting,
    Gone,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Unknown => "unknown",
            LifecycleState::Missing => "missing",
            LifecycleState::Creating => "creating",
            LifecycleState::Active => "active",
            LifecycleState::Tagged => "tagged",
            LifecycleState::Deleting => "deleting",
            LifecycleState::Gone => "gone",
        };
        f.write_str(s)
    }
}

/// Sleep intervals between lifecycle retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTimings {
    /// After a throttled describe
    pub describe_retry: Duration,
    /// After a throttled create
    pub create_retry: Duration,
    /// Between polls while waiting for the stream to appear or disappear
    pub poll_interval: Duration,
    /// After a throttled or not-ready tag request
    pub tag_retry: Duration,
    /// After a throttled or busy delete
    pub delete_retry: Duration,
}

impl Default for LifecycleTimings {
    fn default() -> Self {
        Self {
            describe_retry: Duration::from_secs(1),
            create_retry: Duration::from_millis(100),
            poll_interval: Duration::from_secs(1),
            tag_retry: Duration::from_secs(1),
            delete_retry: Duration::from_millis(100),
        }
    }
}

/// Makes sure a stream exists before publishing and removes it on request.
///
/// Throttling is retried without limit. Any other unexpected answer from the
/// service aborts the operation and is returned to the caller.
pub struct StreamLifecycle {
    client: Arc<dyn StreamClient>,
    stream: String,
    shard_count: u32,
    tags: BTreeMap<String, String>,
    timings: LifecycleTimings,
    state: Mutex<LifecycleState>,
}

impl StreamLifecycle {
    pub fn new(client: Arc<dyn StreamClient>, stream: impl Into<String>, shard_count: u32) -> Self {
        Self {
            client,
            stream: stream.into(),
            shard_count,
            tags: BTreeMap::new(),
            timings: LifecycleTimings::default(),
            state: Mutex::new(LifecycleState::Unknown),
        }
    }

    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_timings(mut self, timings: LifecycleTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    fn set_state(&self, state: LifecycleState) {
        let mut current = self.state.lock();
        let previous = *current;
        debug!(stream = %self.stream, from = %previous, to = %state, "Lifecycle transition");
        *current = state;
    }

    fn fail(&self, operation: &str, e: StreamError) -> StreamError {
        error!(
            stream = %self.stream,
            shards = self.shard_count,
            code = e.code(),
            "{} failed: {}",
            operation,
            e
        );
        e
    }

    /// Ensures the stream exists, creating and tagging it when missing.
    pub async fn ensure(&self) -> Result<()> {
        loop {
            match self.client.describe_stream(&self.stream).await {
                Ok(description) => {
                    if description.open_shard_count != self.shard_count {
                        info!(
                            stream = %self.stream,
                            shards = description.open_shard_count,
                            expected = self.shard_count,
                            "Using existing stream with a different shard count"
                        );
                    } else {
                        info!(stream = %self.stream, status = %description.status, "Stream exists");
                    }
                    self.set_state(LifecycleState::Active);
                    return Ok(());
                }
                Err(StreamError::NotFound(_)) => break,
                Err(e) if e.is_throttle() => {
                    debug!(stream = %self.stream, "Describe throttled, retrying");
                    tokio::time::sleep(self.timings.describe_retry).await;
                }
                Err(e) => return Err(self.fail("Describe stream", e)),
            }
        }

        self.set_state(LifecycleState::Missing);
        self.create().await?;
        self.wait_until_active().await?;
        self.apply_tags().await
    }

    async fn create(&self) -> Result<()> {
        self.set_state(LifecycleState::Creating);
        loop {
            match self.client.create_stream(&self.stream, self.shard_count).await {
                Ok(()) => {
                    info!(stream = %self.stream, shards = self.shard_count, "Creating stream");
                    return Ok(());
                }
                Err(StreamError::InUse(_)) => {
                    info!(stream = %self.stream, "Stream is already being created");
                    return Ok(());
                }
                Err(e) if e.is_throttle() => {
                    debug!(stream = %self.stream, "Create throttled, retrying");
                    tokio::time::sleep(self.timings.create_retry).await;
                }
                Err(e) => return Err(self.fail("Create stream", e)),
            }
        }
    }

    async fn wait_until_active(&self) -> Result<()> {
        loop {
            match self.client.describe_stream(&self.stream).await {
                Ok(description) if description.status == StreamStatus::Active => {
                    info!(stream = %self.stream, shards = description.open_shard_count, "Stream is active");
                    self.set_state(LifecycleState::Active);
                    return Ok(());
                }
                Ok(description) => {
                    debug!(stream = %self.stream, status = %description.status, "Waiting for stream");
                }
                Err(StreamError::NotFound(_)) => {
                    debug!(stream = %self.stream, "Stream not visible yet");
                }
                Err(e) if e.is_throttle() => {
                    debug!(stream = %self.stream, "Describe throttled while waiting");
                }
                Err(e) => return Err(self.fail("Describe stream", e)),
            }
            tokio::time::sleep(self.timings.poll_interval).await;
        }
    }

    async fn apply_tags(&self) -> Result<()> {
        if self.tags.is_empty() {
            return Ok(());
        }

        loop {
            match self.client.add_tags(&self.stream, &self.tags).await {
                Ok(()) => {
                    info!(stream = %self.stream, tags = self.tags.len(), "Tagged stream");
                    self.set_state(LifecycleState::Tagged);
                    return Ok(());
                }
                Err(e @ StreamError::InUse(_)) | Err(e @ StreamError::Throttled(_)) => {
                    debug!(stream = %self.stream, code = e.code(), "Stream not ready for tags, retrying");
                    tokio::time::sleep(self.timings.tag_retry).await;
                }
                Err(e) => return Err(self.fail("Tag stream", e)),
            }
        }
    }

    /// Deletes the stream (forcing consumer deletion) and waits until it is gone.
    ///
    /// A stream that does not exist counts as deleted. Repeated calls issue
    /// the delete again without moving the state back from `Gone`.
    pub async fn teardown(&self) -> Result<()> {
        if self.state() != LifecycleState::Gone {
            self.set_state(LifecycleState::Deleting);
        }
        loop {
            match self.client.delete_stream(&self.stream, true).await {
                Ok(()) => {
                    info!(stream = %self.stream, "Deleting stream");
                    break;
                }
                Err(StreamError::NotFound(_)) => {
                    info!(stream = %self.stream, "Stream already deleted");
                    self.set_state(LifecycleState::Gone);
                    return Ok(());
                }
                Err(e @ StreamError::InUse(_)) | Err(e @ StreamError::Throttled(_)) => {
                    debug!(stream = %self.stream, code = e.code(), "Delete deferred, retrying");
                    tokio::time::sleep(self.timings.delete_retry).await;
                }
                Err(e) => return Err(self.fail("Delete stream", e)),
            }
        }

        loop {
            match self.client.describe_stream(&self.stream).await {
                Err(StreamError::NotFound(_)) => {
                    info!(stream = %self.stream, "Stream deleted");
                    self.set_state(LifecycleState::Gone);
                    return Ok(());
                }
                Ok(description) => {
                    debug!(stream = %self.stream, status = %description.status, "Waiting for deletion");
                }
                Err(e) if e.is_throttle() => {
                    debug!(stream = %self.stream, "Describe throttled while deleting");
                }
                Err(e) => {
                    warn!(stream = %self.stream, code = e.code(), "Could not confirm deletion: {}", e);
                    return Err(e);
                }
            }
            tokio::time::sleep(self.timings.poll_interval).await;
        }
    }
}
