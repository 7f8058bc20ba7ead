//! Publisher writing to a remote stream.

use crate::batcher::Batcher;
use crate::client::StreamClient;
use crate::delivery::deliver_batch;
use crate::error::PublishError;
use crate::lifecycle::{LifecycleTimings, StreamLifecycle};
use crate::publisher::{Publisher, StreamTarget};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use streamgen_core::{Event, MetricsSink, Record};
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Tunables for [`StreamPublisher`].
#[derive(Debug, Clone)]
pub struct StreamPublisherSettings {
    pub batcher: Batcher,
    /// Sleep after a round with throughput-exceeded records
    pub throttle_backoff: Duration,
    /// Deliveries allowed to talk to the service at once
    pub max_in_flight: usize,
    /// Tags applied to newly created streams
    pub tags: BTreeMap<String, String>,
    pub timings: LifecycleTimings,
}

impl Default for StreamPublisherSettings {
    fn default() -> Self {
        Self {
            batcher: Batcher::default(),
            throttle_backoff: Duration::from_millis(250),
            max_in_flight: 64,
            tags: BTreeMap::new(),
            timings: LifecycleTimings::default(),
        }
    }
}

/// Ships events to one stream.
///
/// Every batch is delivered on its own task. Tasks are tracked so shutdown
/// can give them a bounded amount of time to finish.
pub struct StreamPublisher {
    target: StreamTarget,
    client: Arc<dyn StreamClient>,
    lifecycle: StreamLifecycle,
    batcher: Batcher,
    throttle_backoff: Duration,
    in_flight: Arc<Semaphore>,
    tracker: TaskTracker,
    sink: Arc<dyn MetricsSink>,
}

impl StreamPublisher {
    pub fn new(
        target: StreamTarget,
        client: Arc<dyn StreamClient>,
        settings: StreamPublisherSettings,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        let lifecycle = StreamLifecycle::new(
            Arc::clone(&client),
            target.stream_name.clone(),
            target.shard_count,
        )
        .with_tags(settings.tags)
        .with_timings(settings.timings);

        Self {
            target,
            client,
            lifecycle,
            batcher: settings.batcher,
            throttle_backoff: settings.throttle_backoff,
            in_flight: Arc::new(Semaphore::new(settings.max_in_flight.max(1))),
            tracker: TaskTracker::new(),
            sink,
        }
    }

    pub fn lifecycle(&self) -> &StreamLifecycle {
        &self.lifecycle
    }

    /// Delivery tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }
}

/// Serializes events, dropping the ones that fail.
pub(crate) fn serialize_events(destination: &str, events: &[Box<dyn Event>]) -> (Vec<Record>, u64) {
    let mut records = Vec::with_capacity(events.len());
    let mut bytes = 0u64;

    for event in events {
        match event.to_record() {
            Ok(record) => {
                bytes += record.size() as u64;
                records.push(record);
            }
            Err(e) => {
                warn!(destination, error = %e, "Dropping event that failed to serialize: {:?}", event);
            }
        }
    }

    (records, bytes)
}

#[async_trait]
impl Publisher for StreamPublisher {
    fn destination(&self) -> &str {
        &self.target.stream_name
    }

    async fn init(&self) -> Result<(), PublishError> {
        self.lifecycle
            .ensure()
            .await
            .map_err(|source| PublishError::Init {
                stream: self.target.stream_name.clone(),
                shards: self.target.shard_count,
                source,
            })
    }

    async fn publish(&self, events: Vec<Box<dyn Event>>) -> Result<(), PublishError> {
        let (records, bytes) = serialize_events(&self.target.stream_name, &events);
        self.sink
            .record_serialized(&self.target.labels, events.len(), records.len(), bytes);

        let batches = self.batcher.split(records);
        debug!(
            stream = %self.target.stream_name,
            org_id = %self.target.labels.org_id,
            batches = batches.len(),
            "Launching deliveries"
        );

        for batch in batches {
            let client = Arc::clone(&self.client);
            let in_flight = Arc::clone(&self.in_flight);
            let sink = Arc::clone(&self.sink);
            let labels = self.target.labels.clone();
            let stream = self.target.stream_name.clone();
            let backoff = self.throttle_backoff;

            self.tracker.spawn(async move {
                let Ok(_permit) = in_flight.acquire_owned().await else {
                    return;
                };
                let report = deliver_batch(client.as_ref(), &stream, batch, backoff).await;
                sink.record_delivery(&labels, &report);
            });
        }

        Ok(())
    }

    async fn drain(&self, grace: Duration) -> usize {
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            let remaining = self.tracker.len();
            warn!(
                stream = %self.target.stream_name,
                remaining,
                "Deliveries still running after {:?}",
                grace
            );
            return remaining;
        }
        0
    }

    async fn cleanup(&self) {
        info!(stream = %self.target.stream_name, "Cleaning up stream");
        if let Err(e) = self.lifecycle.teardown().await {
            error!(
                stream = %self.target.stream_name,
                shards = self.target.shard_count,
                "Stream cleanup failed: {}",
                e
            );
        }
    }
}
