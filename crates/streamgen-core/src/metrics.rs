//! Observability sink injected into pipelines and publishers.

use crate::org::OrgLabels;
use std::time::Duration;

/// Outcome of delivering one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Records in the batch when it was first submitted
    pub records: usize,
    /// Records acknowledged with a shard id
    pub delivered: usize,
    /// Payload + key bytes of the batch
    pub bytes: u64,
    /// Requests issued for this batch
    pub rounds: u32,
    /// Rounds that saw a throughput throttle
    pub throttled_rounds: u32,
    /// Set when a hard error made the task give up
    pub abandoned: bool,
}

/// Receives pipeline and publisher observations.
///
/// Implementations must tolerate concurrent calls from many delivery tasks.
pub trait MetricsSink: Send + Sync {
    /// One generation + publish cycle finished.
    fn record_cycle(
        &self,
        labels: &OrgLabels,
        events: usize,
        generate_elapsed: Duration,
        publish_elapsed: Duration,
    );

    /// A publish call serialized its input.
    fn record_serialized(&self, labels: &OrgLabels, generated: usize, serialized: usize, bytes: u64);

    /// A delivery task finished (successfully or not).
    fn record_delivery(&self, labels: &OrgLabels, report: &DeliveryReport);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn record_cycle(&self, _: &OrgLabels, _: usize, _: Duration, _: Duration) {}

    fn record_serialized(&self, _: &OrgLabels, _: usize, _: usize, _: u64) {}

    fn record_delivery(&self, _: &OrgLabels, _: &DeliveryReport) {}
}
