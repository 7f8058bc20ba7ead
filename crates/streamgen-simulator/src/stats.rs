//! In-process metrics sink.

use crate::report::{LatencyStats, OrgRow};
use dashmap::DashMap;
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use streamgen_core::{DeliveryReport, MetricsSink, OrgLabels};

/// Counters for one organization.
pub struct OrgStats {
    pub devices: AtomicU64,
    pub cycles: AtomicU64,
    pub events_last_cycle: AtomicU64,
    pub events_generated: AtomicU64,
    pub events_serialized: AtomicU64,
    pub events_dropped: AtomicU64,
    pub bytes_serialized: AtomicU64,
    pub last_serialized_bytes: AtomicU64,
    pub records_delivered: AtomicU64,
    pub bytes_delivered: AtomicU64,
    pub batches_delivered: AtomicU64,
    pub batches_abandoned: AtomicU64,
    pub retry_rounds: AtomicU64,
    pub throttled_rounds: AtomicU64,
    generate_latency: Mutex<Histogram<u64>>,
    publish_latency: Mutex<Histogram<u64>>,
}

impl OrgStats {
    fn new() -> Self {
        Self {
            devices: AtomicU64::new(0),
            cycles: AtomicU64::new(0),
            events_last_cycle: AtomicU64::new(0),
            events_generated: AtomicU64::new(0),
            events_serialized: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            bytes_serialized: AtomicU64::new(0),
            last_serialized_bytes: AtomicU64::new(0),
            records_delivered: AtomicU64::new(0),
            bytes_delivered: AtomicU64::new(0),
            batches_delivered: AtomicU64::new(0),
            batches_abandoned: AtomicU64::new(0),
            retry_rounds: AtomicU64::new(0),
            throttled_rounds: AtomicU64::new(0),
            generate_latency: Mutex::new(latency_histogram()),
            publish_latency: Mutex::new(latency_histogram()),
        }
    }

    fn row(&self, labels: &OrgLabels) -> OrgRow {
        OrgRow {
            org_id: labels.org_id.clone(),
            case: Some(labels.case),
            size: Some(labels.size),
            devices: self.devices.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            events_last_cycle: self.events_last_cycle.load(Ordering::Relaxed),
            events_generated: self.events_generated.load(Ordering::Relaxed),
            events_serialized: self.events_serialized.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            bytes_serialized: self.bytes_serialized.load(Ordering::Relaxed),
            bytes_last_cycle: self.last_serialized_bytes.load(Ordering::Relaxed),
            records_delivered: self.records_delivered.load(Ordering::Relaxed),
            bytes_delivered: self.bytes_delivered.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            batches_abandoned: self.batches_abandoned.load(Ordering::Relaxed),
            retry_rounds: self.retry_rounds.load(Ordering::Relaxed),
            throttled_rounds: self.throttled_rounds.load(Ordering::Relaxed),
            generate_latency: compute_latency_stats(&self.generate_latency.lock()),
            publish_latency: compute_latency_stats(&self.publish_latency.lock()),
        }
    }
}

/// [`MetricsSink`] keeping per-organization counters and latency histograms.
#[derive(Default)]
pub struct StatsRecorder {
    orgs: DashMap<OrgLabels, Arc<OrgStats>>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stats for `labels`, created on first use.
    pub fn org(&self, labels: &OrgLabels) -> Arc<OrgStats> {
        if let Some(stats) = self.orgs.get(labels) {
            return Arc::clone(stats.value());
        }
        Arc::clone(
            self.orgs
                .entry(labels.clone())
                .or_insert_with(|| Arc::new(OrgStats::new()))
                .value(),
        )
    }

    /// Records the size of an organization's device set.
    pub fn record_devices(&self, labels: &OrgLabels, devices: usize) {
        self.org(labels)
            .devices
            .store(devices as u64, Ordering::Relaxed);
    }

    /// Snapshot of every organization, ordered by labels.
    pub fn rows(&self) -> Vec<OrgRow> {
        let mut entries: Vec<(OrgLabels, Arc<OrgStats>)> = self
            .orgs
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        entries.sort_by(|a, b| {
            let id = |l: &OrgLabels| l.org_id.parse::<u64>().unwrap_or(u64::MAX);
            id(&a.0).cmp(&id(&b.0)).then_with(|| a.0.cmp(&b.0))
        });
        entries
            .iter()
            .map(|(labels, stats)| stats.row(labels))
            .collect()
    }
}

impl MetricsSink for StatsRecorder {
    fn record_cycle(
        &self,
        labels: &OrgLabels,
        events: usize,
        generate_elapsed: Duration,
        publish_elapsed: Duration,
    ) {
        let stats = self.org(labels);
        stats.cycles.fetch_add(1, Ordering::Relaxed);
        stats.events_last_cycle.store(events as u64, Ordering::Relaxed);
        stats
            .events_generated
            .fetch_add(events as u64, Ordering::Relaxed);
        stats
            .generate_latency
            .lock()
            .saturating_record(generate_elapsed.as_micros() as u64);
        stats
            .publish_latency
            .lock()
            .saturating_record(publish_elapsed.as_micros() as u64);
    }

    fn record_serialized(
        &self,
        labels: &OrgLabels,
        generated: usize,
        serialized: usize,
        bytes: u64,
    ) {
        let stats = self.org(labels);
        stats
            .events_serialized
            .fetch_add(serialized as u64, Ordering::Relaxed);
        stats.events_dropped.fetch_add(
            generated.saturating_sub(serialized) as u64,
            Ordering::Relaxed,
        );
        stats.bytes_serialized.fetch_add(bytes, Ordering::Relaxed);
        stats.last_serialized_bytes.store(bytes, Ordering::Relaxed);
    }

    fn record_delivery(&self, labels: &OrgLabels, report: &DeliveryReport) {
        let stats = self.org(labels);
        stats
            .records_delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        stats
            .retry_rounds
            .fetch_add(report.rounds.saturating_sub(1) as u64, Ordering::Relaxed);
        stats
            .throttled_rounds
            .fetch_add(report.throttled_rounds as u64, Ordering::Relaxed);
        if report.abandoned {
            stats.batches_abandoned.fetch_add(1, Ordering::Relaxed);
        } else {
            stats.batches_delivered.fetch_add(1, Ordering::Relaxed);
            stats.bytes_delivered.fetch_add(report.bytes, Ordering::Relaxed);
        }
    }
}

fn latency_histogram() -> Histogram<u64> {
    Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).expect("constant histogram bounds")
}

/// Computes latency statistics from a histogram.
pub fn compute_latency_stats(histogram: &Histogram<u64>) -> LatencyStats {
    if histogram.is_empty() {
        return LatencyStats::default();
    }

    LatencyStats {
        count: histogram.len(),
        min_us: histogram.min(),
        max_us: histogram.max(),
        mean_us: histogram.mean() as u64,
        p50_us: histogram.value_at_quantile(0.50),
        p95_us: histogram.value_at_quantile(0.95),
        p99_us: histogram.value_at_quantile(0.99),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamgen_core::{CaseId, OrgSize};

    fn labels(id: &str) -> OrgLabels {
        OrgLabels::new(id, CaseId::HeartbeatMessage, OrgSize::Tiny)
    }

    #[test]
    fn test_cycle_counters_and_latency() {
        let stats = StatsRecorder::new();
        stats.record_cycle(&labels("1"), 10, Duration::from_millis(2), Duration::from_millis(5));
        stats.record_cycle(&labels("1"), 4, Duration::from_millis(3), Duration::from_millis(5));

        let rows = stats.rows();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.cycles, 2);
        assert_eq!(row.events_generated, 14);
        assert_eq!(row.events_last_cycle, 4);
        assert_eq!(row.generate_latency.count, 2);
        assert!(row.publish_latency.p50_us >= 4_990);
    }

    #[test]
    fn test_delivery_reports() {
        let stats = StatsRecorder::new();
        stats.record_serialized(&labels("1"), 12, 10, 1_000);
        stats.record_delivery(
            &labels("1"),
            &DeliveryReport {
                records: 10,
                delivered: 10,
                bytes: 1_000,
                rounds: 3,
                throttled_rounds: 2,
                abandoned: false,
            },
        );
        stats.record_delivery(
            &labels("1"),
            &DeliveryReport {
                records: 5,
                delivered: 2,
                bytes: 500,
                rounds: 1,
                throttled_rounds: 0,
                abandoned: true,
            },
        );

        let row = &stats.rows()[0];
        assert_eq!(row.events_serialized, 10);
        assert_eq!(row.events_dropped, 2);
        assert_eq!(row.bytes_serialized, 1_000);
        assert_eq!(row.bytes_last_cycle, 1_000);
        assert_eq!(row.records_delivered, 12);
        assert_eq!(row.bytes_delivered, 1_000);
        assert_eq!(row.batches_delivered, 1);
        assert_eq!(row.batches_abandoned, 1);
        assert_eq!(row.retry_rounds, 2);
        assert_eq!(row.throttled_rounds, 2);
    }

    #[test]
    fn test_last_cycle_bytes_tracks_latest_publish() {
        let stats = StatsRecorder::new();
        stats.record_serialized(&labels("1"), 10, 10, 4_000);
        stats.record_serialized(&labels("1"), 3, 3, 900);

        let row = &stats.rows()[0];
        assert_eq!(row.bytes_serialized, 4_900);
        assert_eq!(row.bytes_last_cycle, 900);
        assert_eq!(row.events_dropped, 0);
    }

    #[test]
    fn test_latency_above_histogram_bound_is_kept() {
        let stats = StatsRecorder::new();
        stats.record_cycle(
            &labels("1"),
            1,
            Duration::from_secs(90),
            Duration::from_millis(1),
        );

        let row = &stats.rows()[0];
        assert_eq!(row.generate_latency.count, 1);
        assert!(row.generate_latency.max_us >= 59_000_000);
    }

    #[test]
    fn test_rows_sorted_by_numeric_org_id() {
        let stats = StatsRecorder::new();
        for id in ["10", "2", "1"] {
            stats.record_devices(&labels(id), 10);
        }
        let ids: Vec<String> = stats.rows().into_iter().map(|r| r.org_id).collect();
        assert_eq!(ids, vec!["1", "2", "10"]);
    }

    #[test]
    fn test_concurrent_updates() {
        let stats = Arc::new(StatsRecorder::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_cycle(&labels("1"), 1, Duration::ZERO, Duration::ZERO);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.rows()[0].cycles, 8000);
    }
}
