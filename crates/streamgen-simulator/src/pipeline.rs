//! Per-organization generate and publish loop.

use crate::org::Org;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use streamgen_core::{MetricsSink, OrgLabels};
use streamgen_output::Publisher;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Created, not pumping yet
    Idle,
    Running,
    /// Cancellation observed, leaving the loop
    Stopping,
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::Running => "running",
            PipelineState::Stopping => "stopping",
            PipelineState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Drives one organization: every interval, generate events and publish them.
///
/// Cycles run concurrently with the timer, so a slow cycle overlaps the next
/// one. A publish error cancels the shared shutdown token.
pub struct Pipeline {
    org: Arc<Org>,
    publisher: Arc<dyn Publisher>,
    sink: Arc<dyn MetricsSink>,
    interval: Duration,
    state: Mutex<PipelineState>,
    cycles: TaskTracker,
}

impl Pipeline {
    pub fn new(
        org: Arc<Org>,
        publisher: Arc<dyn Publisher>,
        sink: Arc<dyn MetricsSink>,
        interval: Duration,
    ) -> Self {
        Self {
            org,
            publisher,
            sink,
            interval,
            state: Mutex::new(PipelineState::Idle),
            cycles: TaskTracker::new(),
        }
    }

    pub fn labels(&self) -> &OrgLabels {
        self.org.labels()
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    /// Cycles still generating or publishing.
    pub fn cycles_in_flight(&self) -> usize {
        self.cycles.len()
    }

    fn set_state(&self, state: PipelineState) {
        *self.state.lock() = state;
    }

    /// Launches a cycle every interval until `shutdown` is cancelled.
    ///
    /// Returns after the first sleep that observes cancellation. Cycles
    /// already launched keep running; see [`Pipeline::wait_for_cycles`].
    pub async fn pump(&self, shutdown: CancellationToken) {
        let labels = self.org.labels();
        self.set_state(PipelineState::Running);
        info!(
            org_id = %labels.org_id,
            case = %labels.case,
            size = %labels.size,
            stream = self.publisher.destination(),
            interval_secs = self.interval.as_secs(),
            "Pipeline started"
        );

        while !shutdown.is_cancelled() {
            self.cycles.spawn(run_cycle(
                Arc::clone(&self.org),
                Arc::clone(&self.publisher),
                Arc::clone(&self.sink),
                shutdown.clone(),
            ));

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.set_state(PipelineState::Stopping);
        self.cycles.close();
        self.set_state(PipelineState::Stopped);
        info!(
            org_id = %labels.org_id,
            case = %labels.case,
            in_flight = self.cycles.len(),
            "Pipeline stopped"
        );
    }

    /// Waits up to `grace` for launched cycles. Returns false on timeout.
    pub async fn wait_for_cycles(&self, grace: Duration) -> bool {
        self.cycles.close();
        if tokio::time::timeout(grace, self.cycles.wait()).await.is_ok() {
            return true;
        }
        warn!(
            org_id = %self.org.labels().org_id,
            cycles = self.cycles.len(),
            "Cycles still running after grace period"
        );
        false
    }

    /// Waits up to `grace` for the publisher's in-flight deliveries.
    pub async fn drain(&self, grace: Duration) -> usize {
        self.publisher.drain(grace).await
    }

    /// Releases the publisher's remote resources.
    pub async fn cleanup(&self) {
        self.publisher.cleanup().await;
    }
}

/// One generation and publish round.
async fn run_cycle(
    org: Arc<Org>,
    publisher: Arc<dyn Publisher>,
    sink: Arc<dyn MetricsSink>,
    shutdown: CancellationToken,
) {
    let started = Instant::now();
    let generator = Arc::clone(&org);
    let events = match tokio::task::spawn_blocking(move || generator.generate_events()).await {
        Ok(events) => events,
        Err(e) => {
            error!(org_id = %org.labels().org_id, error = %e, "Event generation failed");
            return;
        }
    };
    let generate_elapsed = started.elapsed();
    let count = events.len();

    let started = Instant::now();
    if let Err(e) = publisher.publish(events).await {
        error!(
            org_id = %org.labels().org_id,
            stream = publisher.destination(),
            error = %e,
            "Publish failed, shutting down"
        );
        shutdown.cancel();
        return;
    }
    let publish_elapsed = started.elapsed();

    sink.record_cycle(org.labels(), count, generate_elapsed, publish_elapsed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use streamgen_core::{CaseId, Event, NoopSink, OrgSize};
    use streamgen_output::PublishError;

    #[derive(Default)]
    struct CountingPublisher {
        calls: AtomicUsize,
        events: AtomicUsize,
        fail: bool,
        cleaned: AtomicUsize,
    }

    #[async_trait]
    impl Publisher for CountingPublisher {
        fn destination(&self) -> &str {
            "test"
        }

        async fn init(&self) -> Result<(), PublishError> {
            Ok(())
        }

        async fn publish(&self, events: Vec<Box<dyn Event>>) -> Result<(), PublishError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.events.fetch_add(events.len(), Ordering::SeqCst);
            if self.fail {
                return Err(PublishError::Io {
                    path: "test".into(),
                    source: std::io::Error::other("disk full"),
                });
            }
            Ok(())
        }

        async fn cleanup(&self) {
            self.cleaned.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn org() -> Arc<Org> {
        Arc::new(Org::new(
            OrgLabels::new("1", CaseId::HeartbeatMessage, OrgSize::Tiny),
            false,
            1,
            0,
        ))
    }

    #[tokio::test]
    async fn test_pump_stops_on_cancel() {
        let publisher = Arc::new(CountingPublisher::default());
        let pipeline = Arc::new(Pipeline::new(
            org(),
            publisher.clone(),
            Arc::new(NoopSink),
            Duration::from_millis(20),
        ));
        assert_eq!(pipeline.state(), PipelineState::Idle);

        let shutdown = CancellationToken::new();
        let task = tokio::spawn({
            let pipeline = Arc::clone(&pipeline);
            let shutdown = shutdown.clone();
            async move { pipeline.pump(shutdown).await }
        });

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert_eq!(pipeline.state(), PipelineState::Running);
        shutdown.cancel();
        task.await.unwrap();

        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert!(pipeline.wait_for_cycles(Duration::from_secs(5)).await);
        assert!(publisher.calls.load(Ordering::SeqCst) >= 2);
        // first heartbeat cycle reports every device
        assert!(publisher.events.load(Ordering::SeqCst) >= 10);
        assert_eq!(publisher.cleaned.load(Ordering::SeqCst), 0);

        pipeline.cleanup().await;
        assert_eq!(publisher.cleaned.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_pump_runs_no_cycle() {
        let publisher = Arc::new(CountingPublisher::default());
        let pipeline = Pipeline::new(
            org(),
            publisher.clone(),
            Arc::new(NoopSink),
            Duration::from_secs(60),
        );
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        pipeline.pump(shutdown).await;

        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_publish_error_cancels_shutdown() {
        let publisher = Arc::new(CountingPublisher {
            fail: true,
            ..Default::default()
        });
        let pipeline = Pipeline::new(
            org(),
            publisher.clone(),
            Arc::new(NoopSink),
            Duration::from_secs(3600),
        );
        let shutdown = CancellationToken::new();

        tokio::time::timeout(Duration::from_secs(5), pipeline.pump(shutdown.clone()))
            .await
            .unwrap();

        assert!(shutdown.is_cancelled());
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }
}
