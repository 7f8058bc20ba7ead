//! Runs every organization's pipeline and coordinates shutdown.

use crate::config::{GeneratorConfig, OutputKind};
use crate::error::{Result, RunError};
use crate::org::Org;
use crate::pipeline::Pipeline;
use crate::report::Report;
use crate::stats::StatsRecorder;
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Instant;
use streamgen_core::{MetricsSink, OrgLabels};
use streamgen_output::{
    file_publisher_factory, stream_publisher_factory, HttpStreamClient, Publisher,
    PublisherFactory, StreamClient, StreamTarget,
};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// Builds the publisher factory selected by `config.output`.
pub fn publisher_factory(
    config: &GeneratorConfig,
    sink: Arc<dyn MetricsSink>,
) -> Result<PublisherFactory> {
    match config.output.kind {
        OutputKind::Stream => {
            let client = HttpStreamClient::new(&config.http_client_config())?;
            info!(
                endpoint = client.endpoint(),
                signed = client.is_signing(),
                "Using stream output"
            );
            if !client.is_signing() && config.stream.sign_requests {
                warn!("No AWS credentials in the environment, sending unsigned requests");
            }
            let client: Arc<dyn StreamClient> = Arc::new(client);
            Ok(stream_publisher_factory(
                client,
                config.publisher_settings(),
                sink,
            ))
        }
        OutputKind::File => {
            info!(dir = %config.output.dir.display(), "Using file output");
            Ok(file_publisher_factory(config.output.dir.clone(), sink))
        }
    }
}

struct Planned {
    labels: OrgLabels,
    seed: u64,
    publisher: Arc<dyn Publisher>,
}

/// Top-level orchestration of one run.
///
/// Publishers are initialized one by one before any pipeline starts; a
/// single failure aborts the run, and cancellation stops it with an empty
/// report. Once everything is running the runner
/// waits for `shutdown`, then stops pipelines, drains deliveries and
/// optionally deletes streams.
pub struct Runner {
    config: GeneratorConfig,
    factory: PublisherFactory,
    stats: Arc<StatsRecorder>,
    shutdown: CancellationToken,
}

impl Runner {
    pub fn new(
        config: GeneratorConfig,
        factory: PublisherFactory,
        stats: Arc<StatsRecorder>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            factory,
            stats,
            shutdown,
        }
    }

    /// Validates `config` and wires the configured output.
    pub fn from_config(config: GeneratorConfig, shutdown: CancellationToken) -> Result<Self> {
        config.validate()?;
        let stats = Arc::new(StatsRecorder::new());
        let factory = publisher_factory(&config, stats.clone() as Arc<dyn MetricsSink>)?;
        Ok(Self::new(config, factory, stats, shutdown))
    }

    pub fn stats(&self) -> &Arc<StatsRecorder> {
        &self.stats
    }

    pub async fn run(self) -> Result<Report> {
        let started = Instant::now();
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let plan = self.config.plan_orgs(&mut rng);
        info!(
            orgs = plan.len(),
            cases = self.config.unique_cases().len(),
            "Planned organizations"
        );

        if self.config.dry_run {
            for labels in &plan {
                info!(
                    org_id = %labels.org_id,
                    case = %labels.case,
                    size = %labels.size,
                    stream = %labels.stream_name(&self.config.global_prefix),
                    shards = labels.shard_count(),
                    "Dry run, skipping"
                );
            }
            return Ok(self.report(started));
        }

        let mut planned = Vec::with_capacity(plan.len());
        for labels in plan {
            let target = StreamTarget::new(labels.clone(), &self.config.global_prefix);
            let publisher = (self.factory)(&target);
            info!(
                org_id = %labels.org_id,
                stream = %target.stream_name,
                shards = target.shard_count,
                "Initializing publisher"
            );

            let init = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                result = publisher.init() => Some(result),
            };

            let Some(result) = init else {
                warn!(
                    stream = %target.stream_name,
                    initialized = planned.len(),
                    "Cancelled during initialization"
                );
                if self.config.cleanup_on_exit {
                    self.cleanup(planned.iter().map(|p: &Planned| Arc::clone(&p.publisher)))
                        .await;
                }
                return Ok(self.report(started));
            };

            if let Err(e) = result {
                error!(
                    stream = %target.stream_name,
                    shards = target.shard_count,
                    error = %e,
                    "Initialization failed, aborting"
                );
                self.shutdown.cancel();
                if self.config.cleanup_on_exit {
                    self.cleanup(planned.iter().map(|p: &Planned| Arc::clone(&p.publisher)))
                        .await;
                }
                return Err(RunError::InitAborted(e));
            }

            planned.push(Planned {
                labels,
                seed: rng.gen(),
                publisher,
            });
        }

        let tracker = TaskTracker::new();
        let mut pipelines = Vec::with_capacity(planned.len());
        let now = chrono::Utc::now().timestamp();

        for Planned {
            labels,
            seed,
            publisher,
        } in planned
        {
            let debug_events = self.config.debug_events;
            let org = tokio::task::spawn_blocking(move || Org::new(labels, debug_events, seed, now))
                .await?;
            self.stats.record_devices(org.labels(), org.device_count());

            let pipeline = Arc::new(Pipeline::new(
                Arc::new(org),
                publisher,
                self.stats.clone() as Arc<dyn MetricsSink>,
                self.config.interval(),
            ));
            let pump = Arc::clone(&pipeline);
            let shutdown = self.shutdown.clone();
            tracker.spawn(async move { pump.pump(shutdown).await });
            pipelines.push(pipeline);
        }

        if let Some(run_for) = self.config.run_for() {
            let shutdown = self.shutdown.clone();
            tracker.spawn(async move {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = tokio::time::sleep(run_for) => {
                        info!(secs = run_for.as_secs(), "Run duration elapsed");
                        shutdown.cancel();
                    }
                }
            });
        }

        info!(pipelines = pipelines.len(), "All pipelines running");
        self.shutdown.cancelled().await;
        info!("Shutting down pipelines");

        tracker.close();
        tracker.wait().await;

        let grace = self.config.drain_timeout();
        join_all(pipelines.iter().map(|p| p.wait_for_cycles(grace))).await;
        let pending: usize = join_all(pipelines.iter().map(|p| p.drain(grace)))
            .await
            .into_iter()
            .sum();
        if pending > 0 {
            warn!(pending, "Deliveries still running after drain timeout");
        }

        if self.config.cleanup_on_exit {
            for pipeline in &pipelines {
                let pipeline = Arc::clone(pipeline);
                tracker.spawn(async move { pipeline.cleanup().await });
            }
            tracker.wait().await;
        }

        info!("Shutdown complete");
        Ok(self.report(started))
    }

    async fn cleanup(&self, publishers: impl Iterator<Item = Arc<dyn Publisher>>) {
        let tracker = TaskTracker::new();
        for publisher in publishers {
            tracker.spawn(async move { publisher.cleanup().await });
        }
        tracker.close();
        tracker.wait().await;
    }

    fn report(&self, started: Instant) -> Report {
        Report::new(
            self.config.global_prefix.clone(),
            self.config.output.kind,
            self.config.interval(),
            self.config.dry_run,
            started.elapsed(),
            self.stats.rows(),
        )
    }
}
