//! Publisher trait and factories.

use crate::client::StreamClient;
use crate::error::PublishError;
use crate::file::FilePublisher;
use crate::stream::{StreamPublisher, StreamPublisherSettings};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use streamgen_core::{Event, MetricsSink, OrgLabels};

/// Destination of one organization's events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    pub labels: OrgLabels,
    pub stream_name: String,
    pub shard_count: u32,
}

impl StreamTarget {
    pub fn new(labels: OrgLabels, global_prefix: &str) -> Self {
        Self {
            stream_name: labels.stream_name(global_prefix),
            shard_count: labels.shard_count(),
            labels,
        }
    }
}

/// Sink for generated events.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Name of the destination, for logs.
    fn destination(&self) -> &str;

    /// Prepares the destination. Must succeed before the first publish.
    async fn init(&self) -> Result<(), PublishError>;

    /// Hands events over for delivery.
    ///
    /// Events that fail to serialize are dropped. Remote delivery may still
    /// be running when this returns.
    async fn publish(&self, events: Vec<Box<dyn Event>>) -> Result<(), PublishError>;

    /// Waits up to `grace` for in-flight deliveries, returning how many are
    /// still running afterwards.
    async fn drain(&self, _grace: Duration) -> usize {
        0
    }

    /// Releases remote resources. Best-effort.
    async fn cleanup(&self);
}

/// Builds the publisher for one organization.
pub type PublisherFactory = Arc<dyn Fn(&StreamTarget) -> Arc<dyn Publisher> + Send + Sync>;

/// Factory producing [`StreamPublisher`]s that share one client.
pub fn stream_publisher_factory(
    client: Arc<dyn StreamClient>,
    settings: StreamPublisherSettings,
    sink: Arc<dyn MetricsSink>,
) -> PublisherFactory {
    Arc::new(move |target: &StreamTarget| {
        let publisher = StreamPublisher::new(
            target.clone(),
            Arc::clone(&client),
            settings.clone(),
            Arc::clone(&sink),
        );
        Arc::new(publisher) as Arc<dyn Publisher>
    })
}

/// Factory producing [`FilePublisher`]s writing below `dir`.
pub fn file_publisher_factory(dir: impl Into<PathBuf>, sink: Arc<dyn MetricsSink>) -> PublisherFactory {
    let dir = dir.into();
    Arc::new(move |target: &StreamTarget| {
        let publisher = FilePublisher::new(target.clone(), &dir, Arc::clone(&sink));
        Arc::new(publisher) as Arc<dyn Publisher>
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedStreamClient;
    use streamgen_core::{CaseId, NoopSink, OrgSize};

    fn target() -> StreamTarget {
        StreamTarget::new(
            OrgLabels::new("7", CaseId::TemperatureReading, OrgSize::Medium),
            "gen",
        )
    }

    #[test]
    fn test_target_derives_name_and_shards() {
        let target = target();
        assert_eq!(target.stream_name, "gen_temperature_reading_7");
        assert_eq!(target.shard_count, 2);
    }

    #[test]
    fn test_factories_choose_variant() {
        let sink: Arc<dyn MetricsSink> = Arc::new(NoopSink);
        let client: Arc<dyn StreamClient> = Arc::new(ScriptedStreamClient::new());

        let stream = stream_publisher_factory(client, StreamPublisherSettings::default(), sink.clone());
        assert_eq!(stream(&target()).destination(), "gen_temperature_reading_7");

        let file = file_publisher_factory("/tmp/out", sink);
        assert!(file(&target()).destination().ends_with("gen_temperature_reading_7"));
    }
}
