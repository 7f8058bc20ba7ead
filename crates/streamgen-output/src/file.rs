//! Publisher appending newline-delimited events to a local file.

use crate::error::PublishError;
use crate::publisher::{Publisher, StreamTarget};
use crate::stream::serialize_events;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use streamgen_core::{DeliveryReport, Event, MetricsSink};
use tokio::io::AsyncWriteExt;

/// Writes each organization's events to `{dir}/{stream_name}`.
pub struct FilePublisher {
    target: StreamTarget,
    path: PathBuf,
    destination: String,
    sink: Arc<dyn MetricsSink>,
}

impl FilePublisher {
    pub fn new(target: StreamTarget, dir: &Path, sink: Arc<dyn MetricsSink>) -> Self {
        let path = dir.join(&target.stream_name);
        let destination = path.display().to_string();
        Self {
            target,
            path,
            destination,
            sink,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> PublishError {
        PublishError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
impl Publisher for FilePublisher {
    fn destination(&self) -> &str {
        &self.destination
    }

    async fn init(&self) -> Result<(), PublishError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| self.io_error(dir, e))?;
        }
        Ok(())
    }

    async fn publish(&self, events: Vec<Box<dyn Event>>) -> Result<(), PublishError> {
        let (records, bytes) = serialize_events(&self.destination, &events);
        self.sink
            .record_serialized(&self.target.labels, events.len(), records.len(), bytes);

        let mut buf = Vec::with_capacity(bytes as usize + records.len());
        for record in &records {
            buf.extend_from_slice(&record.data);
            buf.push(b'\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(&self.path, e))?;
        file.write_all(&buf)
            .await
            .map_err(|e| self.io_error(&self.path, e))?;
        file.flush().await.map_err(|e| self.io_error(&self.path, e))?;

        self.sink.record_delivery(
            &self.target.labels,
            &DeliveryReport {
                records: records.len(),
                delivered: records.len(),
                bytes: buf.len() as u64,
                rounds: 1,
                ..Default::default()
            },
        );

        Ok(())
    }

    async fn cleanup(&self) {}
}
