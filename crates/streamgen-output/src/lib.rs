//! streamgen output - getting events out of the process
//!
//! Two publisher flavours share the [`Publisher`] trait:
//! - [`StreamPublisher`] ships events to a shard-partitioned, rate-limited
//!   stream service. It packs serialized events into request-sized batches
//!   ([`Batcher`]), delivers every batch on its own task, resubmits only the
//!   records the service rejected, and backs off when throttled. Before the
//!   first publish the [`StreamLifecycle`] makes sure the stream exists and
//!   is tagged; on shutdown it can tear the stream down again.
//! - [`FilePublisher`] appends newline-delimited events to a local file.
//!
//! The remote service is reached through the [`StreamClient`] trait;
//! [`HttpStreamClient`] speaks the Kinesis JSON protocol, SigV4-signing
//! requests when [`Credentials`] are supplied.

pub mod batcher;
pub mod client;
pub mod delivery;
pub mod error;
pub mod file;
pub mod http;
pub mod lifecycle;
pub mod publisher;
pub mod sigv4;
pub mod stream;
pub mod testing;

pub use batcher::{Batch, Batcher, MAX_BYTES_PER_REQUEST, MAX_RECORDS_PER_REQUEST};
pub use client::{
    PutRecordResult, PutRecordsOutput, StreamClient, StreamDescription, StreamStatus,
    THROUGHPUT_EXCEEDED,
};
pub use delivery::deliver_batch;
pub use error::{PublishError, Result, StreamError};
pub use file::FilePublisher;
pub use http::{HttpClientConfig, HttpStreamClient};
pub use lifecycle::{LifecycleState, LifecycleTimings, StreamLifecycle};
pub use publisher::{file_publisher_factory, stream_publisher_factory, Publisher, PublisherFactory, StreamTarget};
pub use sigv4::{Credentials, Signer};
pub use stream::{StreamPublisher, StreamPublisherSettings};
