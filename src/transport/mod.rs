//! Partitioned append-only stream transports.
//!
//! [`StreamTransport`] is the narrow seam the consumer and producer talk to.
//! [`KinesisTransport`] talks to AWS Kinesis Data Streams; [`InMemoryStream`]
//! is a deterministic stand-in used by tests and local runs.

mod kinesis;
mod memory;

pub use kinesis::KinesisTransport;
pub use memory::InMemoryStream;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;

/// Where a freshly requested cursor should point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionKind {
    /// Oldest record still retained by the stream.
    Earliest,
    /// Just past the newest record; only later publishes are visible.
    Latest,
}

/// A record read back from a shard.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    pub partition_key: String,
    pub sequence: String,
    pub data: Bytes,
}

/// Result of one `read` call.
#[derive(Debug, Clone, Default)]
pub struct ReadResponse {
    pub records: Vec<StreamRecord>,
    /// `None` once the shard is closed and fully drained.
    pub next_token: Option<String>,
}

/// One entry of a publish call.
#[derive(Debug, Clone)]
pub struct PublishEntry {
    pub partition_key: String,
    pub payload: Bytes,
}

/// Per-call publish outcome. Failed entries are not retried by the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    pub accepted: usize,
    pub failed: usize,
}

#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Lists the shard ids of `stream`.
    async fn describe(&self, stream: &str) -> Result<Vec<String>, TransportError>;

    /// Issues an opaque read token for one shard.
    async fn get_cursor(
        &self,
        stream: &str,
        shard: &str,
        position: PositionKind,
    ) -> Result<String, TransportError>;

    /// Reads at most `limit` records at `token`.
    async fn read(&self, token: &str, limit: usize) -> Result<ReadResponse, TransportError>;

    /// Appends `entries` to `stream`, routing each by its partition key.
    async fn publish(
        &self,
        stream: &str,
        entries: Vec<PublishEntry>,
    ) -> Result<PublishOutcome, TransportError>;
}
