//! Read positions into one stream partition.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::TransportError;
use crate::mode::Mode;
use crate::transport::{PositionKind, StreamRecord, StreamTransport};

/// Default bound on a single transport call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// One shard of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionId {
    pub stream: String,
    pub shard: String,
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stream, self.shard)
    }
}

/// An opaque read position, scoped to exactly one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    token: String,
    mode: Mode,
    partition: PartitionId,
}

impl Cursor {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn partition(&self) -> &PartitionId {
        &self.partition
    }

    fn advanced(&self, token: String) -> Self {
        Self {
            token,
            mode: self.mode,
            partition: self.partition.clone(),
        }
    }
}

/// Records returned by [`CursorManager::read`] and where to read next.
#[derive(Debug, Clone)]
pub struct ReadBatch {
    pub records: Vec<StreamRecord>,
    /// `None` when the shard is closed; the caller must re-acquire.
    pub next_cursor: Option<Cursor>,
}

/// Acquires and advances cursors for one stream.
///
/// Every transport call is bounded by `call_timeout`; an elapsed timeout is
/// reported as [`TransportError::Unavailable`].
pub struct CursorManager<T> {
    transport: Arc<T>,
    stream: String,
    shard: Option<String>,
    call_timeout: Duration,
}

impl<T: StreamTransport> CursorManager<T> {
    pub fn new(transport: Arc<T>, stream: impl Into<String>) -> Self {
        Self {
            transport,
            stream: stream.into(),
            shard: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Pins reads to `shard` instead of the first shard the stream lists.
    pub fn with_shard(mut self, shard: impl Into<String>) -> Self {
        self.shard = Some(shard.into());
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// LIVE positions at the stream tip, REPLAY at the trim horizon.
    #[tracing::instrument(skip(self), fields(stream = %self.stream))]
    pub async fn acquire(&self, mode: Mode) -> Result<Cursor, TransportError> {
        let shard = match &self.shard {
            Some(shard) => shard.clone(),
            None => {
                let shards = self.bounded(self.transport.describe(&self.stream)).await?;
                shards.into_iter().next().ok_or_else(|| {
                    TransportError::unavailable(format!("stream {} has no shards", self.stream))
                })?
            }
        };

        let position = match mode {
            Mode::Live => PositionKind::Latest,
            Mode::Replay => PositionKind::Earliest,
        };
        let token = self
            .bounded(self.transport.get_cursor(&self.stream, &shard, position))
            .await?;

        info!(shard = %shard, ?position, "Cursor acquired");
        Ok(Cursor {
            token,
            mode,
            partition: PartitionId {
                stream: self.stream.clone(),
                shard,
            },
        })
    }

    /// Reads at most `max_records` at `cursor`.
    ///
    /// A transport answering with more than `max_records` has already moved
    /// its next cursor past the surplus, so the response is rejected as
    /// [`TransportError::Unavailable`] and `cursor` stays usable.
    pub async fn read(
        &self,
        cursor: &Cursor,
        max_records: usize,
    ) -> Result<ReadBatch, TransportError> {
        let response = self
            .bounded(self.transport.read(&cursor.token, max_records))
            .await
            .map_err(|e| match e {
                TransportError::CursorExpired { .. } => TransportError::CursorExpired {
                    partition: cursor.partition.to_string(),
                },
                other => other,
            })?;

        debug!(
            partition = %cursor.partition,
            records = response.records.len(),
            "Read batch"
        );

        if response.records.len() > max_records {
            return Err(TransportError::unavailable(format!(
                "read returned {} records, limit was {max_records}",
                response.records.len()
            )));
        }

        Ok(ReadBatch {
            records: response.records,
            next_cursor: response.next_token.map(|token| cursor.advanced(token)),
        })
    }

    async fn bounded<F, R>(&self, call: F) -> Result<R, TransportError>
    where
        F: Future<Output = Result<R, TransportError>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::unavailable(format!(
                "transport call timed out after {:?}",
                self.call_timeout
            ))),
        }
    }
}
