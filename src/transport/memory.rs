use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use super::{
    PositionKind, PublishEntry, PublishOutcome, ReadResponse, StreamRecord, StreamTransport,
};
use crate::error::TransportError;

/// Process-local stream with Kinesis-like cursor semantics.
///
/// Offsets are absolute per shard; [`InMemoryStream::trim`] moves the trim
/// horizon forward and expires cursors pointing behind it. Cursors can also
/// expire by age (see [`InMemoryStream::with_cursor_ttl`]) or on demand.
/// A cursor token is consumed by a successful read; only the returned next
/// token stays valid.
pub struct InMemoryStream {
    cursor_ttl: Option<Duration>,
    state: Mutex<State>,
}

struct Shard {
    id: String,
    trimmed: usize,
    closed: bool,
    records: Vec<StreamRecord>,
}

impl Shard {
    fn end(&self) -> usize {
        self.trimmed + self.records.len()
    }
}

struct IssuedCursor {
    stream: String,
    shard: usize,
    offset: usize,
    issued_at: Instant,
    expired: bool,
}

#[derive(Default)]
struct State {
    streams: HashMap<String, Vec<Shard>>,
    cursors: HashMap<String, IssuedCursor>,
    rejected_keys: HashSet<String>,
    unavailable: bool,
    stalled: bool,
    issued: u64,
    sequence: u64,
}

impl InMemoryStream {
    /// Creates `stream` with `shard_count` empty shards (at least one).
    pub fn new(stream: &str, shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|i| Shard {
                id: format!("shardId-{i:012}"),
                trimmed: 0,
                closed: false,
                records: Vec::new(),
            })
            .collect();

        let mut state = State::default();
        state.streams.insert(stream.to_string(), shards);

        Self {
            cursor_ttl: None,
            state: Mutex::new(state),
        }
    }

    /// Cursors older than `ttl` fail with [`TransportError::CursorExpired`].
    pub fn with_cursor_ttl(mut self, ttl: Duration) -> Self {
        self.cursor_ttl = Some(ttl);
        self
    }

    /// While unavailable every call fails with [`TransportError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.unavailable = !available;
        }
    }

    /// While stalled, reads never complete.
    pub fn set_stalled(&self, stalled: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.stalled = stalled;
        }
    }

    /// Closes every shard of `stream`: publishes are refused and a read that
    /// reaches the end of a shard returns no next cursor.
    pub fn close_shards(&self, stream: &str) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(shards) = state.streams.get_mut(stream) {
                for shard in shards.iter_mut() {
                    shard.closed = true;
                }
            }
        }
    }

    /// Number of cursor tokens currently outstanding.
    pub fn outstanding_cursors(&self) -> usize {
        self.state.lock().map(|state| state.cursors.len()).unwrap_or(0)
    }

    /// Expires every cursor issued so far.
    pub fn expire_cursors(&self) {
        if let Ok(mut state) = self.state.lock() {
            for cursor in state.cursors.values_mut() {
                cursor.expired = true;
            }
        }
    }

    /// Publishes with this partition key are reported as failed entries.
    pub fn reject_partition_key(&self, key: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.rejected_keys.insert(key.to_string());
        }
    }

    /// Drops all but the newest `keep` records of every shard of `stream`.
    pub fn trim(&self, stream: &str, keep: usize) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(shards) = state.streams.get_mut(stream) {
                for shard in shards.iter_mut() {
                    let drop = shard.records.len().saturating_sub(keep);
                    shard.records.drain(..drop);
                    shard.trimmed += drop;
                }
            }
        }
    }

    /// Number of records currently retained across all shards of `stream`.
    pub fn retained(&self, stream: &str) -> usize {
        self.state
            .lock()
            .ok()
            .and_then(|state| {
                state
                    .streams
                    .get(stream)
                    .map(|shards| shards.iter().map(|s| s.records.len()).sum())
            })
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, TransportError> {
        let state = self
            .state
            .lock()
            .map_err(|_| TransportError::unavailable("in-memory stream lock poisoned"))?;
        if state.unavailable {
            return Err(TransportError::unavailable("stream service unreachable"));
        }
        Ok(state)
    }
}

impl State {
    fn issue(&mut self, stream: &str, shard: usize, offset: usize) -> String {
        self.issued += 1;
        let token = format!("{stream}:{shard}:{}", self.issued);
        self.cursors.insert(
            token.clone(),
            IssuedCursor {
                stream: stream.to_string(),
                shard,
                offset,
                issued_at: Instant::now(),
                expired: false,
            },
        );
        token
    }
}

fn shard_for(key: &str, shard_count: usize) -> usize {
    let hash = key
        .bytes()
        .fold(0u64, |h, b| h.wrapping_mul(31).wrapping_add(u64::from(b)));
    (hash % shard_count as u64) as usize
}

#[async_trait]
impl StreamTransport for InMemoryStream {
    async fn describe(&self, stream: &str) -> Result<Vec<String>, TransportError> {
        let state = self.lock()?;
        let shards = state
            .streams
            .get(stream)
            .ok_or_else(|| TransportError::unavailable(format!("stream {stream} not found")))?;
        Ok(shards.iter().map(|s| s.id.clone()).collect())
    }

    async fn get_cursor(
        &self,
        stream: &str,
        shard: &str,
        position: PositionKind,
    ) -> Result<String, TransportError> {
        let mut state = self.lock()?;
        let shards = state
            .streams
            .get(stream)
            .ok_or_else(|| TransportError::unavailable(format!("stream {stream} not found")))?;
        let index = shards
            .iter()
            .position(|s| s.id == shard)
            .ok_or_else(|| TransportError::unavailable(format!("shard {shard} not found")))?;

        let offset = match position {
            PositionKind::Earliest => shards[index].trimmed,
            PositionKind::Latest => shards[index].end(),
        };
        Ok(state.issue(stream, index, offset))
    }

    async fn read(&self, token: &str, limit: usize) -> Result<ReadResponse, TransportError> {
        let stalled = self.lock()?.stalled;
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut state = self.lock()?;
        let (stream, shard_index, offset, expired) = {
            let cursor = state
                .cursors
                .get(token)
                .ok_or_else(|| TransportError::unavailable(format!("unknown cursor {token}")))?;
            let aged = self
                .cursor_ttl
                .is_some_and(|ttl| cursor.issued_at.elapsed() > ttl);
            (
                cursor.stream.clone(),
                cursor.shard,
                cursor.offset,
                cursor.expired || aged,
            )
        };

        let shard = &state.streams[&stream][shard_index];
        if expired || offset < shard.trimmed {
            return Err(TransportError::CursorExpired {
                partition: format!("{stream}/{}", shard.id),
            });
        }

        let start = offset - shard.trimmed;
        let records: Vec<StreamRecord> = shard
            .records
            .iter()
            .skip(start)
            .take(limit)
            .cloned()
            .collect();
        let next_offset = offset + records.len();
        let exhausted = shard.closed && next_offset == shard.end();
        debug!(token, returned = records.len(), next_offset, exhausted, "in-memory read");

        state.cursors.remove(token);
        let next_token = (!exhausted).then(|| state.issue(&stream, shard_index, next_offset));
        Ok(ReadResponse {
            records,
            next_token,
        })
    }

    async fn publish(
        &self,
        stream: &str,
        entries: Vec<PublishEntry>,
    ) -> Result<PublishOutcome, TransportError> {
        let mut state = self.lock()?;
        let State {
            streams,
            rejected_keys,
            sequence,
            ..
        } = &mut *state;
        let shards = streams
            .get_mut(stream)
            .ok_or_else(|| TransportError::unavailable(format!("stream {stream} not found")))?;

        let mut outcome = PublishOutcome::default();
        for entry in entries {
            let index = shard_for(&entry.partition_key, shards.len());
            if rejected_keys.contains(&entry.partition_key) || shards[index].closed {
                outcome.failed += 1;
                continue;
            }
            *sequence += 1;
            shards[index].records.push(StreamRecord {
                partition_key: entry.partition_key,
                sequence: format!("{:020}", *sequence),
                data: entry.payload,
            });
            outcome.accepted += 1;
        }
        Ok(outcome)
    }
}
