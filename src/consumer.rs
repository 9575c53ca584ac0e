//! The fetch cycle: one bounded read folded into the latest-state cache per tick.
//!
//! A tick never fails. Transport problems become a [`TickStatus`] and the
//! caller simply ticks again later:
//!
//! | condition              | cursor      | cache     |
//! |------------------------|-------------|-----------|
//! | mode changed / reset   | dropped     | cleared   |
//! | acquire failed         | still none  | kept      |
//! | cursor expired         | dropped     | kept      |
//! | transport unavailable  | kept        | kept      |
//! | shard closed           | dropped     | kept      |

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cache::VehicleCache;
use crate::cursor::{Cursor, CursorManager};
use crate::mode::{Mode, ModeController, ModeSignal};
use crate::record::VehicleUpdate;
use crate::stats::{TickReport, TickStatus};
use crate::transport::StreamTransport;

/// Records read per tick unless configured otherwise.
pub const DEFAULT_BATCH_LIMIT: usize = 200;

/// Everything one consumer owns between ticks.
///
/// Independent consumers each hold their own state; nothing is shared.
#[derive(Debug)]
pub struct ConsumerState {
    cursor: Option<Cursor>,
    cache: VehicleCache,
    mode: ModeController,
    seen_ids: BTreeSet<String>,
}

impl ConsumerState {
    pub fn new(mode: Mode) -> Self {
        Self {
            cursor: None,
            cache: VehicleCache::new(),
            mode: ModeController::new(mode),
            seen_ids: BTreeSet::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode.current()
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn cache(&self) -> &VehicleCache {
        &self.cache
    }

    /// Every id observed this session, kept across resets and mode changes.
    pub fn seen_ids(&self) -> &BTreeSet<String> {
        &self.seen_ids
    }

    /// Explicit user reset: the next tick re-acquires and starts from an empty cache.
    pub fn reset(&mut self) {
        self.cursor = None;
        self.cache.reset();
    }
}

/// Result of one tick: the report plus the full current cache contents.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub report: TickReport,
    pub vehicles: Vec<VehicleUpdate>,
}

pub struct FetchCycle<T> {
    cursors: CursorManager<T>,
    batch_limit: usize,
}

impl<T: StreamTransport> FetchCycle<T> {
    pub fn new(transport: Arc<T>, stream: impl Into<String>) -> Self {
        Self::with_cursor_manager(CursorManager::new(transport, stream))
    }

    pub fn with_cursor_manager(cursors: CursorManager<T>) -> Self {
        Self {
            cursors,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    /// Caps how many records one tick may fold. Zero is treated as one.
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    /// Runs one tick against the current wall clock.
    pub async fn tick(&self, state: &mut ConsumerState, requested: Mode) -> TickOutcome {
        let now = Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        self.tick_at(state, requested, now).await
    }

    /// Runs one tick, computing lag against `now` (epoch seconds).
    #[tracing::instrument(skip(self, state, now), fields(stream = %self.cursors.stream()))]
    pub async fn tick_at(
        &self,
        state: &mut ConsumerState,
        requested: Mode,
        now: f64,
    ) -> TickOutcome {
        let mut report = TickReport::new(requested);

        if let ModeSignal::Changed { from, to } = state.mode.observe(requested) {
            info!(
                %from,
                %to,
                dropped = state.cache.len(),
                "Mode changed, resetting stream position"
            );
            state.reset();
            report.mode_changed = true;
        }

        // The held cursor stays in `state` until a read settles, so a tick
        // dropped mid-read resumes from the same position.
        let cursor = match state.cursor.clone() {
            Some(cursor) => cursor,
            None => match self.cursors.acquire(requested).await {
                Ok(cursor) => {
                    state.cursor = Some(cursor.clone());
                    cursor
                }
                Err(e) => {
                    warn!(error = %e, "Could not acquire cursor, retrying next tick");
                    return self.finish(state, report.with_status(TickStatus::AcquireFailed));
                }
            },
        };

        let batch = match self.cursors.read(&cursor, self.batch_limit).await {
            Ok(batch) => batch,
            Err(e) if e.is_expired() => {
                warn!(error = %e, "Cursor expired, re-acquiring next tick");
                state.cursor = None;
                return self.finish(state, report.with_status(TickStatus::CursorExpired));
            }
            Err(e) => {
                warn!(error = %e, "Stream read failed, retrying next tick");
                return self.finish(state, report.with_status(TickStatus::TransportUnavailable));
            }
        };

        state.cursor = batch.next_cursor;
        if state.cursor.is_none() {
            info!(partition = %cursor.partition(), "Shard closed, re-acquiring next tick");
            report.status = TickStatus::ShardClosed;
        }

        report.records_read = batch.records.len();
        let mut last_source_timestamp = None;
        for record in &batch.records {
            match VehicleUpdate::from_payload(&record.data) {
                Ok(update) => {
                    last_source_timestamp = Some(update.source_timestamp);
                    state.seen_ids.insert(update.id.clone());
                    state.cache.fold(update);
                    report.records_folded += 1;
                }
                Err(e) => {
                    debug!(sequence = %record.sequence, error = %e, "Dropping undecodable record");
                    report.decode_failures += 1;
                }
            }
        }

        if report.decode_failures > 0 {
            warn!(failures = report.decode_failures, "Dropped undecodable records");
        }

        // An empty batch reports zero lag rather than "unknown"; displays
        // treat 0 as the "caught up / nothing new" sentinel.
        report.lag_seconds = last_source_timestamp.map_or(0.0, |ts| now - ts);

        self.finish(state, report)
    }

    fn finish(&self, state: &ConsumerState, mut report: TickReport) -> TickOutcome {
        report.vehicle_count = state.cache.len();
        debug!(
            status = ?report.status,
            folded = report.records_folded,
            vehicles = report.vehicle_count,
            lag_seconds = report.lag_seconds,
            "Tick complete"
        );
        TickOutcome {
            report,
            vehicles: state.cache.snapshot(),
        }
    }
}
