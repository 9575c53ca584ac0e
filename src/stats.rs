use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::mode::Mode;

/// How a tick ended. Only `Ok` means records were read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickStatus {
    #[default]
    Ok,
    AcquireFailed,
    CursorExpired,
    TransportUnavailable,
    ShardClosed,
}

/// One row per consumer tick; appended to CSV by [`crate::output::append_record`].
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub timestamp: DateTime<Utc>,
    pub mode: Mode,
    pub status: TickStatus,
    pub mode_changed: bool,

    // batch
    pub records_read: usize,
    pub records_folded: usize,
    pub decode_failures: usize,

    // world state
    pub vehicle_count: usize,
    /// Seconds behind wall clock of the last folded record; 0 for an empty batch.
    pub lag_seconds: f64,
}

impl TickReport {
    pub fn new(mode: Mode) -> Self {
        TickReport {
            timestamp: Utc::now(),
            mode,
            status: TickStatus::Ok,
            mode_changed: false,
            records_read: 0,
            records_folded: 0,
            decode_failures: 0,
            vehicle_count: 0,
            lag_seconds: 0.0,
        }
    }

    pub fn with_status(mut self, status: TickStatus) -> Self {
        self.status = status;
        self
    }

    pub fn lag_minutes(&self) -> f64 {
        self.lag_seconds / 60.0
    }
}

/// Outcome of publishing one feed snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub entities: usize,
    pub vehicles: usize,
    pub batches: usize,
    pub published: usize,
    pub failed: usize,
}

impl PublishReport {
    /// Entities that did not yield a vehicle record.
    pub fn skipped(&self) -> usize {
        self.entities.saturating_sub(self.vehicles)
    }
}
