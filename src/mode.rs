//! Viewing modes and the transition detector.

use std::fmt;

use serde::Serialize;

/// Where a consumer starts reading and how it advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Start at the stream tip; only records published afterwards are seen.
    Live,
    /// Start at the oldest retained record and play the backlog forward.
    Replay,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Live => f.write_str("live"),
            Mode::Replay => f.write_str("replay"),
        }
    }
}

/// Outcome of comparing the requested mode with the last applied one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSignal {
    Unchanged,
    /// The caller must drop its cursor and clear its cache.
    Changed { from: Mode, to: Mode },
}

/// Two-state machine over [`Mode`], evaluated once per tick.
#[derive(Debug, Clone)]
pub struct ModeController {
    last_applied: Mode,
}

impl ModeController {
    pub fn new(initial: Mode) -> Self {
        Self {
            last_applied: initial,
        }
    }

    pub fn current(&self) -> Mode {
        self.last_applied
    }

    /// Records `requested` as applied and reports whether it differs from
    /// the previous mode.
    pub fn observe(&mut self, requested: Mode) -> ModeSignal {
        if requested == self.last_applied {
            return ModeSignal::Unchanged;
        }

        let from = self.last_applied;
        self.last_applied = requested;
        ModeSignal::Changed {
            from,
            to: requested,
        }
    }
}
