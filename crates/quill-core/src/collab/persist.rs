//! Debounced persistence: when the editor buffer is written to the store.
//!
//! Every local edit re-arms a fixed quiet-period deadline. The write happens
//! only once the deadline passes with no further local edit, so a burst of
//! typing produces a single update carrying the burst's final state. Failed
//! writes are reported, never retried; the next edit arms a fresh attempt.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::models::Note;

/// Idle save delay - save after 2 seconds of no typing
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(2000);

/// Explicit debounce timer handle. Arming replaces any previous deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistTimer {
    deadline: Option<Instant>,
}

impl PersistTimer {
    pub fn arm(&mut self, now: Instant, quiet_period: Duration) {
        self.deadline = Some(now + quiet_period);
    }

    /// Discard the pending deadline. Returns whether one was armed.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Disarm and return true when the deadline has passed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Save indicator state exposed to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SaveStatus {
    /// Nothing written since the note was loaded
    Idle,
    /// Local edits waiting for the quiet period
    Pending,
    Saving,
    Saved { at: DateTime<Utc> },
    /// Last write failed; the buffer is kept and the next edit retries
    Failed { message: String },
}

/// Owns the debounce timer and the bookkeeping around writes.
///
/// At most one write is in flight. A quiet period that expires while a write
/// is running queues a follow-up write, started once the running one ends.
#[derive(Debug, Clone)]
pub struct PersistController {
    quiet_period: Duration,
    timer: PersistTimer,
    in_flight: bool,
    queued: bool,
    last_persisted_at: Option<DateTime<Utc>>,
    status: SaveStatus,
    writes_issued: u64,
}

impl PersistController {
    #[must_use]
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            timer: PersistTimer::default(),
            in_flight: false,
            queued: false,
            last_persisted_at: None,
            status: SaveStatus::Idle,
            writes_issued: 0,
        }
    }

    /// A local edit happened at `now`: restart the quiet period.
    pub fn on_local_edit(&mut self, now: Instant) {
        self.timer.arm(now, self.quiet_period);
        self.status = SaveStatus::Pending;
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Whether the quiet period has elapsed; disarms the timer when it has.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        self.timer.fire_if_due(now)
    }

    /// Drop the pending deadline and any queued write without writing.
    ///
    /// Returns whether a save was owed.
    pub fn cancel(&mut self) -> bool {
        let owed = self.timer.cancel() | std::mem::take(&mut self.queued);
        if owed && !self.in_flight {
            self.status = self.settled_status();
        }
        owed
    }

    /// Claim the single write slot. Returns false and queues a follow-up
    /// when a write is already running.
    pub fn begin(&mut self) -> bool {
        if self.in_flight {
            self.queued = true;
            if !self.timer.is_armed() {
                self.status = SaveStatus::Saving;
            }
            return false;
        }
        self.in_flight = true;
        self.writes_issued += 1;
        if !self.timer.is_armed() {
            self.status = SaveStatus::Saving;
        }
        true
    }

    /// Record the outcome of the running write.
    ///
    /// Returns true when a queued write should start now.
    pub fn finish(&mut self, outcome: Result<&Note, String>) -> bool {
        self.in_flight = false;
        let follow_up = std::mem::take(&mut self.queued);
        if let Ok(note) = outcome {
            self.last_persisted_at = Some(note.updated_at);
        }

        if self.timer.is_armed() {
            self.status = SaveStatus::Pending;
        } else if follow_up {
            self.status = SaveStatus::Saving;
        } else {
            self.status = match outcome {
                Ok(note) => SaveStatus::Saved {
                    at: note.updated_at,
                },
                Err(message) => SaveStatus::Failed { message },
            };
        }
        follow_up
    }

    #[must_use]
    pub const fn pending_persist(&self) -> bool {
        self.timer.is_armed() || self.in_flight || self.queued
    }

    #[must_use]
    pub const fn in_flight(&self) -> bool {
        self.in_flight
    }

    #[must_use]
    pub const fn last_persisted_at(&self) -> Option<DateTime<Utc>> {
        self.last_persisted_at
    }

    #[must_use]
    pub const fn status(&self) -> &SaveStatus {
        &self.status
    }

    /// Writes handed to the store since the session started.
    #[must_use]
    pub const fn writes_issued(&self) -> u64 {
        self.writes_issued
    }

    fn settled_status(&self) -> SaveStatus {
        match self.last_persisted_at {
            Some(at) => SaveStatus::Saved { at },
            None => SaveStatus::Idle,
        }
    }
}
