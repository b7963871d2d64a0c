//! # Wall Clock
//!
//! Bucket selection, TTL expiry and decay scheduling all depend on "now".
//! The [`Clock`] trait lets the engine read the wall clock through an
//! injectable seam so tests can pin time to a specific half-hour slot.

use chrono::{DateTime, Duration, FixedOffset, Local};
use std::sync::{Mutex, PoisonError};

/// Source of the current local wall-clock time
pub trait Clock: Send + Sync {
    /// Current local time, including the UTC offset in effect
    fn now(&self) -> DateTime<FixedOffset>;

    /// Current time as milliseconds since the Unix epoch
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Production clock backed by the system's local time zone
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// A clock that only moves when told to.
///
/// Used by tests and by the CLI's `--at` override.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl ManualClock {
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Replace the current time
    pub fn set(&self, to: DateTime<FixedOffset>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }

    /// Move the clock forward (or backward, for negative values)
    pub fn advance_millis(&self, millis: i64) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += Duration::milliseconds(millis);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
