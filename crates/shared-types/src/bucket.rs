//! # Fixed-Window Bucket
//!
//! Per-key rate-limit counter state for the current window.
//!
//! ```text
//!  window_start                      window_start + window
//!      │◀──────────── window ──────────────▶│
//!      │ consume → remaining-1 ... 0 → reject│ fresh bucket
//! ```
//!
//! Invariant: `0 <= remaining <= capacity`. A bucket is only meaningful
//! while `now < window_start + window`; after that the key starts over.

use std::time::{Duration, Instant};

/// Counter state of one fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub capacity: u32,
    pub remaining: u32,
    pub window_start: Instant,
    pub window: Duration,
}

impl Bucket {
    /// A full bucket whose window opens at `now`.
    #[must_use]
    pub fn start(capacity: u32, window: Duration, now: Instant) -> Self {
        Self {
            capacity,
            remaining: capacity,
            window_start: now,
            window,
        }
    }

    /// Instant at which the window closes.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.window_start + self.window
    }

    /// Whether `now` still falls inside the window.
    #[must_use]
    pub fn is_current(&self, now: Instant) -> bool {
        now < self.deadline()
    }

    /// Time until the window closes, zero if already closed.
    #[must_use]
    pub fn resets_in(&self, now: Instant) -> Duration {
        self.deadline().saturating_duration_since(now)
    }

    /// Points consumed so far in this window.
    #[must_use]
    pub fn used(&self) -> u32 {
        self.capacity - self.remaining
    }

    /// Take one point. Returns `false` (and leaves the bucket untouched)
    /// when none remain.
    pub fn try_consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}
