//! Fixed-window state and the per-check window arithmetic.

use crate::error::WindowCodecError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Persisted state of one fixed window.
///
/// Stored in the shared store as JSON text with exactly three numeric fields:
/// `{"total":10,"remaining":9,"reset":1700000000000}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    /// Capacity copied in when the window was first created.
    pub total: u64,
    /// Hits left before rejection. Goes negative once the subject is being rejected.
    pub remaining: i64,
    /// Absolute timestamp (clock milliseconds) at which the window ends.
    pub reset: u64,
}

impl RateLimitWindow {
    /// A full window starting at `now`.
    pub fn fresh(total: u64, now: u64, expire: Duration) -> Self {
        Self { total, remaining: clamp_remaining(total), reset: now.saturating_add(millis(expire)) }
    }

    /// Whether the window has ended. A window is still live at exactly `now == reset`.
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.reset
    }

    /// Replace an ended window's quota and deadline in place. `total` is kept.
    ///
    /// Returns `true` if a rollover happened.
    pub fn roll_over(&mut self, now: u64, total: u64, expire: Duration) -> bool {
        if !self.is_expired(now) {
            return false;
        }
        self.reset = now.saturating_add(millis(expire));
        self.remaining = clamp_remaining(total);
        true
    }

    /// Consume one hit. Never saturates at zero.
    pub fn hit(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }

    /// Whether the last hit was within quota.
    pub fn is_allowed(&self) -> bool {
        self.remaining >= 0
    }

    /// Time left in the window as seen from `now`.
    pub fn time_to_reset(&self, now: u64) -> Duration {
        Duration::from_millis(self.reset.saturating_sub(now))
    }

    /// Whole seconds until reset, rounded up, as sent in `Retry-After`.
    pub fn retry_after_secs(&self, now: u64) -> u64 {
        let ms = self.reset.saturating_sub(now);
        ms / 1000 + u64::from(ms % 1000 != 0)
    }

    /// Serialize for the store.
    pub fn encode(&self) -> Result<String, WindowCodecError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a value previously written by [`encode`](Self::encode).
    pub fn decode(raw: &str) -> Result<Self, WindowCodecError> {
        Ok(serde_json::from_str(raw)?)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn clamp_remaining(total: u64) -> i64 {
    i64::try_from(total).unwrap_or(i64::MAX)
}
