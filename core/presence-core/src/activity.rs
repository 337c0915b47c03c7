//! Last-interaction tracking used to derive idle state.

use chrono::{DateTime, Utc};

const MILLIS_PER_MINUTE: i64 = 60_000;

/// Remembers when the user last interacted with the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityTracker {
    last_activity_ms: i64,
}

impl ActivityTracker {
    /// Starts tracking as if the user had just interacted.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_activity_ms: now.timestamp_millis(),
        }
    }

    /// Stamps `now` as the latest interaction. Older stamps never move the
    /// tracker backwards.
    pub fn record_activity(&mut self, now: DateTime<Utc>) {
        self.last_activity_ms = self.last_activity_ms.max(now.timestamp_millis());
    }

    pub fn last_activity_ms(&self) -> i64 {
        self.last_activity_ms
    }

    /// Whether more than `threshold_minutes` have passed since the last
    /// interaction. A zero threshold never reports idle.
    pub fn is_idle(&self, threshold_minutes: u32, now: DateTime<Utc>) -> bool {
        if threshold_minutes == 0 {
            return false;
        }
        let elapsed = now.timestamp_millis().saturating_sub(self.last_activity_ms);
        elapsed > i64::from(threshold_minutes) * MILLIS_PER_MINUTE
    }
}
