//! Occupancy summary — derived view over tracker state, no state of its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tracker::Tracker;

/// Aggregate counters consumers render and the alert engine observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Total tracks ever created over the tracker's lifetime.
    pub unique: u64,
    /// Tracks currently inside the active zone.
    pub current: usize,
    /// Longest current dwell among inside tracks, whole seconds.
    pub longest_dwell: i64,
}

pub fn summarize_at(tracker: &Tracker, now: DateTime<Utc>) -> Summary {
    Summary {
        unique: tracker.unique_count(),
        current: tracker.occupancy(),
        longest_dwell: tracker.longest_dwell_at(now),
    }
}

pub fn summarize(tracker: &Tracker) -> Summary {
    summarize_at(tracker, Utc::now())
}
