//! Importance decay recomputation.
//!
//! One run lowers each item's importance by an effective rate that depends
//! on how recently the item was used:
//!
//! | last access             | effective rate          |
//! |-------------------------|-------------------------|
//! | within `protect_days`   | `rate * 0.5`            |
//! | over `stale_days` ago   | `rate * (1 + days/30)`  |
//! | otherwise               | `rate`                  |
//!
//! The result never drops below `floor`, and items already at the floor are
//! left alone.

use chrono::{DateTime, Utc};
use rae_state::MemoryItem;
use serde::{Deserialize, Serialize};

/// Parameters of one decay run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportanceDecayPolicy {
    pub rate: f64,
    pub floor: f64,
    pub protect_days: i64,
    pub stale_days: i64,
}

impl Default for ImportanceDecayPolicy {
    fn default() -> Self {
        Self {
            rate: 0.01,
            floor: 0.01,
            protect_days: 7,
            stale_days: 30,
        }
    }
}

impl ImportanceDecayPolicy {
    /// Effective rate for an item idle for `idle_days`.
    pub fn effective_rate(&self, idle_days: f64) -> f64 {
        let rate = if idle_days <= self.protect_days as f64 {
            self.rate * 0.5
        } else if idle_days > self.stale_days as f64 {
            self.rate * (1.0 + idle_days / 30.0)
        } else {
            self.rate
        };
        rate.clamp(0.0, 1.0)
    }
}

/// New importance after one decay run, or `None` when the item is left
/// untouched.
pub fn recompute_importance(
    item: &MemoryItem,
    policy: &ImportanceDecayPolicy,
    now: DateTime<Utc>,
) -> Option<f64> {
    if item.importance <= policy.floor {
        return None;
    }
    let idle_secs = (now - item.reference_time()).num_seconds().max(0) as f64;
    let idle_days = idle_secs / 86_400.0;
    let decayed = item.importance * (1.0 - policy.effective_rate(idle_days));
    let next = decayed.max(policy.floor);
    (next < item.importance).then_some(next)
}
