//! Global atomic counters for RAE observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`EngineMetrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. on every daemon tick).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static ENGINE_METRICS: EngineMetrics = EngineMetrics::new();

/// Lightweight atomic counters. No allocations, no locking.
pub struct EngineMetrics {
    searches: AtomicU64,
    strategies_degraded: AtomicU64,
    traversals: AtomicU64,
    memories_stored: AtomicU64,
    dedup_hits: AtomicU64,
    snapshots_created: AtomicU64,
    restores: AtomicU64,
    rollbacks: AtomicU64,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub const fn new() -> Self {
        Self {
            searches: AtomicU64::new(0),
            strategies_degraded: AtomicU64::new(0),
            traversals: AtomicU64::new(0),
            memories_stored: AtomicU64::new(0),
            dedup_hits: AtomicU64::new(0),
            snapshots_created: AtomicU64::new(0),
            restores: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
        }
    }

    pub fn inc_searches(&self) {
        self.searches.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "searches", "counter incremented");
    }

    /// Add `n` degraded strategies from one search.
    pub fn add_strategies_degraded(&self, n: u64) {
        if n == 0 {
            return;
        }
        self.strategies_degraded.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "strategies_degraded", n, "counter incremented");
    }

    pub fn inc_traversals(&self) {
        self.traversals.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "traversals", "counter incremented");
    }

    pub fn inc_memories_stored(&self) {
        self.memories_stored.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "memories_stored", "counter incremented");
    }

    pub fn inc_dedup_hits(&self) {
        self.dedup_hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "dedup_hits", "counter incremented");
    }

    pub fn inc_snapshots_created(&self) {
        self.snapshots_created.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "snapshots_created", "counter incremented");
    }

    pub fn inc_restores(&self) {
        self.restores.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "restores", "counter incremented");
    }

    pub fn inc_rollbacks(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rollbacks", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            searches = self.searches(),
            strategies_degraded = self.strategies_degraded(),
            traversals = self.traversals(),
            memories_stored = self.memories_stored(),
            dedup_hits = self.dedup_hits(),
            snapshots_created = self.snapshots_created(),
            restores = self.restores(),
            rollbacks = self.rollbacks(),
        );
    }

    pub fn searches(&self) -> u64 {
        self.searches.load(Ordering::Relaxed)
    }

    pub fn strategies_degraded(&self) -> u64 {
        self.strategies_degraded.load(Ordering::Relaxed)
    }

    pub fn traversals(&self) -> u64 {
        self.traversals.load(Ordering::Relaxed)
    }

    pub fn memories_stored(&self) -> u64 {
        self.memories_stored.load(Ordering::Relaxed)
    }

    pub fn dedup_hits(&self) -> u64 {
        self.dedup_hits.load(Ordering::Relaxed)
    }

    pub fn snapshots_created(&self) -> u64 {
        self.snapshots_created.load(Ordering::Relaxed)
    }

    pub fn restores(&self) -> u64 {
        self.restores.load(Ordering::Relaxed)
    }

    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.searches,
            &self.strategies_degraded,
            &self.traversals,
            &self.memories_stored,
            &self.dedup_hits,
            &self.snapshots_created,
            &self.restores,
            &self.rollbacks,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
