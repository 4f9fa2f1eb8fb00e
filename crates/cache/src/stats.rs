//! Cache counters and the read-only performance snapshot

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub(crate) struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    recomputes: AtomicU64,
    recompute_nanos: AtomicU64,
    invalidations: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recompute(&self, elapsed: Duration) {
        self.recomputes.fetch_add(1, Ordering::Relaxed);
        self.recompute_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entries: usize) -> PerformanceSnapshot {
        let recompute_count = self.recomputes.load(Ordering::Relaxed);
        let total = self.recompute_nanos.load(Ordering::Relaxed);
        let average = if recompute_count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(total / recompute_count)
        };

        PerformanceSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            recompute_count,
            average_recompute_latency: average,
            invalidations: self.invalidations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries,
        }
    }
}

/// Point-in-time view of cache behaviour for observability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub recompute_count: u64,
    pub average_recompute_latency: Duration,
    pub invalidations: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl PerformanceSnapshot {
    /// Fraction of lookups served from cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
