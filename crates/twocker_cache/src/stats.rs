//! Cache hit and miss accounting.

use derive_getters::Getters;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Getters)]
pub struct CacheStats {
    hits: u64,
    misses: u64,
    entries: usize,
    hit_rate: f64,
}

impl CacheStats {
    /// Build a view, deriving the hit rate. An idle cache reports a rate of 0.
    pub fn new(hits: u64, misses: u64, entries: usize) -> Self {
        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };
        Self {
            hits,
            misses,
            entries,
            hit_rate,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Counters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entries: usize) -> CacheStats {
        CacheStats::new(
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            entries,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_hit_rate_is_zero() {
        let stats = CacheStats::new(0, 0, 0);
        assert_eq!(*stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_ratio() {
        let stats = CacheStats::new(3, 1, 2);
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(*stats.entries(), 2);
    }
}
