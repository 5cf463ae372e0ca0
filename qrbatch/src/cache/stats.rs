//! Cache statistics tracking.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters tracking cache effectiveness.
///
/// All counters are atomics so the lookup path can record hits without
/// touching the image map's write lock.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    encodes: AtomicU64,
    encode_failures: AtomicU64,
}

impl CacheStats {
    /// Create a zeroed statistics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a lookup served from cache.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a lookup that found nothing.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful encode performed on behalf of a lookup.
    pub fn record_encode(&self) {
        self.encodes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an encode attempt that returned an error.
    pub fn record_encode_failure(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.encodes.store(0, Ordering::Relaxed);
        self.encode_failures.store(0, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            encodes: self.encodes.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`CacheStats`] counters for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub encodes: u64,
    pub encode_failures: u64,
}

impl CacheStatsSnapshot {
    /// Fraction of lookups served from cache (0.0 to 1.0).
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_start_at_zero() {
        let snapshot = CacheStats::new().snapshot();

        assert_eq!(snapshot.hits, 0);
        assert_eq!(snapshot.misses, 0);
        assert_eq!(snapshot.encodes, 0);
        assert_eq!(snapshot.encode_failures, 0);
    }

    #[test]
    fn test_record_and_snapshot() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_encode();
        stats.record_encode_failure();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.encodes, 1);
        assert_eq!(snapshot.encode_failures, 1);
    }

    #[test]
    fn test_reset_zeroes_counters() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_miss();

        stats.reset();

        assert_eq!(stats.snapshot(), CacheStatsSnapshot::default());
    }

    #[test]
    fn test_hit_ratio_no_lookups() {
        assert_eq!(CacheStatsSnapshot::default().hit_ratio(), 0.0);
    }

    #[test]
    fn test_hit_ratio_mixed() {
        let snapshot = CacheStatsSnapshot {
            hits: 75,
            misses: 25,
            encodes: 25,
            encode_failures: 0,
        };
        assert_eq!(snapshot.hit_ratio(), 0.75);
    }
}
