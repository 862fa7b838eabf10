//! Cache Statistics Module
//!
//! Tracks lookups, writes and the housekeeping the cache performed.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Lookups answered with a live value
    pub hits: u64,
    /// Hits served by the memory mirror without touching a backend
    pub memory_hits: u64,
    /// Lookups that found nothing usable (absent, expired or corrupted)
    pub misses: u64,
    /// Successful writes
    pub writes: u64,
    /// Writes rejected by serialization, encoding or the backend
    pub write_failures: u64,
    /// Records deleted because they failed to decode
    pub corrupted: u64,
    /// Entries deleted because they had expired
    pub expired: u64,
    /// Entries currently held by the memory mirror
    pub mirrored_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self, from_memory: bool) {
        self.hits += 1;
        if from_memory {
            self.memory_hits += 1;
        }
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_write(&mut self) {
        self.writes += 1;
    }

    pub fn record_write_failure(&mut self) {
        self.write_failures += 1;
    }

    pub fn record_corrupted(&mut self) {
        self.corrupted += 1;
    }

    pub fn record_expired(&mut self, count: u64) {
        self.expired += count;
    }
}

// == Sweep Report ==
/// Outcome of one housekeeping pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Registered records inspected
    pub scanned: usize,
    /// Expired entries removed (backends and mirror)
    pub expired: usize,
    /// Undecodable records removed
    pub corrupted: usize,
    /// Keys or backends the sweep could not process
    pub errors: usize,
}

impl SweepReport {
    pub fn removed(&self) -> usize {
        self.expired + self.corrupted
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.writes, 0);
        assert_eq!(stats.mirrored_entries, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = CacheStats::new();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut stats = CacheStats::new();
        stats.record_hit(true);
        stats.record_hit(false);
        stats.record_miss();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.5);
        assert_eq!(stats.memory_hits, 1);
    }

    #[test]
    fn test_failure_counters() {
        let mut stats = CacheStats::new();
        stats.record_write_failure();
        stats.record_corrupted();
        stats.record_expired(3);
        assert_eq!(stats.write_failures, 1);
        assert_eq!(stats.corrupted, 1);
        assert_eq!(stats.expired, 3);
    }

    #[test]
    fn test_sweep_report_removed() {
        let report = SweepReport {
            scanned: 5,
            expired: 2,
            corrupted: 1,
            errors: 0,
        };
        assert_eq!(report.removed(), 3);
    }
}
