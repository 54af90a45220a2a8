//! Stored entry format and cache statistics.

use chorus_core::EpochMillis;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A cached value with its expiry.
///
/// Stored as JSON: `{ "value": ..., "stored_at": ..., "expires_at": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    /// When the entry was written, epoch milliseconds.
    #[serde(default)]
    pub stored_at: EpochMillis,
    /// Absolute expiry, epoch milliseconds.
    pub expires_at: EpochMillis,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, stored_at: EpochMillis, ttl_ms: u64) -> Self {
        let ttl = i64::try_from(ttl_ms).unwrap_or(i64::MAX);
        Self {
            value,
            stored_at,
            expires_at: stored_at.saturating_add(ttl),
        }
    }

    /// An entry is expired once its full TTL has elapsed.
    pub fn is_expired_at(&self, now: EpochMillis) -> bool {
        now >= self.expires_at
    }
}

/// Expiry metadata only, used to sweep entries without knowing their type.
#[derive(Debug, Deserialize)]
pub(crate) struct EntryHeader {
    pub expires_at: EpochMillis,
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses (absent, expired or unreadable).
    pub misses: u64,
    /// Number of entries evicted because they expired.
    pub evictions: u64,
    /// Number of medium failures swallowed.
    pub io_errors: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    io_errors: AtomicU64,
}

impl StatsCounters {
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn evicted(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn io_error(&self) {
        self.io_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            io_errors: self.io_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_expiry_boundary() {
        let entry = CacheEntry::new("v", 1_000, 500);
        assert_eq!(entry.expires_at, 1_500);
        assert!(!entry.is_expired_at(1_499));
        assert!(entry.is_expired_at(1_500));
    }

    #[test]
    fn test_entry_json_shape() {
        let entry = CacheEntry::new(vec![1, 2], 10, 5);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "value": [1, 2], "stored_at": 10, "expires_at": 15 })
        );
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let entry = CacheEntry::new((), i64::MAX - 1, u64::MAX);
        assert_eq!(entry.expires_at, i64::MAX);
    }

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);
        assert!((CacheStats::default().hit_rate() - 0.0).abs() < 0.001);
    }
}
