//! Namespaced TTL cache over a [`KvMedium`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chorus_core::{CacheIoError, Clock};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::entry::{CacheEntry, CacheStats, EntryHeader, StatsCounters};
use super::freshness::CacheRead;
use super::medium::KvMedium;

/// Result of a cache write.
///
/// Writes never fail loudly; this only tells the caller what happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The entry was stored.
    Written,
    /// A newer write happened since the expected version; nothing stored.
    Superseded,
    /// The medium rejected the write. The previous entry was dropped.
    Failed,
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written)
    }
}

/// Monotonic write versions.
///
/// Every `set`/`clear` of a key takes the next sequence number. Bulk clears
/// record a floor for their prefix, so keys that were never written still
/// observe the clear.
#[derive(Debug, Default)]
struct VersionTable {
    seq: u64,
    keys: HashMap<String, u64>,
    prefix_floors: Vec<(String, u64)>,
}

impl VersionTable {
    fn current(&self, key: &str) -> u64 {
        let own = self.keys.get(key).copied().unwrap_or(0);
        self.prefix_floors
            .iter()
            .filter(|(prefix, _)| key.starts_with(prefix.as_str()))
            .map(|(_, floor)| *floor)
            .fold(own, u64::max)
    }

    fn bump(&mut self, key: &str) -> u64 {
        self.seq += 1;
        self.keys.insert(key.to_string(), self.seq);
        self.seq
    }

    fn bump_prefix(&mut self, prefix: &str) {
        self.seq += 1;
        let seq = self.seq;
        if prefix.is_empty() {
            // A full clear subsumes every older record.
            self.keys.clear();
            self.prefix_floors.clear();
        } else {
            // Records under the prefix now sit below its floor.
            self.keys.retain(|key, _| !key.starts_with(prefix));
            self.prefix_floors.retain(|(p, _)| !p.starts_with(prefix));
        }
        self.prefix_floors.push((prefix.to_string(), seq));
    }
}

/// Best-effort TTL key-value cache.
///
/// Keys are stored in the medium as `<namespace>:<key>`. Values are JSON
/// [`CacheEntry`] records. Medium failures are logged and counted, and the
/// operation behaves as a miss (reads) or a dropped entry (writes).
pub struct TtlCache {
    medium: Arc<dyn KvMedium>,
    clock: Arc<dyn Clock>,
    namespace: String,
    stats: StatsCounters,
    versions: Mutex<VersionTable>,
}

impl std::fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("namespace", &self.namespace)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl TtlCache {
    pub fn new(
        medium: Arc<dyn KvMedium>,
        clock: Arc<dyn Clock>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            medium,
            clock,
            namespace: namespace.into(),
            stats: StatsCounters::default(),
            versions: Mutex::new(VersionTable::default()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn namespace_prefix(&self) -> String {
        format!("{}:", self.namespace)
    }

    fn versions(&self) -> MutexGuard<'_, VersionTable> {
        self.versions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record_io_error(&self, operation: &'static str, err: &CacheIoError) {
        self.stats.io_error();
        tracing::warn!(namespace = %self.namespace, operation, error = %err, "cache medium failure");
    }

    /// Get the value stored under `key`.
    ///
    /// Absent, expired and unreadable entries all return `None`. Expired and
    /// unreadable entries are evicted.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.read(key).map(CacheRead::into_value)
    }

    /// Like [`get`](Self::get) but keeps the entry's timestamps.
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Option<CacheRead<T>> {
        let full_key = self.full_key(key);
        let raw = match self.medium.read(&full_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.stats.miss();
                return None;
            }
            Err(e) => {
                self.record_io_error("read", &e);
                self.stats.miss();
                return None;
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                let err = CacheIoError::Deserialization {
                    key: full_key.clone(),
                    reason: e.to_string(),
                };
                self.record_io_error("decode", &err);
                self.remove_quietly(&full_key);
                self.stats.miss();
                return None;
            }
        };

        let now = self.clock.now_millis();
        if entry.is_expired_at(now) {
            tracing::debug!(key = %full_key, expires_at = entry.expires_at, now, "evicting expired cache entry");
            self.remove_quietly(&full_key);
            self.stats.evicted(1);
            self.stats.miss();
            return None;
        }

        self.stats.hit();
        Some(CacheRead::from_cache(
            entry.value,
            entry.stored_at,
            entry.expires_at,
        ))
    }

    /// Store `value` under `key` for `ttl`, replacing any existing entry.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> WriteOutcome {
        let mut versions = self.versions();
        versions.bump(key);
        self.write_entry(key, value, ttl)
    }

    /// Store `value` only if `key` is still at version `expected`.
    ///
    /// The version check and the write happen under one lock, so a `set`
    /// racing with this call is either fully before it (and wins) or fully
    /// after it (and overwrites it).
    pub fn set_if_version<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        expected: u64,
    ) -> WriteOutcome {
        let mut versions = self.versions();
        let current = versions.current(key);
        if current != expected {
            tracing::debug!(
                namespace = %self.namespace,
                key,
                expected,
                current,
                "cache write superseded by newer write"
            );
            return WriteOutcome::Superseded;
        }
        versions.bump(key);
        self.write_entry(key, value, ttl)
    }

    /// Current write version of `key`. Changes on every write or clear.
    pub fn version(&self, key: &str) -> u64 {
        self.versions().current(key)
    }

    fn write_entry<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> WriteOutcome {
        let full_key = self.full_key(key);
        let now = self.clock.now_millis();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let entry = CacheEntry::new(value, now, ttl_ms);

        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                let err = CacheIoError::Serialization {
                    key: full_key.clone(),
                    reason: e.to_string(),
                };
                self.record_io_error("encode", &err);
                self.remove_quietly(&full_key);
                return WriteOutcome::Failed;
            }
        };

        match self.medium.write(&full_key, &raw) {
            Ok(()) => WriteOutcome::Written,
            Err(e) => {
                self.record_io_error("write", &e);
                // Never leave an older value behind a failed overwrite.
                self.remove_quietly(&full_key);
                WriteOutcome::Failed
            }
        }
    }

    fn remove_quietly(&self, full_key: &str) {
        if let Err(e) = self.medium.remove(full_key) {
            self.record_io_error("remove", &e);
        }
    }

    /// Remove one entry.
    pub fn clear(&self, key: &str) {
        let mut versions = self.versions();
        versions.bump(key);
        self.remove_quietly(&self.full_key(key));
    }

    /// Remove every entry in the namespace. Returns the number removed.
    pub fn clear_all(&self) -> usize {
        self.clear_prefix("")
    }

    /// Remove every entry whose key starts with `prefix`.
    pub fn clear_prefix(&self, prefix: &str) -> usize {
        let mut versions = self.versions();
        versions.bump_prefix(prefix);

        let full_prefix = format!("{}{}", self.namespace_prefix(), prefix);
        let keys = match self.medium.keys_with_prefix(&full_prefix) {
            Ok(keys) => keys,
            Err(e) => {
                self.record_io_error("list", &e);
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys {
            match self.medium.remove(&key) {
                Ok(()) => removed += 1,
                Err(e) => self.record_io_error("remove", &e),
            }
        }
        tracing::debug!(namespace = %self.namespace, prefix, removed, "cleared cache entries");
        removed
    }

    /// Evict every expired entry in the namespace. Returns the number evicted.
    pub fn purge_expired(&self) -> usize {
        let keys = match self.medium.keys_with_prefix(&self.namespace_prefix()) {
            Ok(keys) => keys,
            Err(e) => {
                self.record_io_error("list", &e);
                return 0;
            }
        };

        let now = self.clock.now_millis();
        let mut evicted = 0;
        for key in keys {
            let expired = match self.medium.read(&key) {
                Ok(Some(raw)) => serde_json::from_str::<EntryHeader>(&raw)
                    .map(|header| now >= header.expires_at)
                    .unwrap_or(true),
                Ok(None) => false,
                Err(e) => {
                    self.record_io_error("read", &e);
                    false
                }
            };
            if expired {
                match self.medium.remove(&key) {
                    Ok(()) => evicted += 1,
                    Err(e) => self.record_io_error("remove", &e),
                }
            }
        }
        if evicted > 0 {
            self.stats.evicted(evicted as u64);
            tracing::debug!(namespace = %self.namespace, evicted, "purged expired cache entries");
        }
        evicted
    }

    /// Keys currently present in the medium, relative to the namespace.
    ///
    /// Includes entries that have expired but were not read since.
    pub fn keys(&self) -> Vec<String> {
        let prefix = self.namespace_prefix();
        match self.medium.keys_with_prefix(&prefix) {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|k| k.strip_prefix(prefix.as_str()).map(str::to_string))
                .collect(),
            Err(e) => {
                self.record_io_error("list", &e);
                Vec::new()
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::medium::MemoryMedium;
    use chorus_core::ManualClock;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: u32,
        name: String,
    }

    fn acme() -> Vec<Row> {
        vec![Row {
            id: 1,
            name: "Acme".to_string(),
        }]
    }

    fn cache_at(start: i64) -> (TtlCache, Arc<MemoryMedium>, Arc<ManualClock>) {
        let medium = Arc::new(MemoryMedium::new());
        let clock = Arc::new(ManualClock::new(start));
        let cache = TtlCache::new(medium.clone(), clock.clone(), "chorus");
        (cache, medium, clock)
    }

    /// Medium whose every operation fails while `broken` is set.
    #[derive(Default)]
    struct BrokenMedium {
        inner: MemoryMedium,
        broken: AtomicBool,
    }

    impl BrokenMedium {
        fn check(&self, key: &str) -> Result<(), CacheIoError> {
            if self.broken.load(Ordering::SeqCst) {
                Err(CacheIoError::Medium {
                    key: key.to_string(),
                    reason: "disk on fire".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    impl KvMedium for BrokenMedium {
        fn read(&self, key: &str) -> Result<Option<String>, CacheIoError> {
            self.check(key)?;
            self.inner.read(key)
        }
        fn write(&self, key: &str, value: &str) -> Result<(), CacheIoError> {
            self.check(key)?;
            self.inner.write(key, value)
        }
        fn remove(&self, key: &str) -> Result<(), CacheIoError> {
            self.inner.remove(key)
        }
        fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheIoError> {
            self.check(prefix)?;
            self.inner.keys_with_prefix(prefix)
        }
    }

    #[test]
    fn test_set_then_get_returns_value() {
        let (cache, medium, _clock) = cache_at(0);
        assert_eq!(
            cache.set("clients", &acme(), Duration::from_millis(600_000)),
            WriteOutcome::Written
        );
        assert_eq!(cache.get::<Vec<Row>>("clients"), Some(acme()));
        assert!(medium.read("chorus:clients").unwrap().is_some());
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_expired_entry_is_evicted_on_read() {
        let (cache, _medium, clock) = cache_at(1_000);
        cache.set("clients", &acme(), Duration::from_millis(500));

        clock.advance(499);
        assert!(cache.get::<Vec<Row>>("clients").is_some());

        clock.advance(1);
        assert_eq!(cache.get::<Vec<Row>>("clients"), None);
        assert!(cache.keys().is_empty());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_corrupt_entry_is_a_miss_and_removed() {
        let (cache, medium, _clock) = cache_at(0);
        medium.write("chorus:clients", "{not json").unwrap();

        assert_eq!(cache.get::<Vec<Row>>("clients"), None);
        assert!(medium.read("chorus:clients").unwrap().is_none());
        assert_eq!(cache.stats().io_errors, 1);
    }

    #[test]
    fn test_medium_failures_are_swallowed() {
        let medium = Arc::new(BrokenMedium::default());
        let cache = TtlCache::new(medium.clone(), Arc::new(ManualClock::new(0)), "chorus");
        cache.set("clients", &acme(), Duration::from_secs(60));

        medium.broken.store(true, Ordering::SeqCst);
        assert_eq!(cache.get::<Vec<Row>>("clients"), None);
        assert_eq!(
            cache.set("clients", &acme(), Duration::from_secs(60)),
            WriteOutcome::Failed
        );
        assert_eq!(cache.clear_all(), 0);
        assert!(cache.stats().io_errors >= 3);
    }

    #[test]
    fn test_failed_overwrite_drops_old_value() {
        let medium = Arc::new(MemoryMedium::with_quota(120));
        let cache = TtlCache::new(medium.clone(), Arc::new(ManualClock::new(0)), "chorus");
        assert!(cache.set("k", &"small", Duration::from_secs(60)).is_written());

        let big = "x".repeat(500);
        assert_eq!(cache.set("k", &big, Duration::from_secs(60)), WriteOutcome::Failed);
        assert_eq!(cache.get::<String>("k"), None);
    }

    #[test]
    fn test_clear_all_is_namespace_scoped() {
        let (cache, medium, _clock) = cache_at(0);
        medium.write("other:clients", "{}").unwrap();
        cache.set("clients", &acme(), Duration::from_secs(60));
        cache.set("profile:u1", &"p", Duration::from_secs(60));

        assert_eq!(cache.clear_all(), 2);
        assert!(cache.keys().is_empty());
        assert!(medium.read("other:clients").unwrap().is_some());
    }

    #[test]
    fn test_clear_prefix() {
        let (cache, _medium, _clock) = cache_at(0);
        cache.set("profile:u1", &"a", Duration::from_secs(60));
        cache.set("profile:u2", &"b", Duration::from_secs(60));
        cache.set("clients", &acme(), Duration::from_secs(60));

        assert_eq!(cache.clear_prefix("profile:"), 2);
        assert_eq!(cache.keys(), vec!["clients".to_string()]);
    }

    #[test]
    fn test_purge_expired() {
        let (cache, _medium, clock) = cache_at(0);
        cache.set("short", &1, Duration::from_millis(10));
        cache.set("long", &2, Duration::from_millis(1_000));

        clock.advance(10);
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.keys(), vec!["long".to_string()]);
    }

    #[test]
    fn test_versions_are_monotonic() {
        let (cache, _medium, _clock) = cache_at(0);
        let v0 = cache.version("clients");
        cache.set("clients", &acme(), Duration::from_secs(60));
        let v1 = cache.version("clients");
        assert!(v1 > v0);

        cache.clear_all();
        assert!(cache.version("clients") > v1);
        // Keys never written still observe the bulk clear.
        assert!(cache.version("never-written") > v0);
    }

    #[test]
    fn test_prefix_clear_prunes_dominated_versions() {
        let (cache, _medium, _clock) = cache_at(0);
        cache.set("profile:a", &1u8, Duration::from_secs(60));
        cache.set("profile:b", &2u8, Duration::from_secs(60));
        cache.clear_prefix("profile:b");
        cache.set("clients", &acme(), Duration::from_secs(60));
        let before = cache.version("profile:a");

        cache.clear_prefix("profile:");
        {
            let versions = cache.versions();
            assert_eq!(versions.keys.len(), 1);
            assert!(versions.keys.contains_key("clients"));
            assert_eq!(versions.prefix_floors.len(), 1);
        }
        assert!(cache.version("profile:a") > before);
        assert!(cache.version("profile:b") > before);

        // A write after the sweep still moves past the floor.
        let floor = cache.version("profile:a");
        cache.set("profile:a", &3u8, Duration::from_secs(60));
        assert!(cache.version("profile:a") > floor);
    }

    #[test]
    fn test_set_if_version_superseded() {
        let (cache, _medium, _clock) = cache_at(0);
        let seen = cache.version("clients");
        cache.set("clients", &acme(), Duration::from_secs(60));

        let outcome = cache.set_if_version("clients", &Vec::<Row>::new(), Duration::from_secs(60), seen);
        assert_eq!(outcome, WriteOutcome::Superseded);
        assert_eq!(cache.get::<Vec<Row>>("clients"), Some(acme()));

        let current = cache.version("clients");
        let outcome = cache.set_if_version("clients", &Vec::<Row>::new(), Duration::from_secs(60), current);
        assert_eq!(outcome, WriteOutcome::Written);
        assert_eq!(cache.get::<Vec<Row>>("clients"), Some(vec![]));
    }

    #[test]
    fn test_read_keeps_timestamps() {
        let (cache, _medium, _clock) = cache_at(5_000);
        cache.set("k", &1u8, Duration::from_millis(100));
        let read = cache.read::<u8>("k").unwrap();
        assert!(read.was_cache_hit());
        assert_eq!(read.stored_at(), 5_000);
        assert_eq!(read.expires_at(), 5_100);
    }
}
