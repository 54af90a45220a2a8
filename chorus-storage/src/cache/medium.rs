//! Persistent key-value medium abstraction.
//!
//! The medium is synchronous: string keys, string values, and a prefix
//! listing. Implementations report failures as [`CacheIoError`]; the cache
//! above them swallows those errors.

use chorus_core::CacheIoError;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Storage medium for cache entries.
///
/// Implementations must be thread-safe. Values are opaque strings (the cache
/// stores JSON).
pub trait KvMedium: Send + Sync {
    /// Read the raw value stored under `key`.
    fn read(&self, key: &str) -> Result<Option<String>, CacheIoError>;

    /// Store `value` under `key`, replacing any previous value.
    fn write(&self, key: &str, value: &str) -> Result<(), CacheIoError>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), CacheIoError>;

    /// All keys starting with `prefix`, in ascending order.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheIoError>;
}

/// In-process medium backed by a sorted map.
///
/// An optional byte quota (sum of key and value lengths) makes writes fail
/// with [`CacheIoError::QuotaExceeded`] once the medium is full, the same way
/// a browser's local storage does.
#[derive(Debug, Default)]
pub struct MemoryMedium {
    entries: RwLock<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Medium that rejects writes once `quota_bytes` would be exceeded.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Bytes currently used (keys plus values).
    pub fn used_bytes(&self) -> usize {
        self.entries
            .read()
            .map(|entries| entries.iter().map(|(k, v)| k.len() + v.len()).sum())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned(key: &str) -> CacheIoError {
    CacheIoError::Medium {
        key: key.to_string(),
        reason: "medium lock poisoned".to_string(),
    }
}

impl KvMedium for MemoryMedium {
    fn read(&self, key: &str) -> Result<Option<String>, CacheIoError> {
        let entries = self.entries.read().map_err(|_| poisoned(key))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheIoError> {
        let mut entries = self.entries.write().map_err(|_| poisoned(key))?;
        if let Some(quota) = self.quota_bytes {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = key.len() + value.len();
            if others + needed > quota {
                return Err(CacheIoError::QuotaExceeded {
                    key: key.to_string(),
                    bytes: needed,
                });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheIoError> {
        let mut entries = self.entries.write().map_err(|_| poisoned(key))?;
        entries.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheIoError> {
        let entries = self.entries.read().map_err(|_| poisoned(prefix))?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}
