//! Read results carrying staleness metadata.

use chorus_core::EpochMillis;
use std::time::Duration;

/// Result of a cache-backed read.
///
/// Callers see whether the value came from the cache (and may be refreshed
/// behind their back) or straight from the remote source.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<T> {
    value: T,
    /// When the value was stored (or fetched), epoch milliseconds.
    stored_at: EpochMillis,
    /// When the stored copy expires, epoch milliseconds.
    expires_at: EpochMillis,
    was_cache_hit: bool,
}

impl<T> CacheRead<T> {
    /// A read served from the cache.
    pub fn from_cache(value: T, stored_at: EpochMillis, expires_at: EpochMillis) -> Self {
        Self {
            value,
            stored_at,
            expires_at,
            was_cache_hit: true,
        }
    }

    /// A read served by the remote source (cache miss).
    pub fn from_remote(value: T, stored_at: EpochMillis, expires_at: EpochMillis) -> Self {
        Self {
            value,
            stored_at,
            expires_at,
            was_cache_hit: false,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn stored_at(&self) -> EpochMillis {
        self.stored_at
    }

    pub fn expires_at(&self) -> EpochMillis {
        self.expires_at
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit
    }

    /// Age of the value as of `now`. Never negative.
    pub fn staleness(&self, now: EpochMillis) -> Duration {
        let age = now.saturating_sub(self.stored_at);
        Duration::from_millis(u64::try_from(age).unwrap_or(0))
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            stored_at: self.stored_at,
            expires_at: self.expires_at,
            was_cache_hit: self.was_cache_hit,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
