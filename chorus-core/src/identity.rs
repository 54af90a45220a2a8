//! Identifiers and time sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Milliseconds since the Unix epoch.
pub type EpochMillis = i64;

/// Prefix carried by every identifier synthesised for a tentative entity.
pub const TEMP_KEY_PREFIX: &str = "temp-";

// ============================================================================
// ENTITY KEY
// ============================================================================

/// Stable identifier of an entity.
///
/// Server-assigned identifiers are opaque strings (usually UUIDs, sometimes
/// integers). Tentative entities created by the optimistic write path carry a
/// `temp-` identifier until the server confirms them.
///
/// Serialises as a plain string; deserialises from a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKey {
    /// Identifier assigned by the backend.
    Remote(String),
    /// Identifier synthesised locally, always starting with `temp-`.
    Temp(String),
}

impl EntityKey {
    /// Wrap a server-assigned identifier.
    pub fn remote(id: impl Into<String>) -> Self {
        Self::Remote(id.into())
    }

    /// Server identifier from a UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self::Remote(id.to_string())
    }

    /// Synthesise a fresh temporary identifier.
    pub fn new_temp() -> Self {
        Self::Temp(format!("{}{}", TEMP_KEY_PREFIX, Uuid::now_v7().simple()))
    }

    /// Parse a raw identifier, classifying `temp-` identifiers as temporary.
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.starts_with(TEMP_KEY_PREFIX) {
            Self::Temp(raw)
        } else {
            Self::Remote(raw)
        }
    }

    pub fn is_temp(&self) -> bool {
        matches!(self, Self::Temp(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Remote(id) | Self::Temp(id) => id,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Uuid> for EntityKey {
    fn from(id: Uuid) -> Self {
        Self::from_uuid(id)
    }
}

impl Serialize for EntityKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EntityKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawKey {
            Text(String),
            Number(i64),
        }

        Ok(match RawKey::deserialize(deserializer)? {
            RawKey::Text(text) => EntityKey::parse(text),
            RawKey::Number(n) => EntityKey::Remote(n.to_string()),
        })
    }
}

// ============================================================================
// CLOCK ABSTRACTION
// ============================================================================

/// Source of wall-clock time in epoch milliseconds.
///
/// Cache expiry and session timestamps go through this trait so tests can
/// drive time explicitly.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> EpochMillis;
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> EpochMillis {
        Utc::now().timestamp_millis()
    }
}

/// Clock frozen at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub EpochMillis);

impl Clock for FixedClock {
    fn now_millis(&self) -> EpochMillis {
        self.0
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: EpochMillis) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Move the clock forward by `millis`.
    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, now: EpochMillis) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> EpochMillis {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_temp_keys_are_unique_and_prefixed() {
        let a = EntityKey::new_temp();
        let b = EntityKey::new_temp();
        assert!(a.is_temp());
        assert!(a.as_str().starts_with(TEMP_KEY_PREFIX));
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_classifies_keys() {
        assert!(EntityKey::parse("temp-123").is_temp());
        assert_eq!(
            EntityKey::parse("6f1c0000-0000-0000-0000-000000000000"),
            EntityKey::Remote("6f1c0000-0000-0000-0000-000000000000".to_string())
        );
    }

    #[test]
    fn test_key_serializes_as_string() {
        let key = EntityKey::remote("abc");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"abc\"");

        let temp: EntityKey = serde_json::from_str("\"temp-9\"").unwrap();
        assert!(temp.is_temp());
    }

    #[test]
    fn test_key_deserializes_from_integer() {
        let key: EntityKey = serde_json::from_str("1").unwrap();
        assert_eq!(key, EntityKey::remote("1"));
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        clock.advance(500);
        assert_eq!(clock.now_millis(), 1_500);
        clock.set(42);
        assert_eq!(clock.now_millis(), 42);
    }

    #[test]
    fn test_fixed_clock() {
        assert_eq!(FixedClock(1704067200000).now_millis(), 1704067200000);
    }
}
