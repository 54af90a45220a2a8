//! Property-Based Tests for the TTL Cache
//!
//! **Property: Round-trip** - `set(k, v, ttl)` followed by `get(k)` returns `v`
//! for every `ttl > 0`.
//!
//! **Property: Expiry** - once `ttl` has elapsed, `get(k)` is a miss and the
//! key disappears from the listing.
//!
//! **Property: Best effort** - medium failures never surface; they read as
//! misses.

use chorus_storage::{TtlCache, WriteOutcome};
use chorus_test_utils::generators::{arb_cache_key, arb_clients, arb_ttl_ms};
use chorus_test_utils::{Client, FlakyMedium, ManualClock};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn cache_with(medium: Arc<FlakyMedium>, clock: Arc<ManualClock>) -> TtlCache {
    TtlCache::new(medium, clock, "chorus")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_set_then_get_round_trips(
        key in arb_cache_key(),
        clients in arb_clients(5),
        ttl_ms in arb_ttl_ms(),
        start in 0i64..1_000_000_000_000i64,
    ) {
        let clock = Arc::new(ManualClock::new(start));
        let cache = cache_with(Arc::new(FlakyMedium::new()), clock);

        prop_assert_eq!(cache.set(&key, &clients, Duration::from_millis(ttl_ms)), WriteOutcome::Written);
        prop_assert_eq!(cache.get::<Vec<Client>>(&key), Some(clients));
    }

    #[test]
    fn prop_expired_entries_are_evicted(
        key in arb_cache_key(),
        clients in arb_clients(3),
        ttl_ms in arb_ttl_ms(),
        overshoot in 0i64..10_000i64,
    ) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let cache = cache_with(Arc::new(FlakyMedium::new()), clock.clone());
        cache.set(&key, &clients, Duration::from_millis(ttl_ms));

        clock.advance(ttl_ms as i64 + overshoot);

        prop_assert_eq!(cache.get::<Vec<Client>>(&key), None);
        prop_assert!(!cache.keys().contains(&key));
    }

    #[test]
    fn prop_live_entries_survive_until_expiry(
        key in arb_cache_key(),
        ttl_ms in 2u64..1_000_000u64,
        fraction in 0.0f64..1.0f64,
    ) {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache_with(Arc::new(FlakyMedium::new()), clock.clone());
        cache.set(&key, &"value", Duration::from_millis(ttl_ms));

        let elapsed = ((ttl_ms - 1) as f64 * fraction) as i64;
        clock.advance(elapsed);
        prop_assert_eq!(cache.get::<String>(&key), Some("value".to_string()));
    }

    #[test]
    fn prop_medium_failures_read_as_misses(
        key in arb_cache_key(),
        clients in arb_clients(3),
    ) {
        let medium = Arc::new(FlakyMedium::new());
        let cache = cache_with(medium.clone(), Arc::new(ManualClock::new(0)));
        cache.set(&key, &clients, Duration::from_secs(60));

        medium.fail_reads(true);
        prop_assert_eq!(cache.get::<Vec<Client>>(&key), None);

        medium.fail_reads(false);
        medium.fail_writes(true);
        prop_assert_eq!(cache.set(&key, &clients, Duration::from_secs(60)), WriteOutcome::Failed);
        prop_assert_eq!(cache.get::<Vec<Client>>(&key), None);
    }
}

#[test]
fn test_scenario_clients_round_trip() {
    let cache = cache_with(Arc::new(FlakyMedium::new()), Arc::new(ManualClock::new(0)));
    let clients = vec![chorus_test_utils::fixtures::acme()];

    cache.set("clients", &clients, Duration::from_millis(600_000));
    let read: Vec<Client> = cache.get("clients").unwrap();

    assert_eq!(read.len(), 1);
    assert_eq!(read[0].id.as_str(), "1");
    assert_eq!(read[0].name, "Acme");
}

#[test]
fn test_corrupt_entry_is_dropped() {
    let medium = Arc::new(FlakyMedium::new());
    let cache = cache_with(medium.clone(), Arc::new(ManualClock::new(0)));
    medium.corrupt("chorus:clients");

    assert_eq!(cache.get::<Vec<Client>>("clients"), None);
    assert_eq!(medium.raw("chorus:clients"), None);
    assert_eq!(cache.stats().misses, 1);
}

#[test]
fn test_lmdb_medium_backs_the_cache() {
    let dir = tempfile::TempDir::new().unwrap();
    let medium = Arc::new(chorus_storage::LmdbMedium::open(dir.path(), 8).unwrap());
    let clock = Arc::new(ManualClock::new(0));
    let cache = TtlCache::new(medium, clock.clone(), "chorus");

    cache.set("clients", &vec![chorus_test_utils::fixtures::acme()], Duration::from_secs(1));
    assert!(cache.get::<Vec<Client>>("clients").is_some());

    clock.advance(1_000);
    assert_eq!(cache.purge_expired(), 1);
    assert!(cache.keys().is_empty());
}
