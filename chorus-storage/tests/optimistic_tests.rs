//! Optimistic mutation scenarios against a scripted remote.

use chorus_storage::{
    CollectionMirror, MutationMessages, MutationState, OptimisticCollection, OptimisticExecutor,
    RefreshOutcome, RevalidatingFetcher, TtlCache,
};
use chorus_test_utils::fixtures::{acme, client};
use chorus_test_utils::generators::{arb_client_draft, arb_client_patch, arb_clients};
use chorus_test_utils::{
    network_error, Client, ClientDraft, ClientPatch, EntityKey, FlakyMedium, Gate, ManualClock,
    MockRemote, MutationKind, RecordingSink, RemoteOp,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    executor: Arc<OptimisticExecutor<Client>>,
    remote: Arc<MockRemote<Client>>,
    sink: Arc<RecordingSink>,
}

fn harness(items: Vec<Client>) -> Harness {
    let remote = Arc::new(MockRemote::with_items(items.clone()));
    let sink = RecordingSink::new();
    let executor = OptimisticExecutor::new(remote.clone(), sink.clone())
        .with_collection(OptimisticCollection::from_items(items));
    Harness {
        executor: Arc::new(executor),
        remote,
        sink,
    }
}

fn messages(kind: MutationKind) -> MutationMessages {
    MutationMessages::default_for::<Client>(kind)
}

#[tokio::test]
async fn test_failed_create_is_visible_then_removed() {
    let h = harness(vec![]);
    let gate = Gate::new();
    h.remote.gate(RemoteOp::Create, gate.clone());
    h.remote.fail_next(RemoteOp::Create, network_error(MutationKind::Create));

    let executor = Arc::clone(&h.executor);
    let pending = tokio::spawn(async move {
        executor
            .create(ClientDraft::named("NewCo"), &messages(MutationKind::Create))
            .await
    });

    gate.entered().await;
    let during = h.executor.snapshot();
    assert_eq!(during.len(), 1);
    assert!(during[0].id.is_temp());
    assert!(during[0].id.as_str().starts_with("temp-"));
    assert_eq!(during[0].name, "NewCo");

    gate.release();
    let report = pending.await.unwrap();

    assert_eq!(report.state, MutationState::RolledBack);
    assert_eq!(report.error, Some(network_error(MutationKind::Create)));
    assert!(h.executor.snapshot().is_empty());
    assert_eq!(h.sink.errors(), 1);
    assert_eq!(h.sink.successes(), 0);
    assert_eq!(h.sink.messages(), vec!["Failed to create client".to_string()]);
}

#[tokio::test]
async fn test_confirmed_create_swaps_in_server_entity() {
    let h = harness(vec![acme()]);
    let report = h
        .executor
        .create(ClientDraft::named("NewCo"), &messages(MutationKind::Create))
        .await;

    let created = report.into_result().unwrap().unwrap();
    assert!(!created.id.is_temp());
    assert_eq!(h.executor.snapshot(), vec![acme(), created]);
    assert_eq!(h.sink.successes(), 1);
}

#[tokio::test]
async fn test_interleaved_mutations_are_not_clobbered() {
    let h = harness(vec![acme(), client("2", "Beta")]);
    let gate = Gate::new();
    h.remote.gate(RemoteOp::Delete, gate.clone());
    h.remote.fail_next(RemoteOp::Delete, network_error(MutationKind::Delete));

    let executor = Arc::clone(&h.executor);
    let pending_delete = tokio::spawn(async move {
        executor
            .delete(&EntityKey::remote("1"), &messages(MutationKind::Delete))
            .await
    });
    gate.entered().await;

    // A second mutation lands while the delete is still pending.
    let patch = ClientPatch {
        name: Some("Beta Two".to_string()),
        ..Default::default()
    };
    let update = h
        .executor
        .update(&EntityKey::remote("2"), patch, &messages(MutationKind::Update))
        .await;
    assert_eq!(update.state, MutationState::Confirmed);

    gate.release();
    let delete = pending_delete.await.unwrap();
    assert_eq!(delete.state, MutationState::RolledBack);

    let names: Vec<String> = h.executor.snapshot().into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["Acme".to_string(), "Beta Two".to_string()]);
    assert_eq!(h.sink.successes(), 1);
    assert_eq!(h.sink.errors(), 1);
}

#[tokio::test]
async fn test_mirror_wins_over_background_refresh() {
    let clock = Arc::new(ManualClock::new(0));
    let cache = Arc::new(TtlCache::new(Arc::new(FlakyMedium::new()), clock, "chorus"));
    let fetcher = RevalidatingFetcher::new(Arc::clone(&cache), Duration::from_secs(5));
    cache.set("clients", &vec![acme()], Duration::from_secs(600));

    let remote = Arc::new(MockRemote::with_items(vec![acme(), client("9", "FromServer")]));
    let refresh_gate = Gate::new();
    remote.gate(RemoteOp::FetchAll, refresh_gate.clone());
    let executor = OptimisticExecutor::new(remote.clone(), RecordingSink::new()).with_mirror(
        CollectionMirror::new(fetcher, "clients", Duration::from_secs(600)),
    );

    let fetched = executor.load().await.unwrap();
    assert!(fetched.read().was_cache_hit());
    assert_eq!(executor.snapshot(), vec![acme()]);

    refresh_gate.entered().await;
    let created = executor
        .create(ClientDraft::named("Local"), &messages(MutationKind::Create))
        .await
        .into_result()
        .unwrap()
        .unwrap();

    refresh_gate.release();
    let (_, refresh) = fetched.into_parts();
    assert_eq!(refresh.unwrap().outcome().await, RefreshOutcome::Superseded);

    assert_eq!(executor.snapshot(), vec![acme(), created.clone()]);
    let cached: Vec<Client> = cache.get("clients").unwrap();
    assert_eq!(cached, vec![acme(), created]);
}

#[tokio::test]
async fn test_refresh_replaces_loaded_collection() {
    let cache = Arc::new(TtlCache::new(
        Arc::new(FlakyMedium::new()),
        Arc::new(ManualClock::new(0)),
        "chorus",
    ));
    cache.set("clients", &vec![acme()], Duration::from_secs(600));
    let remote = Arc::new(MockRemote::with_items(vec![acme(), client("2", "Beta")]));
    let executor = OptimisticExecutor::new(remote, RecordingSink::new()).with_mirror(
        CollectionMirror::new(
            RevalidatingFetcher::new(Arc::clone(&cache), Duration::from_secs(5)),
            "clients",
            Duration::from_secs(600),
        ),
    );

    let (_, refresh) = executor.load().await.unwrap().into_parts();
    assert_eq!(refresh.unwrap().outcome().await, RefreshOutcome::Updated);
    assert_eq!(executor.snapshot().len(), 2);
}

#[tokio::test]
async fn test_load_miss_propagates_error() {
    let cache = Arc::new(TtlCache::new(
        Arc::new(FlakyMedium::new()),
        Arc::new(ManualClock::new(0)),
        "chorus",
    ));
    let remote = Arc::new(MockRemote::<Client>::new());
    remote.fail_next(RemoteOp::FetchAll, chorus_test_utils::fetch_error());
    let executor = OptimisticExecutor::new(remote, RecordingSink::new()).with_mirror(
        CollectionMirror::new(
            RevalidatingFetcher::new(cache, Duration::from_secs(5)),
            "clients",
            Duration::from_secs(600),
        ),
    );

    let err = executor.load().await.unwrap_err();
    assert_eq!(err, chorus_test_utils::fetch_error());
    assert!(executor.snapshot().is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_failed_create_restores_collection(
        items in arb_clients(6),
        draft in arb_client_draft(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let h = harness(items.clone());
            h.remote.fail_always(network_error(MutationKind::Create));

            let report = h.executor.create(draft, &messages(MutationKind::Create)).await;

            prop_assert_eq!(report.state, MutationState::RolledBack);
            prop_assert_eq!(h.executor.snapshot(), items);
            prop_assert_eq!(h.sink.errors(), 1);
            Ok(())
        })?;
    }

    #[test]
    fn prop_failed_update_restores_exact_snapshot(
        items in arb_clients(6).prop_filter("need an entity", |v| !v.is_empty()),
        pick in any::<prop::sample::Index>(),
        patch in arb_client_patch(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let h = harness(items.clone());
            h.remote.fail_always(network_error(MutationKind::Update));
            let key = items[pick.index(items.len())].id.clone();

            let report = h.executor.update(&key, patch, &messages(MutationKind::Update)).await;

            prop_assert_eq!(report.state, MutationState::RolledBack);
            let restored = serde_json::to_string(&h.executor.snapshot()).unwrap();
            let original = serde_json::to_string(&items).unwrap();
            prop_assert_eq!(restored, original);
            Ok(())
        })?;
    }

    #[test]
    fn prop_failed_delete_restores_order(
        items in arb_clients(6).prop_filter("need an entity", |v| !v.is_empty()),
        pick in any::<prop::sample::Index>(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let h = harness(items.clone());
            h.remote.fail_always(network_error(MutationKind::Delete));
            let key = items[pick.index(items.len())].id.clone();

            h.executor.delete(&key, &messages(MutationKind::Delete)).await;

            prop_assert_eq!(h.executor.snapshot(), items);
            Ok(())
        })?;
    }
}
