//! Optimistic create/update/delete with rollback.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chorus_core::{
    ChorusError, ChorusResult, Entity, EntityKey, MutationKind, ValidationError,
};

use super::collection::OptimisticCollection;
use super::intent::{MutationIntent, MutationReport, MutationState};
use super::remote::RemoteCollection;
use crate::cache::{CacheRead, Fetched, RevalidatingFetcher};
use crate::notify::NotificationSink;

/// Default bound on a single remote mutation.
pub const DEFAULT_MUTATION_TIMEOUT: Duration = Duration::from_secs(15);

/// Messages shown to the user when a mutation succeeds or fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationMessages {
    pub success: String,
    pub error: String,
}

impl MutationMessages {
    pub fn new(success: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: success.into(),
            error: error.into(),
        }
    }

    /// "Client created" / "Failed to create client", and so on.
    pub fn default_for<T: Entity>(kind: MutationKind) -> Self {
        let label = T::entity_kind().label();
        let mut success = format!("{label} {kind}d");
        if let Some(first) = success.get(..1) {
            success = format!("{}{}", first.to_uppercase(), &success[1..]);
        }
        Self {
            success,
            error: format!("Failed to {kind} {label}"),
        }
    }
}

/// Where the collection is persisted between runs.
#[derive(Debug, Clone)]
pub struct CollectionMirror {
    pub fetcher: RevalidatingFetcher,
    pub key: String,
    pub ttl: Duration,
}

impl CollectionMirror {
    pub fn new(fetcher: RevalidatingFetcher, key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            fetcher,
            key: key.into(),
            ttl,
        }
    }
}

/// Tracks whether a background refresh may still replace the loaded items.
#[derive(Debug)]
struct LoadSlot<T> {
    settled: bool,
    /// Generation right after the load applied its items, if it did.
    applied: Option<u64>,
    /// Refresh result that arrived before the load applied the cached items.
    early: Option<Vec<T>>,
}

/// Applies mutations locally first, then confirms or rolls them back.
///
/// Concurrent mutations on one collection are allowed. A failing mutation
/// restores its full pre-mutation snapshot only if nothing else changed the
/// collection since it applied its change; otherwise it reverts just its own
/// change so the other mutation's effect survives.
pub struct OptimisticExecutor<T: Entity> {
    collection: OptimisticCollection<T>,
    remote: Arc<dyn RemoteCollection<T>>,
    sink: Arc<dyn NotificationSink>,
    mirror: Option<CollectionMirror>,
    mutation_timeout: Duration,
}

impl<T: Entity> OptimisticExecutor<T> {
    pub fn new(remote: Arc<dyn RemoteCollection<T>>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            collection: OptimisticCollection::new(),
            remote,
            sink,
            mirror: None,
            mutation_timeout: DEFAULT_MUTATION_TIMEOUT,
        }
    }

    pub fn with_collection(mut self, collection: OptimisticCollection<T>) -> Self {
        self.collection = collection;
        self
    }

    pub fn with_mirror(mut self, mirror: CollectionMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn with_mutation_timeout(mut self, timeout: Duration) -> Self {
        self.mutation_timeout = timeout;
        self
    }

    pub fn collection(&self) -> &OptimisticCollection<T> {
        &self.collection
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.collection.snapshot()
    }

    pub fn get(&self, key: &EntityKey) -> Option<T> {
        self.collection.get(key)
    }

    fn resource() -> &'static str {
        T::entity_kind().table()
    }

    /// Run a remote call under the mutation timeout. The call is dropped
    /// when the deadline passes.
    async fn bounded<R, F>(&self, operation: &str, call: F) -> ChorusResult<R>
    where
        F: Future<Output = ChorusResult<R>>,
    {
        match tokio::time::timeout(self.mutation_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    resource = Self::resource(),
                    operation,
                    timeout_ms = self.mutation_timeout.as_millis() as u64,
                    "remote call timed out"
                );
                Err(ChorusError::timeout(
                    format!("{operation} {}", Self::resource()),
                    self.mutation_timeout,
                ))
            }
        }
    }

    /// Load the collection, serving the cached copy first when there is one.
    ///
    /// A background refresh replaces the loaded items only if no mutation
    /// changed the collection in the meantime.
    pub async fn load(&self) -> ChorusResult<Fetched<Vec<T>>> {
        let Some(mirror) = &self.mirror else {
            let items = self.bounded("fetch", self.remote.fetch_all()).await?;
            self.collection.replace_all(items.clone());
            let now = chrono::Utc::now().timestamp_millis();
            return Ok(Fetched::uncached(CacheRead::from_remote(items, now, now)));
        };

        let start_generation = self.collection.generation();
        let slot = Arc::new(Mutex::new(LoadSlot {
            settled: false,
            applied: None,
            early: None,
        }));

        let remote = Arc::clone(&self.remote);
        let refresh_slot = Arc::clone(&slot);
        let refresh_collection = self.collection.clone();
        let fetched = mirror
            .fetcher
            .fetch_with_cache_then(
                &mirror.key,
                move || async move { remote.fetch_all().await },
                mirror.ttl,
                move |items: Vec<T>| {
                    let mut slot = refresh_slot
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    if !slot.settled {
                        slot.early = Some(items);
                        return;
                    }
                    match slot.applied {
                        Some(expected) => match refresh_collection.replace_all_if(expected, items) {
                            Some(generation) => slot.applied = Some(generation),
                            None => tracing::debug!(
                                resource = Self::resource(),
                                "collection changed during refresh, keeping local state"
                            ),
                        },
                        None => tracing::debug!(
                            resource = Self::resource(),
                            "load was overtaken by a mutation, dropping refresh"
                        ),
                    }
                },
            )
            .await?;

        let mut slot = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let items = slot.early.take().unwrap_or_else(|| fetched.value().clone());
        slot.applied = self.collection.replace_all_if(start_generation, items);
        slot.settled = true;
        tracing::debug!(
            resource = Self::resource(),
            from_cache = fetched.read().was_cache_hit(),
            applied = slot.applied.is_some(),
            "collection loaded"
        );
        Ok(fetched)
    }

    /// Create an entity from `draft`.
    ///
    /// A tentative entity with a temporary key is visible in the collection
    /// until the backend answers.
    pub async fn create(&self, draft: T::Draft, messages: &MutationMessages) -> MutationReport<T> {
        let kind = MutationKind::Create;
        let temp_key = EntityKey::new_temp();
        let tentative = T::tentative(temp_key.clone(), &draft);

        let change = self.collection.push_tracked(tentative);
        let mut intent = MutationIntent::from_change(kind, change);
        tracing::debug!(resource = Self::resource(), key = %temp_key, "create applied");

        match self.bounded("create", self.remote.create(&draft)).await {
            Ok(created) => {
                if !self.collection.replace_key(&temp_key, created.clone()) {
                    self.collection.push(created.clone());
                }
                intent.confirm();
                tracing::debug!(resource = Self::resource(), key = %created.key(), "create confirmed");
                self.settle(&intent, messages);
                MutationReport::confirmed(kind, Some(created))
            }
            Err(error) => {
                self.roll_back(&mut intent, &temp_key, &error);
                self.settle(&intent, messages);
                MutationReport::failed(kind, MutationState::RolledBack, error)
            }
        }
    }

    /// Apply `patch` to the entity with `key`.
    pub async fn update(
        &self,
        key: &EntityKey,
        patch: T::Patch,
        messages: &MutationMessages,
    ) -> MutationReport<T> {
        let kind = MutationKind::Update;
        if let Err(error) = Self::check_remote_key(kind, key) {
            return self.reject(kind, error, messages);
        }

        let change = self.collection.patch_tracked(key, &patch);
        let mut intent = MutationIntent::from_change(kind, change);
        tracing::debug!(resource = Self::resource(), %key, "update applied");

        match self.bounded("update", self.remote.update(key, &patch)).await {
            Ok(updated) => {
                // Server response is authoritative over the optimistic entity.
                self.collection.replace_key(key, updated.clone());
                intent.confirm();
                tracing::debug!(resource = Self::resource(), %key, "update confirmed");
                self.settle(&intent, messages);
                MutationReport::confirmed(kind, Some(updated))
            }
            Err(error) => {
                self.roll_back(&mut intent, key, &error);
                self.settle(&intent, messages);
                MutationReport::failed(kind, MutationState::RolledBack, error)
            }
        }
    }

    /// Delete the entity with `key`.
    pub async fn delete(&self, key: &EntityKey, messages: &MutationMessages) -> MutationReport<T> {
        let kind = MutationKind::Delete;
        if let Err(error) = Self::check_remote_key(kind, key) {
            return self.reject(kind, error, messages);
        }

        let change = self.collection.remove_tracked(key);
        let mut intent = MutationIntent::from_change(kind, change);
        tracing::debug!(resource = Self::resource(), %key, "delete applied");

        match self.bounded("delete", self.remote.delete(key)).await {
            Ok(()) => {
                intent.confirm();
                tracing::debug!(resource = Self::resource(), %key, "delete confirmed");
                self.settle(&intent, messages);
                MutationReport::confirmed(kind, None)
            }
            Err(error) => {
                self.roll_back(&mut intent, key, &error);
                self.settle(&intent, messages);
                MutationReport::failed(kind, MutationState::RolledBack, error)
            }
        }
    }

    fn check_remote_key(kind: MutationKind, key: &EntityKey) -> ChorusResult<()> {
        if key.is_temp() {
            return Err(ValidationError::InvalidValue {
                field: "id".to_string(),
                reason: format!("cannot {kind} {key} before it is created on the server"),
            }
            .into());
        }
        Ok(())
    }

    fn reject(
        &self,
        kind: MutationKind,
        error: ChorusError,
        messages: &MutationMessages,
    ) -> MutationReport<T> {
        tracing::warn!(resource = Self::resource(), %kind, %error, "mutation rejected");
        self.sink.error(&messages.error);
        MutationReport::failed(kind, MutationState::Rejected, error)
    }

    fn roll_back(&self, intent: &mut MutationIntent<T>, key: &EntityKey, error: &ChorusError) {
        let full_restore = self
            .collection
            .replace_all_if(intent.generation, intent.snapshot.clone())
            .is_some();

        if !full_restore {
            match (intent.kind, intent.original.clone()) {
                (MutationKind::Create, _) => {
                    self.collection.remove_key(key);
                }
                (MutationKind::Update, Some((_, previous))) => {
                    self.collection.replace_key(key, previous);
                }
                (MutationKind::Delete, Some((index, previous))) => {
                    if self.collection.get(key).is_none() {
                        self.collection.insert_at(index, previous);
                    }
                }
                (_, None) => {}
            }
        }

        intent.roll_back();
        tracing::warn!(
            resource = Self::resource(),
            kind = %intent.kind,
            %key,
            full_restore,
            %error,
            "mutation rolled back"
        );
    }

    /// Persist the settled collection and tell the user.
    fn settle(&self, intent: &MutationIntent<T>, messages: &MutationMessages) {
        if let Some(mirror) = &self.mirror {
            let persisted: Vec<T> = self
                .collection
                .snapshot()
                .into_iter()
                .filter(|item| !item.key().is_temp())
                .collect();
            mirror
                .fetcher
                .cache()
                .set(&mirror.key, &persisted, mirror.ttl);
        }

        match intent.state() {
            MutationState::Confirmed => self.sink.success(&messages.success),
            _ => self.sink.error(&messages.error),
        }
    }
}
