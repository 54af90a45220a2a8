//! Chorus Test Utilities
//!
//! Shared test infrastructure for the Chorus workspace:
//! - Mock media, remotes, sinks and auth backends
//! - Proptest generators for entity types
//! - Test fixtures for common scenarios
//!
//! Only integration tests (`tests/` directories) depend on this crate.

// Re-export core types for convenience
pub use chorus_core::{
    AuthError, CacheIoError, ChorusError, ChorusResult, Client, ClientDraft, ClientPatch, Clock,
    Entity, EntityKey, FixedClock, ManualClock, MutationKind, Organization, Profile,
    ProfileBundle, RemoteFetchError, RemoteMutationError, Session, SessionUser,
};

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chorus_session::AuthBackend;
use chorus_storage::{KvMedium, MemoryMedium, Notification, NotificationLevel, NotificationSink, RemoteCollection};
use tokio::sync::Notify;
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// MOCK MEDIUM
// ============================================================================

/// In-memory medium that fails on demand.
#[derive(Debug, Default)]
pub struct FlakyMedium {
    inner: MemoryMedium,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_removes: AtomicBool,
    fail_lists: AtomicBool,
}

impl FlakyMedium {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    pub fn fail_everything(&self, fail: bool) {
        self.fail_reads(fail);
        self.fail_writes(fail);
        self.fail_removes(fail);
        self.fail_lists(fail);
    }

    /// Store a value that is not a valid cache entry.
    pub fn corrupt(&self, full_key: &str) {
        let _ = self.inner.write(full_key, "\u{0}garbage");
    }

    /// Raw value, bypassing failure injection.
    pub fn raw(&self, full_key: &str) -> Option<String> {
        self.inner.read(full_key).ok().flatten()
    }

    fn check(flag: &AtomicBool, key: &str) -> Result<(), CacheIoError> {
        if flag.load(Ordering::SeqCst) {
            return Err(CacheIoError::Medium {
                key: key.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl KvMedium for FlakyMedium {
    fn read(&self, key: &str) -> Result<Option<String>, CacheIoError> {
        Self::check(&self.fail_reads, key)?;
        self.inner.read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheIoError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheIoError::QuotaExceeded {
                key: key.to_string(),
                bytes: key.len() + value.len(),
            });
        }
        self.inner.write(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), CacheIoError> {
        Self::check(&self.fail_removes, key)?;
        self.inner.remove(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheIoError> {
        Self::check(&self.fail_lists, prefix)?;
        self.inner.keys_with_prefix(prefix)
    }
}

// ============================================================================
// MOCK REMOTE
// ============================================================================

/// Which remote call a script entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    FetchAll,
    Create,
    Update,
    Delete,
}

/// Holds a remote call until the test releases it.
///
/// The call signals [`entered`](Gate::entered) first, so the test can
/// inspect the optimistic state while the call is pending.
#[derive(Debug, Default)]
pub struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wait until a call reaches the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let one waiting (or the next) call through.
    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

/// In-memory [`RemoteCollection`] with scripted failures.
pub struct MockRemote<T: Entity> {
    items: Mutex<Vec<T>>,
    scripted: Mutex<VecDeque<(RemoteOp, ChorusError)>>,
    fail_always: Mutex<Option<ChorusError>>,
    gates: Mutex<HashMap<RemoteOp, Arc<Gate>>>,
    delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<RemoteOp>>,
}

impl<T: Entity> Default for MockRemote<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> MockRemote<T> {
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    pub fn with_items(items: Vec<T>) -> Self {
        Self {
            items: Mutex::new(items),
            scripted: Mutex::new(VecDeque::new()),
            fail_always: Mutex::new(None),
            gates: Mutex::new(HashMap::new()),
            delay: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next `op` call with `error`.
    pub fn fail_next(&self, op: RemoteOp, error: ChorusError) {
        lock(&self.scripted).push_back((op, error));
    }

    /// Fail every call with `error` until [`heal`](Self::heal).
    pub fn fail_always(&self, error: ChorusError) {
        *lock(&self.fail_always) = Some(error);
    }

    pub fn heal(&self) {
        *lock(&self.fail_always) = None;
        lock(&self.scripted).clear();
    }

    /// Hold every `op` call at `gate`.
    pub fn gate(&self, op: RemoteOp, gate: Arc<Gate>) {
        lock(&self.gates).insert(op, gate);
    }

    /// Sleep before answering (tokio time, so paused tests stay instant).
    pub fn delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    pub fn set_items(&self, items: Vec<T>) {
        *lock(&self.items) = items;
    }

    /// Server-side items.
    pub fn items(&self) -> Vec<T> {
        lock(&self.items).clone()
    }

    pub fn calls(&self) -> Vec<RemoteOp> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, op: RemoteOp) -> usize {
        lock(&self.calls).iter().filter(|c| **c == op).count()
    }

    async fn enter(&self, op: RemoteOp) -> ChorusResult<()> {
        lock(&self.calls).push(op);

        let gate = lock(&self.gates).get(&op).cloned();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = {
            let mut scripted = lock(&self.scripted);
            let position = scripted.iter().position(|(o, _)| *o == op);
            position.and_then(|i| scripted.remove(i)).map(|(_, e)| e)
        };
        if let Some(error) = scripted {
            return Err(error);
        }
        match lock(&self.fail_always).clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<T: Entity> RemoteCollection<T> for MockRemote<T> {
    async fn fetch_all(&self) -> ChorusResult<Vec<T>> {
        self.enter(RemoteOp::FetchAll).await?;
        Ok(self.items())
    }

    async fn create(&self, draft: &T::Draft) -> ChorusResult<T> {
        self.enter(RemoteOp::Create).await?;
        let created = T::tentative(EntityKey::from_uuid(Uuid::now_v7()), draft);
        lock(&self.items).push(created.clone());
        Ok(created)
    }

    async fn update(&self, key: &EntityKey, patch: &T::Patch) -> ChorusResult<T> {
        self.enter(RemoteOp::Update).await?;
        let mut items = lock(&self.items);
        match items.iter_mut().find(|item| item.key() == key) {
            Some(item) => {
                item.apply_patch(patch);
                Ok(item.clone())
            }
            None => Err(RemoteMutationError::Rejected {
                kind: MutationKind::Update,
                resource: T::entity_kind().table().to_string(),
                reason: format!("{key} not found"),
            }
            .into()),
        }
    }

    async fn delete(&self, key: &EntityKey) -> ChorusResult<()> {
        self.enter(RemoteOp::Delete).await?;
        lock(&self.items).retain(|item| item.key() != key);
        Ok(())
    }
}

/// The error a flaky network produces on a mutation.
pub fn network_error(kind: MutationKind) -> ChorusError {
    RemoteMutationError::Transport {
        kind,
        resource: "clients".to_string(),
        reason: "network".to_string(),
    }
    .into()
}

/// The error a flaky network produces on a read.
pub fn fetch_error() -> ChorusError {
    RemoteFetchError::Transport {
        resource: "clients".to_string(),
        reason: "network".to_string(),
    }
    .into()
}

// ============================================================================
// RECORDING SINK
// ============================================================================

/// Notification sink that remembers everything it was told.
#[derive(Debug, Default)]
pub struct RecordingSink {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.seen).clone()
    }

    pub fn count(&self, level: NotificationLevel) -> usize {
        lock(&self.seen).iter().filter(|n| n.level == level).count()
    }

    pub fn successes(&self) -> usize {
        self.count(NotificationLevel::Success)
    }

    pub fn errors(&self) -> usize {
        self.count(NotificationLevel::Error)
    }

    pub fn messages(&self) -> Vec<String> {
        lock(&self.seen).iter().map(|n| n.message.clone()).collect()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        lock(&self.seen).push(notification);
    }
}

// ============================================================================
// MOCK AUTH BACKEND
// ============================================================================

/// Scripted [`AuthBackend`].
#[derive(Debug, Default)]
pub struct MockAuthBackend {
    session: Mutex<Option<Session>>,
    session_error: Mutex<Option<ChorusError>>,
    session_delay: Mutex<Option<Duration>>,
    profiles: Mutex<HashMap<EntityKey, ProfileBundle>>,
    profile_error: Mutex<Option<ChorusError>>,
    profile_delay: Mutex<Option<Duration>>,
    users: Mutex<HashMap<String, (String, Session)>>,
    sign_out_error: Mutex<Option<ChorusError>>,
    pushed_tokens: Mutex<Vec<Option<String>>>,
    session_calls: AtomicUsize,
    profile_calls: AtomicUsize,
    sign_in_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
}

impl MockAuthBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_session(&self, session: Option<Session>) {
        *lock(&self.session) = session;
    }

    pub fn fail_session(&self, error: Option<ChorusError>) {
        *lock(&self.session_error) = error;
    }

    pub fn delay_session(&self, delay: Option<Duration>) {
        *lock(&self.session_delay) = delay;
    }

    pub fn put_profile(&self, bundle: ProfileBundle) {
        lock(&self.profiles).insert(bundle.profile.id.clone(), bundle);
    }

    pub fn fail_profile(&self, error: Option<ChorusError>) {
        *lock(&self.profile_error) = error;
    }

    pub fn delay_profile(&self, delay: Option<Duration>) {
        *lock(&self.profile_delay) = delay;
    }

    /// Register credentials that [`sign_in`](AuthBackend::sign_in) accepts.
    pub fn add_user(&self, email: &str, password: &str, session: Session) {
        lock(&self.users).insert(email.to_string(), (password.to_string(), session));
    }

    pub fn fail_sign_out(&self, error: Option<ChorusError>) {
        *lock(&self.sign_out_error) = error;
    }

    pub fn session_calls(&self) -> usize {
        self.session_calls.load(Ordering::SeqCst)
    }

    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    pub fn sign_in_calls(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    /// Access tokens handed over through
    /// [`session_changed`](AuthBackend::session_changed), oldest first.
    pub fn pushed_tokens(&self) -> Vec<Option<String>> {
        lock(&self.pushed_tokens).clone()
    }
}

#[async_trait]
impl AuthBackend for MockAuthBackend {
    async fn get_session(&self) -> ChorusResult<Option<Session>> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.session_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = lock(&self.session_error).clone() {
            return Err(error);
        }
        Ok(lock(&self.session).clone())
    }

    async fn fetch_profile(&self, user_id: &EntityKey) -> ChorusResult<ProfileBundle> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.profile_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = lock(&self.profile_error).clone() {
            return Err(error);
        }
        lock(&self.profiles).get(user_id).cloned().ok_or_else(|| {
            RemoteFetchError::NotFound {
                resource: format!("profiles/{user_id}"),
            }
            .into()
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> ChorusResult<Session> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let user = lock(&self.users).get(email).cloned();
        match user {
            Some((expected, session)) if expected == password => {
                *lock(&self.session) = Some(session.clone());
                Ok(session)
            }
            _ => Err(AuthError::InvalidCredentials.into()),
        }
    }

    async fn sign_out(&self) -> ChorusResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.session) = None;
        match lock(&self.sign_out_error).clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn session_changed(&self, session: Option<&Session>) {
        lock(&self.pushed_tokens).push(session.map(|s| s.access_token.clone()));
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating Chorus entity types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a server-assigned key.
    pub fn arb_remote_key() -> impl Strategy<Value = EntityKey> {
        any::<[u8; 16]>().prop_map(|bytes| EntityKey::from_uuid(Uuid::from_bytes(bytes)))
    }

    pub fn arb_name() -> impl Strategy<Value = String> {
        "[A-Z][a-zA-Z0-9 ]{0,20}"
    }

    pub fn arb_client_draft() -> impl Strategy<Value = ClientDraft> {
        (
            arb_name(),
            proptest::option::of("[a-z]{3,12}"),
            proptest::option::of("[a-z ]{0,40}"),
        )
            .prop_map(|(name, industry, description)| ClientDraft {
                name,
                industry,
                description,
                ..Default::default()
            })
    }

    pub fn arb_client_patch() -> impl Strategy<Value = ClientPatch> {
        (
            proptest::option::of(arb_name()),
            proptest::option::of("[a-z]{3,12}"),
            proptest::option::of(any::<bool>()),
        )
            .prop_map(|(name, tone, is_active)| ClientPatch {
                name,
                tone,
                is_active,
                ..Default::default()
            })
    }

    pub fn arb_client() -> impl Strategy<Value = Client> {
        (arb_remote_key(), arb_client_draft()).prop_map(|(key, draft)| Client::tentative(key, &draft))
    }

    /// Clients with distinct keys.
    pub fn arb_clients(max: usize) -> impl Strategy<Value = Vec<Client>> {
        proptest::collection::vec(arb_client_draft(), 0..=max).prop_map(|drafts| {
            drafts
                .iter()
                .enumerate()
                .map(|(i, draft)| Client::tentative(EntityKey::remote(format!("client-{i}")), draft))
                .collect()
        })
    }

    /// Cache keys as the application uses them.
    pub fn arb_cache_key() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,12}(:[a-z0-9_]{1,12})?"
    }

    /// TTLs from one millisecond to about a day.
    pub fn arb_ttl_ms() -> impl Strategy<Value = u64> {
        1u64..86_400_000u64
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common scenarios.

    use super::*;

    pub fn client(id: &str, name: &str) -> Client {
        Client::tentative(EntityKey::remote(id), &ClientDraft::named(name))
    }

    pub fn acme() -> Client {
        client("1", "Acme")
    }

    pub fn user(id: &str) -> SessionUser {
        SessionUser {
            id: EntityKey::remote(id),
            email: Some(format!("{id}@example.com")),
        }
    }

    pub fn session_for(user_id: &str) -> Session {
        Session {
            access_token: format!("access-{user_id}"),
            refresh_token: Some(format!("refresh-{user_id}")),
            expires_at: None,
            user: user(user_id),
        }
    }

    pub fn profile_bundle(user_id: &str, organization: &str) -> ProfileBundle {
        let org_id = EntityKey::remote(format!("org-{user_id}"));
        ProfileBundle {
            profile: Profile {
                id: EntityKey::remote(user_id),
                full_name: Some(format!("User {user_id}")),
                role: Some("admin".to_string()),
                organization_id: Some(org_id.clone()),
            },
            organization: Some(Organization {
                id: org_id,
                name: organization.to_string(),
                plan: Some("pro".to_string()),
            }),
        }
    }
}
