//! Explicit session context.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chorus_core::{AuthError, ChorusConfig, ChorusError, ChorusResult, EntityKey, ProfileBundle, Session};
use chorus_storage::TtlCache;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::backend::AuthBackend;
use crate::event::AuthEvent;
use crate::state::{AuthSnapshot, SessionState};

/// Cache key prefix of per-user profiles (`profile:<user id>`).
pub const PROFILE_PREFIX: &str = "profile:";

/// Cache key holding the id of the last signed-in user. Kept outside
/// [`PROFILE_PREFIX`] so no user id can collide with it.
pub const PROFILE_LAST_KEY: &str = "profile-last";

/// Timeouts and TTLs used by [`SessionContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub session_timeout: Duration,
    pub profile_timeout: Duration,
    pub profile_ttl: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(5),
            profile_timeout: Duration::from_secs(3),
            profile_ttl: Duration::from_secs(30 * 60),
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &ChorusConfig) -> Self {
        Self {
            session_timeout: config.timeouts.session(),
            profile_timeout: config.timeouts.profile(),
            profile_ttl: config.cache.profile_ttl(),
        }
    }
}

fn profile_key(user_id: &EntityKey) -> String {
    format!("{PROFILE_PREFIX}{user_id}")
}

/// Owns the signed-in state for one application instance.
///
/// Observers follow state changes through [`subscribe`](Self::subscribe).
pub struct SessionContext {
    backend: Arc<dyn AuthBackend>,
    cache: Arc<TtlCache>,
    settings: SessionSettings,
    state_tx: watch::Sender<SessionState>,
    session: Mutex<Option<Session>>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("state", &self.state_tx.borrow().name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl SessionContext {
    pub fn new(backend: Arc<dyn AuthBackend>, cache: Arc<TtlCache>, settings: SessionSettings) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            backend,
            cache,
            settings,
            state_tx,
            session: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn current(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    /// The active session, tokens included.
    pub fn session(&self) -> Option<Session> {
        self.session_slot().clone()
    }

    /// Bearer token of the active session.
    pub fn access_token(&self) -> Option<String> {
        self.session_slot().as_ref().map(|s| s.access_token.clone())
    }

    fn session_slot(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Swap the held session and hand it to the backend.
    fn replace_session(&self, session: Option<Session>) {
        self.backend.session_changed(session.as_ref());
        *self.session_slot() = session;
    }

    fn transition(&self, next: SessionState) -> SessionState {
        let previous = self.state_tx.borrow().name();
        tracing::debug!(from = previous, to = next.name(), "session state transition");
        self.state_tx.send_replace(next.clone());
        next
    }

    /// Anonymous, passing through the transient failed state.
    fn fail(&self, error: String) -> SessionState {
        self.replace_session(None);
        self.transition(SessionState::Failed {
            error: error.clone(),
        });
        self.transition(SessionState::Anonymous { error: Some(error) })
    }

    async fn bounded<R, F>(&self, operation: &'static str, limit: Duration, call: F) -> ChorusResult<R>
    where
        F: Future<Output = ChorusResult<R>>,
    {
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, timeout_ms = limit.as_millis() as u64, "auth call timed out");
                Err(ChorusError::timeout(operation, limit))
            }
        }
    }

    /// Profile cached for the last signed-in user.
    pub fn cached_profile(&self) -> Option<ProfileBundle> {
        let user_id: EntityKey = self.cache.get(PROFILE_LAST_KEY)?;
        self.cache.get(&profile_key(&user_id))
    }

    /// Determine who is signed in.
    ///
    /// Returns the terminal state. Timeouts and failures of the session
    /// check end in `Anonymous` with the error kept; a failed profile fetch
    /// still ends in `Authenticated`, with the cached profile if there is one.
    pub async fn bootstrap(&self) -> SessionState {
        let cached = self.cached_profile();
        self.transition(SessionState::CheckingSession { cached });

        let session = match self
            .bounded("session check", self.settings.session_timeout, self.backend.get_session())
            .await
        {
            Ok(Some(session)) => session,
            Ok(None) => {
                self.replace_session(None);
                self.cache.clear_prefix(PROFILE_PREFIX);
                self.cache.clear(PROFILE_LAST_KEY);
                return self.transition(SessionState::Anonymous { error: None });
            }
            Err(e) => {
                tracing::warn!(error = %e, "session check failed");
                return self.fail(e.to_string());
            }
        };

        if session.is_expired_at(self.cache.clock().now_millis()) {
            return self.fail(ChorusError::from(AuthError::SessionExpired).to_string());
        }

        self.establish(session, true).await
    }

    /// Sign in with email and password.
    ///
    /// On failure the state becomes `Anonymous` with the error and the error
    /// is returned.
    pub async fn sign_in(&self, email: &str, password: &str) -> ChorusResult<SessionState> {
        self.transition(SessionState::CheckingSession { cached: None });
        match self
            .bounded("sign in", self.settings.session_timeout, self.backend.sign_in(email, password))
            .await
        {
            Ok(session) => {
                self.cache.clear(&profile_key(&session.user.id));
                Ok(self.establish(session, false).await)
            }
            Err(e) => {
                tracing::warn!(error = %e, "sign in failed");
                self.fail(e.to_string());
                Err(e)
            }
        }
    }

    /// Sign out remotely and tear down local state.
    ///
    /// Local teardown happens even if the backend call fails; that error is
    /// still returned.
    pub async fn sign_out(&self) -> ChorusResult<()> {
        let result = self
            .bounded("sign out", self.settings.session_timeout, self.backend.sign_out())
            .await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "remote sign out failed, clearing local state anyway");
        }
        self.teardown();
        result
    }

    fn teardown(&self) {
        self.replace_session(None);
        let removed = self.cache.clear_all();
        tracing::debug!(removed, "session torn down");
        self.transition(SessionState::Anonymous { error: None });
    }

    /// Apply an auth event pushed by the backend.
    pub async fn handle_event(&self, event: AuthEvent) -> SessionState {
        tracing::debug!(event = event.name(), "auth event");
        match event {
            AuthEvent::SignedIn(session) | AuthEvent::UserUpdated(session) => {
                self.cache.clear(&profile_key(&session.user.id));
                self.establish(session, false).await
            }
            AuthEvent::TokenRefreshed(session) => {
                self.replace_session(Some(session));
                self.current()
            }
            AuthEvent::SignedOut => {
                self.teardown();
                self.current()
            }
        }
    }

    /// Feed events from `events` into [`handle_event`](Self::handle_event)
    /// until the sender side closes.
    pub fn spawn_listener(self: &Arc<Self>, mut events: broadcast::Receiver<AuthEvent>) -> JoinHandle<()> {
        let context = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        context.handle_event(event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "auth events lagged, re-checking session");
                        context.bootstrap().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Store `session`, then fetch its profile.
    async fn establish(&self, session: Session, allow_cached: bool) -> SessionState {
        let user = session.user.clone();
        self.replace_session(Some(session));

        let error = match self
            .bounded(
                "profile fetch",
                self.settings.profile_timeout,
                self.backend.fetch_profile(&user.id),
            )
            .await
        {
            Ok(bundle) => {
                let ttl = self.settings.profile_ttl;
                self.cache.set(&profile_key(&user.id), &bundle, ttl);
                self.cache.set(PROFILE_LAST_KEY, &user.id, ttl);
                return self.transition(SessionState::Authenticated(AuthSnapshot::fresh(user, bundle)));
            }
            Err(e) => e,
        };

        tracing::warn!(user_id = %user.id, error = %error, "profile fetch failed");
        let cached = if allow_cached {
            self.cache.get::<ProfileBundle>(&profile_key(&user.id))
        } else {
            None
        };
        let snapshot = match cached {
            Some(bundle) => AuthSnapshot::cached(user, bundle, error.to_string()),
            None => AuthSnapshot::without_profile(user, error.to_string()),
        };
        self.transition(SessionState::Authenticated(snapshot))
    }
}
