//! Hosted authentication service.

use async_trait::async_trait;
use chorus_core::{ChorusResult, EntityKey, ProfileBundle, Session};

/// Authentication and profile lookups against the backend.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// The currently persisted session, if any.
    async fn get_session(&self) -> ChorusResult<Option<Session>>;

    /// Profile and organization of `user_id`.
    async fn fetch_profile(&self, user_id: &EntityKey) -> ChorusResult<ProfileBundle>;

    async fn sign_in(&self, email: &str, password: &str) -> ChorusResult<Session>;

    async fn sign_out(&self) -> ChorusResult<()>;

    /// Called whenever the session held by the context changes, so the
    /// backend authorizes later calls with the same token. `None` after
    /// teardown.
    fn session_changed(&self, _session: Option<&Session>) {}
}
