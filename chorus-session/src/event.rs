//! Auth state changes pushed by the backend.

use chorus_core::Session;

#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
    /// New access token for the same user.
    TokenRefreshed(Session),
    /// User metadata changed; the cached profile is stale.
    UserUpdated(Session),
}

impl AuthEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SignedIn(_) => "signed_in",
            Self::SignedOut => "signed_out",
            Self::TokenRefreshed(_) => "token_refreshed",
            Self::UserUpdated(_) => "user_updated",
        }
    }
}
