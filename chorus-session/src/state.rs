//! Displayed authentication state.

use chorus_core::{Organization, Profile, ProfileBundle, SessionUser};

/// What the user is shown as signed in as.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    pub user: SessionUser,
    pub profile: Option<Profile>,
    pub organization: Option<Organization>,
    /// Profile data came from the cache rather than a fresh fetch.
    pub from_cache: bool,
    /// Why the profile could not be refreshed, for display.
    pub error: Option<String>,
}

impl AuthSnapshot {
    pub fn fresh(user: SessionUser, bundle: ProfileBundle) -> Self {
        Self {
            user,
            profile: Some(bundle.profile),
            organization: bundle.organization,
            from_cache: false,
            error: None,
        }
    }

    pub fn cached(user: SessionUser, bundle: ProfileBundle, error: String) -> Self {
        Self {
            user,
            profile: Some(bundle.profile),
            organization: bundle.organization,
            from_cache: true,
            error: Some(error),
        }
    }

    pub fn without_profile(user: SessionUser, error: String) -> Self {
        Self {
            user,
            profile: None,
            organization: None,
            from_cache: false,
            error: Some(error),
        }
    }
}

/// Session bootstrap state machine.
///
/// `Idle → CheckingSession → {Authenticated, Anonymous}`. `Failed` is
/// transient and always resolves to `Anonymous` with the error kept.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    CheckingSession {
        /// Last cached profile, shown while the check runs.
        cached: Option<ProfileBundle>,
    },
    Authenticated(AuthSnapshot),
    Anonymous {
        error: Option<String>,
    },
    Failed {
        error: String,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CheckingSession { .. } => "checking_session",
            Self::Authenticated(_) => "authenticated",
            Self::Anonymous { .. } => "anonymous",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Authenticated(_) | Self::Anonymous { .. })
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    pub fn snapshot(&self) -> Option<&AuthSnapshot> {
        match self {
            Self::Authenticated(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn user(&self) -> Option<&SessionUser> {
        self.snapshot().map(|s| &s.user)
    }

    /// Profile to display, including the cached one while checking.
    pub fn profile(&self) -> Option<&Profile> {
        match self {
            Self::Authenticated(snapshot) => snapshot.profile.as_ref(),
            Self::CheckingSession { cached } => cached.as_ref().map(|b| &b.profile),
            _ => None,
        }
    }

    pub fn organization(&self) -> Option<&Organization> {
        match self {
            Self::Authenticated(snapshot) => snapshot.organization.as_ref(),
            Self::CheckingSession { cached } => cached.as_ref().and_then(|b| b.organization.as_ref()),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Authenticated(snapshot) => snapshot.error.as_deref(),
            Self::Anonymous { error } => error.as_deref(),
            Self::Failed { error } => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_core::EntityKey;

    fn user() -> SessionUser {
        SessionUser {
            id: EntityKey::remote("u1"),
            email: Some("ana@example.com".to_string()),
        }
    }

    fn bundle() -> ProfileBundle {
        ProfileBundle {
            profile: Profile {
                id: EntityKey::remote("u1"),
                full_name: Some("Ana".to_string()),
                role: None,
                organization_id: Some(EntityKey::remote("o1")),
            },
            organization: Some(Organization {
                id: EntityKey::remote("o1"),
                name: "Acme".to_string(),
                plan: None,
            }),
        }
    }

    #[test]
    fn test_anonymous_has_nothing() {
        let state = SessionState::Anonymous { error: None };
        assert!(state.is_terminal());
        assert!(state.user().is_none());
        assert!(state.profile().is_none());
        assert!(state.organization().is_none());
    }

    #[test]
    fn test_checking_session_shows_cached_profile() {
        let state = SessionState::CheckingSession {
            cached: Some(bundle()),
        };
        assert!(!state.is_terminal());
        assert_eq!(state.profile().and_then(|p| p.full_name.as_deref()), Some("Ana"));
        assert_eq!(state.organization().map(|o| o.name.as_str()), Some("Acme"));
    }

    #[test]
    fn test_snapshot_constructors() {
        let fresh = AuthSnapshot::fresh(user(), bundle());
        assert!(!fresh.from_cache);
        assert!(fresh.error.is_none());

        let missing = AuthSnapshot::without_profile(user(), "profile timed out".to_string());
        let state = SessionState::Authenticated(missing);
        assert!(state.is_authenticated());
        assert!(state.profile().is_none());
        assert_eq!(state.error(), Some("profile timed out"));
    }

    #[test]
    fn test_default_is_idle() {
        assert_eq!(SessionState::default().name(), "idle");
    }
}
