//! Auth service endpoints.

use async_trait::async_trait;
use chorus_core::{
    AuthError, ChorusResult, EntityKey, EpochMillis, Organization, Profile, ProfileBundle,
    RemoteFetchError, Session, SessionUser,
};
use chorus_session::AuthBackend;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{error_message, fetch_decode, fetch_transport, sign_in_status};
use crate::rest::{id_filter, table_path, RestClient};

const TOKEN_PATH: &str = "/auth/v1/token";
const USER_PATH: &str = "/auth/v1/user";
const LOGOUT_PATH: &str = "/auth/v1/logout";
const PROFILE_SELECT: &str = "*,organization:organizations(*)";

#[derive(Debug, Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserRow {
    id: EntityKey,
    #[serde(default)]
    email: Option<String>,
}

impl From<UserRow> for SessionUser {
    fn from(row: UserRow) -> Self {
        SessionUser {
            id: row.id,
            email: row.email,
        }
    }
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    expires_in: Option<i64>,
    /// Absolute expiry, epoch seconds.
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserRow,
}

impl TokenResponse {
    /// Session expiring at `expires_at`, else `expires_in` from `now_ms`.
    pub(crate) fn into_session(self, now_ms: EpochMillis) -> Session {
        let expires_at = self
            .expires_at
            .map(|secs| secs * 1000)
            .or_else(|| self.expires_in.map(|secs| now_ms + secs * 1000));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user.into(),
        }
    }
}

/// Profile row with its organization embedded.
#[derive(Debug, Deserialize)]
pub(crate) struct ProfileRow {
    #[serde(flatten)]
    profile: Profile,
    #[serde(default)]
    organization: Option<Organization>,
}

impl From<ProfileRow> for ProfileBundle {
    fn from(row: ProfileRow) -> Self {
        ProfileBundle {
            profile: row.profile,
            organization: row.organization,
        }
    }
}

#[async_trait]
impl AuthBackend for RestClient {
    /// Validates the stored session against the auth service.
    ///
    /// A token the service no longer accepts drops the session.
    async fn get_session(&self) -> ChorusResult<Option<Session>> {
        let Some(mut session) = self.session() else {
            return Ok(None);
        };

        let response = self
            .request(Method::GET, USER_PATH)?
            .send()
            .await
            .map_err(|e| fetch_transport("auth/user", &e))?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::debug!(status = status.as_u16(), "stored session rejected");
            self.set_session(None);
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteFetchError::Status {
                resource: "auth/user".to_string(),
                status: status.as_u16(),
                message: error_message(&body),
            }
            .into());
        }

        let user: UserRow = response
            .json()
            .await
            .map_err(|e| fetch_decode("auth/user", &e))?;
        session.user = user.into();
        self.set_session(Some(session.clone()));
        Ok(Some(session))
    }

    async fn fetch_profile(&self, user_id: &EntityKey) -> ChorusResult<ProfileBundle> {
        let query = [id_filter(user_id)?, ("select", PROFILE_SELECT.to_string())];
        let rows: Vec<ProfileRow> = self
            .get_json("profiles", &table_path("profiles"), &query)
            .await?;
        rows.into_iter()
            .next()
            .map(ProfileBundle::from)
            .ok_or_else(|| {
                RemoteFetchError::NotFound {
                    resource: format!("profiles/{user_id}"),
                }
                .into()
            })
    }

    async fn sign_in(&self, email: &str, password: &str) -> ChorusResult<Session> {
        let response = self
            .request(Method::POST, TOKEN_PATH)?
            .query(&[("grant_type", "password")])
            .json(&PasswordGrant { email, password })
            .send()
            .await
            .map_err(|e| AuthError::Rejected {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(sign_in_status(status, &body));
        }

        let token: TokenResponse = response.json().await.map_err(|e| AuthError::Rejected {
            reason: format!("invalid token response: {}", e),
        })?;
        let session = token.into_session(chrono::Utc::now().timestamp_millis());
        tracing::info!(user_id = %session.user.id, "signed in");
        self.set_session(Some(session.clone()));
        Ok(session)
    }

    /// Revokes the session remotely. The local session is dropped either way.
    async fn sign_out(&self) -> ChorusResult<()> {
        if self.session().is_none() {
            return Ok(());
        }
        let request = self.request(Method::POST, LOGOUT_PATH)?;
        self.set_session(None);

        let response = request.send().await.map_err(|e| AuthError::Rejected {
            reason: e.to_string(),
        })?;
        let status = response.status();
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(AuthError::Rejected {
            reason: format!("HTTP {}: {}", status.as_u16(), error_message(&body)),
        }
        .into())
    }

    fn session_changed(&self, session: Option<&Session>) {
        self.set_session(session.cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_prefers_absolute_expiry() {
        let token: TokenResponse = serde_json::from_str(
            r#"{
                "access_token": "at",
                "token_type": "bearer",
                "expires_in": 3600,
                "expires_at": 1700003600,
                "refresh_token": "rt",
                "user": {"id": "u1", "email": "ana@example.com", "role": "authenticated"}
            }"#,
        )
        .unwrap();
        let session = token.into_session(1_700_000_000_000);
        assert_eq!(session.access_token, "at");
        assert_eq!(session.refresh_token.as_deref(), Some("rt"));
        assert_eq!(session.expires_at, Some(1_700_003_600_000));
        assert_eq!(session.user.id, EntityKey::remote("u1"));
        assert_eq!(session.user.email.as_deref(), Some("ana@example.com"));
    }

    #[test]
    fn test_token_response_falls_back_to_lifetime() {
        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token": "at", "expires_in": 60, "user": {"id": "u1"}}"#).unwrap();
        let session = token.into_session(1_000);
        assert_eq!(session.expires_at, Some(61_000));
        assert_eq!(session.refresh_token, None);
    }

    #[test]
    fn test_profile_row_embeds_organization() {
        let rows: Vec<ProfileRow> = serde_json::from_str(
            r#"[{
                "id": "u1",
                "full_name": "Ana Lima",
                "role": "admin",
                "organization_id": "o1",
                "updated_at": "2024-01-01T00:00:00Z",
                "organization": {"id": "o1", "name": "Acme", "plan": "pro"}
            }]"#,
        )
        .unwrap();
        let bundle = ProfileBundle::from(rows.into_iter().next().unwrap());
        assert_eq!(bundle.profile.full_name.as_deref(), Some("Ana Lima"));
        assert_eq!(bundle.profile.organization_id, Some(EntityKey::remote("o1")));
        assert_eq!(bundle.organization.unwrap().name, "Acme");
    }

    #[test]
    fn test_profile_row_without_organization() {
        let row: ProfileRow = serde_json::from_str(r#"{"id": "u2", "organization": null}"#).unwrap();
        let bundle = ProfileBundle::from(row);
        assert_eq!(bundle.profile.id, EntityKey::remote("u2"));
        assert!(bundle.organization.is_none());
    }
}
