//! Entity records owned by the backend.
//!
//! The cache and mutation layers treat these opaquely through the [`Entity`]
//! trait: a serialisable record with a stable key, a creation payload and a
//! field-level patch.

use crate::{EntityKey, EntityKind, EpochMillis, Platform, ProviderKind, Timestamp};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

/// A record managed through a remote collection.
///
/// # Implementation Requirements
///
/// - `entity_kind()` must return the same value for all instances
/// - `key()` must return the identifier the backend knows the record by, or a
///   temporary key for a record that has not been confirmed yet
/// - `tentative()` builds the locally displayed record for a pending create
/// - `apply_patch()` applies only the fields present in the patch
pub trait Entity:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Payload sent to the backend on create.
    type Draft: Clone + fmt::Debug + Serialize + Send + Sync + 'static;

    /// Field-level update; absent fields are left untouched.
    type Patch: Clone + fmt::Debug + Serialize + Send + Sync + 'static;

    fn entity_kind() -> EntityKind;

    fn key(&self) -> &EntityKey;

    fn tentative(key: EntityKey, draft: &Self::Draft) -> Self;

    fn apply_patch(&mut self, patch: &Self::Patch);
}

fn patch_field<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

fn patch_optional<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if let Some(value) = value {
        *target = Some(value.clone());
    }
}

// ============================================================================
// CLIENT
// ============================================================================

/// A customer the dashboard writes comments for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: EntityKey,
    pub name: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Voice the generated comments should use ("friendly", "expert", ...).
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDraft {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl ClientDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl Entity for Client {
    type Draft = ClientDraft;
    type Patch = ClientPatch;

    fn entity_kind() -> EntityKind {
        EntityKind::Client
    }

    fn key(&self) -> &EntityKey {
        &self.id
    }

    fn tentative(key: EntityKey, draft: &ClientDraft) -> Self {
        Self {
            id: key,
            name: draft.name.clone(),
            industry: draft.industry.clone(),
            description: draft.description.clone(),
            tone: draft.tone.clone(),
            website: draft.website.clone(),
            is_active: true,
            created_at: None,
        }
    }

    fn apply_patch(&mut self, patch: &ClientPatch) {
        patch_field(&mut self.name, &patch.name);
        patch_optional(&mut self.industry, &patch.industry);
        patch_optional(&mut self.description, &patch.description);
        patch_optional(&mut self.tone, &patch.tone);
        patch_optional(&mut self.website, &patch.website);
        patch_field(&mut self.is_active, &patch.is_active);
    }
}

// ============================================================================
// KEYWORD
// ============================================================================

/// A term whose posts should be answered on behalf of a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: EntityKey,
    pub client_id: EntityKey,
    pub term: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordDraft {
    pub client_id: EntityKey,
    pub term: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
}

impl Entity for Keyword {
    type Draft = KeywordDraft;
    type Patch = KeywordPatch;

    fn entity_kind() -> EntityKind {
        EntityKind::Keyword
    }

    fn key(&self) -> &EntityKey {
        &self.id
    }

    fn tentative(key: EntityKey, draft: &KeywordDraft) -> Self {
        Self {
            id: key,
            client_id: draft.client_id.clone(),
            term: draft.term.clone(),
            created_at: None,
        }
    }

    fn apply_patch(&mut self, patch: &KeywordPatch) {
        patch_field(&mut self.term, &patch.term);
    }
}

// ============================================================================
// SAMPLE COMMENT
// ============================================================================

/// An example of the client's voice, fed to the model as a style reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleComment {
    pub id: EntityKey,
    pub client_id: EntityKey,
    #[serde(default)]
    pub platform: Platform,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleCommentDraft {
    pub client_id: EntityKey,
    pub platform: Platform,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleCommentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Entity for SampleComment {
    type Draft = SampleCommentDraft;
    type Patch = SampleCommentPatch;

    fn entity_kind() -> EntityKind {
        EntityKind::SampleComment
    }

    fn key(&self) -> &EntityKey {
        &self.id
    }

    fn tentative(key: EntityKey, draft: &SampleCommentDraft) -> Self {
        Self {
            id: key,
            client_id: draft.client_id.clone(),
            platform: draft.platform,
            content: draft.content.clone(),
            created_at: None,
        }
    }

    fn apply_patch(&mut self, patch: &SampleCommentPatch) {
        patch_field(&mut self.platform, &patch.platform);
        patch_field(&mut self.content, &patch.content);
    }
}

// ============================================================================
// AI PROVIDER
// ============================================================================

/// Credentials and model settings for one hosted language-model API.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AiProvider {
    pub id: EntityKey,
    pub name: String,
    pub kind: ProviderKind,
    pub model: String,
    pub api_key: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    500
}

impl fmt::Debug for AiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiProvider")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("is_default", &self.is_default)
            .finish()
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AiProviderDraft {
    pub name: String,
    pub kind: ProviderKind,
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub is_default: bool,
}

impl fmt::Debug for AiProviderDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiProviderDraft")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiProviderPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

impl Entity for AiProvider {
    type Draft = AiProviderDraft;
    type Patch = AiProviderPatch;

    fn entity_kind() -> EntityKind {
        EntityKind::AiProvider
    }

    fn key(&self) -> &EntityKey {
        &self.id
    }

    fn tentative(key: EntityKey, draft: &AiProviderDraft) -> Self {
        Self {
            id: key,
            name: draft.name.clone(),
            kind: draft.kind,
            model: draft.model.clone(),
            api_key: draft.api_key.clone(),
            temperature: draft.temperature,
            max_tokens: draft.max_tokens,
            is_default: draft.is_default,
            created_at: None,
        }
    }

    fn apply_patch(&mut self, patch: &AiProviderPatch) {
        patch_field(&mut self.name, &patch.name);
        patch_field(&mut self.model, &patch.model);
        patch_field(&mut self.temperature, &patch.temperature);
        patch_field(&mut self.max_tokens, &patch.max_tokens);
        patch_field(&mut self.is_default, &patch.is_default);
    }
}

// ============================================================================
// SESSION & PROFILE
// ============================================================================

/// The authenticated user as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: EntityKey,
    #[serde(default)]
    pub email: Option<String>,
}

/// An authenticated session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiry of the access token, epoch milliseconds.
    #[serde(default)]
    pub expires_at: Option<EpochMillis>,
    pub user: SessionUser,
}

impl Session {
    pub fn is_expired_at(&self, now: EpochMillis) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Per-user profile row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: EntityKey,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub organization_id: Option<EntityKey>,
}

/// The organization a profile belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: EntityKey,
    pub name: String,
    #[serde(default)]
    pub plan: Option<String>,
}

/// A profile together with its organization, as fetched and cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileBundle {
    pub profile: Profile,
    #[serde(default)]
    pub organization: Option<Organization>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_tentative_from_draft() {
        let key = EntityKey::new_temp();
        let draft = ClientDraft::named("NewCo");
        let client = Client::tentative(key.clone(), &draft);
        assert_eq!(client.id, key);
        assert_eq!(client.name, "NewCo");
        assert!(client.is_active);
        assert!(client.created_at.is_none());
    }

    #[test]
    fn test_client_patch_touches_only_present_fields() {
        let mut client = Client::tentative(
            EntityKey::remote("1"),
            &ClientDraft {
                name: "Acme".to_string(),
                industry: Some("Retail".to_string()),
                ..Default::default()
            },
        );
        client.apply_patch(&ClientPatch {
            tone: Some("playful".to_string()),
            ..Default::default()
        });
        assert_eq!(client.name, "Acme");
        assert_eq!(client.industry.as_deref(), Some("Retail"));
        assert_eq!(client.tone.as_deref(), Some("playful"));
    }

    #[test]
    fn test_patch_serializes_only_present_fields() {
        let patch = ClientPatch {
            name: Some("Renamed".to_string()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            serde_json::json!({ "name": "Renamed" })
        );
    }

    #[test]
    fn test_client_deserializes_with_defaults() {
        let client: Client = serde_json::from_str(r#"{"id": 1, "name": "Acme"}"#).unwrap();
        assert_eq!(client.id, EntityKey::remote("1"));
        assert!(client.is_active);
        assert!(client.industry.is_none());
    }

    #[test]
    fn test_ai_provider_debug_redacts_key() {
        let provider = AiProvider::tentative(
            EntityKey::new_temp(),
            &AiProviderDraft {
                name: "Claude".to_string(),
                kind: ProviderKind::Anthropic,
                model: "claude-3-5-sonnet-20241022".to_string(),
                api_key: "sk-secret".to_string(),
                temperature: 0.5,
                max_tokens: 300,
                is_default: true,
            },
        );
        let debug = format!("{:?}", provider);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_session_expiry() {
        let session = Session {
            access_token: "secret-token-value".to_string(),
            refresh_token: None,
            expires_at: Some(1_000),
            user: SessionUser {
                id: EntityKey::remote("u1"),
                email: None,
            },
        };
        assert!(!session.is_expired_at(999));
        assert!(session.is_expired_at(1_000));
        assert!(!format!("{:?}", session).contains("secret-token-value"));
    }

    #[test]
    fn test_keyword_and_sample_patch() {
        let mut keyword = Keyword::tentative(
            EntityKey::new_temp(),
            &KeywordDraft {
                client_id: EntityKey::remote("c1"),
                term: "rust".to_string(),
            },
        );
        keyword.apply_patch(&KeywordPatch {
            term: Some("rustlang".to_string()),
        });
        assert_eq!(keyword.term, "rustlang");

        let mut sample = SampleComment::tentative(
            EntityKey::new_temp(),
            &SampleCommentDraft {
                client_id: EntityKey::remote("c1"),
                platform: Platform::Twitter,
                content: "Great thread!".to_string(),
            },
        );
        sample.apply_patch(&SampleCommentPatch {
            platform: Some(Platform::Reddit),
            content: None,
        });
        assert_eq!(sample.platform, Platform::Reddit);
        assert_eq!(sample.content, "Great thread!");
    }
}
