//! Enumerations shared across the workspace.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a write against a remote collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Entity type discriminator. Doubles as the backend table name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Client,
    Keyword,
    SampleComment,
    AiProvider,
    Profile,
    Organization,
}

impl EntityKind {
    /// Backend table / REST resource holding this entity.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Client => "clients",
            Self::Keyword => "keywords",
            Self::SampleComment => "sample_comments",
            Self::AiProvider => "ai_providers",
            Self::Profile => "profiles",
            Self::Organization => "organizations",
        }
    }

    /// Singular, human-readable name used in notifications.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Keyword => "keyword",
            Self::SampleComment => "sample comment",
            Self::AiProvider => "AI provider",
            Self::Profile => "profile",
            Self::Organization => "organization",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Hosted language-model API a provider record points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }
}

/// Social platform a sample comment was written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    #[default]
    Linkedin,
    Twitter,
    Facebook,
    Instagram,
    Reddit,
    Other,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Linkedin => "LinkedIn",
            Self::Twitter => "Twitter",
            Self::Facebook => "Facebook",
            Self::Instagram => "Instagram",
            Self::Reddit => "Reddit",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}
