//! Error types for Chorus operations

use crate::MutationKind;
use std::time::Duration;
use thiserror::Error;

/// Failures of the persistent key-value medium behind the cache.
///
/// These never cross the cache boundary: the cache logs them and reports a
/// miss instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheIoError {
    #[error("Storage medium failure on {key}: {reason}")]
    Medium { key: String, reason: String },

    #[error("Quota exceeded writing {key} ({bytes} bytes)")]
    QuotaExceeded { key: String, bytes: usize },

    #[error("Failed to serialize cache entry {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Failed to deserialize cache entry {key}: {reason}")]
    Deserialization { key: String, reason: String },
}

/// Network or server failure while reading remote data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteFetchError {
    #[error("Request for {resource} failed: {reason}")]
    Transport { resource: String, reason: String },

    #[error("Request for {resource} returned status {status}: {message}")]
    Status {
        resource: String,
        status: u16,
        message: String,
    },

    #[error("Invalid response for {resource}: {reason}")]
    Decode { resource: String, reason: String },

    #[error("{resource} not found")]
    NotFound { resource: String },
}

/// Failure of a create, update or delete against the backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteMutationError {
    #[error("{kind} on {resource} rejected: {reason}")]
    Rejected {
        kind: MutationKind,
        resource: String,
        reason: String,
    },

    #[error("{kind} on {resource} failed: {reason}")]
    Transport {
        kind: MutationKind,
        resource: String,
        reason: String,
    },

    #[error("{kind} on {resource} returned status {status}: {message}")]
    Status {
        kind: MutationKind,
        resource: String,
        status: u16,
        message: String,
    },

    #[error("Invalid {kind} response for {resource}: {reason}")]
    Decode {
        kind: MutationKind,
        resource: String,
        reason: String,
    },
}

impl RemoteMutationError {
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::Rejected { kind, .. }
            | Self::Transport { kind, .. }
            | Self::Status { kind, .. }
            | Self::Decode { kind, .. } => *kind,
        }
    }
}

/// Synthetic error produced when an operation loses its deadline race.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} timed out after {after_ms}ms")]
pub struct TimeoutError {
    pub operation: String,
    pub after_ms: u64,
}

impl TimeoutError {
    pub fn new(operation: impl Into<String>, after: Duration) -> Self {
        Self {
            operation: operation.into(),
            after_ms: after.as_millis() as u64,
        }
    }
}

/// Authentication errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Session expired")]
    SessionExpired,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Authentication rejected: {reason}")]
    Rejected { reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or CHORUS_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// LLM provider errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("No LLM provider configured")]
    ProviderNotConfigured,

    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("Invalid API key for {provider}")]
    InvalidApiKey { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Prompt template errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Template variable not provided: {name}")]
    MissingVariable { name: String },

    #[error("Unterminated placeholder starting at byte {offset}")]
    Unterminated { offset: usize },
}

/// Master error type for all Chorus errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChorusError {
    #[error("Cache I/O error: {0}")]
    CacheIo(#[from] CacheIoError),

    #[error("Remote fetch error: {0}")]
    RemoteFetch(#[from] RemoteFetchError),

    #[error("Remote mutation error: {0}")]
    RemoteMutation(#[from] RemoteMutationError),

    #[error("Timeout: {0}")]
    Timeout(#[from] TimeoutError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
}

impl ChorusError {
    /// Shorthand for a [`TimeoutError`].
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout(TimeoutError::new(operation, after))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Result type alias for Chorus operations.
pub type ChorusResult<T> = Result<T, ChorusError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_io_error_display_quota() {
        let err = CacheIoError::QuotaExceeded {
            key: "chorus:clients".to_string(),
            bytes: 4096,
        };
        let msg = err.to_string();
        assert!(msg.contains("Quota exceeded"));
        assert!(msg.contains("chorus:clients"));
        assert!(msg.contains("4096"));
    }

    #[test]
    fn test_remote_mutation_error_kind() {
        let err = RemoteMutationError::Status {
            kind: MutationKind::Update,
            resource: "clients".to_string(),
            status: 409,
            message: "conflict".to_string(),
        };
        assert_eq!(err.kind(), MutationKind::Update);
        assert!(err.to_string().contains("update on clients"));
        assert!(err.to_string().contains("409"));
    }

    #[test]
    fn test_timeout_error_display() {
        let err = ChorusError::timeout("session check", Duration::from_millis(5000));
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Timeout: session check timed out after 5000ms");
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "backend.url",
            reason: "must not be empty".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("backend.url"));
        assert!(msg.contains("must not be empty"));
    }

    #[test]
    fn test_chorus_error_from_variants() {
        let cache = ChorusError::from(CacheIoError::Medium {
            key: "k".to_string(),
            reason: "disk".to_string(),
        });
        assert!(matches!(cache, ChorusError::CacheIo(_)));

        let fetch = ChorusError::from(RemoteFetchError::NotFound {
            resource: "clients".to_string(),
        });
        assert!(matches!(fetch, ChorusError::RemoteFetch(_)));

        let auth = ChorusError::from(AuthError::NotSignedIn);
        assert!(matches!(auth, ChorusError::Auth(_)));
        assert!(!auth.is_timeout());

        let llm = ChorusError::from(LlmError::ProviderNotConfigured);
        assert!(matches!(llm, ChorusError::Llm(_)));

        let template = ChorusError::from(TemplateError::MissingVariable {
            name: "client_name".to_string(),
        });
        assert!(matches!(template, ChorusError::Template(_)));
    }
}
