//! Mapping of HTTP failures onto the Chorus error taxonomy.

use chorus_core::{AuthError, ChorusError, MutationKind, RemoteFetchError, RemoteMutationError};
use reqwest::StatusCode;
use serde::Deserialize;

/// Error bodies of the data and auth APIs. Field names differ by service.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Human-readable message from an error body, or the raw body.
pub(crate) fn error_message(body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) else {
        return body.trim().to_string();
    };
    let message = parsed
        .message
        .or(parsed.msg)
        .or(parsed.error_description)
        .or(parsed.error)
        .unwrap_or_else(|| body.trim().to_string());
    match parsed.details {
        Some(details) if !details.is_empty() => format!("{message} ({details})"),
        _ => message,
    }
}

pub(crate) fn fetch_transport(resource: &str, err: &reqwest::Error) -> ChorusError {
    RemoteFetchError::Transport {
        resource: resource.to_string(),
        reason: err.to_string(),
    }
    .into()
}

pub(crate) fn fetch_decode(resource: &str, err: &reqwest::Error) -> ChorusError {
    RemoteFetchError::Decode {
        resource: resource.to_string(),
        reason: err.to_string(),
    }
    .into()
}

/// Non-success status on a read.
pub(crate) fn fetch_status(resource: &str, status: StatusCode, body: &str) -> ChorusError {
    match status {
        StatusCode::NOT_FOUND => RemoteFetchError::NotFound {
            resource: resource.to_string(),
        }
        .into(),
        StatusCode::UNAUTHORIZED => AuthError::SessionExpired.into(),
        _ => RemoteFetchError::Status {
            resource: resource.to_string(),
            status: status.as_u16(),
            message: error_message(body),
        }
        .into(),
    }
}

pub(crate) fn mutation_transport(kind: MutationKind, resource: &str, err: &reqwest::Error) -> ChorusError {
    RemoteMutationError::Transport {
        kind,
        resource: resource.to_string(),
        reason: err.to_string(),
    }
    .into()
}

pub(crate) fn mutation_decode(kind: MutationKind, resource: &str, reason: impl Into<String>) -> ChorusError {
    RemoteMutationError::Decode {
        kind,
        resource: resource.to_string(),
        reason: reason.into(),
    }
    .into()
}

/// Non-success status on a write.
///
/// Constraint and permission failures are rejections; anything else is
/// reported with its status.
pub(crate) fn mutation_status(kind: MutationKind, resource: &str, status: StatusCode, body: &str) -> ChorusError {
    let message = error_message(body);
    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::FORBIDDEN
        | StatusCode::NOT_FOUND
        | StatusCode::CONFLICT
        | StatusCode::UNPROCESSABLE_ENTITY => RemoteMutationError::Rejected {
            kind,
            resource: resource.to_string(),
            reason: message,
        }
        .into(),
        StatusCode::UNAUTHORIZED => AuthError::SessionExpired.into(),
        _ => RemoteMutationError::Status {
            kind,
            resource: resource.to_string(),
            status: status.as_u16(),
            message,
        }
        .into(),
    }
}

/// Non-success status on a password sign-in.
pub(crate) fn sign_in_status(status: StatusCode, body: &str) -> ChorusError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => AuthError::InvalidCredentials.into(),
        _ => AuthError::Rejected {
            reason: format!("HTTP {}: {}", status.as_u16(), error_message(body)),
        }
        .into(),
    }
}
