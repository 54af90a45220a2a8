//! Hosted LLM API clients
//!
//! One submodule per API, each with a rate-limited HTTP client, its wire
//! types and a [`CommentGenerator`](crate::CommentGenerator).

pub mod anthropic;
pub mod openai;
mod rate_limit;

pub use anthropic::{AnthropicClient, AnthropicCommentGenerator};
pub use openai::{OpenAIClient, OpenAICommentGenerator};
pub use rate_limit::RateLimiter;

use chorus_core::{ChorusError, LlmError};
use reqwest::StatusCode;
use std::time::Duration;

pub(crate) fn request_failed(provider: &str, status: u16, message: impl Into<String>) -> ChorusError {
    LlmError::RequestFailed {
        provider: provider.to_string(),
        status,
        message: message.into(),
    }
    .into()
}

pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> ChorusError {
    LlmError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    }
    .into()
}

/// Map a non-success HTTP status to an [`LlmError`].
///
/// `message` is the provider's error message if the body could be parsed,
/// the raw body otherwise.
pub(crate) fn status_error(provider: &str, status: StatusCode, message: String) -> ChorusError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
            provider: provider.to_string(),
        }
        .into(),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::InvalidApiKey {
            provider: provider.to_string(),
        }
        .into(),
        _ => request_failed(provider, status.as_u16(), message),
    }
}

/// Build the underlying HTTP client with a per-request timeout.
pub(crate) fn http_client(provider: &str, timeout: Duration) -> Result<reqwest::Client, ChorusError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| request_failed(provider, 0, format!("HTTP client setup failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_mapping() {
        assert_eq!(
            status_error("openai", StatusCode::TOO_MANY_REQUESTS, String::new()),
            ChorusError::Llm(LlmError::RateLimited {
                provider: "openai".to_string()
            })
        );
        assert_eq!(
            status_error("anthropic", StatusCode::FORBIDDEN, String::new()),
            ChorusError::Llm(LlmError::InvalidApiKey {
                provider: "anthropic".to_string()
            })
        );
        assert_eq!(
            status_error("openai", StatusCode::BAD_GATEWAY, "upstream down".to_string()),
            ChorusError::Llm(LlmError::RequestFailed {
                provider: "openai".to_string(),
                status: 502,
                message: "upstream down".to_string(),
            })
        );
    }
}
