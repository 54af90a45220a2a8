//! Anthropic HTTP client with rate limiting

use super::types::ApiError;
use crate::providers::{http_client, invalid_response, request_failed, status_error, RateLimiter};
use chorus_core::{ChorusResult, LlmSettings};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};

const PROVIDER: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

/// Anthropic API client with rate limiting.
pub struct AnthropicClient {
    client: Client,
    api_key: SecretString,
    base_url: String,
    rate_limiter: RateLimiter,
}

impl AnthropicClient {
    pub fn new(api_key: SecretString, settings: &LlmSettings) -> ChorusResult<Self> {
        Ok(Self {
            client: http_client(PROVIDER, settings.request_timeout())?,
            api_key,
            base_url: "https://api.anthropic.com/v1".to_string(),
            rate_limiter: RateLimiter::new(PROVIDER, settings.requests_per_minute),
        })
    }

    /// Point the client at another host (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make an API request with automatic rate limiting.
    pub async fn request<Req: Serialize, Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Req,
    ) -> ChorusResult<Res> {
        let _permit = self.rate_limiter.acquire().await?;

        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| request_failed(PROVIDER, 0, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| invalid_response(PROVIDER, format!("Failed to parse response: {}", e)));
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        tracing::warn!(provider = PROVIDER, status = status.as_u16(), "LLM request failed");
        Err(status_error(PROVIDER, status, error_message(error_text)))
    }
}

/// The API's error message, or the raw body if it is not an API error.
pub(crate) fn error_message(body: String) -> String {
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => api_error.error.message,
        Err(_) => body,
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
