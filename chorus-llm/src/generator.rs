//! Comment generator trait and provider selection.

use async_trait::async_trait;
use chorus_core::{AiProvider, ChorusResult, LlmError, LlmSettings, ProviderKind};
use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::SecretString;

use crate::prompt::CommentPrompt;
use crate::providers::{AnthropicClient, AnthropicCommentGenerator, OpenAIClient, OpenAICommentGenerator};

/// Drafts comments for a post.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait CommentGenerator: Send + Sync {
    /// Generate up to `prompt.count()` comments.
    async fn generate(&self, prompt: &CommentPrompt) -> ChorusResult<Vec<String>>;

    /// Provider name, e.g. `anthropic`.
    fn provider(&self) -> &str;

    fn model(&self) -> &str;
}

/// Model parameters taken from an [`AiProvider`] record.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&AiProvider> for GenerationSettings {
    fn from(provider: &AiProvider) -> Self {
        Self {
            model: provider.model.clone(),
            temperature: provider.temperature.clamp(0.0, 2.0),
            max_tokens: provider.max_tokens.max(1),
        }
    }
}

/// Build the generator an [`AiProvider`] record describes.
pub fn generator_for(provider: &AiProvider, settings: &LlmSettings) -> ChorusResult<Box<dyn CommentGenerator>> {
    if provider.api_key.trim().is_empty() || provider.model.trim().is_empty() {
        return Err(LlmError::ProviderNotConfigured.into());
    }

    let api_key = SecretString::from(provider.api_key.clone());
    let generation = GenerationSettings::from(provider);
    tracing::debug!(
        provider = provider.kind.name(),
        model = %generation.model,
        "building comment generator"
    );
    let generator: Box<dyn CommentGenerator> = match provider.kind {
        ProviderKind::Anthropic => Box::new(AnthropicCommentGenerator::new(
            AnthropicClient::new(api_key, settings)?,
            generation,
        )),
        ProviderKind::OpenAi => Box::new(OpenAICommentGenerator::new(
            OpenAIClient::new(api_key, settings)?,
            generation,
        )),
    };
    Ok(generator)
}

/// The provider marked default, else the first one.
pub fn default_provider(providers: &[AiProvider]) -> ChorusResult<&AiProvider> {
    providers
        .iter()
        .find(|p| p.is_default)
        .or_else(|| providers.first())
        .ok_or_else(|| LlmError::ProviderNotConfigured.into())
}

static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[-*•]|\d{1,3}[.)]|\(\d{1,3}\))\s+").expect("Invalid list marker regex"));

/// Split a model response into individual comments.
///
/// One comment per non-empty line, with list markers and wrapping quotes
/// removed, at most `limit` of them.
pub fn split_comments(text: &str, limit: usize) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .map(|line| LIST_MARKER.replace(line, "").into_owned())
        .map(|line| strip_quotes(line.trim()).to_string())
        .filter(|line| !line.is_empty())
        .take(limit)
        .collect()
}

fn strip_quotes(line: &str) -> &str {
    for (open, close) in [('"', '"'), ('\u{201c}', '\u{201d}')] {
        if let Some(inner) = line.strip_prefix(open).and_then(|l| l.strip_suffix(close)) {
            return inner.trim();
        }
    }
    line
}
