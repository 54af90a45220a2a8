//! Comment generation through GPT models

use super::client::OpenAIClient;
use super::types::{CompletionRequest, CompletionResponse, Message};
use crate::generator::{split_comments, CommentGenerator, GenerationSettings};
use crate::prompt::CommentPrompt;
use crate::providers::invalid_response;
use async_trait::async_trait;
use chorus_core::ChorusResult;

/// [`CommentGenerator`] backed by the OpenAI Chat Completions API.
#[derive(Debug)]
pub struct OpenAICommentGenerator {
    client: OpenAIClient,
    settings: GenerationSettings,
}

impl OpenAICommentGenerator {
    pub fn new(client: OpenAIClient, settings: GenerationSettings) -> Self {
        Self { client, settings }
    }

    fn build_request(&self, prompt: &CommentPrompt) -> ChorusResult<CompletionRequest> {
        Ok(CompletionRequest {
            model: self.settings.model.clone(),
            messages: vec![
                Message::system(prompt.system_prompt()?),
                Message::user(prompt.user_prompt()?),
            ],
            max_tokens: Some(self.settings.max_tokens),
            temperature: Some(self.settings.temperature),
        })
    }
}

#[async_trait]
impl CommentGenerator for OpenAICommentGenerator {
    async fn generate(&self, prompt: &CommentPrompt) -> ChorusResult<Vec<String>> {
        let request = self.build_request(prompt)?;
        let response: CompletionResponse = self.client.request("chat/completions", &request).await?;

        let text = response
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| invalid_response("openai", "No choices in response"))?;
        let comments = split_comments(text, prompt.count());
        if comments.is_empty() {
            return Err(invalid_response("openai", "response contained no comments"));
        }
        tracing::debug!(
            provider = "openai",
            model = %self.settings.model,
            comments = comments.len(),
            "generated comments"
        );
        Ok(comments)
    }

    fn provider(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.settings.model
    }
}
