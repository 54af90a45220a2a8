//! Comment generation through Claude models

use super::client::AnthropicClient;
use super::types::{Message, MessageRequest, MessageResponse};
use crate::generator::{split_comments, CommentGenerator, GenerationSettings};
use crate::prompt::CommentPrompt;
use crate::providers::invalid_response;
use async_trait::async_trait;
use chorus_core::ChorusResult;

/// [`CommentGenerator`] backed by the Anthropic Messages API.
#[derive(Debug)]
pub struct AnthropicCommentGenerator {
    client: AnthropicClient,
    settings: GenerationSettings,
}

impl AnthropicCommentGenerator {
    pub fn new(client: AnthropicClient, settings: GenerationSettings) -> Self {
        Self { client, settings }
    }

    fn build_request(&self, prompt: &CommentPrompt) -> ChorusResult<MessageRequest> {
        Ok(MessageRequest {
            model: self.settings.model.clone(),
            system: Some(prompt.system_prompt()?),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.user_prompt()?,
            }],
            max_tokens: self.settings.max_tokens,
            temperature: Some(self.settings.temperature),
        })
    }
}

#[async_trait]
impl CommentGenerator for AnthropicCommentGenerator {
    async fn generate(&self, prompt: &CommentPrompt) -> ChorusResult<Vec<String>> {
        let request = self.build_request(prompt)?;
        let response: MessageResponse = self.client.request("messages", &request).await?;

        let comments = split_comments(&response.text(), prompt.count());
        if comments.is_empty() {
            return Err(invalid_response("anthropic", "response contained no comments"));
        }
        tracing::debug!(
            provider = "anthropic",
            model = %response.model,
            output_tokens = response.usage.output_tokens,
            comments = comments.len(),
            "generated comments"
        );
        Ok(comments)
    }

    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.settings.model
    }
}
