//! Comment prompt assembly.

use std::collections::HashMap;

use chorus_core::{ChorusResult, Client, Keyword, Platform, SampleComment, ValidationError};

use crate::template::PromptTemplate;

/// System prompt used unless the builder is given another one.
pub const DEFAULT_SYSTEM_TEMPLATE: &str = "\
You write social media comments on behalf of {{ client_name }}.
About the client: {{ client_description }}
Industry: {{ industry }}
Voice: {{ tone }}

Match the style of these sample comments:
{{ samples }}

Rules:
- Sound like a person, not an advertisement.
- Never invent facts about the client.
- Reply with exactly {{ count }} comments, one per line, with no numbering or commentary.";

/// User prompt used unless the builder is given another one.
pub const DEFAULT_USER_TEMPLATE: &str = "\
Write {{ count }} {{ platform }} comments replying to the post below.
Work in these keywords where they fit naturally: {{ keywords }}

Post:
{{ post }}";

const DEFAULT_COUNT: usize = 3;

/// Everything the model needs to draft comments for one post.
#[derive(Debug, Clone)]
pub struct CommentPrompt {
    client: Client,
    keywords: Vec<String>,
    samples: Vec<String>,
    platform: Platform,
    post: String,
    count: usize,
    system_template: PromptTemplate,
    user_template: PromptTemplate,
}

impl CommentPrompt {
    pub fn builder(client: Client) -> CommentPromptBuilder {
        CommentPromptBuilder::new(client)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn post(&self) -> &str {
        &self.post
    }

    /// Number of comments requested.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    fn variables(&self) -> HashMap<String, String> {
        let or_unknown = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or("not specified")
                .to_string()
        };

        let samples = if self.samples.is_empty() {
            "(none provided)".to_string()
        } else {
            self.samples
                .iter()
                .map(|s| format!("- {}", s.trim()))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let keywords = if self.keywords.is_empty() {
            "(none)".to_string()
        } else {
            self.keywords.join(", ")
        };

        HashMap::from([
            ("client_name".to_string(), self.client.name.clone()),
            ("client_description".to_string(), or_unknown(&self.client.description)),
            ("industry".to_string(), or_unknown(&self.client.industry)),
            ("tone".to_string(), or_unknown(&self.client.tone)),
            ("samples".to_string(), samples),
            ("keywords".to_string(), keywords),
            ("platform".to_string(), self.platform.to_string()),
            ("post".to_string(), self.post.trim().to_string()),
            ("count".to_string(), self.count.to_string()),
        ])
    }

    pub fn system_prompt(&self) -> ChorusResult<String> {
        Ok(self.system_template.render(&self.variables())?)
    }

    pub fn user_prompt(&self) -> ChorusResult<String> {
        Ok(self.user_template.render(&self.variables())?)
    }
}

/// Builder for [`CommentPrompt`].
#[derive(Debug, Clone)]
pub struct CommentPromptBuilder {
    client: Client,
    keywords: Vec<String>,
    samples: Vec<String>,
    platform: Platform,
    post: String,
    count: usize,
    system_template: Option<String>,
    user_template: Option<String>,
}

impl CommentPromptBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            keywords: Vec::new(),
            samples: Vec::new(),
            platform: Platform::default(),
            post: String::new(),
            count: DEFAULT_COUNT,
            system_template: None,
            user_template: None,
        }
    }

    /// Keywords belonging to the prompt's client. Others are ignored.
    pub fn keywords<'a>(mut self, keywords: impl IntoIterator<Item = &'a Keyword>) -> Self {
        let client_id = self.client.id.clone();
        self.keywords.extend(
            keywords
                .into_iter()
                .filter(|k| k.client_id == client_id)
                .map(|k| k.term.clone()),
        );
        self
    }

    /// Sample comments belonging to the prompt's client. Others are ignored.
    pub fn samples<'a>(mut self, samples: impl IntoIterator<Item = &'a SampleComment>) -> Self {
        let client_id = self.client.id.clone();
        self.samples.extend(
            samples
                .into_iter()
                .filter(|s| s.client_id == client_id)
                .map(|s| s.content.clone()),
        );
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn post(mut self, post: impl Into<String>) -> Self {
        self.post = post.into();
        self
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn system_template(mut self, source: impl Into<String>) -> Self {
        self.system_template = Some(source.into());
        self
    }

    pub fn user_template(mut self, source: impl Into<String>) -> Self {
        self.user_template = Some(source.into());
        self
    }

    pub fn build(self) -> ChorusResult<CommentPrompt> {
        if self.post.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "post".to_string(),
            }
            .into());
        }
        if self.count == 0 {
            return Err(ValidationError::InvalidValue {
                field: "count".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }

        let system_source = self.system_template.as_deref().unwrap_or(DEFAULT_SYSTEM_TEMPLATE);
        let user_source = self.user_template.as_deref().unwrap_or(DEFAULT_USER_TEMPLATE);
        Ok(CommentPrompt {
            system_template: PromptTemplate::parse(system_source)?,
            user_template: PromptTemplate::parse(user_source)?,
            client: self.client,
            keywords: self.keywords,
            samples: self.samples,
            platform: self.platform,
            post: self.post,
            count: self.count,
        })
    }
}
