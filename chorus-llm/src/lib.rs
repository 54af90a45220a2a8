//! Chorus LLM - Comment Generation
//!
//! Turns a client's profile, keywords and sample comments into prompts and
//! sends them to a hosted language model.
//!
//! - [`PromptTemplate`]: `{{ name }}` placeholder templates
//! - [`CommentPrompt`]: system and user prompts for one post
//! - [`CommentGenerator`]: provider-agnostic generation, built from an
//!   `AiProvider` record with [`generator_for`]
//!
//! # Example
//! ```ignore
//! let provider = default_provider(&providers)?;
//! let generator = generator_for(provider, &config.llm.unwrap_or_default())?;
//! let prompt = CommentPrompt::builder(client)
//!     .keywords(&keywords)
//!     .samples(&samples)
//!     .post(post_text)
//!     .build()?;
//! let comments = generator.generate(&prompt).await?;
//! ```

pub mod generator;
pub mod prompt;
pub mod providers;
pub mod template;

pub use generator::{default_provider, generator_for, split_comments, CommentGenerator, GenerationSettings};
pub use prompt::{CommentPrompt, CommentPromptBuilder, DEFAULT_SYSTEM_TEMPLATE, DEFAULT_USER_TEMPLATE};
pub use providers::RateLimiter;
pub use template::PromptTemplate;
