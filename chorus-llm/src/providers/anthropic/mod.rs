//! Anthropic Messages API provider

pub mod client;
pub mod generator;
pub mod types;

pub use client::AnthropicClient;
pub use generator::AnthropicCommentGenerator;
