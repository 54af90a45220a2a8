//! OpenAI Chat Completions provider

pub mod client;
pub mod generator;
pub mod types;

pub use client::OpenAIClient;
pub use generator::OpenAICommentGenerator;
