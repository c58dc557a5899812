//! Language model access.
//!
//! Everything that talks to a model goes through [`LlmClient`], so the ask
//! pipeline can be driven by a scripted client in tests.

pub mod openai;

pub use openai::OpenAiClient;

use crate::error::AppResult;
use async_trait::async_trait;

/// A single chat completion: one system message, one user message.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Return the text of the first completion choice.
    async fn complete(&self, request: &CompletionRequest) -> AppResult<String>;

    /// Model identifier, for logs.
    fn model(&self) -> &str {
        "unknown"
    }
}
