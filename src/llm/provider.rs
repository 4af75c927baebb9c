//! `LlmProvider` trait and the request/response types that cross it.

use async_trait::async_trait;

use crate::error::LlmError;

/// A single-turn text completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

/// A completed response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    /// Provider-reported usage; 0 when the provider omits it.
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A text-generation backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Run one completion. Must fail rather than return empty content.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}
