//! Bridges rig's `CompletionModel` to our `LlmProvider` trait.
//!
//! Each attempt is bounded by the upstream timeout and transient failures go
//! through the shared retry helper. Provider error bodies in Google's
//! `{"error": {"code": ..}}` envelope keep their HTTP status so 5xx can be
//! told apart from client errors.

use std::time::Duration;

use async_trait::async_trait;
use rig::completion::{CompletionError, CompletionModel};
use rig::message::{AssistantContent, Message};
use tracing::debug;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};
use crate::retry::{RetryPolicy, with_retry};

/// Wraps a rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
    provider: &'static str,
    timeout: Duration,
    retry: RetryPolicy,
}

impl<M> RigAdapter<M>
where
    M: CompletionModel,
{
    pub fn new(
        model: M,
        model_name: &str,
        provider: &'static str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            provider,
            timeout,
            retry,
        }
    }

    async fn complete_once(&self, prompt: &str) -> Result<CompletionResponse, LlmError> {
        let request = self
            .model
            .completion_request(Message::user(prompt))
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| LlmError::Timeout {
                provider: self.provider.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|e| map_completion_error(self.provider, e))?;

        let content = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: self.provider.to_string(),
            });
        }

        Ok(CompletionResponse {
            content,
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        })
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = request.prompt.as_str();
        let response = with_retry(
            &self.retry,
            "llm.complete",
            LlmError::is_transient,
            move || self.complete_once(prompt),
        )
        .await?;

        debug!(
            model = %self.model_name,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Completion finished"
        );
        Ok(response)
    }
}

/// Status code from a Google API error envelope, if the body is one.
fn envelope_status(body: &str) -> Option<u16> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let code = value.get("error")?.get("code")?.as_u64()?;
    u16::try_from(code).ok()
}

pub(crate) fn map_completion_error(provider: &str, e: CompletionError) -> LlmError {
    match e {
        CompletionError::HttpError(err) => LlmError::RequestFailed {
            provider: provider.to_string(),
            reason: err.to_string(),
        },
        CompletionError::ProviderError(body) => match envelope_status(&body) {
            Some(401) | Some(403) => LlmError::AuthFailed {
                provider: provider.to_string(),
            },
            Some(status) => LlmError::Status {
                provider: provider.to_string(),
                status,
                body,
            },
            None => LlmError::InvalidResponse {
                provider: provider.to_string(),
                reason: body,
            },
        },
        other => LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_envelope_is_transient() {
        let err = map_completion_error(
            "gemini",
            CompletionError::ProviderError(
                r#"{"error": {"code": 503, "message": "overloaded", "status": "UNAVAILABLE"}}"#
                    .to_string(),
            ),
        );
        assert!(matches!(err, LlmError::Status { status: 503, .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn client_error_envelope_is_not_retried() {
        let err = map_completion_error(
            "gemini",
            CompletionError::ProviderError(
                r#"{"error": {"code": 400, "message": "bad"}}"#.to_string(),
            ),
        );
        assert!(matches!(err, LlmError::Status { status: 400, .. }));
        assert!(!err.is_transient());
        assert!(err.to_string().contains("400"));
    }

    #[test]
    fn auth_envelope_maps_to_auth_failed() {
        let err = map_completion_error(
            "gemini",
            CompletionError::ProviderError(r#"{"error": {"code": 403}}"#.to_string()),
        );
        assert!(matches!(err, LlmError::AuthFailed { .. }));
    }

    #[test]
    fn unstructured_provider_error_is_invalid_response() {
        let err = map_completion_error("gemini", CompletionError::ProviderError("boom".into()));
        assert!(matches!(err, LlmError::InvalidResponse { ref reason, .. } if reason == "boom"));
        assert!(!err.is_transient());
    }
}
