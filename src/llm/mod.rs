//! LLM integration.
//!
//! The pipeline only sees the `LlmProvider` trait. Gemini is reached through
//! rig-core; `RigAdapter` bridges rig's `CompletionModel` to `LlmProvider`.
//! Tests substitute scripted providers.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;
use std::time::Duration;

use rig::client::CompletionClient;
use secrecy::{ExposeSecret, SecretString};

use crate::config::{GeminiConfig, UpstreamConfig};
use crate::error::LlmError;
use crate::retry::RetryPolicy;

/// Create the LLM provider from configuration.
pub fn create_provider(
    config: &GeminiConfig,
    upstream: &UpstreamConfig,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    create_gemini_provider(
        &config.api_key,
        &config.model,
        &config.base_url,
        upstream.timeout,
        RetryPolicy::new(upstream.max_retries),
    )
}

/// Gemini provider against an explicit base URL.
pub fn create_gemini_provider(
    api_key: &SecretString,
    model: &str,
    base_url: &str,
    timeout: Duration,
    retry: RetryPolicy,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::gemini;

    let client: rig::client::Client<gemini::client::GeminiExt> = gemini::Client::builder()
        .api_key(api_key.expose_secret())
        .base_url(base_url.trim_end_matches('/'))
        .build()
        .map_err(|e| LlmError::RequestFailed {
            provider: "gemini".to_string(),
            reason: format!("Failed to create Gemini client: {}", e),
        })?;

    let completion_model = client.completion_model(model);
    tracing::info!("Using Gemini (model: {})", model);
    Ok(Arc::new(RigAdapter::new(
        completion_model,
        model,
        "gemini",
        timeout,
        retry,
    )))
}
