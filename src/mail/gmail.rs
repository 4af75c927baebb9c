//! Gmail REST client.
//!
//! Reads (list, get, labels list) go through the bounded retry helper.
//! Draft creation, label creation and modify are sent exactly once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info};

use crate::config::{GmailConfig, UpstreamConfig};
use crate::error::MailError;
use crate::mail::MailClient;
use crate::mail::auth::TokenProvider;
use crate::mail::types::{
    DraftResponse, Label, LabelList, ListResponse, MessageResponse, RemoteMessage,
    build_draft_raw, parse_message, reply_subject,
};
use crate::retry::{RetryPolicy, with_retry};

/// Gmail API client authenticated through a `TokenProvider`.
pub struct GmailClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl GmailClient {
    /// Create a client from service configuration.
    pub fn new(
        config: &GmailConfig,
        upstream: &UpstreamConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, MailError> {
        Self::with_base_url(
            &config.api_base,
            tokens,
            upstream.timeout,
            RetryPolicy::new(upstream.max_retries),
        )
    }

    /// Create a client against an arbitrary base URL (fake servers in tests).
    pub fn with_base_url(
        base_url: &str,
        tokens: Arc<dyn TokenProvider>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, MailError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MailError::Http {
                operation: "client_builder",
                reason: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
            timeout,
            retry,
        })
    }

    fn transport_error(&self, operation: &'static str, e: reqwest::Error) -> MailError {
        if e.is_timeout() {
            MailError::Timeout {
                operation,
                timeout: self.timeout,
            }
        } else {
            MailError::Http {
                operation,
                reason: e.to_string(),
            }
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, MailError> {
        let resp = request
            .send()
            .await
            .map_err(|e| self.transport_error(operation, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MailError::Api {
                operation,
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<T>()
            .await
            .map_err(|e| MailError::InvalidResponse {
                operation,
                reason: e.to_string(),
            })
    }

    /// Idempotent GET, retried on transient failures.
    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, MailError> {
        with_retry(&self.retry, operation, MailError::is_transient, move || async move {
            let token = self.tokens.access_token().await?;
            self.execute(operation, self.http.get(url).bearer_auth(token).query(query))
                .await
        })
        .await
    }

    /// Non-idempotent POST, sent once.
    async fn post_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: &str,
        body: serde_json::Value,
    ) -> Result<T, MailError> {
        let token = self.tokens.access_token().await?;
        self.execute(operation, self.http.post(url).bearer_auth(token).json(&body))
            .await
    }

    async fn list_ids(&self, query: Option<&str>, limit: u32) -> Result<Vec<String>, MailError> {
        let mut params = vec![("maxResults", limit.to_string())];
        if let Some(q) = query {
            params.push(("q", q.to_string()));
        }
        let url = format!("{}/messages", self.base_url);
        let list: ListResponse = self.get_json("list_messages", &url, &params).await?;

        let ids: Vec<String> = list
            .messages
            .into_iter()
            .take(limit as usize)
            .map(|m| m.id)
            .collect();
        debug!(count = ids.len(), query = query.unwrap_or(""), "Listed Gmail messages");
        Ok(ids)
    }
}

fn validate_id(kind: &str, id: &str) -> Result<(), MailError> {
    if id.is_empty() || id.contains(['/', '\\', '?', '#']) || id.contains("..") {
        return Err(MailError::InvalidResponse {
            operation: "validate_id",
            reason: format!("invalid {kind} id: {id:?}"),
        });
    }
    Ok(())
}

#[async_trait]
impl MailClient for GmailClient {
    async fn list_recent_messages(&self, limit: u32) -> Result<Vec<String>, MailError> {
        self.list_ids(None, limit).await
    }

    async fn list_unread_messages(&self, limit: u32) -> Result<Vec<String>, MailError> {
        self.list_ids(Some("is:unread"), limit).await
    }

    async fn fetch_message(&self, id: &str) -> Result<RemoteMessage, MailError> {
        validate_id("message", id)?;
        let url = format!("{}/messages/{}", self.base_url, id);
        let raw: MessageResponse = self
            .get_json("get_message", &url, &[("format", "full".to_string())])
            .await?;
        Ok(parse_message(raw))
    }

    async fn create_draft_reply(
        &self,
        to: &str,
        subject: &str,
        body_text: &str,
    ) -> Result<String, MailError> {
        let raw = build_draft_raw(to, &reply_subject(subject), body_text);
        let url = format!("{}/drafts", self.base_url);
        let draft: DraftResponse = self
            .post_json("create_draft", &url, json!({ "message": { "raw": raw } }))
            .await?;
        info!(draft_id = %draft.id, "Created Gmail draft");
        Ok(draft.id)
    }

    async fn ensure_label(&self, name: &str) -> Result<String, MailError> {
        let url = format!("{}/labels", self.base_url);
        let existing: LabelList = self.get_json("list_labels", &url, &[]).await?;
        if let Some(label) = existing.labels.into_iter().find(|l| l.name == name) {
            debug!(label_id = %label.id, name, "Found existing label");
            return Ok(label.id);
        }

        let created: Label = self
            .post_json(
                "create_label",
                &url,
                json!({
                    "name": name,
                    "labelListVisibility": "labelShow",
                    "messageListVisibility": "show",
                }),
            )
            .await?;
        info!(label_id = %created.id, name, "Created label");
        Ok(created.id)
    }

    async fn apply_label_and_mark_read(
        &self,
        message_id: &str,
        label_id: &str,
    ) -> Result<(), MailError> {
        validate_id("message", message_id)?;
        let url = format!("{}/messages/{}/modify", self.base_url, message_id);
        let _: serde_json::Value = self
            .post_json(
                "modify_message",
                &url,
                json!({
                    "addLabelIds": [label_id],
                    "removeLabelIds": ["UNREAD"],
                }),
            )
            .await?;
        debug!(message_id, label_id, "Labeled message and marked read");
        Ok(())
    }
}
