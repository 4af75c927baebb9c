//! Mail provider adapter.
//!
//! The pipeline talks to `MailClient`; `GmailClient` implements it over the
//! Gmail REST API with tokens from `auth::GoogleAuthenticator`.

pub mod auth;
pub mod gmail;
pub mod types;

pub use auth::{GoogleAuthenticator, TokenProvider};
pub use gmail::GmailClient;
pub use types::RemoteMessage;

use async_trait::async_trait;

use crate::error::MailError;

/// Operations the pipeline needs from a mailbox.
#[async_trait]
pub trait MailClient: Send + Sync {
    /// Most recent message ids, newest first.
    async fn list_recent_messages(&self, limit: u32) -> Result<Vec<String>, MailError>;

    /// Unread message ids, newest first.
    async fn list_unread_messages(&self, limit: u32) -> Result<Vec<String>, MailError>;

    /// Full message with decoded, truncated body.
    async fn fetch_message(&self, id: &str) -> Result<RemoteMessage, MailError>;

    /// Create (never send) a reply draft; returns the draft id.
    async fn create_draft_reply(
        &self,
        to: &str,
        subject: &str,
        body_text: &str,
    ) -> Result<String, MailError>;

    /// Id of the label with this name, creating it when missing.
    async fn ensure_label(&self, name: &str) -> Result<String, MailError>;

    /// Add the label and remove `UNREAD`.
    async fn apply_label_and_mark_read(
        &self,
        message_id: &str,
        label_id: &str,
    ) -> Result<(), MailError>;
}
