//! `Database` trait: single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::DatabaseError;

/// A named instruction template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub id: i64,
    pub name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A processed message as stored.
#[derive(Debug, Clone, Serialize)]
pub struct EmailRecord {
    pub id: i64,
    pub content: String,
    pub category: String,
    pub reply: String,
    pub created_at: DateTime<Utc>,
}

/// One classification call as stored.
#[derive(Debug, Clone, Serialize)]
pub struct UsageLog {
    pub id: i64,
    pub endpoint: String,
    pub tokens_used: i64,
    pub created_at: DateTime<Utc>,
}

/// Email + usage rows produced by one processed message.
#[derive(Debug, Clone)]
pub struct ProcessedRecord {
    pub content: String,
    pub category: String,
    pub reply: String,
    pub endpoint: String,
    pub tokens_used: i64,
}

/// Backend-agnostic database trait covering prompts, emails and usage logs.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Prompts ─────────────────────────────────────────────────────

    /// Look up a template by its unique name.
    async fn get_prompt(&self, name: &str) -> Result<Option<Prompt>, DatabaseError>;

    /// Create a template or replace the content of an existing one.
    async fn upsert_prompt(&self, name: &str, content: &str) -> Result<Prompt, DatabaseError>;

    // ── Emails + usage ──────────────────────────────────────────────

    /// Insert one email row and one usage row per record, all in a single
    /// transaction. Either every row lands or none does.
    async fn record_batch(&self, records: &[ProcessedRecord]) -> Result<(), DatabaseError>;

    /// Most recent emails first.
    async fn list_emails(&self, limit: usize) -> Result<Vec<EmailRecord>, DatabaseError>;

    /// Most recent usage rows first.
    async fn list_usage(&self, limit: usize) -> Result<Vec<UsageLog>, DatabaseError>;
}
