//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{Database, EmailRecord, ProcessedRecord, Prompt, UsageLog};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// Batch writes take `write_lock` so two requests never interleave
/// transactions on the shared connection.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    write_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

const PROMPT_COLUMNS: &str = "id, name, content, created_at";
const EMAIL_COLUMNS: &str = "id, content, category, reply, created_at";
const USAGE_COLUMNS: &str = "id, endpoint, tokens_used, created_at";

fn row_to_prompt(row: &libsql::Row) -> Result<Prompt, libsql::Error> {
    let created: String = row.get(3)?;
    Ok(Prompt {
        id: row.get(0)?,
        name: row.get(1)?,
        content: row.get(2)?,
        created_at: parse_datetime(&created),
    })
}

fn row_to_email(row: &libsql::Row) -> Result<EmailRecord, libsql::Error> {
    let created: String = row.get(4)?;
    Ok(EmailRecord {
        id: row.get(0)?,
        content: row.get(1)?,
        category: row.get(2)?,
        reply: row.get(3)?,
        created_at: parse_datetime(&created),
    })
}

fn row_to_usage(row: &libsql::Row) -> Result<UsageLog, libsql::Error> {
    let created: String = row.get(3)?;
    Ok(UsageLog {
        id: row.get(0)?,
        endpoint: row.get(1)?,
        tokens_used: row.get(2)?,
        created_at: parse_datetime(&created),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Prompts ─────────────────────────────────────────────────────

    async fn get_prompt(&self, name: &str) -> Result<Option<Prompt>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PROMPT_COLUMNS} FROM prompts WHERE name = ?1"),
                params![name],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_prompt: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let prompt = row_to_prompt(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_prompt row parse: {e}")))?;
                Ok(Some(prompt))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_prompt: {e}"))),
        }
    }

    async fn upsert_prompt(&self, name: &str, content: &str) -> Result<Prompt, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO prompts (name, content, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET content = excluded.content",
                params![name, content, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_prompt: {e}")))?;

        debug!(name, "Prompt upserted");
        self.get_prompt(name)
            .await?
            .ok_or_else(|| DatabaseError::Query(format!("upsert_prompt: '{name}' missing after write")))
    }

    // ── Emails + usage ──────────────────────────────────────────────

    async fn record_batch(&self, records: &[ProcessedRecord]) -> Result<(), DatabaseError> {
        if records.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Transaction(format!("begin: {e}")))?;

        let now = Utc::now().to_rfc3339();
        for record in records {
            tx.execute(
                "INSERT INTO emails (content, category, reply, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.content.as_str(),
                    record.category.as_str(),
                    record.reply.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert email: {e}")))?;

            tx.execute(
                "INSERT INTO usage_logs (endpoint, tokens_used, created_at) VALUES (?1, ?2, ?3)",
                params![record.endpoint.as_str(), record.tokens_used, now.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert usage log: {e}")))?;
        }

        // Dropping an uncommitted transaction rolls it back, so any `?` above
        // leaves the tables untouched.
        tx.commit()
            .await
            .map_err(|e| DatabaseError::Transaction(format!("commit: {e}")))?;

        debug!(count = records.len(), "Batch recorded");
        Ok(())
    }

    async fn list_emails(&self, limit: usize) -> Result<Vec<EmailRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {EMAIL_COLUMNS} FROM emails ORDER BY id DESC LIMIT ?1"),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_emails: {e}")))?;

        let mut emails = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_emails: {e}")))?
        {
            emails.push(
                row_to_email(&row)
                    .map_err(|e| DatabaseError::Query(format!("list_emails row parse: {e}")))?,
            );
        }
        Ok(emails)
    }

    async fn list_usage(&self, limit: usize) -> Result<Vec<UsageLog>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USAGE_COLUMNS} FROM usage_logs ORDER BY id DESC LIMIT ?1"),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_usage: {e}")))?;

        let mut logs = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_usage: {e}")))?
        {
            logs.push(
                row_to_usage(&row)
                    .map_err(|e| DatabaseError::Query(format!("list_usage row parse: {e}")))?,
            );
        }
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn record(content: &str, category: &str, endpoint: &str) -> ProcessedRecord {
        ProcessedRecord {
            content: content.to_string(),
            category: category.to_string(),
            reply: format!("re: {content}"),
            endpoint: endpoint.to_string(),
            tokens_used: 42,
        }
    }

    // ── Prompt tests ────────────────────────────────────────────────

    #[tokio::test]
    async fn get_prompt_missing_is_none() {
        let db = test_db().await;
        assert!(db.get_prompt("email_assistant").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_then_get_prompt() {
        let db = test_db().await;
        let created = db
            .upsert_prompt("email_assistant", "You are an assistant.")
            .await
            .unwrap();
        assert_eq!(created.name, "email_assistant");

        let fetched = db.get_prompt("email_assistant").await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.content, "You are an assistant.");
    }

    #[tokio::test]
    async fn upsert_replaces_content_keeps_id() {
        let db = test_db().await;
        let first = db.upsert_prompt("email_assistant", "v1").await.unwrap();
        let second = db.upsert_prompt("email_assistant", "v2").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.content, "v2");
    }

    // ── Batch tests ─────────────────────────────────────────────────

    #[tokio::test]
    async fn record_batch_inserts_email_and_usage_rows() {
        let db = test_db().await;
        db.record_batch(&[
            record("first", "Work", "process-gmail"),
            record("second", "Spam", "process-gmail"),
        ])
        .await
        .unwrap();

        let emails = db.list_emails(10).await.unwrap();
        assert_eq!(emails.len(), 2);
        // Most recent first
        assert_eq!(emails[0].content, "second");
        assert_eq!(emails[0].category, "Spam");
        assert_eq!(emails[1].reply, "re: first");

        let usage = db.list_usage(10).await.unwrap();
        assert_eq!(usage.len(), 2);
        assert!(usage.iter().all(|u| u.endpoint == "process-gmail"));
        assert!(usage.iter().all(|u| u.tokens_used == 42));
    }

    #[tokio::test]
    async fn record_batch_empty_is_noop() {
        let db = test_db().await;
        db.record_batch(&[]).await.unwrap();
        assert!(db.list_emails(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_content_creates_duplicate_rows() {
        let db = test_db().await;
        db.record_batch(&[record("same", "Work", "process-email")])
            .await
            .unwrap();
        db.record_batch(&[record("same", "Work", "process-email")])
            .await
            .unwrap();
        assert_eq!(db.list_emails(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn list_respects_limit() {
        let db = test_db().await;
        let batch: Vec<_> = (0..5)
            .map(|i| record(&format!("m{i}"), "Other", "process-unread"))
            .collect();
        db.record_batch(&batch).await.unwrap();
        assert_eq!(db.list_emails(3).await.unwrap().len(), 3);
        assert_eq!(db.list_usage(2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn new_local_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("dir").join("test.db");
        let db = LibSqlBackend::new_local(&db_path).await.unwrap();
        db.upsert_prompt("email_assistant", "x").await.unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn parse_datetime_accepts_sqlite_format() {
        let dt = parse_datetime("2026-02-15 10:00:00");
        assert_eq!(dt.to_rfc3339(), "2026-02-15T10:00:00+00:00");
        assert_eq!(parse_datetime("garbage"), DateTime::<Utc>::MIN_UTC);
    }
}
