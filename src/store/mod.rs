//! Persistence layer: libSQL-backed storage for prompts, processed emails
//! and usage logs.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, EmailRecord, ProcessedRecord, Prompt, UsageLog};
