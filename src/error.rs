//! Error types for the email assistant.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Mail provider errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Authorization failed: {0}")]
    Auth(String),

    #[error("Mail API {operation} failed ({status}): {body}")]
    Api {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Mail API {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("HTTP error during {operation}: {reason}")]
    Http {
        operation: &'static str,
        reason: String,
    },

    #[error("Invalid response from mail API during {operation}: {reason}")]
    InvalidResponse {
        operation: &'static str,
        reason: String,
    },

    #[error("Credential storage error: {0}")]
    CredentialStore(String),
}

impl MailError {
    /// Whether the failure is worth another attempt: timeouts, connection
    /// errors and 5xx responses. 429 is deliberately excluded.
    pub fn is_transient(&self) -> bool {
        match self {
            MailError::Timeout { .. } | MailError::Http { .. } => true,
            MailError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} returned HTTP {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} returned no text")]
    EmptyResponse { provider: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

impl LlmError {
    /// Timeouts, transport failures and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Timeout { .. } | LlmError::RequestFailed { .. } => true,
            LlmError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Stage of the per-message state machine at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Classify,
    Draft,
    Label,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Classify => "classify",
            Stage::Draft => "draft",
            Stage::Label => "label",
            Stage::Persist => "persist",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Prompt not found: {name}")]
    PromptNotFound { name: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Mail provider failed during {stage}: {source}")]
    Mail {
        stage: Stage,
        #[source]
        source: MailError,
    },

    #[error("Language model failed during {stage}: {source}")]
    Llm {
        stage: Stage,
        #[source]
        source: LlmError,
    },

    #[error("Storage failed during {stage}: {source}")]
    Database {
        stage: Stage,
        #[source]
        source: DatabaseError,
    },
}

impl PipelineError {
    /// The stage that failed, if the error came from a processing step.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Mail { stage, .. }
            | PipelineError::Llm { stage, .. }
            | PipelineError::Database { stage, .. } => Some(*stage),
            PipelineError::PromptNotFound { .. } | PipelineError::InvalidInput(_) => None,
        }
    }
}
