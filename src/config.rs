//! Configuration types.
//!
//! Everything is read from environment variables (optionally seeded from a
//! `.env` file by the binary). `from_lookup` exists so tests can feed a map
//! instead of touching the process environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use tracing::warn;

use crate::error::ConfigError;

/// Name of the instruction template every classification needs.
pub const DEFAULT_PROMPT_NAME: &str = "email_assistant";

/// Label applied to messages handled by the unread flow.
pub const DEFAULT_PROCESSED_LABEL: &str = "AI-Processed";

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-flash-latest";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// What happens to the rest of a batch when one message fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// First failure aborts the request; nothing from the batch is persisted.
    #[default]
    Abort,
    /// Failures are logged and reported; the remaining messages still run.
    Continue,
}

impl FromStr for FailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" | "abort-all" | "abort_all" => Ok(FailurePolicy::Abort),
            "continue" | "best-effort" | "best_effort" => Ok(FailurePolicy::Continue),
            other => Err(ConfigError::InvalidValue {
                key: "PIPELINE_FAILURE_POLICY".into(),
                message: format!("expected 'abort' or 'continue', got '{other}'"),
            }),
        }
    }
}

/// Batch sizes for each flow.
#[derive(Debug, Clone, Copy)]
pub struct FlowLimits {
    pub fetch: u32,
    pub process: u32,
    pub drafts: u32,
    pub unread: u32,
}

impl Default for FlowLimits {
    fn default() -> Self {
        Self {
            fetch: 5,
            process: 5,
            drafts: 3,
            unread: 5,
        }
    }
}

/// Pipeline behaviour.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub prompt_name: String,
    pub processed_label: String,
    pub failure_policy: FailurePolicy,
    pub limits: FlowLimits,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            prompt_name: DEFAULT_PROMPT_NAME.to_string(),
            processed_label: DEFAULT_PROCESSED_LABEL.to_string(),
            failure_policy: FailurePolicy::default(),
            limits: FlowLimits::default(),
        }
    }
}

/// Outbound HTTP behaviour shared by the Gmail and Gemini clients.
#[derive(Debug, Clone, Copy)]
pub struct UpstreamConfig {
    /// Per-call timeout.
    pub timeout: Duration,
    /// Extra attempts for transient failures on idempotent calls.
    pub max_retries: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
        }
    }
}

/// Gmail adapter settings.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub api_base: String,
    pub client_secret_path: PathBuf,
    pub token_path: PathBuf,
    /// Loopback port for the consent redirect; 0 picks a free port.
    pub oauth_port: u16,
    pub consent_timeout: Duration,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_GMAIL_API_BASE.to_string(),
            client_secret_path: PathBuf::from("credentials.json"),
            token_path: PathBuf::from("token.json"),
            oauth_port: 0,
            consent_timeout: Duration::from_secs(300),
        }
    }
}

/// Gemini settings.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_path: PathBuf,
    pub gemini: GeminiConfig,
    pub gmail: GmailConfig,
    pub upstream: UpstreamConfig,
    pub pipeline: PipelineConfig,
    /// Template content upserted at startup when set.
    pub prompt_seed_file: Option<PathBuf>,
    /// `None` means any origin.
    pub cors_allow_origins: Option<Vec<String>>,
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr: SocketAddr =
            parse_or(&get, "BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 8000)))?;

        let database_path = get("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/email-assistant.db"));

        let api_key = get("GOOGLE_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("GOOGLE_API_KEY".into()))?;
        let gemini = GeminiConfig {
            api_key: SecretString::from(api_key),
            model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            base_url: get("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
        };

        let gmail_defaults = GmailConfig::default();
        let gmail = GmailConfig {
            api_base: get("GMAIL_API_BASE").unwrap_or(gmail_defaults.api_base),
            client_secret_path: get("GMAIL_CLIENT_SECRET_PATH")
                .map(PathBuf::from)
                .unwrap_or(gmail_defaults.client_secret_path),
            token_path: get("GMAIL_TOKEN_PATH")
                .map(PathBuf::from)
                .unwrap_or(gmail_defaults.token_path),
            oauth_port: parse_or(&get, "GMAIL_OAUTH_PORT", gmail_defaults.oauth_port)?,
            consent_timeout: Duration::from_secs(parse_or(
                &get,
                "GMAIL_CONSENT_TIMEOUT_SECS",
                gmail_defaults.consent_timeout.as_secs(),
            )?),
        };

        let upstream_defaults = UpstreamConfig::default();
        let upstream = UpstreamConfig {
            timeout: Duration::from_secs(parse_or(
                &get,
                "HTTP_TIMEOUT_SECS",
                upstream_defaults.timeout.as_secs(),
            )?),
            max_retries: parse_or(&get, "UPSTREAM_MAX_RETRIES", upstream_defaults.max_retries)?,
        };

        let pipeline = PipelineConfig {
            prompt_name: get("PROMPT_NAME").unwrap_or_else(|| DEFAULT_PROMPT_NAME.to_string()),
            processed_label: get("PROCESSED_LABEL")
                .unwrap_or_else(|| DEFAULT_PROCESSED_LABEL.to_string()),
            failure_policy: match get("PIPELINE_FAILURE_POLICY") {
                Some(raw) => raw.parse()?,
                None => FailurePolicy::default(),
            },
            limits: FlowLimits::default(),
        };

        let cors_allow_origins = get("CORS_ALLOW_ORIGINS").and_then(|raw| parse_origins(&raw));

        Ok(Self {
            bind_addr,
            database_path,
            gemini,
            gmail,
            upstream,
            pipeline,
            prompt_seed_file: get("PROMPT_SEED_FILE").map(PathBuf::from),
            cors_allow_origins,
            log_dir: get("LOG_DIR").map(PathBuf::from),
        })
    }
}

/// Comma-separated origins. `*` anywhere in the list means any origin.
fn parse_origins(raw: &str) -> Option<Vec<String>> {
    let origins: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if !origins.iter().any(|o| o == "*") {
        return (!origins.is_empty()).then_some(origins);
    }
    if origins.len() > 1 {
        warn!(
            origins = %raw,
            "CORS_ALLOW_ORIGINS mixes '*' with explicit origins; allowing any origin"
        );
    }
    None
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
