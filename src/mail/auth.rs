//! Google OAuth2 credentials for the Gmail client.
//!
//! `GoogleAuthenticator` wraps a yup-oauth2 installed-flow authenticator,
//! which reuses a valid token, refreshes an expired one and otherwise runs
//! the consent flow with a loopback redirect. Tokens persist through
//! `FileTokenStorage`, a JSON file with owner-only permissions. The
//! authenticator is built on first use and every token request runs under
//! one mutex so concurrent requests never race on the token file.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use yup_oauth2::authenticator::DefaultAuthenticator;
use yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use yup_oauth2::storage::{TokenInfo, TokenStorage};
use yup_oauth2::{InstalledFlowAuthenticator, InstalledFlowReturnMethod};

use crate::config::GmailConfig;
use crate::error::MailError;

/// Scopes requested during consent: read, compose drafts, modify labels.
pub const GMAIL_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.compose",
    "https://www.googleapis.com/auth/gmail.modify",
];

/// Source of bearer tokens for the Gmail API.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, MailError>;
}

// ── Token file ──────────────────────────────────────────────────────

/// JSON token file, written with owner-only permissions.
struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `Ok(None)` when the file does not exist.
    fn load(&self) -> Result<Option<TokenInfo>, MailError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            MailError::CredentialStore(format!(
                "failed to read token file '{}': {e}",
                self.path.display()
            ))
        })?;
        let token: TokenInfo = serde_json::from_str(&content).map_err(|e| {
            MailError::CredentialStore(format!(
                "failed to parse token file '{}': {e}",
                self.path.display()
            ))
        })?;
        Ok(Some(token))
    }

    fn save(&self, token: &TokenInfo) -> Result<(), MailError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                MailError::CredentialStore(format!(
                    "failed to create token directory '{}': {e}",
                    parent.display()
                ))
            })?;
        }
        let content = serde_json::to_string_pretty(token)
            .map_err(|e| MailError::CredentialStore(format!("failed to serialize token: {e}")))?;
        std::fs::write(&self.path, content).map_err(|e| {
            MailError::CredentialStore(format!(
                "failed to write token file '{}': {e}",
                self.path.display()
            ))
        })?;
        set_owner_only(&self.path)?;
        debug!(path = %self.path.display(), "Saved Gmail token");
        Ok(())
    }
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> Result<(), MailError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(|e| {
        MailError::CredentialStore(format!(
            "failed to set permissions on '{}': {e}",
            path.display()
        ))
    })
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> Result<(), MailError> {
    Ok(())
}

/// yup-oauth2 storage backed by a single `TokenStore` file. One token is
/// kept regardless of scopes.
struct FileTokenStorage {
    store: TokenStore,
}

impl FileTokenStorage {
    fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: TokenStore::new(path),
        }
    }
}

#[async_trait]
impl TokenStorage for FileTokenStorage {
    async fn set(&self, _scopes: &[&str], token: TokenInfo) -> anyhow::Result<()> {
        self.store.save(&token)?;
        Ok(())
    }

    async fn get(&self, _scopes: &[&str]) -> Option<TokenInfo> {
        match self.store.load() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable Gmail token file");
                None
            }
        }
    }
}

// ── Consent prompt ──────────────────────────────────────────────────

/// Prints the consent URL; the loopback redirect delivers the code.
struct ConsoleDelegate;

impl InstalledFlowDelegate for ConsoleDelegate {
    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        _need_code: bool,
    ) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            info!("Waiting for Gmail consent");
            eprintln!("Please visit this URL to authorize Gmail access:\n\n{url}\n");
            Ok(String::new())
        })
    }
}

// ── Authenticator ───────────────────────────────────────────────────

struct AuthState {
    delegate: Option<Box<dyn InstalledFlowDelegate>>,
    authenticator: Option<DefaultAuthenticator>,
}

/// `TokenProvider` backed by yup-oauth2's installed flow.
pub struct GoogleAuthenticator {
    client_secret_path: PathBuf,
    token_path: PathBuf,
    oauth_port: u16,
    consent_timeout: Duration,
    state: Mutex<AuthState>,
}

impl GoogleAuthenticator {
    pub fn new(config: &GmailConfig) -> Self {
        Self::with_delegate(config, Box::new(ConsoleDelegate))
    }

    fn with_delegate(config: &GmailConfig, delegate: Box<dyn InstalledFlowDelegate>) -> Self {
        Self {
            client_secret_path: config.client_secret_path.clone(),
            token_path: config.token_path.clone(),
            oauth_port: config.oauth_port,
            consent_timeout: config.consent_timeout,
            state: Mutex::new(AuthState {
                delegate: Some(delegate),
                authenticator: None,
            }),
        }
    }

    /// Port 0 lets the OS pick the loopback port.
    fn return_method(&self) -> InstalledFlowReturnMethod {
        match self.oauth_port {
            0 => InstalledFlowReturnMethod::HTTPRedirect,
            port => InstalledFlowReturnMethod::HTTPPortRedirect(port),
        }
    }

    async fn build(
        &self,
        delegate: Box<dyn InstalledFlowDelegate>,
    ) -> Result<DefaultAuthenticator, MailError> {
        let secret = yup_oauth2::read_application_secret(&self.client_secret_path)
            .await
            .map_err(|e| {
                MailError::Auth(format!(
                    "failed to read client secret '{}': {e}",
                    self.client_secret_path.display()
                ))
            })?;

        InstalledFlowAuthenticator::builder(secret, self.return_method())
            .with_storage(Box::new(FileTokenStorage::new(&self.token_path)))
            .flow_delegate(delegate)
            .build()
            .await
            .map_err(|e| MailError::Auth(format!("failed to build authenticator: {e}")))
    }
}

#[async_trait]
impl TokenProvider for GoogleAuthenticator {
    async fn access_token(&self) -> Result<String, MailError> {
        let mut state = self.state.lock().await;

        if state.authenticator.is_none() {
            let delegate = state
                .delegate
                .take()
                .unwrap_or_else(|| Box::new(ConsoleDelegate));
            let built = self.build(delegate).await?;
            info!(path = %self.token_path.display(), "Gmail authenticator ready");
            state.authenticator = Some(built);
        }
        let authenticator = state
            .authenticator
            .as_ref()
            .ok_or_else(|| MailError::Auth("authenticator unavailable".into()))?;

        let token = tokio::time::timeout(self.consent_timeout, authenticator.token(GMAIL_SCOPES))
            .await
            .map_err(|_| {
                MailError::Auth(format!(
                    "no Gmail token within {:?}",
                    self.consent_timeout
                ))
            })?
            .map_err(|e| MailError::Auth(format!("token request failed: {e}")))?;

        token
            .token()
            .map(str::to_string)
            .ok_or_else(|| MailError::Auth("token response carried no access token".into()))
    }
}
