use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use email_assistant::api::{AppState, router};
use email_assistant::config::AppConfig;
use email_assistant::llm::create_provider;
use email_assistant::mail::{GmailClient, GoogleAuthenticator};
use email_assistant::pipeline::Pipeline;
use email_assistant::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("📧 Email Assistant v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.gemini.model);
    eprintln!("   Database: {}", config.database_path.display());
    eprintln!("   API: http://{}", config.bind_addr);

    // ── Database ─────────────────────────────────────────────────────────
    let backend = LibSqlBackend::new_local(&config.database_path)
        .await
        .with_context(|| {
            format!(
                "Failed to open database at {}",
                config.database_path.display()
            )
        })?;
    let db: Arc<dyn Database> = Arc::new(backend);

    if let Some(seed_path) = &config.prompt_seed_file {
        let content = std::fs::read_to_string(seed_path)
            .with_context(|| format!("Failed to read prompt seed {}", seed_path.display()))?;
        db.upsert_prompt(&config.pipeline.prompt_name, content.trim())
            .await
            .context("Failed to seed prompt")?;
        tracing::info!(
            name = %config.pipeline.prompt_name,
            path = %seed_path.display(),
            "Seeded instruction template"
        );
    }

    // ── Upstream clients ─────────────────────────────────────────────────
    let llm = create_provider(&config.gemini, &config.upstream)?;
    let authenticator = Arc::new(GoogleAuthenticator::new(&config.gmail));
    let mail = Arc::new(GmailClient::new(
        &config.gmail,
        &config.upstream,
        authenticator,
    )?);

    eprintln!(
        "   Failure policy: {:?}, retries: {}",
        config.pipeline.failure_policy, config.upstream.max_retries
    );

    // ── HTTP server ──────────────────────────────────────────────────────
    let pipeline = Arc::new(Pipeline::new(db, llm, mail, config.pipeline.clone()));
    let app = router(AppState { pipeline }, config.cors_allow_origins.as_deref());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "HTTP server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("Shut down");
    Ok(())
}

/// Console logging, plus a daily-rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "email-assistant.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
