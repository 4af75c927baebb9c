//! REST endpoints for the email assistant.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;
use super::error::ApiError;
use crate::mail::RemoteMessage;
use crate::pipeline::{DraftedEmail, FailedMessage, ProcessedEmail};

#[derive(Debug, Deserialize)]
pub struct ProcessEmailRequest {
    pub email_text: String,
}

#[derive(Debug, Serialize)]
struct ProcessEmailResponse {
    category: String,
    reply: String,
    tokens_used: i64,
}

#[derive(Debug, Serialize)]
struct FetchResponse {
    emails: Vec<RemoteMessage>,
}

#[derive(Debug, Serialize)]
struct ProcessedEmailsResponse {
    processed_emails: Vec<ProcessedEmail>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failed: Vec<FailedMessage>,
}

#[derive(Debug, Serialize)]
struct DraftsCreatedResponse {
    drafts_created: Vec<DraftedEmail>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failed: Vec<FailedMessage>,
}

#[derive(Debug, Serialize)]
struct UnreadResponse {
    processed_unread_emails: Vec<DraftedEmail>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failed: Vec<FailedMessage>,
}

/// GET /
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "Backend running" }))
}

/// POST /process-email
///
/// Classifies caller-supplied text and stores the result.
async fn process_email(
    State(state): State<AppState>,
    payload: Result<Json<ProcessEmailRequest>, JsonRejection>,
) -> Result<Json<ProcessEmailResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let result = state.pipeline.process_manual(&request.email_text).await?;
    Ok(Json(ProcessEmailResponse {
        category: result.category,
        reply: result.reply,
        tokens_used: result.tokens_used,
    }))
}

/// GET /fetch-gmail
async fn fetch_gmail(State(state): State<AppState>) -> Result<Json<FetchResponse>, ApiError> {
    let emails = state.pipeline.fetch_recent().await?;
    Ok(Json(FetchResponse { emails }))
}

/// GET /process-gmail
async fn process_gmail(
    State(state): State<AppState>,
) -> Result<Json<ProcessedEmailsResponse>, ApiError> {
    let outcome = state.pipeline.process_recent().await?;
    Ok(Json(ProcessedEmailsResponse {
        processed_emails: outcome.items,
        failed: outcome.failed,
    }))
}

/// GET /process-gmail-drafts
///
/// Creates reply drafts; nothing is sent.
async fn process_gmail_drafts(
    State(state): State<AppState>,
) -> Result<Json<DraftsCreatedResponse>, ApiError> {
    let outcome = state.pipeline.process_and_draft().await?;
    Ok(Json(DraftsCreatedResponse {
        drafts_created: outcome.items,
        failed: outcome.failed,
    }))
}

/// GET /process-unread
///
/// Drafts replies to unread messages, labels them and marks them read.
async fn process_unread(State(state): State<AppState>) -> Result<Json<UnreadResponse>, ApiError> {
    let outcome = state.pipeline.process_unread().await?;
    Ok(Json(UnreadResponse {
        processed_unread_emails: outcome.items,
        failed: outcome.failed,
    }))
}

/// Build the assistant REST routes.
pub fn assistant_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/process-email", post(process_email))
        .route("/fetch-gmail", get(fetch_gmail))
        .route("/process-gmail", get(process_gmail))
        .route("/process-gmail-drafts", get(process_gmail_drafts))
        .route("/process-unread", get(process_unread))
        .with_state(state)
}
