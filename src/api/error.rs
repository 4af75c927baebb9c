//! Mapping from pipeline failures to HTTP responses.
//!
//! Every error body carries `detail`; failures from a processing step also
//! carry the `stage` that failed.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use crate::error::PipelineError;

/// Error returned by the HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    Pipeline(PipelineError),
    /// Request body could not be read.
    BadRequest(String),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError::Pipeline(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Pipeline(e) => match e {
                PipelineError::PromptNotFound { .. } => StatusCode::NOT_FOUND,
                PipelineError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
                PipelineError::Mail { .. } | PipelineError::Llm { .. } => StatusCode::BAD_GATEWAY,
                PipelineError::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::BadRequest(detail) => json!({ "detail": detail }),
            ApiError::Pipeline(PipelineError::PromptNotFound { .. }) => {
                json!({ "detail": "Prompt not found" })
            }
            ApiError::Pipeline(e) => match e.stage() {
                Some(stage) => json!({ "detail": e.to_string(), "stage": stage }),
                None => json!({ "detail": e.to_string() }),
            },
        };

        if status.is_server_error() {
            error!(status = status.as_u16(), error = %body["detail"], "Request failed");
        }
        (status, Json(body)).into_response()
    }
}
