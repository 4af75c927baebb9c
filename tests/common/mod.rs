//! Fake Gmail + Gemini upstreams shared by the integration tests.
//!
//! One axum app serves both APIs on a random port. Gmail routes live under
//! `/gmail`, Gemini under `/gemini`. Every mutating call is recorded so tests
//! can assert on what the service sent.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use email_assistant::error::MailError;
use email_assistant::mail::TokenProvider;
use email_assistant::retry::RetryPolicy;

/// Maximum time any test is allowed to run before we consider it hung.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const API_KEY: &str = "test-api-key";

/// Model answer used unless a prompt contains `FAIL_MARKER`.
pub const CANNED_ANSWER: &str = "Category: Work\nReply: Thanks, I'll take a look.";

/// Prompts containing this make the fake Gemini answer 400.
pub const FAIL_MARKER: &str = "TRIGGER-MODEL-FAILURE";

/// Token provider returning a fixed bearer token.
pub struct StaticToken;

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String, MailError> {
        Ok("test-token".to_string())
    }
}

/// Retry policy with millisecond backoff.
pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

/// Gmail `format=full` message JSON.
pub fn gmail_message(id: &str, subject: &str, from: &str, body: &str, unread: bool) -> Value {
    let labels: Vec<&str> = if unread {
        vec!["INBOX", "UNREAD"]
    } else {
        vec!["INBOX"]
    };
    json!({
        "id": id,
        "threadId": format!("t-{id}"),
        "labelIds": labels,
        "payload": {
            "mimeType": "multipart/alternative",
            "headers": [
                {"name": "Subject", "value": subject},
                {"name": "From", "value": from}
            ],
            "parts": [
                {"mimeType": "text/plain", "body": {"data": URL_SAFE_NO_PAD.encode(body)}},
                {"mimeType": "text/html", "body": {"data": URL_SAFE_NO_PAD.encode(format!("<p>{body}</p>"))}}
            ]
        }
    })
}

/// Recorded state of the fake upstreams.
#[derive(Default)]
pub struct FakeState {
    pub messages: Mutex<Vec<Value>>,
    pub labels: Mutex<Vec<(String, String)>>,
    pub label_creates: Mutex<u32>,
    pub drafts: Mutex<Vec<Value>>,
    pub modifies: Mutex<Vec<(String, Value)>>,
    pub list_calls: Mutex<u32>,
    /// Status returned by the next N list calls before succeeding.
    pub list_failures: Mutex<Vec<u16>>,
    /// When set, draft creation answers with this status.
    pub draft_status: Mutex<Option<u16>>,
    pub gemini_prompts: Mutex<Vec<String>>,
}

impl FakeState {
    pub fn with_messages(messages: Vec<Value>) -> Arc<Self> {
        let state = Self::default();
        *state.messages.lock().unwrap() = messages;
        Arc::new(state)
    }
}

/// Running fake upstream.
pub struct FakeUpstream {
    pub state: Arc<FakeState>,
    pub gmail_base: String,
    pub gemini_base: String,
}

fn status_response(status: u16, message: &str) -> Response {
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (code, Json(json!({"error": {"code": status, "message": message}}))).into_response()
}

async fn list_messages(
    State(state): State<Arc<FakeState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    *state.list_calls.lock().unwrap() += 1;
    {
        let mut failures = state.list_failures.lock().unwrap();
        if !failures.is_empty() {
            let status = failures.remove(0);
            return status_response(status, "list failed");
        }
    }

    let max: usize = params
        .get("maxResults")
        .and_then(|m| m.parse().ok())
        .unwrap_or(100);
    let unread_only = params.get("q").map(String::as_str) == Some("is:unread");

    let messages = state.messages.lock().unwrap();
    let refs: Vec<Value> = messages
        .iter()
        .filter(|m| {
            !unread_only
                || m["labelIds"]
                    .as_array()
                    .is_some_and(|l| l.iter().any(|v| v == "UNREAD"))
        })
        .take(max)
        .map(|m| json!({"id": m["id"], "threadId": m["threadId"]}))
        .collect();
    let estimate = refs.len();
    Json(json!({"messages": refs, "resultSizeEstimate": estimate})).into_response()
}

async fn get_message(State(state): State<Arc<FakeState>>, Path(id): Path<String>) -> Response {
    let messages = state.messages.lock().unwrap();
    match messages.iter().find(|m| m["id"] == id.as_str()) {
        Some(m) => Json(m.clone()).into_response(),
        None => status_response(404, "Requested entity was not found."),
    }
}

async fn modify_message(
    State(state): State<Arc<FakeState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    state.modifies.lock().unwrap().push((id.clone(), body));
    Json(json!({"id": id})).into_response()
}

async fn list_labels(State(state): State<Arc<FakeState>>) -> Response {
    let labels: Vec<Value> = state
        .labels
        .lock()
        .unwrap()
        .iter()
        .map(|(id, name)| json!({"id": id, "name": name, "type": "user"}))
        .collect();
    Json(json!({"labels": labels})).into_response()
}

async fn create_label(State(state): State<Arc<FakeState>>, Json(body): Json<Value>) -> Response {
    *state.label_creates.lock().unwrap() += 1;
    let mut labels = state.labels.lock().unwrap();
    let id = format!("Label_{}", labels.len() + 1);
    let name = body["name"].as_str().unwrap_or_default().to_string();
    labels.push((id.clone(), name.clone()));
    Json(json!({"id": id, "name": name})).into_response()
}

async fn create_draft(State(state): State<Arc<FakeState>>, Json(body): Json<Value>) -> Response {
    let mut drafts = state.drafts.lock().unwrap();
    drafts.push(body);
    if let Some(status) = *state.draft_status.lock().unwrap() {
        return status_response(status, "draft failed");
    }
    Json(json!({"id": format!("r-{}", drafts.len()), "message": {"id": "m-draft"}})).into_response()
}

/// Every string under a `text` key, in document order.
fn collect_text(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                match (key.as_str(), v) {
                    ("text", Value::String(text)) => out.push(text.clone()),
                    _ => collect_text(v, out),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_text(v, out)),
        _ => {}
    }
}

async fn generate_content(
    State(state): State<Arc<FakeState>>,
    Path(rest): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let header_key = headers.get("x-goog-api-key").and_then(|v| v.to_str().ok());
    let query_key = params.get("key").map(String::as_str);
    if header_key != Some(API_KEY) && query_key != Some(API_KEY) {
        return status_response(403, "API key not valid");
    }
    if !rest.ends_with(":generateContent") {
        return status_response(404, "unknown method");
    }

    let mut texts = Vec::new();
    collect_text(&body["contents"], &mut texts);
    let prompt = texts.join("\n");
    state.gemini_prompts.lock().unwrap().push(prompt.clone());

    if prompt.contains(FAIL_MARKER) {
        return status_response(400, "Request contains an invalid argument.");
    }
    Json(json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": CANNED_ANSWER}]},
            "finishReason": "STOP",
            "index": 0
        }],
        "usageMetadata": {
            "promptTokenCount": 40,
            "candidatesTokenCount": 9,
            "totalTokenCount": 49
        },
        "modelVersion": "gemini-flash-latest",
        "responseId": "resp-1"
    }))
    .into_response()
}

/// Start the fake upstreams on a random port.
pub async fn start_fake_upstream(state: Arc<FakeState>) -> FakeUpstream {
    let app = Router::new()
        .route("/gmail/messages", get(list_messages))
        .route("/gmail/messages/{id}", get(get_message))
        .route("/gmail/messages/{id}/modify", post(modify_message))
        .route("/gmail/labels", get(list_labels).post(create_label))
        .route("/gmail/drafts", post(create_draft))
        .route("/gemini/{*rest}", post(generate_content))
        .with_state(Arc::clone(&state));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeUpstream {
        state,
        gmail_base: format!("http://{addr}/gmail"),
        gemini_base: format!("http://{addr}/gemini"),
    }
}
