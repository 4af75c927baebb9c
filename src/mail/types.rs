//! Gmail wire types and message helpers: body extraction, draft encoding.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Body text longer than this is cut.
pub const BODY_PREVIEW_CHARS: usize = 500;

/// A provider message reduced to what the pipeline needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteMessage {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub body: String,
    #[serde(skip)]
    pub unread: bool,
    #[serde(skip)]
    pub label_ids: Vec<String>,
}

impl RemoteMessage {
    /// Text handed to the classifier for a fetched message.
    pub fn email_text(&self) -> String {
        format!("Subject: {}\n\n{}", self.subject, self.body)
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListResponse {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessageResponse {
    pub id: String,
    #[serde(default)]
    pub label_ids: Vec<String>,
    pub payload: Option<Payload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Payload {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub parts: Vec<Payload>,
    pub body: Option<Body>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Body {
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LabelList {
    #[serde(default)]
    pub labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Label {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DraftResponse {
    pub id: String,
}

// ── Parsing ─────────────────────────────────────────────────────────

/// Convert a `format=full` message into a `RemoteMessage`.
pub(crate) fn parse_message(raw: MessageResponse) -> RemoteMessage {
    let payload = raw.payload.unwrap_or_default();

    let subject = find_header(&payload.headers, "Subject").unwrap_or_default();
    let sender = find_header(&payload.headers, "From").unwrap_or_default();
    let body = truncate_chars(&extract_body(&payload), BODY_PREVIEW_CHARS);
    let unread = raw.label_ids.iter().any(|l| l == "UNREAD");

    RemoteMessage {
        id: raw.id,
        subject,
        sender,
        body,
        unread,
        label_ids: raw.label_ids,
    }
}

/// Find a header value by name (case-insensitive).
fn find_header(headers: &[Header], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
}

/// Multi-part payloads yield their first `text/plain` part (depth-first);
/// single-part payloads yield their own body.
fn extract_body(payload: &Payload) -> String {
    if !payload.parts.is_empty() {
        return find_text_part(&payload.parts).unwrap_or_default();
    }
    payload
        .body
        .as_ref()
        .and_then(|b| b.data.as_deref())
        .map(decode_base64url)
        .unwrap_or_default()
}

fn find_text_part(parts: &[Payload]) -> Option<String> {
    for part in parts {
        if part.mime_type.eq_ignore_ascii_case("text/plain") {
            if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
                return Some(decode_base64url(data));
            }
        }
        if let Some(text) = find_text_part(&part.parts) {
            return Some(text);
        }
    }
    None
}

/// Decode base64url with or without padding. Invalid UTF-8 is replaced;
/// undecodable input becomes an empty string.
pub fn decode_base64url(encoded: &str) -> String {
    let trimmed = encoded.trim().trim_end_matches('=');
    match URL_SAFE_NO_PAD.decode(trimmed) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!(error = %e, payload = %encoded, "Undecodable message body, using empty body");
            String::new()
        }
    }
}

/// Keep at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

// ── Drafts ──────────────────────────────────────────────────────────

/// Subject line for a reply. Always prefixed, even when already a reply
/// or empty.
pub fn reply_subject(subject: &str) -> String {
    format!("Re: {subject}")
}

/// Build a base64url-encoded RFC 2822 text/plain message for the drafts API.
pub fn build_draft_raw(to: &str, subject: &str, body: &str) -> String {
    let to = strip_crlf(to);
    let subject = encode_header_value(&strip_crlf(subject));
    let body = body.replace("\r\n", "\n").replace('\n', "\r\n");

    let message = format!(
        "To: {to}\r\n\
         Subject: {subject}\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: text/plain; charset=\"utf-8\"\r\n\
         Content-Transfer-Encoding: 8bit\r\n\
         \r\n\
         {body}"
    );
    URL_SAFE.encode(message.as_bytes())
}

fn strip_crlf(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// RFC 2047 `B` encoding for non-ASCII header values, split into encoded
/// words of at most 45 source bytes each.
fn encode_header_value(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for c in value.chars() {
        if chunk.len() + c.len_utf8() > 45 {
            words.push(format!("=?UTF-8?B?{}?=", STANDARD.encode(chunk.as_bytes())));
            chunk.clear();
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        words.push(format!("=?UTF-8?B?{}?=", STANDARD.encode(chunk.as_bytes())));
    }
    words.join("\r\n ")
}
