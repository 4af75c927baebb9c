//! Classification: one model call per message yielding a category and a
//! reply draft.
//!
//! The model is asked for a two-line `Category:` / `Reply:` answer. Answers
//! that miss either marker degrade to category `Other` with the whole text
//! as the reply.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::llm::{CompletionRequest, LlmProvider};

const CATEGORY_MARKER: &str = "Category:";
const REPLY_MARKER: &str = "Reply:";

/// Known categories. The stored category is whatever the model answered;
/// answers outside this set are kept but logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Category {
    Work,
    Personal,
    Finance,
    Spam,
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Work,
        Category::Personal,
        Category::Finance,
        Category::Spam,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Work => "Work",
            Category::Personal => "Personal",
            Category::Finance => "Finance",
            Category::Spam => "Spam",
            Category::Other => "Other",
        }
    }

    /// Case-insensitive match against the known categories.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub category: String,
    pub reply: String,
    /// Word-count estimate, not provider-reported usage.
    pub tokens_used: i64,
}

/// Build the full prompt sent to the model.
pub fn compose_prompt(template: &str, email_text: &str) -> String {
    format!(
        "\n{template}\n\nEmail:\n{email_text}\n\nInstructions:\nReturn output in EXACT format:\n\n\
         Category: <one of Work, Personal, Finance, Spam, Other>\n\
         Reply: <professional reply only>\n"
    )
}

/// Split a raw model answer into `(category, reply)`.
pub fn parse_response(raw: &str) -> (String, String) {
    if raw.contains(CATEGORY_MARKER) {
        if let Some((before, after)) = raw.split_once(REPLY_MARKER) {
            let category = before.replace(CATEGORY_MARKER, "").trim().to_string();
            return (category, after.trim().to_string());
        }
    }

    warn!(raw_response = %raw, "Model answer missing Category/Reply markers, defaulting to Other");
    (Category::Other.as_str().to_string(), raw.to_string())
}

/// Whitespace word count of the prompt plus the reply.
pub fn estimate_tokens(prompt: &str, reply: &str) -> i64 {
    (prompt.split_whitespace().count() + reply.split_whitespace().count()) as i64
}

/// Classifies message text with the configured model.
pub struct Classifier {
    llm: Arc<dyn LlmProvider>,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Classify `email_text` under `template`.
    pub async fn classify(
        &self,
        template: &str,
        email_text: &str,
    ) -> Result<Classification, LlmError> {
        let prompt = compose_prompt(template, email_text);
        let request = CompletionRequest::new(prompt.as_str());

        let response = self.llm.complete(request).await?;
        if response.content.trim().is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: self.llm.model_name().to_string(),
            });
        }

        let (category, reply) = parse_response(&response.content);
        if Category::from_label(&category).is_none() {
            warn!(category = %category, "Model answered an unknown category, keeping it as-is");
        }
        let tokens_used = estimate_tokens(&prompt, &reply);

        debug!(
            model = self.llm.model_name(),
            category = %category,
            tokens_used,
            "Classified message"
        );

        Ok(Classification {
            category,
            reply,
            tokens_used,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::llm::CompletionResponse;

    /// Returns a fixed answer and records the prompts it saw.
    struct ScriptedLlm {
        response: String,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: response.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.seen.lock().unwrap().push(request.prompt);
            Ok(CompletionResponse {
                content: self.response.clone(),
                input_tokens: 0,
                output_tokens: 0,
            })
        }
    }

    // ── Prompt ──────────────────────────────────────────────────────

    #[test]
    fn prompt_layout() {
        let prompt = compose_prompt("Be helpful.", "Hi there");
        assert_eq!(
            prompt,
            "\nBe helpful.\n\nEmail:\nHi there\n\nInstructions:\nReturn output in EXACT format:\n\n\
             Category: <one of Work, Personal, Finance, Spam, Other>\n\
             Reply: <professional reply only>\n"
        );
    }

    // ── Parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_well_formed() {
        let (category, reply) = parse_response("Category: Work\nReply: Thanks, I'll review it.");
        assert_eq!(category, "Work");
        assert_eq!(reply, "Thanks, I'll review it.");
    }

    #[test]
    fn parse_splits_on_first_reply_marker() {
        let (category, reply) = parse_response("Category: Personal\nReply: Sure.\nReply: again");
        assert_eq!(category, "Personal");
        assert_eq!(reply, "Sure.\nReply: again");
    }

    #[test]
    fn parse_missing_category_marker_falls_back() {
        let raw = "Reply: only a reply";
        assert_eq!(parse_response(raw), ("Other".to_string(), raw.to_string()));
    }

    #[test]
    fn parse_missing_reply_marker_falls_back() {
        let raw = "Category: Spam but nothing else";
        assert_eq!(parse_response(raw), ("Other".to_string(), raw.to_string()));
    }

    #[test]
    fn parse_keeps_unexpected_category_text() {
        let (category, _) = parse_response("Category: Urgent\nReply: ok");
        assert_eq!(category, "Urgent");
        assert_eq!(Category::from_label(&category), None);
    }

    #[test]
    fn category_from_label_is_case_insensitive() {
        assert_eq!(Category::from_label(" finance "), Some(Category::Finance));
        assert_eq!(Category::from_label("SPAM"), Some(Category::Spam));
        assert_eq!(Category::Work.to_string(), "Work");
    }

    #[test]
    fn token_estimate_counts_words() {
        assert_eq!(estimate_tokens("one two\nthree", "four  five"), 5);
        assert_eq!(estimate_tokens("", ""), 0);
    }

    // ── Classifier ──────────────────────────────────────────────────

    #[tokio::test]
    async fn classify_sends_composed_prompt() {
        let llm = ScriptedLlm::new("Category: Work\nReply: Thanks, I'll review it.");
        let classifier = Classifier::new(llm.clone());

        let result = classifier
            .classify("You are an assistant.", "Subject: Q3\n\nPlease review.")
            .await
            .unwrap();

        assert_eq!(result.category, "Work");
        assert_eq!(result.reply, "Thanks, I'll review it.");

        let seen = llm.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("You are an assistant."));
        assert!(seen[0].contains("Email:\nSubject: Q3\n\nPlease review."));
        assert_eq!(
            result.tokens_used,
            estimate_tokens(&seen[0], "Thanks, I'll review it.")
        );
    }

    #[tokio::test]
    async fn classify_rejects_blank_answer() {
        let classifier = Classifier::new(ScriptedLlm::new("   \n"));
        let err = classifier.classify("t", "e").await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { .. }));
    }
}
