//! Pipeline orchestrator: runs one flow per request.
//!
//! Every flow checks for the instruction template before touching any
//! upstream. Fetched messages then move through
//! fetch → classify → (draft) → (label), and all rows produced by a run are
//! written in one transaction at the end.

use std::sync::Arc;

use serde::Serialize;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::config::{FailurePolicy, PipelineConfig};
use crate::error::{PipelineError, Stage};
use crate::llm::LlmProvider;
use crate::mail::{MailClient, RemoteMessage};
use crate::pipeline::classifier::{Classification, Classifier};
use crate::store::{Database, ProcessedRecord, Prompt};

/// The request flows the service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Manual,
    FetchOnly,
    ClassifyFetched,
    ClassifyAndDraft,
    ClassifyUnread,
}

impl Flow {
    /// Endpoint name recorded in usage logs.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Flow::Manual => "process-email",
            Flow::FetchOnly => "fetch-gmail",
            Flow::ClassifyFetched => "process-gmail",
            Flow::ClassifyAndDraft => "process-gmail-drafts",
            Flow::ClassifyUnread => "process-unread",
        }
    }

    fn drafts(&self) -> bool {
        matches!(self, Flow::ClassifyAndDraft | Flow::ClassifyUnread)
    }
}

/// A classified message (`process-gmail`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedEmail {
    pub subject: String,
    pub category: String,
    pub reply: String,
}

/// A classified message with a draft reply (`process-gmail-drafts`, `process-unread`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftedEmail {
    pub subject: String,
    pub category: String,
    pub draft_id: String,
}

/// A message skipped under `FailurePolicy::Continue`.
#[derive(Debug, Clone, Serialize)]
pub struct FailedMessage {
    pub message_id: String,
    pub subject: String,
    pub stage: Stage,
    pub error: String,
}

/// Results of a batch flow.
#[derive(Debug, Clone)]
pub struct BatchOutcome<T> {
    pub items: Vec<T>,
    pub failed: Vec<FailedMessage>,
}

/// Per-message result before it is shaped for a specific flow.
struct MessageOutcome {
    subject: String,
    classification: Classification,
    draft_id: Option<String>,
}

/// Runs flows against injected store, model and mailbox.
pub struct Pipeline {
    db: Arc<dyn Database>,
    classifier: Classifier,
    mail: Arc<dyn MailClient>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        db: Arc<dyn Database>,
        llm: Arc<dyn LlmProvider>,
        mail: Arc<dyn MailClient>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            db,
            classifier: Classifier::new(llm),
            mail,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Classify caller-supplied text and persist the result.
    pub async fn process_manual(&self, email_text: &str) -> Result<Classification, PipelineError> {
        let span = run_span(Flow::Manual);
        async {
            let template = self.load_template().await?;
            if email_text.trim().is_empty() {
                return Err(PipelineError::InvalidInput(
                    "email_text must not be empty".into(),
                ));
            }
            let classification = self
                .classifier
                .classify(&template.content, email_text)
                .await
                .map_err(|source| PipelineError::Llm {
                    stage: Stage::Classify,
                    source,
                })?;

            self.persist(&[ProcessedRecord {
                content: email_text.to_string(),
                category: classification.category.clone(),
                reply: classification.reply.clone(),
                endpoint: Flow::Manual.endpoint().to_string(),
                tokens_used: classification.tokens_used,
            }])
            .await?;

            info!(category = %classification.category, "Manual message processed");
            Ok::<_, PipelineError>(classification)
        }
        .instrument(span)
        .await
    }

    /// Fetch the most recent messages without classifying them.
    pub async fn fetch_recent(&self) -> Result<Vec<RemoteMessage>, PipelineError> {
        let span = run_span(Flow::FetchOnly);
        async {
            let ids = self
                .mail
                .list_recent_messages(self.config.limits.fetch)
                .await
                .map_err(fetch_error)?;

            let mut messages = Vec::with_capacity(ids.len());
            for id in &ids {
                messages.push(self.mail.fetch_message(id).await.map_err(fetch_error)?);
            }
            info!(count = messages.len(), "Fetched recent messages");
            Ok::<_, PipelineError>(messages)
        }
        .instrument(span)
        .await
    }

    /// Classify recent messages.
    pub async fn process_recent(&self) -> Result<BatchOutcome<ProcessedEmail>, PipelineError> {
        let outcome = self
            .run_batch(Flow::ClassifyFetched, self.config.limits.process)
            .await?;
        Ok(BatchOutcome {
            items: outcome
                .items
                .into_iter()
                .map(|o| ProcessedEmail {
                    subject: o.subject,
                    category: o.classification.category,
                    reply: o.classification.reply,
                })
                .collect(),
            failed: outcome.failed,
        })
    }

    /// Classify recent messages and create a reply draft for each.
    pub async fn process_and_draft(&self) -> Result<BatchOutcome<DraftedEmail>, PipelineError> {
        let outcome = self
            .run_batch(Flow::ClassifyAndDraft, self.config.limits.drafts)
            .await?;
        Ok(drafted(outcome))
    }

    /// Classify unread messages, draft replies, label them and mark them read.
    pub async fn process_unread(&self) -> Result<BatchOutcome<DraftedEmail>, PipelineError> {
        let outcome = self
            .run_batch(Flow::ClassifyUnread, self.config.limits.unread)
            .await?;
        Ok(drafted(outcome))
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn load_template(&self) -> Result<Prompt, PipelineError> {
        self.db
            .get_prompt(&self.config.prompt_name)
            .await
            .map_err(|source| PipelineError::Database {
                stage: Stage::Fetch,
                source,
            })?
            .ok_or_else(|| PipelineError::PromptNotFound {
                name: self.config.prompt_name.clone(),
            })
    }

    async fn persist(&self, records: &[ProcessedRecord]) -> Result<(), PipelineError> {
        self.db
            .record_batch(records)
            .await
            .map_err(|source| PipelineError::Database {
                stage: Stage::Persist,
                source,
            })
    }

    async fn run_batch(
        &self,
        flow: Flow,
        limit: u32,
    ) -> Result<BatchOutcome<MessageOutcome>, PipelineError> {
        let span = run_span(flow);
        async {
            let template = self.load_template().await?;

            let label_id = if flow == Flow::ClassifyUnread {
                let id = self
                    .mail
                    .ensure_label(&self.config.processed_label)
                    .await
                    .map_err(|source| PipelineError::Mail {
                        stage: Stage::Label,
                        source,
                    })?;
                Some(id)
            } else {
                None
            };

            let ids = if flow == Flow::ClassifyUnread {
                self.mail.list_unread_messages(limit).await
            } else {
                self.mail.list_recent_messages(limit).await
            }
            .map_err(fetch_error)?;

            info!(count = ids.len(), "Processing messages");

            let mut items = Vec::with_capacity(ids.len());
            let mut records = Vec::with_capacity(ids.len());
            let mut failed = Vec::new();

            for id in &ids {
                match self
                    .process_one(flow, id, &template.content, label_id.as_deref())
                    .await
                {
                    Ok((outcome, record)) => {
                        items.push(outcome);
                        records.push(record);
                    }
                    Err((subject, e)) => match self.config.failure_policy {
                        FailurePolicy::Abort => {
                            warn!(message_id = %id, error = %e, "Message failed, aborting run");
                            return Err(e);
                        }
                        FailurePolicy::Continue => {
                            warn!(message_id = %id, error = %e, "Message failed, continuing");
                            failed.push(FailedMessage {
                                message_id: id.clone(),
                                subject,
                                stage: e.stage().unwrap_or(Stage::Fetch),
                                error: e.to_string(),
                            });
                        }
                    },
                }
            }

            self.persist(&records).await?;

            info!(
                processed = items.len(),
                failed = failed.len(),
                "Run complete"
            );
            Ok::<_, PipelineError>(BatchOutcome { items, failed })
        }
        .instrument(span)
        .await
    }

    /// Walk one message through its stages. Errors carry the subject when
    /// it is known.
    async fn process_one(
        &self,
        flow: Flow,
        id: &str,
        template: &str,
        label_id: Option<&str>,
    ) -> Result<(MessageOutcome, ProcessedRecord), (String, PipelineError)> {
        let message = self
            .mail
            .fetch_message(id)
            .await
            .map_err(|e| (String::new(), fetch_error(e)))?;
        let subject = message.subject.clone();
        let email_text = message.email_text();

        let classification = self
            .classifier
            .classify(template, &email_text)
            .await
            .map_err(|source| {
                (
                    subject.clone(),
                    PipelineError::Llm {
                        stage: Stage::Classify,
                        source,
                    },
                )
            })?;

        let draft_id = if flow.drafts() {
            let draft_id = self
                .mail
                .create_draft_reply(&message.sender, &message.subject, &classification.reply)
                .await
                .map_err(|source| {
                    (
                        subject.clone(),
                        PipelineError::Mail {
                            stage: Stage::Draft,
                            source,
                        },
                    )
                })?;
            Some(draft_id)
        } else {
            None
        };

        if let Some(label_id) = label_id {
            self.mail
                .apply_label_and_mark_read(&message.id, label_id)
                .await
                .map_err(|source| {
                    (
                        subject.clone(),
                        PipelineError::Mail {
                            stage: Stage::Label,
                            source,
                        },
                    )
                })?;
        }

        let record = ProcessedRecord {
            content: email_text,
            category: classification.category.clone(),
            reply: classification.reply.clone(),
            endpoint: flow.endpoint().to_string(),
            tokens_used: classification.tokens_used,
        };

        Ok((
            MessageOutcome {
                subject,
                classification,
                draft_id,
            },
            record,
        ))
    }
}

fn run_span(flow: Flow) -> tracing::Span {
    info_span!("pipeline_run", run_id = %Uuid::new_v4(), flow = flow.endpoint())
}

fn fetch_error(source: crate::error::MailError) -> PipelineError {
    PipelineError::Mail {
        stage: Stage::Fetch,
        source,
    }
}

fn drafted(outcome: BatchOutcome<MessageOutcome>) -> BatchOutcome<DraftedEmail> {
    BatchOutcome {
        items: outcome
            .items
            .into_iter()
            .map(|o| DraftedEmail {
                subject: o.subject,
                category: o.classification.category,
                draft_id: o.draft_id.unwrap_or_default(),
            })
            .collect(),
        failed: outcome.failed,
    }
}
