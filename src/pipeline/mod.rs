//! Message processing pipeline.
//!
//! `classifier` turns message text into a category and reply using the
//! stored instruction template; `orchestrator` runs the request flows
//! (manual, fetch-only, classify, classify + draft, unread) on top of it.

pub mod classifier;
pub mod orchestrator;

pub use classifier::{Category, Classification, Classifier};
pub use orchestrator::{
    BatchOutcome, DraftedEmail, FailedMessage, Flow, Pipeline, ProcessedEmail,
};
