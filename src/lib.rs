//! Email assistant: classifies mail and drafts replies with a language model.
//!
//! Messages come from Gmail or straight from the caller, are classified by
//! Gemini against a stored instruction template, and the results are kept in
//! libSQL. The HTTP API in `api` exposes one flow per endpoint.

pub mod api;
pub mod config;
pub mod error;
pub mod llm;
pub mod mail;
pub mod pipeline;
pub mod retry;
pub mod store;
