//! Tutoring model module.
//!
//! This module provides:
//! * [`TutorModel`] — async trait for the correction and teaching stages.
//! * [`RelayTutor`] — chat-completions backend reached through the relay.
//! * [`FailOpenTutor`] — wraps any model; never returns an error.
//! * [`PromptBuilder`] — builds correction and teaching prompts.
//! * [`ContextWindow`] — the last *N* turns, snapshotted per call.
//! * [`extract_teaching_reply`] / [`extract_verdict`] — tolerant JSON extraction.
//! * [`filter_annotations`] — drops annotations absent from the reply.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voice_tutor::config::AppConfig;
//! use voice_tutor::relay::HttpRelay;
//! use voice_tutor::tutor::{ContextWindow, FailOpenTutor, RelayTutor, TutorModel};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let relay = Arc::new(HttpRelay::new(config.relay.url.clone()));
//!     let tutor = FailOpenTutor::new(
//!         RelayTutor::from_config(relay, &config.tutor),
//!         &config.tutor.fallback_reply,
//!     );
//!
//!     let verdict = tutor.correct("밥", &ContextWindow::default()).await.unwrap();
//!     println!("{}", verdict.corrected_text());
//! }
//! ```

pub mod annotation;
pub mod context;
pub mod extract;
pub mod fallback;
pub mod model;
pub mod prompt;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use annotation::{filter_annotations, GrammarItem, VocabItem};
pub use context::{ContextTurn, ContextWindow};
pub use extract::{
    extract_teaching_reply, extract_verdict, json_object, salvage_text, Extraction, Script,
    TeachingReply,
};
pub use fallback::{fail_open, fail_safe, FailOpenTutor};
pub use model::{RelayTutor, TutorError, TutorModel, Verdict};
pub use prompt::{PromptBuilder, SENTENCE_SEPARATOR};
