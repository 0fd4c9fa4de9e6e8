//! Core `TutorModel` trait and the relay-backed `RelayTutor`.
//!
//! `RelayTutor` sends OpenAI-compatible chat-completion bodies through the
//! [`Relay`] for both stages and hands the raw message content to the
//! extractor.  Model name, temperatures and deadlines come from
//! [`TutorConfig`].

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{SessionSettings, TutorConfig};
use crate::relay::{Endpoint, Relay, RelayError, RelayRequest};

use super::context::ContextWindow;
use super::extract::{extract_teaching_reply, extract_verdict, Extraction, TeachingReply};
use super::prompt::PromptBuilder;

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Outcome of the correction stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted {
        corrected_text: String,
    },
    Rejected {
        corrected_text: String,
        explanation: String,
    },
}

impl Verdict {
    pub fn corrected_text(&self) -> &str {
        match self {
            Verdict::Accepted { corrected_text } | Verdict::Rejected { corrected_text, .. } => {
                corrected_text
            }
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted { .. })
    }
}

// ---------------------------------------------------------------------------
// TutorError
// ---------------------------------------------------------------------------

/// Errors that can occur during either model stage.
#[derive(Debug, Error)]
pub enum TutorError {
    /// The relay call failed or timed out.
    #[error(transparent)]
    Transport(#[from] RelayError),

    /// The model answered, but no verdict could be read from it.
    #[error("malformed model output: {0}")]
    Malformed(String),

    /// The completion carried no message content.
    #[error("model returned an empty response")]
    EmptyResponse,
}

// ---------------------------------------------------------------------------
// TutorModel trait
// ---------------------------------------------------------------------------

/// Async seam for the two model stages.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn TutorModel>`.  `context` is always a snapshot taken by the caller
/// at call time.
#[async_trait]
pub trait TutorModel: Send + Sync {
    /// Stage 1: classify `utterance` and propose a correction.
    async fn correct(&self, utterance: &str, context: &ContextWindow)
        -> Result<Verdict, TutorError>;

    /// Stage 2: reply to `corrected` with candidate annotations.
    async fn teach(
        &self,
        corrected: &str,
        context: &ContextWindow,
        settings: &SessionSettings,
    ) -> Result<Extraction<TeachingReply>, TutorError>;
}

// ---------------------------------------------------------------------------
// RelayTutor
// ---------------------------------------------------------------------------

/// Talks to the chat-completions endpoint through a [`Relay`].
pub struct RelayTutor {
    relay: Arc<dyn Relay>,
    config: TutorConfig,
    prompts: PromptBuilder,
}

impl RelayTutor {
    pub fn from_config(relay: Arc<dyn Relay>, config: &TutorConfig) -> Self {
        let prompts = PromptBuilder::new(&config.target_language, &config.explanation_language);
        Self {
            relay,
            config: config.clone(),
            prompts,
        }
    }

    pub fn config(&self) -> &TutorConfig {
        &self.config
    }

    async fn complete(
        &self,
        messages: Vec<serde_json::Value>,
        temperature: f32,
        timeout: std::time::Duration,
    ) -> Result<String, TutorError> {
        let body = serde_json::json!({
            "model":           self.config.model,
            "messages":        messages,
            "temperature":     temperature,
            "response_format": { "type": "json_object" },
        });

        let json = self
            .relay
            .send(RelayRequest::post(Endpoint::ChatCompletions, body), timeout)
            .await?
            .into_json()?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(TutorError::EmptyResponse)?
            .trim()
            .to_string();

        if content.is_empty() {
            return Err(TutorError::EmptyResponse);
        }
        Ok(content)
    }
}

#[async_trait]
impl TutorModel for RelayTutor {
    async fn correct(
        &self,
        utterance: &str,
        context: &ContextWindow,
    ) -> Result<Verdict, TutorError> {
        let messages = self.prompts.correction_messages(utterance, context);
        let content = self
            .complete(
                messages,
                self.config.correction_temperature,
                self.config.correction_timeout(),
            )
            .await?;

        extract_verdict(&content, utterance).ok_or_else(|| {
            TutorError::Malformed(format!("no verdict in {} chars of output", content.len()))
        })
    }

    async fn teach(
        &self,
        corrected: &str,
        context: &ContextWindow,
        settings: &SessionSettings,
    ) -> Result<Extraction<TeachingReply>, TutorError> {
        let messages = self.prompts.teaching_messages(corrected, context, settings);
        let content = self
            .complete(
                messages,
                self.config.teaching_temperature,
                self.config.teaching_timeout(),
            )
            .await?;

        let extraction =
            extract_teaching_reply(&content, self.config.script, &self.config.fallback_reply);
        if extraction.is_degraded() {
            log::warn!("tutor: teaching output was not well-formed JSON, using degraded reply");
        }
        Ok(extraction)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
