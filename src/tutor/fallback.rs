//! Fail-open tutor — wraps any [`TutorModel`] so callers never see an error.
//!
//! * Correction failures (`Transport`, `Malformed`, `EmptyResponse`) accept
//!   the utterance unchanged.  No retry is attempted.
//! * Teaching failures produce a fixed polite "please repeat" reply with no
//!   annotations.

use async_trait::async_trait;

use crate::config::SessionSettings;

use super::context::ContextWindow;
use super::extract::{Extraction, TeachingReply};
use super::model::{TutorError, TutorModel, Verdict};

/// Verdict used when the correction stage could not produce one.
pub fn fail_open(utterance: &str) -> Verdict {
    Verdict::Accepted {
        corrected_text: utterance.to_string(),
    }
}

/// Teaching payload used when the teaching stage could not produce one.
pub fn fail_safe(fallback_reply: &str) -> Extraction<TeachingReply> {
    Extraction::Degraded(TeachingReply::bare(fallback_reply))
}

// ---------------------------------------------------------------------------
// FailOpenTutor
// ---------------------------------------------------------------------------

/// A transparent wrapper around any [`TutorModel`] that never returns an
/// error.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use voice_tutor::config::TutorConfig;
/// use voice_tutor::relay::HttpRelay;
/// use voice_tutor::tutor::{FailOpenTutor, RelayTutor};
///
/// let config = TutorConfig::default();
/// let relay = Arc::new(HttpRelay::new("http://localhost:3000/api/openai"));
/// let tutor = FailOpenTutor::new(RelayTutor::from_config(relay, &config), &config.fallback_reply);
/// // `tutor` keeps the conversation going even when the relay is down.
/// ```
pub struct FailOpenTutor<T: TutorModel> {
    inner: T,
    fallback_reply: String,
}

impl<T: TutorModel> FailOpenTutor<T> {
    pub fn new(inner: T, fallback_reply: &str) -> Self {
        Self {
            inner,
            fallback_reply: fallback_reply.to_string(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: TutorModel> TutorModel for FailOpenTutor<T> {
    /// Never returns `Err(_)`.
    async fn correct(
        &self,
        utterance: &str,
        context: &ContextWindow,
    ) -> Result<Verdict, TutorError> {
        match self.inner.correct(utterance, context).await {
            Ok(verdict) => Ok(verdict),
            Err(err) => {
                log::warn!("tutor: correction failed, accepting utterance as-is: {err}");
                Ok(fail_open(utterance))
            }
        }
    }

    /// Never returns `Err(_)`.
    async fn teach(
        &self,
        corrected: &str,
        context: &ContextWindow,
        settings: &SessionSettings,
    ) -> Result<Extraction<TeachingReply>, TutorError> {
        match self.inner.teach(corrected, context, settings).await {
            Ok(reply) => Ok(reply),
            Err(err) => {
                log::warn!("tutor: teaching failed, using fallback reply: {err}");
                Ok(fail_safe(&self.fallback_reply))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
