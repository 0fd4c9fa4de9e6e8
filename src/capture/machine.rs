//! Press-and-hold voice capture state machine.
//!
//! ```text
//! Idle ──press──▶ Capturing ──engine ends──▶ Capturing   (restart, transcript kept)
//!                     │
//!                     ├─release, heard enough──▶ Confirming ──confirm──▶ Idle (text out)
//!                     ├─release, nothing / unclear──────────────────────▶ Idle (retry hint)
//!                     └─fatal engine error─────────────────────────────▶ Idle (notice)
//! any state ──cancel──▶ Idle
//! ```
//!
//! Every exit from `Capturing` stops the engine, stops all microphone tracks
//! and bumps the generation, so late engine callbacks are ignored.

use thiserror::Error;

use crate::config::CaptureConfig;
use crate::notice::Notice;

use super::microphone::{MicStream, Microphone};
use super::recognition::{RecognitionEngine, RecognitionErrorKind, RecognitionEvent};
use super::session::RecognitionSession;

// ---------------------------------------------------------------------------
// Errors and outcomes
// ---------------------------------------------------------------------------

/// Errors that can occur while starting or driving a capture.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("microphone access was denied")]
    PermissionDenied,

    #[error("microphone unavailable: {0}")]
    Device(String),

    #[error("speech recognition failed: {0}")]
    Recognition(String),

    #[error("cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: CaptureState,
    },
}

impl CaptureError {
    /// Learner-facing notice for this error, if it should be shown.
    pub fn notice(&self) -> Option<Notice> {
        match self {
            CaptureError::PermissionDenied => Some(Notice::PermissionDenied),
            CaptureError::Device(_) => Some(Notice::MicrophoneUnavailable),
            CaptureError::Recognition(_) => Some(Notice::RecognitionFailed),
            CaptureError::InvalidState { .. } => None,
        }
    }
}

/// Why a release produced nothing to submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    NoSpeechDetected,
    LowConfidence,
}

impl RetryReason {
    pub fn notice(&self) -> Notice {
        match self {
            RetryReason::NoSpeechDetected => Notice::NoSpeechDetected,
            RetryReason::LowConfidence => Notice::LowConfidence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    Capturing,
    /// Waiting for the learner to say whether the transcript is a question.
    Confirming,
}

/// The learner's answer to the confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentenceKind {
    Question,
    Statement,
}

/// Shown after a successful release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationPrompt {
    pub transcript: String,
}

impl ConfirmationPrompt {
    /// What will be submitted for each answer.
    pub fn preview(&self, kind: SentenceKind) -> String {
        punctuate(&self.transcript, kind)
    }
}

/// Result of releasing the gesture: exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Confirm(ConfirmationPrompt),
    Retry(RetryReason),
}

/// What a recognition callback did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Stale generation, wrong state, or a benign error.
    Ignored,
    Updated,
    Restarted,
    /// The capture was torn down; show the notice.
    Aborted(Notice),
}

/// Terminal punctuation for the committed text.
///
/// ```
/// use voice_tutor::capture::{punctuate, SentenceKind};
///
/// assert_eq!(punctuate("밥 먹었어요", SentenceKind::Question), "밥 먹었어요?");
/// assert_eq!(punctuate("밥 먹었어요.", SentenceKind::Question), "밥 먹었어요?");
/// assert_eq!(punctuate("네", SentenceKind::Statement), "네.");
/// assert_eq!(punctuate("좋아요!", SentenceKind::Statement), "좋아요!");
/// ```
pub fn punctuate(text: &str, kind: SentenceKind) -> String {
    let text = text.trim();
    match kind {
        SentenceKind::Question => {
            if text.ends_with('?') {
                text.to_string()
            } else {
                format!("{}?", text.trim_end_matches('.'))
            }
        }
        SentenceKind::Statement => {
            if text.ends_with(['.', '?', '!']) {
                text.to_string()
            } else {
                format!("{text}.")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// VoiceCapture
// ---------------------------------------------------------------------------

pub struct VoiceCapture<E: RecognitionEngine, M: Microphone> {
    engine: E,
    mic: M,
    config: CaptureConfig,
    state: CaptureState,
    generation: u64,
    session: Option<RecognitionSession>,
    stream: Option<Box<dyn MicStream>>,
    pending: Option<String>,
}

impl<E: RecognitionEngine, M: Microphone> VoiceCapture<E, M> {
    pub fn new(engine: E, mic: M, config: &CaptureConfig) -> Self {
        Self {
            engine,
            mic,
            config: config.clone(),
            state: CaptureState::Idle,
            generation: 0,
            session: None,
            stream: None,
            pending: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Generation of the current (or last) capture.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The live session, while capturing.
    pub fn session(&self) -> Option<&RecognitionSession> {
        self.session.as_ref()
    }

    /// Tracks still open on the microphone.
    pub fn live_tracks(&self) -> usize {
        self.stream.as_ref().map_or(0, |s| s.live_tracks())
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Start capturing (gesture pressed).  Returns the generation the
    /// engine's callbacks must carry.
    pub fn press(&mut self) -> Result<u64, CaptureError> {
        if self.state != CaptureState::Idle {
            return Err(CaptureError::InvalidState {
                action: "press",
                state: self.state,
            });
        }

        let stream = self.mic.acquire()?;
        self.stream = Some(stream);
        self.generation += 1;
        self.session = Some(RecognitionSession::new());

        if let Err(e) = self.engine.start(self.generation, &self.config.language) {
            log::warn!("capture: recognition failed to start: {e}");
            self.teardown(false);
            return Err(e);
        }

        self.state = CaptureState::Capturing;
        log::debug!("capture: Idle → Capturing (generation {})", self.generation);
        Ok(self.generation)
    }

    /// Handle an engine callback tagged with `generation`.
    pub fn handle_event(&mut self, generation: u64, event: RecognitionEvent) -> EventOutcome {
        if generation != self.generation || self.state != CaptureState::Capturing {
            log::debug!("capture: ignoring stale event from generation {generation}");
            return EventOutcome::Ignored;
        }

        match event {
            RecognitionEvent::Result(result) => {
                if let Some(session) = self.session.as_mut() {
                    session.apply(result);
                }
                EventOutcome::Updated
            }
            RecognitionEvent::Error(kind) if kind.is_benign() => {
                log::debug!("capture: benign recognition error {kind:?}");
                EventOutcome::Ignored
            }
            RecognitionEvent::Error(kind) => {
                log::warn!("capture: recognition error {kind:?}");
                let notice = match kind {
                    RecognitionErrorKind::NotAllowed => Notice::PermissionDenied,
                    _ => Notice::RecognitionFailed,
                };
                self.teardown(true);
                EventOutcome::Aborted(notice)
            }
            RecognitionEvent::End => self.restart(),
        }
    }

    /// Gesture released.  Always ends in `Idle` or `Confirming`, with the
    /// microphone released.
    pub fn release(&mut self) -> Result<ReleaseOutcome, CaptureError> {
        if self.state != CaptureState::Capturing {
            return Err(CaptureError::InvalidState {
                action: "release",
                state: self.state,
            });
        }

        let session = self.session.take().unwrap_or_default();
        self.teardown(false);

        let transcript = session.transcript();
        if transcript.trim().is_empty() {
            log::debug!("capture: Capturing → Idle (no speech)");
            return Ok(ReleaseOutcome::Retry(RetryReason::NoSpeechDetected));
        }
        if let Some(confidence) = session.confidence() {
            if confidence < self.config.min_confidence {
                log::debug!("capture: Capturing → Idle (confidence {confidence:.2})");
                return Ok(ReleaseOutcome::Retry(RetryReason::LowConfidence));
            }
        }

        self.pending = Some(transcript.clone());
        self.state = CaptureState::Confirming;
        log::debug!("capture: Capturing → Confirming");
        Ok(ReleaseOutcome::Confirm(ConfirmationPrompt { transcript }))
    }

    /// Answer the confirmation prompt; returns the text to submit.
    pub fn confirm(&mut self, kind: SentenceKind) -> Result<String, CaptureError> {
        let Some(transcript) = self.pending.take() else {
            return Err(CaptureError::InvalidState {
                action: "confirm",
                state: self.state,
            });
        };
        self.state = CaptureState::Idle;
        log::debug!("capture: Confirming → Idle ({kind:?})");
        Ok(punctuate(&transcript, kind))
    }

    /// Abandon whatever is in progress.
    pub fn cancel(&mut self) {
        self.pending = None;
        if self.state == CaptureState::Capturing {
            self.teardown(true);
        } else {
            self.generation += 1;
            if let Some(mut stream) = self.stream.take() {
                stream.stop_all();
            }
            self.state = CaptureState::Idle;
        }
        self.session = None;
        log::debug!("capture: cancelled");
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn restart(&mut self) -> EventOutcome {
        let restarts = self.session.as_mut().map_or(1, |s| s.note_restart());
        if restarts > self.config.max_restarts {
            log::warn!("capture: recognition ended {restarts} times in a row, giving up");
            self.teardown(true);
            return EventOutcome::Aborted(Notice::RecognitionFailed);
        }

        match self.engine.start(self.generation, &self.config.language) {
            Ok(()) => {
                log::debug!("capture: recognition restarted ({restarts})");
                EventOutcome::Restarted
            }
            Err(e) => {
                log::warn!("capture: recognition restart failed: {e}");
                self.teardown(true);
                EventOutcome::Aborted(Notice::RecognitionFailed)
            }
        }
    }

    /// Stop the engine (abort or graceful stop), release the microphone and
    /// invalidate outstanding callbacks.  Leaves the state `Idle`.
    fn teardown(&mut self, abort: bool) {
        self.generation += 1;
        if abort {
            self.engine.abort();
        } else {
            self.engine.stop();
        }
        if let Some(mut stream) = self.stream.take() {
            stream.stop_all();
        }
        self.session = None;
        self.state = CaptureState::Idle;
    }
}

impl<E: RecognitionEngine, M: Microphone> Drop for VoiceCapture<E, M> {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop_all();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
