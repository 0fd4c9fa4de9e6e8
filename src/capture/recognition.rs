//! Speech-recognition engine seam.
//!
//! The engine is platform glue: it is started with a generation number and
//! tags every callback with it, so the state machine can drop callbacks that
//! arrive after the capture they belong to has ended.

use super::machine::CaptureError;

/// One recognition hypothesis.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub transcript: String,
    pub is_final: bool,
    /// `[0, 1]`; engines that do not report one send `None`.
    pub confidence: Option<f32>,
}

impl RecognitionResult {
    pub fn interim(transcript: &str, confidence: Option<f32>) -> Self {
        Self {
            transcript: transcript.to_string(),
            is_final: false,
            confidence,
        }
    }

    pub fn final_(transcript: &str, confidence: Option<f32>) -> Self {
        Self {
            transcript: transcript.to_string(),
            is_final: true,
            confidence,
        }
    }
}

/// Error codes reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    NoSpeech,
    Aborted,
    NotAllowed,
    AudioCapture,
    Network,
    Other(String),
}

impl RecognitionErrorKind {
    /// Map a platform error code (`"no-speech"`, `"not-allowed"`, ...).
    ///
    /// ```
    /// use voice_tutor::capture::RecognitionErrorKind;
    ///
    /// assert_eq!(RecognitionErrorKind::from_code("no-speech"), RecognitionErrorKind::NoSpeech);
    /// assert_eq!(RecognitionErrorKind::from_code("service-not-allowed"), RecognitionErrorKind::NotAllowed);
    /// assert!(RecognitionErrorKind::from_code("aborted").is_benign());
    /// ```
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => Self::NoSpeech,
            "aborted" => Self::Aborted,
            "not-allowed" | "service-not-allowed" => Self::NotAllowed,
            "audio-capture" => Self::AudioCapture,
            "network" => Self::Network,
            other => Self::Other(other.to_string()),
        }
    }

    /// Benign errors end the engine but not the capture; it is restarted.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::NoSpeech | Self::Aborted)
    }
}

/// Callback payloads, delivered through
/// [`VoiceCapture::handle_event`](super::VoiceCapture::handle_event).
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    Result(RecognitionResult),
    Error(RecognitionErrorKind),
    /// The engine stopped, on request or spontaneously.
    End,
}

/// Continuous recognition with interim results.
pub trait RecognitionEngine {
    /// Begin recognising `language`; tag callbacks with `generation`.
    fn start(&mut self, generation: u64, language: &str) -> Result<(), CaptureError>;

    /// Stop and deliver any pending final result.
    fn stop(&mut self);

    /// Stop and discard pending results.
    fn abort(&mut self);
}
