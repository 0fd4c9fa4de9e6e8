//! Voice capture — microphone → continuous recognition → confirmation.
//!
//! # Flow
//!
//! ```text
//! press ─▶ Microphone::acquire ─▶ RecognitionEngine::start(generation)
//!            engine callbacks ─▶ VoiceCapture::handle_event(generation, event)
//! release ─▶ stop engine + stop all tracks ─▶ ConfirmationPrompt | RetryReason
//! confirm(Question | Statement) ─▶ punctuated text ─▶ TurnCommand::Submit
//! ```
//!
//! The machine is single-threaded.  Platform glue owns the recognition
//! engine and forwards its callbacks.  [`RelayTranscriber`] is the built-in
//! engine: [`CpalMicrophone`] records into a [`SharedRecording`] and the
//! clip is transcribed through the relay when the learner lets go.

pub mod machine;
pub mod microphone;
pub mod recognition;
pub mod recording;
pub mod session;
pub mod transcriber;

pub use machine::{
    punctuate, CaptureError, CaptureState, ConfirmationPrompt, EventOutcome, ReleaseOutcome,
    RetryReason, SentenceKind, VoiceCapture,
};
pub use microphone::{probe_permission, CpalMicrophone, MicStream, Microphone, Permission};
pub use recognition::{
    RecognitionEngine, RecognitionErrorKind, RecognitionEvent, RecognitionResult,
};
pub use recording::{
    encode_wav, lock_recording, new_shared_recording, to_mono, MonoClip, Recording,
    SharedRecording,
};
pub use session::RecognitionSession;
pub use transcriber::{RecognitionSender, RelayTranscriber};
