//! Korean conversation tutor.
//!
//! A learner speaks or types a Korean sentence.  Each turn runs in two
//! stages: the sentence is checked first, and only an acceptable sentence
//! earns a teaching reply with vocabulary and grammar notes.  Replies are
//! synthesized and their text is revealed in step with the audio.
//!
//! | Module           | Role                                              |
//! |------------------|---------------------------------------------------|
//! | [`config`]       | `settings.toml`, session settings                 |
//! | [`relay`]        | HTTP relay to the model and speech provider       |
//! | [`tutor`]        | prompts, response extraction, annotation filter   |
//! | [`conversation`] | message log and two-stage turn orchestrator       |
//! | [`playback`]     | synthesis, audio output, progressive reveal       |
//! | [`capture`]      | push-to-talk voice capture state machine          |
//! | [`notice`]       | localized learner-facing notices                  |

pub mod capture;
pub mod config;
pub mod conversation;
pub mod notice;
pub mod playback;
pub mod relay;
pub mod tutor;
