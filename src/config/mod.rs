//! Configuration module for the voice tutor.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each subsystem,
//! the learner-editable [`SessionSettings`], `AppPaths` for cross-platform
//! directories, and TOML persistence via `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, CaptureConfig, RelayConfig, SessionSettings, SpeechConfig, TutorConfig, UiConfig,
    Voice, MAX_SPEECH_RATE, MIN_SPEECH_RATE,
};
