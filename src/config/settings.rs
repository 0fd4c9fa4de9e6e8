//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and handed to the
//! orchestrator by value.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::notice::Locale;
use crate::tutor::Script;

/// Lower bound of the learner-adjustable speech rate.
pub const MIN_SPEECH_RATE: f32 = 0.5;
/// Upper bound of the learner-adjustable speech rate.
pub const MAX_SPEECH_RATE: f32 = 1.5;

// ---------------------------------------------------------------------------
// Voice
// ---------------------------------------------------------------------------

/// Voice used for synthesized replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Female,
    Male,
}

impl Voice {
    /// Provider voice identifier sent with the synthesis request.
    pub fn provider_id(&self) -> &'static str {
        match self {
            Voice::Female => "nova",
            Voice::Male => "onyx",
        }
    }
}

impl Default for Voice {
    fn default() -> Self {
        Self::Female
    }
}

// ---------------------------------------------------------------------------
// SessionSettings
// ---------------------------------------------------------------------------

/// Learner-editable settings for the current session.
///
/// Passed explicitly into every turn; nothing reads these from a global.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Voice for synthesized replies.
    pub voice: Voice,
    /// Synthesis speed, always inside `[0.5, 1.5]`.
    speech_rate: f32,
    /// Grammar pattern tags the learner already knows.  Only used to bias
    /// the difficulty of the teaching reply.
    pub known_grammar: BTreeSet<String>,
}

impl SessionSettings {
    pub fn speech_rate(&self) -> f32 {
        self.speech_rate
    }

    /// Set the speech rate, clamped into `[0.5, 1.5]`.
    pub fn set_speech_rate(&mut self, rate: f32) {
        let rate = if rate.is_finite() { rate } else { 1.0 };
        self.speech_rate = rate.clamp(MIN_SPEECH_RATE, MAX_SPEECH_RATE);
    }

    /// Nudge the speech rate by `delta`, rounded to one decimal place.
    ///
    /// ```
    /// use voice_tutor::config::SessionSettings;
    ///
    /// let mut s = SessionSettings::default();
    /// s.adjust_speech_rate(0.1);
    /// assert!((s.speech_rate() - 1.0).abs() < 1e-6);
    /// ```
    pub fn adjust_speech_rate(&mut self, delta: f32) {
        let next = ((self.speech_rate + delta) * 10.0).round() / 10.0;
        self.set_speech_rate(next);
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            voice: Voice::default(),
            speech_rate: 0.9,
            known_grammar: BTreeSet::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// RelayConfig
// ---------------------------------------------------------------------------

/// Where the authentication relay lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Full URL of the relay endpoint that accepts `{endpoint, method, body}`.
    pub url: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000/api/openai".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// TutorConfig
// ---------------------------------------------------------------------------

/// Settings for the correction and teaching stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorConfig {
    /// Chat model identifier sent through the relay.
    pub model: String,
    /// Language the learner is practising (used in prompts).
    pub target_language: String,
    /// Language used for explanations and meanings.
    pub explanation_language: String,
    /// Writing system kept when a teaching reply has to be salvaged from
    /// prose.
    pub script: Script,
    /// Sampling temperature for the correction stage.
    pub correction_temperature: f32,
    /// Sampling temperature for the teaching stage.
    pub teaching_temperature: f32,
    /// Maximum seconds to wait for the correction verdict.
    pub correction_timeout_secs: u64,
    /// Maximum seconds to wait for the teaching reply.
    pub teaching_timeout_secs: u64,
    /// Number of prior messages sent as rolling context.
    pub context_window: usize,
    /// Reply used when the teaching stage cannot be reached.
    pub fallback_reply: String,
}

impl TutorConfig {
    pub fn correction_timeout(&self) -> Duration {
        Duration::from_secs(self.correction_timeout_secs)
    }

    pub fn teaching_timeout(&self) -> Duration {
        Duration::from_secs(self.teaching_timeout_secs)
    }
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            target_language: "Korean".into(),
            explanation_language: "Vietnamese".into(),
            script: Script::Hangul,
            correction_temperature: 0.03,
            teaching_temperature: 0.6,
            correction_timeout_secs: 9,
            teaching_timeout_secs: 14,
            context_window: 6,
            fallback_reply: "죄송합니다. 다시 말씀해 주세요.".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

/// Settings for speech synthesis and synchronized playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Synthesis model identifier.
    pub model: String,
    /// Maximum seconds to wait for synthesized audio.
    pub timeout_secs: u64,
    /// Reveal assistant text progressively while the audio plays.
    pub reveal_text: bool,
    /// Floor for the per-character reveal interval, in milliseconds.
    pub min_reveal_interval_ms: u64,
}

impl SpeechConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn min_reveal_interval(&self) -> Duration {
        Duration::from_millis(self.min_reveal_interval_ms)
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            model: "tts-1".into(),
            timeout_secs: 20,
            reveal_text: true,
            min_reveal_interval_ms: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

/// Settings for voice capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// BCP-47 tag handed to the recognition engine (e.g. `"ko-KR"`).
    pub language: String,
    /// Transcripts below this confidence are not submitted.
    pub min_confidence: f32,
    /// Cap on consecutive automatic recognition restarts within one capture.
    pub max_restarts: u32,
    /// Transcription model used by the relay-backed recognizer.
    pub transcription_model: String,
    /// Maximum seconds to wait for a transcription.
    pub transcription_timeout_secs: u64,
    /// Recordings shorter than this are treated as silence.
    pub min_speech_ms: u64,
}

impl CaptureConfig {
    pub fn transcription_timeout(&self) -> Duration {
        Duration::from_secs(self.transcription_timeout_secs)
    }

    pub fn min_speech(&self) -> Duration {
        Duration::from_millis(self.min_speech_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            language: "ko-KR".into(),
            min_confidence: 0.3,
            max_restarts: 50,
            transcription_model: "whisper-1".into(),
            transcription_timeout_secs: 15,
            min_speech_ms: 300,
        }
    }
}

// ---------------------------------------------------------------------------
// UiConfig
// ---------------------------------------------------------------------------

/// Front-end settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// Language of learner-facing notices.
    pub locale: Locale,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            locale: Locale::Vietnamese,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voice_tutor::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub relay: RelayConfig,
    pub tutor: TutorConfig,
    pub speech: SpeechConfig,
    pub capture: CaptureConfig,
    pub session: SessionSettings,
    pub ui: UiConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// so callers never need to special-case a missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        // Hand-edited files may carry an out-of-range rate.
        let rate = config.session.speech_rate;
        config.session.set_speech_rate(rate);
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original.relay.url, loaded.relay.url);
        assert_eq!(original.tutor.model, loaded.tutor.model);
        assert_eq!(original.tutor.script, loaded.tutor.script);
        assert_eq!(
            original.tutor.correction_timeout_secs,
            loaded.tutor.correction_timeout_secs
        );
        assert_eq!(original.tutor.fallback_reply, loaded.tutor.fallback_reply);
        assert_eq!(original.speech.model, loaded.speech.model);
        assert_eq!(original.capture.language, loaded.capture.language);
        assert_eq!(original.session, loaded.session);
        assert_eq!(original.ui.locale, loaded.ui.locale);
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.tutor.model, "gpt-4o-mini");
        assert_eq!(config.session, SessionSettings::default());
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.tutor.correction_timeout(), Duration::from_secs(9));
        assert_eq!(cfg.tutor.teaching_timeout(), Duration::from_secs(14));
        assert_eq!(cfg.speech.timeout(), Duration::from_secs(20));
        assert_eq!(cfg.tutor.context_window, 6);
        assert_eq!(cfg.session.voice, Voice::Female);
        assert!((cfg.session.speech_rate() - 0.9).abs() < 1e-6);
        assert!(cfg.session.known_grammar.is_empty());
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.relay.url = "https://tutor.example/relay".into();
        cfg.session.voice = Voice::Male;
        cfg.session.set_speech_rate(1.3);
        cfg.session.known_grammar.insert("-아요/어요".into());
        cfg.ui.locale = Locale::English;

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.relay.url, "https://tutor.example/relay");
        assert_eq!(loaded.session.voice, Voice::Male);
        assert!((loaded.session.speech_rate() - 1.3).abs() < 1e-6);
        assert!(loaded.session.known_grammar.contains("-아요/어요"));
        assert_eq!(loaded.ui.locale, Locale::English);
    }

    #[test]
    fn out_of_range_rate_in_file_is_clamped() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("rate.toml");

        let mut table: toml::Table =
            toml::from_str(&toml::to_string_pretty(&AppConfig::default()).unwrap()).unwrap();
        table["session"]
            .as_table_mut()
            .unwrap()
            .insert("speech_rate".into(), toml::Value::Float(4.0));
        std::fs::write(&path, toml::to_string_pretty(&table).unwrap()).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert!((loaded.session.speech_rate() - MAX_SPEECH_RATE).abs() < 1e-6);
    }

    #[test]
    fn speech_rate_is_clamped() {
        let mut s = SessionSettings::default();
        s.set_speech_rate(3.0);
        assert!((s.speech_rate() - 1.5).abs() < 1e-6);
        s.set_speech_rate(0.1);
        assert!((s.speech_rate() - 0.5).abs() < 1e-6);
        s.set_speech_rate(f32::NAN);
        assert!((s.speech_rate() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn adjusting_rate_stops_at_bounds() {
        let mut s = SessionSettings::default();
        for _ in 0..20 {
            s.adjust_speech_rate(0.1);
        }
        assert!((s.speech_rate() - 1.5).abs() < 1e-6);
        for _ in 0..20 {
            s.adjust_speech_rate(-0.1);
        }
        assert!((s.speech_rate() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn voice_maps_to_provider_ids() {
        assert_eq!(Voice::Female.provider_id(), "nova");
        assert_eq!(Voice::Male.provider_id(), "onyx");
    }
}
