//! Speech synthesis seam and the relay-backed implementation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{SessionSettings, SpeechConfig};
use crate::relay::{Endpoint, Relay, RelayRequest};

use super::player::PlaybackError;

/// Turns text into encoded audio bytes (MP3 from the relay).
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        settings: &SessionSettings,
    ) -> Result<Vec<u8>, PlaybackError>;
}

/// Posts `{model, input, voice, speed}` to the speech endpoint.
pub struct RelaySynthesizer {
    relay: Arc<dyn Relay>,
    config: SpeechConfig,
}

impl RelaySynthesizer {
    pub fn from_config(relay: Arc<dyn Relay>, config: &SpeechConfig) -> Self {
        Self {
            relay,
            config: config.clone(),
        }
    }

    fn body(&self, text: &str, settings: &SessionSettings) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "input": text,
            "voice": settings.voice.provider_id(),
            "speed": settings.speech_rate(),
        })
    }
}

#[async_trait]
impl Synthesizer for RelaySynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        settings: &SessionSettings,
    ) -> Result<Vec<u8>, PlaybackError> {
        let request = RelayRequest::post(Endpoint::AudioSpeech, self.body(text, settings));
        let audio = self
            .relay
            .send(request, self.config.timeout())
            .await?
            .into_audio()?;

        if audio.is_empty() {
            return Err(PlaybackError::Decode("synthesizer returned no audio".into()));
        }
        Ok(audio)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Voice;
    use crate::relay::{RelayError, RelayResponse};
    use std::sync::Mutex;
    use std::time::Duration;

    struct CannedRelay {
        response: Mutex<Option<RelayResponse>>,
        seen: Mutex<Vec<(RelayRequest, Duration)>>,
    }

    impl CannedRelay {
        fn new(response: RelayResponse) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Some(response)),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Relay for CannedRelay {
        async fn send(
            &self,
            request: RelayRequest,
            timeout: Duration,
        ) -> Result<RelayResponse, RelayError> {
            self.seen.lock().unwrap().push((request, timeout));
            self.response
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| RelayError::Request("exhausted".into()))
        }
    }

    #[tokio::test]
    async fn sends_voice_and_rate_from_settings() {
        let relay = CannedRelay::new(RelayResponse::Audio(vec![0xFF, 0xFB]));
        let synth = RelaySynthesizer::from_config(relay.clone(), &SpeechConfig::default());

        let mut settings = SessionSettings::default();
        settings.voice = Voice::Male;
        settings.set_speech_rate(1.2);

        let audio = synth.synthesize("안녕하세요,, 반가워요.", &settings).await.unwrap();
        assert_eq!(audio, vec![0xFF, 0xFB]);

        let seen = relay.seen.lock().unwrap();
        let (req, timeout) = &seen[0];
        assert_eq!(req.endpoint, "/v1/audio/speech");
        assert_eq!(*timeout, Duration::from_secs(20));
        assert_eq!(req.body["model"], "tts-1");
        assert_eq!(req.body["voice"], "onyx");
        assert_eq!(req.body["input"], "안녕하세요,, 반가워요.");
        let speed = req.body["speed"].as_f64().unwrap();
        assert!((speed - 1.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn json_body_is_rejected() {
        let relay = CannedRelay::new(RelayResponse::Json(serde_json::json!({})));
        let synth = RelaySynthesizer::from_config(relay, &SpeechConfig::default());
        let err = synth
            .synthesize("네", &SessionSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::Synthesis(RelayError::UnexpectedBody { .. })));
    }

    #[tokio::test]
    async fn empty_audio_is_a_decode_error() {
        let relay = CannedRelay::new(RelayResponse::Audio(Vec::new()));
        let synth = RelaySynthesizer::from_config(relay, &SpeechConfig::default());
        let err = synth
            .synthesize("네", &SessionSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::Decode(_)));
    }
}
