//! Relay-backed recognition engine.
//!
//! [`RelayTranscriber`] records through the [`SharedRecording`] that the
//! microphone feeds.  [`finish`](RelayTranscriber::finish) sends the clip to
//! the relay's transcription endpoint and reports the text as one final
//! result; `stop`/`abort` end the engine with [`RecognitionEvent::End`].
//! Every event carries the generation it was started with.
//!
//! Platform glue calls `finish` before [`VoiceCapture::release`], then
//! feeds the queued events to [`VoiceCapture::handle_event`]:
//!
//! ```text
//! press ─▶ start(gen) ─▶ recording.begin()
//! Enter ─▶ finish() ─▶ relay /v1/audio/transcriptions ─▶ (gen, Result(final))
//!        ─▶ handle_event(gen, ..) ─▶ release()
//! ```
//!
//! [`VoiceCapture::release`]: super::VoiceCapture::release
//! [`VoiceCapture::handle_event`]: super::VoiceCapture::handle_event

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::sync::mpsc;

use crate::config::CaptureConfig;
use crate::relay::{Endpoint, Relay, RelayRequest};

use super::machine::CaptureError;
use super::recognition::{
    RecognitionEngine, RecognitionErrorKind, RecognitionEvent, RecognitionResult,
};
use super::recording::{encode_wav, lock_recording, MonoClip, SharedRecording};

/// Generation-tagged engine events.
pub type RecognitionSender = mpsc::UnboundedSender<(u64, RecognitionEvent)>;

pub struct RelayTranscriber {
    relay: Arc<dyn Relay>,
    recording: SharedRecording,
    events: RecognitionSender,
    model: String,
    timeout: Duration,
    min_speech: Duration,
    /// Generation of the running recognition, if any.
    generation: Option<u64>,
    language: String,
}

impl RelayTranscriber {
    pub fn new(
        relay: Arc<dyn Relay>,
        recording: SharedRecording,
        events: RecognitionSender,
        config: &CaptureConfig,
    ) -> Self {
        Self {
            relay,
            recording,
            events,
            model: config.transcription_model.clone(),
            timeout: config.transcription_timeout(),
            min_speech: config.min_speech(),
            generation: None,
            language: config.language.clone(),
        }
    }

    /// Generation of the running recognition.
    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    /// Stop recording, transcribe what was heard and queue the result.
    ///
    /// Silence and clips shorter than `min_speech` are reported as
    /// `no-speech`; relay failures as a network error.  Does nothing when
    /// no recognition is running.
    pub async fn finish(&self) {
        let Some(generation) = self.generation else {
            log::debug!("transcriber: finish without a running recognition");
            return;
        };
        let clip = lock_recording(&self.recording).take();
        let event = self.transcribe(clip).await;
        self.emit(generation, event);
    }

    async fn transcribe(&self, clip: MonoClip) -> RecognitionEvent {
        let length = clip.duration();
        if length < self.min_speech {
            log::debug!("transcriber: clip too short ({length:?})");
            return RecognitionEvent::Error(RecognitionErrorKind::NoSpeech);
        }

        let wav = match encode_wav(&clip) {
            Ok(wav) => wav,
            Err(e) => {
                log::error!("transcriber: {e}");
                return RecognitionEvent::Error(RecognitionErrorKind::Other(e.to_string()));
            }
        };

        let body = serde_json::json!({
            "model": self.model,
            "file": STANDARD.encode(&wav),
            "format": "wav",
            "language": language_code(&self.language),
        });
        log::debug!("transcriber: sending {length:?} of audio ({} bytes)", wav.len());

        let response = self
            .relay
            .send(RelayRequest::post(Endpoint::AudioTranscriptions, body), self.timeout)
            .await
            .and_then(|r| r.into_json());

        match response {
            Ok(json) => match json.get("text").and_then(|t| t.as_str()).map(str::trim) {
                Some(text) if !text.is_empty() => {
                    RecognitionEvent::Result(RecognitionResult::final_(text, None))
                }
                _ => RecognitionEvent::Error(RecognitionErrorKind::NoSpeech),
            },
            Err(e) => {
                log::warn!("transcriber: relay call failed: {e}");
                RecognitionEvent::Error(RecognitionErrorKind::Network)
            }
        }
    }

    fn emit(&self, generation: u64, event: RecognitionEvent) {
        if self.events.send((generation, event)).is_err() {
            log::debug!("transcriber: event receiver dropped");
        }
    }
}

impl RecognitionEngine for RelayTranscriber {
    fn start(&mut self, generation: u64, language: &str) -> Result<(), CaptureError> {
        let mut recording = lock_recording(&self.recording);
        if self.generation == Some(generation) {
            // Restart within the same capture keeps what was recorded.
            recording.resume();
        } else {
            recording.begin();
        }
        self.generation = Some(generation);
        self.language = language.to_string();
        Ok(())
    }

    fn stop(&mut self) {
        lock_recording(&self.recording).end();
        if let Some(generation) = self.generation.take() {
            self.emit(generation, RecognitionEvent::End);
        }
    }

    fn abort(&mut self) {
        lock_recording(&self.recording).discard();
        if let Some(generation) = self.generation.take() {
            self.emit(generation, RecognitionEvent::End);
        }
    }
}

/// `"ko-KR"` → `"ko"`.
fn language_code(tag: &str) -> &str {
    tag.split(['-', '_']).next().unwrap_or(tag)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{
        new_shared_recording, CaptureState, MicStream, Microphone, ReleaseOutcome, RetryReason,
        VoiceCapture,
    };
    use crate::relay::{RelayError, RelayResponse};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedRelay {
        responses: Mutex<VecDeque<Result<RelayResponse, RelayError>>>,
        seen: Mutex<Vec<RelayRequest>>,
    }

    impl ScriptedRelay {
        fn new(responses: Vec<Result<RelayResponse, RelayError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Relay for ScriptedRelay {
        async fn send(
            &self,
            request: RelayRequest,
            _timeout: Duration,
        ) -> Result<RelayResponse, RelayError> {
            self.seen.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RelayError::Request("no scripted response".into())))
        }
    }

    fn text(t: &str) -> Result<RelayResponse, RelayError> {
        Ok(RelayResponse::Json(serde_json::json!({ "text": t })))
    }

    type Events = mpsc::UnboundedReceiver<(u64, RecognitionEvent)>;

    fn transcriber(relay: Arc<ScriptedRelay>) -> (RelayTranscriber, SharedRecording, Events) {
        let recording = new_shared_recording();
        lock_recording(&recording).set_format(16_000, 1);
        let (tx, rx) = mpsc::unbounded_channel();
        let t = RelayTranscriber::new(relay, Arc::clone(&recording), tx, &CaptureConfig::default());
        (t, recording, rx)
    }

    fn speak(recording: &SharedRecording, millis: usize) {
        lock_recording(recording).push(&vec![0.25; 16 * millis]);
    }

    fn drain(rx: &mut Events) -> Vec<(u64, RecognitionEvent)> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    #[tokio::test]
    async fn finish_reports_a_tagged_final_result() {
        let relay = ScriptedRelay::new(vec![text(" 저는 학생이에요 ")]);
        let (mut t, recording, mut rx) = transcriber(relay.clone());

        t.start(4, "ko-KR").unwrap();
        speak(&recording, 800);
        t.finish().await;

        assert_eq!(
            drain(&mut rx),
            vec![(
                4,
                RecognitionEvent::Result(RecognitionResult::final_("저는 학생이에요", None))
            )]
        );

        let seen = relay.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind(), Endpoint::AudioTranscriptions);
        assert_eq!(seen[0].endpoint, "/v1/audio/transcriptions");
        assert_eq!(seen[0].body["model"], "whisper-1");
        assert_eq!(seen[0].body["language"], "ko");
        let wav = STANDARD.decode(seen[0].body["file"].as_str().unwrap()).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
    }

    #[tokio::test]
    async fn short_clip_is_no_speech_without_a_relay_call() {
        let relay = ScriptedRelay::new(vec![]);
        let (mut t, recording, mut rx) = transcriber(relay.clone());

        t.start(1, "ko-KR").unwrap();
        speak(&recording, 100);
        t.finish().await;

        assert_eq!(
            drain(&mut rx),
            vec![(1, RecognitionEvent::Error(RecognitionErrorKind::NoSpeech))]
        );
        assert!(relay.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_transcript_is_no_speech() {
        let (mut t, recording, mut rx) = transcriber(ScriptedRelay::new(vec![text("  ")]));
        t.start(1, "ko-KR").unwrap();
        speak(&recording, 500);
        t.finish().await;
        assert_eq!(
            drain(&mut rx),
            vec![(1, RecognitionEvent::Error(RecognitionErrorKind::NoSpeech))]
        );
    }

    #[tokio::test]
    async fn relay_failure_is_a_network_error() {
        let relay = ScriptedRelay::new(vec![Err(RelayError::Timeout(Duration::from_secs(15)))]);
        let (mut t, recording, mut rx) = transcriber(relay);
        t.start(2, "ko-KR").unwrap();
        speak(&recording, 500);
        t.finish().await;
        assert_eq!(
            drain(&mut rx),
            vec![(2, RecognitionEvent::Error(RecognitionErrorKind::Network))]
        );
    }

    #[tokio::test]
    async fn finish_without_start_is_silent() {
        let (t, _recording, mut rx) = transcriber(ScriptedRelay::new(vec![]));
        t.finish().await;
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn stop_and_abort_end_the_generation() {
        let (mut t, recording, mut rx) = transcriber(ScriptedRelay::new(vec![]));

        t.start(3, "ko-KR").unwrap();
        speak(&recording, 100);
        t.stop();
        assert!(!lock_recording(&recording).is_active());
        t.stop();
        assert_eq!(drain(&mut rx), vec![(3, RecognitionEvent::End)]);

        t.start(4, "ko-KR").unwrap();
        speak(&recording, 100);
        t.abort();
        assert_eq!(drain(&mut rx), vec![(4, RecognitionEvent::End)]);
        assert!(lock_recording(&recording).take().samples.is_empty());
        assert_eq!(t.generation(), None);
    }

    #[test]
    fn restart_in_same_generation_keeps_audio() {
        let (mut t, recording, _rx) = transcriber(ScriptedRelay::new(vec![]));

        t.start(1, "ko-KR").unwrap();
        speak(&recording, 100);
        t.start(1, "ko-KR").unwrap();
        speak(&recording, 100);
        assert_eq!(lock_recording(&recording).take().samples.len(), 3_200);

        t.start(1, "ko-KR").unwrap();
        speak(&recording, 100);
        t.start(2, "ko-KR").unwrap();
        assert!(lock_recording(&recording).take().samples.is_empty());
    }

    #[test]
    fn language_tags_are_reduced_to_codes() {
        assert_eq!(language_code("ko-KR"), "ko");
        assert_eq!(language_code("en_US"), "en");
        assert_eq!(language_code("ko"), "ko");
    }

    // -----------------------------------------------------------------------
    // With the capture machine
    // -----------------------------------------------------------------------

    struct Stream;

    impl MicStream for Stream {
        fn live_tracks(&self) -> usize {
            1
        }
        fn stop_all(&mut self) {}
    }

    struct Mic;

    impl Microphone for Mic {
        fn acquire(&mut self) -> Result<Box<dyn MicStream>, CaptureError> {
            Ok(Box::new(Stream))
        }
    }

    async fn talk(
        capture: &mut VoiceCapture<RelayTranscriber, Mic>,
        rx: &mut Events,
    ) -> ReleaseOutcome {
        capture.engine().finish().await;
        for (generation, event) in drain(rx) {
            capture.handle_event(generation, event);
        }
        capture.release().unwrap()
    }

    #[tokio::test]
    async fn press_talk_release_yields_confirmation() {
        let (t, recording, mut rx) = transcriber(ScriptedRelay::new(vec![text("밥 먹었어요")]));
        let mut capture = VoiceCapture::new(t, Mic, &CaptureConfig::default());

        capture.press().unwrap();
        speak(&recording, 600);

        match talk(&mut capture, &mut rx).await {
            ReleaseOutcome::Confirm(prompt) => assert_eq!(prompt.transcript, "밥 먹었어요"),
            other => panic!("expected confirmation, got {other:?}"),
        }
        assert_eq!(capture.state(), CaptureState::Confirming);

        // The End from stop() belongs to a finished generation.
        for (generation, event) in drain(&mut rx) {
            assert_eq!(
                capture.handle_event(generation, event),
                crate::capture::EventOutcome::Ignored
            );
        }
    }

    #[tokio::test]
    async fn silence_yields_retry() {
        let (t, recording, mut rx) = transcriber(ScriptedRelay::new(vec![]));
        let mut capture = VoiceCapture::new(t, Mic, &CaptureConfig::default());

        capture.press().unwrap();
        speak(&recording, 50);

        assert_eq!(
            talk(&mut capture, &mut rx).await,
            ReleaseOutcome::Retry(RetryReason::NoSpeechDetected)
        );
        assert_eq!(capture.state(), CaptureState::Idle);
    }
}
