//! Playback synchronizer: fetch once, cache per message, play one at a time.
//!
//! [`PlaybackSynchronizer`] asks a [`Synthesizer`] for audio, wraps the bytes
//! in an [`AudioHandle`] that is cached per message, and hands it to an
//! [`AudioOutput`].  Replaying a message reuses the cached handle.
//!
//! Every call takes a ticket.  A fetch that completes after a newer playback
//! was requested is still cached but does not become audible.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;

use crate::config::SessionSettings;
use crate::conversation::MessageId;
use crate::relay::RelayError;

use super::output::AudioOutput;
use super::synth::Synthesizer;

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

/// Errors that can occur while fetching or playing synthesized speech.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The synthesis request failed or timed out.
    #[error("speech synthesis failed: {0}")]
    Synthesis(#[from] RelayError),

    /// No usable output device, or the device refused the stream.
    #[error("audio output unavailable: {0}")]
    Device(String),

    /// The returned bytes could not be decoded as audio.
    #[error("failed to decode audio: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// AudioHandle
// ---------------------------------------------------------------------------

/// Replayable reference to synthesized audio for one message.
///
/// Cheap to clone; the bytes are shared.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioHandle {
    uri: String,
    bytes: Arc<[u8]>,
}

impl AudioHandle {
    /// ```
    /// use voice_tutor::conversation::MessageId;
    /// use voice_tutor::playback::AudioHandle;
    ///
    /// let handle = AudioHandle::for_message(MessageId(42), vec![1, 2, 3]);
    /// assert_eq!(handle.uri(), "audio://message/42");
    /// assert_eq!(handle.len(), 3);
    /// ```
    pub fn for_message(id: MessageId, bytes: Vec<u8>) -> Self {
        Self {
            uri: format!("audio://message/{}", id.0),
            bytes: bytes.into(),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for AudioHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioHandle")
            .field("uri", &self.uri)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PlaybackReport
// ---------------------------------------------------------------------------

/// What happened to one playback request.
#[derive(Debug, Clone)]
pub struct PlaybackReport {
    pub handle: AudioHandle,
    /// `true` when the handle came from the synthesizer rather than the cache.
    pub fetched: bool,
    /// `false` when a newer playback superseded this one before it started.
    pub audible: bool,
    /// Measured length of the audio, when the output could tell.
    pub duration: Option<Duration>,
}

// ---------------------------------------------------------------------------
// PlaybackSynchronizer
// ---------------------------------------------------------------------------

pub struct PlaybackSynchronizer {
    synth: Arc<dyn Synthesizer>,
    output: Arc<dyn AudioOutput>,
    cache: Mutex<HashMap<MessageId, AudioHandle>>,
    latest: AtomicU64,
    /// Bumped by [`clear`](Self::clear); fetches started earlier are not cached.
    epoch: AtomicU64,
}

impl PlaybackSynchronizer {
    pub fn new(synth: Arc<dyn Synthesizer>, output: Arc<dyn AudioOutput>) -> Self {
        Self {
            synth,
            output,
            cache: Mutex::new(HashMap::new()),
            latest: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
        }
    }

    /// The cached handle for `id`, if audio was ever fetched for it.
    pub fn handle(&self, id: MessageId) -> Option<AudioHandle> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Play `text` for message `id` once, fetching audio only if no handle is
    /// cached yet.  Anything currently audible is stopped first.
    pub async fn play(
        &self,
        id: MessageId,
        text: &str,
        settings: &SessionSettings,
    ) -> Result<PlaybackReport, PlaybackError> {
        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let epoch = self.epoch.load(Ordering::SeqCst);

        let (handle, fetched) = match self.handle(id) {
            Some(handle) => (handle, false),
            None => {
                log::debug!("playback: synthesizing {} chars for message {}", text.chars().count(), id.0);
                let bytes = self.synth.synthesize(text, settings).await?;
                (self.remember(id, epoch, AudioHandle::for_message(id, bytes)), true)
            }
        };

        if self.latest.load(Ordering::SeqCst) != ticket {
            log::debug!("playback: message {} superseded before it started", id.0);
            return Ok(PlaybackReport {
                handle,
                fetched,
                audible: false,
                duration: None,
            });
        }

        // Decoding is CPU-bound; keep it off the event loop.
        let output = Arc::clone(&self.output);
        let clip = handle.clone();
        let duration = tokio::task::spawn_blocking(move || output.play(clip.bytes()))
            .await
            .map_err(|e| PlaybackError::Device(format!("output task failed: {e}")))??;
        Ok(PlaybackReport {
            handle,
            fetched,
            audible: true,
            duration,
        })
    }

    /// Replay a message.  Same as [`play`](Self::play); a cached handle is
    /// never fetched again.
    pub async fn replay(
        &self,
        id: MessageId,
        text: &str,
        settings: &SessionSettings,
    ) -> Result<PlaybackReport, PlaybackError> {
        log::debug!("playback: replay requested for message {}", id.0);
        self.play(id, text, settings).await
    }

    /// Silence whatever is playing and invalidate in-flight requests.
    pub fn stop(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
        self.output.stop();
    }

    /// Drop every cached handle (conversation reset).
    pub fn clear(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        cache.clear();
    }

    /// Insert `handle` unless one is already cached; return the cached one.
    /// A fetch that started before the last [`clear`](Self::clear) is
    /// returned without being cached.
    fn remember(&self, id: MessageId, epoch: u64, handle: AudioHandle) -> AudioHandle {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if self.epoch.load(Ordering::SeqCst) != epoch {
            log::debug!("playback: dropping audio for message {} fetched before reset", id.0);
            return handle;
        }
        cache
            .entry(id)
            .or_insert(handle)
            .clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Returns the text's bytes as "audio" and counts calls.
    #[derive(Default)]
    pub(crate) struct EchoSynth {
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl Synthesizer for EchoSynth {
        async fn synthesize(
            &self,
            text: &str,
            _settings: &SessionSettings,
        ) -> Result<Vec<u8>, PlaybackError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.as_bytes().to_vec())
        }
    }

    /// Records what was played; reports a fixed duration.
    #[derive(Default)]
    pub(crate) struct RecordingOutput {
        pub played: Mutex<Vec<Vec<u8>>>,
        pub stops: AtomicUsize,
    }

    impl AudioOutput for RecordingOutput {
        fn play(&self, audio: &[u8]) -> Result<Option<Duration>, PlaybackError> {
            self.played.lock().unwrap().push(audio.to_vec());
            Ok(Some(Duration::from_millis(300)))
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Blocks the first synthesis until released.
    struct GatedSynth {
        gate: Notify,
        first: AtomicUsize,
    }

    #[async_trait]
    impl Synthesizer for GatedSynth {
        async fn synthesize(
            &self,
            text: &str,
            _settings: &SessionSettings,
        ) -> Result<Vec<u8>, PlaybackError> {
            if self.first.fetch_add(1, Ordering::SeqCst) == 0 {
                self.gate.notified().await;
            }
            Ok(text.as_bytes().to_vec())
        }
    }

    fn synchronizer(synth: Arc<dyn Synthesizer>) -> (PlaybackSynchronizer, Arc<RecordingOutput>) {
        let output = Arc::new(RecordingOutput::default());
        (PlaybackSynchronizer::new(synth, output.clone()), output)
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn first_play_fetches_and_is_audible() {
        let synth = Arc::new(EchoSynth::default());
        let (player, output) = synchronizer(synth.clone());

        let report = player
            .play(MessageId(7), "안녕하세요", &SessionSettings::default())
            .await
            .unwrap();

        assert!(report.fetched);
        assert!(report.audible);
        assert_eq!(report.duration, Some(Duration::from_millis(300)));
        assert_eq!(report.handle.uri(), "audio://message/7");
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
        assert_eq!(output.played.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replay_reuses_cached_handle() {
        let synth = Arc::new(EchoSynth::default());
        let (player, output) = synchronizer(synth.clone());
        let settings = SessionSettings::default();

        player.play(MessageId(1), "하나", &settings).await.unwrap();
        let again = player.replay(MessageId(1), "하나", &settings).await.unwrap();

        assert!(!again.fetched);
        assert!(again.audible);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
        assert_eq!(output.played.lock().unwrap().len(), 2);
        assert_eq!(player.handle(MessageId(1)), Some(again.handle));
    }

    #[tokio::test]
    async fn superseded_fetch_is_cached_but_silent() {
        let synth = Arc::new(GatedSynth {
            gate: Notify::new(),
            first: AtomicUsize::new(0),
        });
        let (player, output) = synchronizer(synth.clone());
        let player = Arc::new(player);
        let settings = SessionSettings::default();

        let slow = {
            let player = Arc::clone(&player);
            let settings = settings.clone();
            tokio::spawn(async move { player.play(MessageId(1), "먼저", &settings).await })
        };
        while synth.first.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let fast = player.play(MessageId(2), "나중", &settings).await.unwrap();
        assert!(fast.audible);

        synth.gate.notify_one();
        let slow = slow.await.unwrap().unwrap();
        assert!(!slow.audible);
        assert!(player.handle(MessageId(1)).is_some());

        let played = output.played.lock().unwrap();
        assert_eq!(played.as_slice(), &["나중".as_bytes().to_vec()]);
    }

    #[tokio::test]
    async fn fetch_in_flight_during_reset_is_not_cached() {
        let synth = Arc::new(GatedSynth {
            gate: Notify::new(),
            first: AtomicUsize::new(0),
        });
        let (player, output) = synchronizer(synth.clone());
        let player = Arc::new(player);

        let pending = {
            let player = Arc::clone(&player);
            tokio::spawn(async move {
                player
                    .play(MessageId(5), "다섯", &SessionSettings::default())
                    .await
            })
        };
        while synth.first.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        player.stop();
        player.clear();
        synth.gate.notify_one();

        let report = pending.await.unwrap().unwrap();
        assert!(!report.audible);
        assert!(player.handle(MessageId(5)).is_none());
        assert!(output.played.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stop_silences_output() {
        let (player, output) = synchronizer(Arc::new(EchoSynth::default()));
        player.stop();
        assert_eq!(output.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_forgets_handles() {
        let synth = Arc::new(EchoSynth::default());
        let (player, _output) = synchronizer(synth.clone());
        let settings = SessionSettings::default();

        player.play(MessageId(3), "셋", &settings).await.unwrap();
        player.clear();
        assert!(player.handle(MessageId(3)).is_none());

        let report = player.play(MessageId(3), "셋", &settings).await.unwrap();
        assert!(report.fetched);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 2);
    }
}
