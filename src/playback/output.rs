//! Audio output devices.
//!
//! [`RodioOutput`] keeps the `rodio` output stream alive on a dedicated
//! thread (the stream is not `Send` on every platform) and plays one
//! [`Sink`] at a time.  [`SilentOutput`] is the stand-in when no output
//! device exists.

use std::io::Cursor;
use std::sync::{mpsc, Mutex, PoisonError};
use std::time::Duration;

use rodio::buffer::SamplesBuffer;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};

use super::player::PlaybackError;

/// Plays encoded audio.  Starting a new clip stops the current one.
pub trait AudioOutput: Send + Sync {
    /// Start playing `audio` and return its duration when known.
    fn play(&self, audio: &[u8]) -> Result<Option<Duration>, PlaybackError>;

    fn stop(&self);
}

// ---------------------------------------------------------------------------
// SilentOutput
// ---------------------------------------------------------------------------

/// Discards audio.  Text reveal then falls back to the minimum pace.
#[derive(Debug, Default)]
pub struct SilentOutput;

impl AudioOutput for SilentOutput {
    fn play(&self, _audio: &[u8]) -> Result<Option<Duration>, PlaybackError> {
        Ok(None)
    }

    fn stop(&self) {}
}

// ---------------------------------------------------------------------------
// RodioOutput
// ---------------------------------------------------------------------------

pub struct RodioOutput {
    handle: OutputStreamHandle,
    current: Mutex<Option<Sink>>,
    // Dropping the sender lets the stream thread exit.
    _shutdown: mpsc::Sender<()>,
}

impl RodioOutput {
    /// Open the default output device.
    pub fn open() -> Result<Self, PlaybackError> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    let _ = ready_tx.send(Ok(handle));
                    // Blocks until the owning RodioOutput is dropped.
                    let _ = shutdown_rx.recv();
                    drop(stream);
                    log::debug!("playback: output stream closed");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(PlaybackError::Device(e.to_string())));
                }
            })
            .map_err(|e| PlaybackError::Device(e.to_string()))?;

        let handle = ready_rx
            .recv()
            .map_err(|_| PlaybackError::Device("audio output thread exited".into()))??;

        log::info!("playback: output device ready");
        Ok(Self {
            handle,
            current: Mutex::new(None),
            _shutdown: shutdown_tx,
        })
    }
}

impl AudioOutput for RodioOutput {
    fn play(&self, audio: &[u8]) -> Result<Option<Duration>, PlaybackError> {
        let clip = decode(audio)?;
        let duration = clip.duration;

        let sink = Sink::try_new(&self.handle).map_err(|e| PlaybackError::Device(e.to_string()))?;

        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.take() {
            previous.stop();
        }
        sink.append(clip.source);
        *current = Some(sink);

        Ok(duration)
    }

    fn stop(&self) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sink) = current.take() {
            sink.stop();
        }
    }
}

/// Fully decoded audio, ready for a [`Sink`].
struct DecodedClip {
    source: SamplesBuffer<f32>,
    duration: Option<Duration>,
}

/// Decode `audio` once.  The duration comes from the sample count, since
/// MP3 streams rarely carry a total duration up front.
fn decode(audio: &[u8]) -> Result<DecodedClip, PlaybackError> {
    let decoder =
        Decoder::new(Cursor::new(audio.to_vec())).map_err(|e| PlaybackError::Decode(e.to_string()))?;
    let channels = decoder.channels();
    let sample_rate = decoder.sample_rate();
    let samples: Vec<f32> = decoder.convert_samples::<f32>().collect();

    let per_second = f64::from(sample_rate) * f64::from(channels);
    let duration = (per_second > 0.0)
        .then(|| Duration::from_secs_f64(samples.len() as f64 / per_second));

    Ok(DecodedClip {
        source: SamplesBuffer::new(channels, sample_rate, samples),
        duration,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// 16-bit mono PCM WAV of `samples` zero samples at `rate` Hz.
    fn silent_wav(rate: u32, samples: u32) -> Vec<u8> {
        let data_len = samples * 2;
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(36 + data_len).to_le_bytes());
        wav.extend_from_slice(b"WAVEfmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&rate.to_le_bytes());
        wav.extend_from_slice(&(rate * 2).to_le_bytes());
        wav.extend_from_slice(&2u16.to_le_bytes());
        wav.extend_from_slice(&16u16.to_le_bytes());
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&data_len.to_le_bytes());
        wav.resize(wav.len() + data_len as usize, 0);
        wav
    }

    #[test]
    fn silent_output_reports_no_duration() {
        let out = SilentOutput;
        assert_eq!(out.play(&[1, 2, 3]).unwrap(), None);
        out.stop();
    }

    #[test]
    fn measures_wav_duration_from_one_decode() {
        let wav = silent_wav(8_000, 4_000);
        let clip = decode(&wav).unwrap();
        let d = clip.duration.unwrap();
        assert!((d.as_secs_f64() - 0.5).abs() < 0.01, "got {d:?}");
        assert_eq!(clip.source.channels(), 1);
        assert_eq!(clip.source.sample_rate(), 8_000);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            decode(b"not audio at all"),
            Err(PlaybackError::Decode(_))
        ));
    }
}
