//! Shared buffer between the microphone callback and the recognizer.
//!
//! The cpal callback appends interleaved samples while a recording is
//! active; the recognizer takes them out as one mono clip when the learner
//! lets go.  Both sides go through [`SharedRecording`].
//!
//! ```rust
//! use voice_tutor::capture::Recording;
//!
//! let mut rec = Recording::default();
//! rec.set_format(16_000, 2);
//! rec.push(&[0.5, 0.5]); // ignored: not recording yet
//! rec.begin();
//! rec.push(&[0.2, 0.4, 1.0, 0.0]);
//! let clip = rec.take();
//! assert_eq!(clip.samples.len(), 2);
//! assert!((clip.samples[0] - 0.3).abs() < 1e-6);
//! ```

use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::machine::CaptureError;

/// Longest recording kept; later samples are dropped.
pub const MAX_RECORDING_SECS: u32 = 60;

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Recording {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    active: bool,
}

/// A mono clip taken out of a [`Recording`].
#[derive(Debug, Clone, PartialEq)]
pub struct MonoClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl MonoClip {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

impl Recording {
    /// Device format of the samples that will be pushed.
    pub fn set_format(&mut self, sample_rate: u32, channels: u16) {
        self.sample_rate = sample_rate;
        self.channels = channels;
    }

    /// Start a fresh recording.
    pub fn begin(&mut self) {
        self.samples.clear();
        self.active = true;
    }

    /// Keep recording into the current buffer.
    pub fn resume(&mut self) {
        self.active = true;
    }

    /// Stop accepting samples; what was recorded is kept.
    pub fn end(&mut self) {
        self.active = false;
    }

    /// Stop and throw away what was recorded.
    pub fn discard(&mut self) {
        self.active = false;
        self.samples.clear();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Append interleaved samples from the device callback.
    pub fn push(&mut self, data: &[f32]) {
        if !self.active {
            return;
        }
        let cap = MAX_RECORDING_SECS as usize
            * self.sample_rate as usize
            * usize::from(self.channels.max(1));
        let room = cap.saturating_sub(self.samples.len());
        self.samples.extend_from_slice(&data[..data.len().min(room)]);
    }

    /// Stop recording and move the samples out as mono.
    pub fn take(&mut self) -> MonoClip {
        self.active = false;
        let samples = std::mem::take(&mut self.samples);
        MonoClip {
            samples: to_mono(&samples, self.channels),
            sample_rate: self.sample_rate,
        }
    }
}

pub type SharedRecording = Arc<Mutex<Recording>>;

pub fn new_shared_recording() -> SharedRecording {
    Arc::new(Mutex::new(Recording::default()))
}

pub fn lock_recording(recording: &SharedRecording) -> MutexGuard<'_, Recording> {
    recording.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Average interleaved frames down to one channel.
pub fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 | 1 => samples.to_vec(),
        n => {
            let n = usize::from(n);
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// 16-bit PCM WAV bytes for `clip`.
pub fn encode_wav(clip: &MonoClip) -> Result<Vec<u8>, CaptureError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: clip.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec)
        .map_err(|e| CaptureError::Recognition(format!("wav encoder: {e}")))?;
    for &s in &clip.samples {
        let sample = (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
        writer
            .write_sample(sample)
            .map_err(|e| CaptureError::Recognition(format!("wav encoder: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| CaptureError::Recognition(format!("wav encoder: {e}")))?;
    Ok(cursor.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
