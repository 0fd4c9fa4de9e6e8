//! Microphone access via `cpal`.
//!
//! [`CpalMicrophone`] opens the default input device, keeps a running input
//! level and feeds a [`SharedRecording`] that the recognizer reads from.  The stream it returns is the only live handle on the
//! hardware; [`MicStream::stop_all`] (or dropping it) releases the device.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::notice::Notice;

use super::machine::CaptureError;
use super::recording::{lock_recording, SharedRecording};

/// An open microphone stream.
pub trait MicStream {
    /// Number of tracks still delivering audio.
    fn live_tracks(&self) -> usize;

    /// Stop every track.  Idempotent.
    fn stop_all(&mut self);
}

/// Source of microphone streams.
pub trait Microphone {
    fn acquire(&mut self) -> Result<Box<dyn MicStream>, CaptureError>;
}

/// Result of the start-up microphone check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    /// No usable input device; access was never asked for.
    Unavailable,
}

impl Permission {
    /// Banner to show for this result.
    pub fn notice(&self) -> Option<Notice> {
        match self {
            Permission::Granted => None,
            Permission::Denied => Some(Notice::PermissionDenied),
            Permission::Unavailable => Some(Notice::MicrophoneUnavailable),
        }
    }
}

/// Acquire a stream and release it at once.
pub fn probe_permission(mic: &mut dyn Microphone) -> Permission {
    match mic.acquire() {
        Ok(mut stream) => {
            stream.stop_all();
            Permission::Granted
        }
        Err(CaptureError::PermissionDenied) => {
            log::warn!("capture: microphone access denied");
            Permission::Denied
        }
        Err(e) => {
            log::warn!("capture: microphone check failed: {e}");
            Permission::Unavailable
        }
    }
}

// ---------------------------------------------------------------------------
// CpalMicrophone
// ---------------------------------------------------------------------------

/// Default input device on the default host.
#[derive(Default)]
pub struct CpalMicrophone {
    level: Arc<AtomicU32>,
    recording: SharedRecording,
}

impl CpalMicrophone {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed captured samples into `recording`.
    pub fn with_recording(recording: SharedRecording) -> Self {
        Self {
            level: Arc::default(),
            recording,
        }
    }

    pub fn recording(&self) -> &SharedRecording {
        &self.recording
    }

    /// RMS level of the most recent input buffer, `[0, 1]`.
    pub fn level(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed))
    }
}

impl Microphone for CpalMicrophone {
    fn acquire(&mut self) -> Result<Box<dyn MicStream>, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| CaptureError::Device("no input device found".into()))?;

        let supported = device
            .default_input_config()
            .map_err(|e| CaptureError::Device(e.to_string()))?;
        let config: cpal::StreamConfig = supported.into();

        lock_recording(&self.recording).set_format(config.sample_rate.0, config.channels);

        let level = Arc::clone(&self.level);
        let recording = Arc::clone(&self.recording);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    level.store(rms(data).to_bits(), Ordering::Relaxed);
                    lock_recording(&recording).push(data);
                },
                |err: cpal::StreamError| {
                    log::error!("cpal input stream error: {err}");
                },
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => CaptureError::PermissionDenied,
                other => CaptureError::Device(other.to_string()),
            })?;

        stream
            .play()
            .map_err(|e| CaptureError::Device(e.to_string()))?;

        log::debug!("capture: microphone opened ({} ch @ {} Hz)", config.channels, config.sample_rate.0);
        Ok(Box::new(CpalStream {
            stream: Some(stream),
            level: Arc::clone(&self.level),
        }))
    }
}

struct CpalStream {
    stream: Option<cpal::Stream>,
    level: Arc<AtomicU32>,
}

impl MicStream for CpalStream {
    fn live_tracks(&self) -> usize {
        usize::from(self.stream.is_some())
    }

    fn stop_all(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
            drop(stream);
            self.level.store(0f32.to_bits(), Ordering::Relaxed);
            log::debug!("capture: microphone released");
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt().min(1.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
