//! Speech playback: synthesis → cached handle → audible output → text reveal.
//!
//! ```text
//! reply text ─▶ Synthesizer (relay, 20 s) ─▶ AudioHandle (cached per message)
//!                                              │
//!                                              ├─▶ AudioOutput::play  (one audible at a time)
//!                                              └─▶ RevealPlan          (duration / chars, clamped)
//! ```

pub mod output;
pub mod player;
pub mod reveal;
pub mod synth;

pub use output::{AudioOutput, RodioOutput, SilentOutput};
pub use player::{AudioHandle, PlaybackError, PlaybackReport, PlaybackSynchronizer};
pub use reveal::{prefix, run_reveal, RevealPlan};
pub use synth::{RelaySynthesizer, Synthesizer};
