//! Recognition session: what has been heard during one capture.
//!
//! Lives only while the capture is active.  Final segments accumulate across
//! engine restarts; the interim hypothesis is replaced on every result.

use super::recognition::RecognitionResult;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecognitionSession {
    final_transcript: String,
    interim_transcript: String,
    final_confidence: Option<f32>,
    interim_confidence: Option<f32>,
    /// Engine restarts since the last result.
    restarts: u32,
}

impl RecognitionSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, result: RecognitionResult) {
        self.restarts = 0;
        let text = result.transcript.trim();
        if result.is_final {
            if !text.is_empty() {
                if !self.final_transcript.is_empty() {
                    self.final_transcript.push(' ');
                }
                self.final_transcript.push_str(text);
            }
            self.interim_transcript.clear();
            self.interim_confidence = None;
            if result.confidence.is_some() {
                self.final_confidence = result.confidence;
            }
        } else {
            self.interim_transcript = text.to_string();
            self.interim_confidence = result.confidence;
        }
    }

    pub fn final_transcript(&self) -> &str {
        &self.final_transcript
    }

    pub fn interim_transcript(&self) -> &str {
        &self.interim_transcript
    }

    /// Everything heard so far: final segments followed by the pending
    /// interim hypothesis.
    pub fn transcript(&self) -> String {
        match (self.final_transcript.is_empty(), self.interim_transcript.is_empty()) {
            (_, true) => self.final_transcript.clone(),
            (true, false) => self.interim_transcript.clone(),
            (false, false) => format!("{} {}", self.final_transcript, self.interim_transcript),
        }
    }

    /// Confidence of the latest final result, else of the latest interim
    /// one.  `None` when the engine never reported any.
    pub fn confidence(&self) -> Option<f32> {
        self.final_confidence.or(self.interim_confidence)
    }

    /// Count one restart and return the running total.
    pub(crate) fn note_restart(&mut self) -> u32 {
        self.restarts += 1;
        self.restarts
    }
}
