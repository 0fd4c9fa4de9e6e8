//! Learner-facing notices.
//!
//! Every failure the learner can see is one of these variants.  The text is
//! localized and deliberately non-technical; provider errors go to the log.

use serde::{Deserialize, Serialize};

/// Language of learner-facing notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Locale {
    #[serde(rename = "vi")]
    Vietnamese,
    #[serde(rename = "en")]
    English,
}

/// A learner-visible condition that is not an application error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Voice capture ended without any transcript.
    NoSpeechDetected,
    /// A transcript was heard but recognition was not confident enough.
    LowConfidence,
    /// Microphone access was refused.  Shown as a persistent banner.
    PermissionDenied,
    /// No usable input device.
    MicrophoneUnavailable,
    /// The recognition engine failed mid-capture.
    RecognitionFailed,
    /// Synthesized audio could not be fetched or played.
    PlaybackUnavailable,
    /// The learner submitted an empty line.
    EmptyUtterance,
}

impl Notice {
    /// `true` for notices that stay on screen until the condition changes.
    pub fn is_persistent(&self) -> bool {
        matches!(self, Notice::PermissionDenied | Notice::MicrophoneUnavailable)
    }

    pub fn text(&self, locale: Locale) -> &'static str {
        match locale {
            Locale::Vietnamese => match self {
                Notice::NoSpeechDetected => "Không nghe thấy gì. Hãy thử lại và nói to hơn nhé.",
                Notice::LowConfidence => "Chưa nghe rõ. Bạn thử nói chậm và rõ hơn nhé.",
                Notice::PermissionDenied => {
                    "Chưa có quyền dùng micro. Bạn vẫn có thể nhập văn bản."
                }
                Notice::MicrophoneUnavailable => {
                    "Không tìm thấy micro. Bạn vẫn có thể nhập văn bản."
                }
                Notice::RecognitionFailed => "Nhận dạng giọng nói bị gián đoạn. Hãy thử lại.",
                Notice::PlaybackUnavailable => "Không phát được âm thanh lúc này.",
                Notice::EmptyUtterance => "Hãy nhập một câu tiếng Hàn.",
            },
            Locale::English => match self {
                Notice::NoSpeechDetected => "Nothing was heard. Try again and speak up a little.",
                Notice::LowConfidence => "That wasn't clear. Try speaking a little slower.",
                Notice::PermissionDenied => {
                    "Microphone access is off. You can still type your answer."
                }
                Notice::MicrophoneUnavailable => {
                    "No microphone was found. You can still type your answer."
                }
                Notice::RecognitionFailed => "Speech recognition stopped. Please try again.",
                Notice::PlaybackUnavailable => "Audio can't be played right now.",
                Notice::EmptyUtterance => "Please type a sentence first.",
            },
        }
    }
}
