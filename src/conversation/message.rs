//! Messages and the append-only conversation log.
//!
//! A [`Message`] is created exactly once.  The only later changes the log
//! allows are additions: an audio handle (first write wins) and growth of
//! the visible prefix during text reveal.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::playback::{prefix, AudioHandle};
use crate::tutor::{GrammarItem, VocabItem};

// ---------------------------------------------------------------------------
// Role / MessageId
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Chat-completion role name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Creation-order identifier (wall-clock milliseconds, never repeated).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out strictly increasing [`MessageId`]s.
///
/// Two ids requested within the same millisecond are offset by one.
#[derive(Debug, Default)]
pub struct IdClock {
    last: u64,
}

impl IdClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> MessageId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.last = now.max(self.last + 1);
        MessageId(self.last)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    /// Raw captured input; `None` for assistant messages.
    pub original_text: Option<String>,
    /// Corrected text (user) or normalised reply (assistant).
    pub display_text: String,
    /// Text sent to synthesis.  Keeps the sentence separators.
    pub speech_text: String,
    pub is_valid: bool,
    /// Present only when `is_valid` is false.
    pub explanation: Option<String>,
    pub vocabulary: Vec<VocabItem>,
    pub grammar: Vec<GrammarItem>,
    pub audio: Option<AudioHandle>,
    /// Characters of `display_text` shown so far; `None` once fully shown.
    pub revealed: Option<usize>,
}

impl Message {
    /// The part of `display_text` the learner can currently see.
    pub fn visible_text(&self) -> &str {
        match self.revealed {
            Some(n) => prefix(&self.display_text, n),
            None => &self.display_text,
        }
    }
}

/// Turn the internal `,,` separator and doubled periods into plain
/// punctuation for display.
///
/// ```
/// use voice_tutor::conversation::normalize_display;
///
/// assert_eq!(normalize_display("반가워요,, 저도요.."), "반가워요, 저도요.");
/// ```
pub fn normalize_display(reply: &str) -> String {
    reply.replace(",,", ",").replace("..", ".")
}

// ---------------------------------------------------------------------------
// MessageLog
// ---------------------------------------------------------------------------

/// Append-only list of messages, oldest first.
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    clock: IdClock,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user message.  It is valid exactly when `explanation` is
    /// `None`.
    pub fn push_user(
        &mut self,
        original: String,
        display: String,
        explanation: Option<String>,
    ) -> MessageId {
        let id = self.clock.next();
        self.messages.push(Message {
            id,
            role: Role::User,
            original_text: Some(original),
            speech_text: display.clone(),
            display_text: display,
            is_valid: explanation.is_none(),
            explanation,
            vocabulary: Vec::new(),
            grammar: Vec::new(),
            audio: None,
            revealed: None,
        });
        id
    }

    /// Append a fully visible assistant message.
    pub fn push_assistant(
        &mut self,
        speech_text: String,
        display_text: String,
        vocabulary: Vec<VocabItem>,
        grammar: Vec<GrammarItem>,
    ) -> MessageId {
        self.push_assistant_inner(speech_text, display_text, vocabulary, grammar, None)
    }

    /// Append an assistant message whose text starts hidden and is revealed
    /// with [`reveal`](Self::reveal).
    pub fn push_assistant_hidden(
        &mut self,
        speech_text: String,
        display_text: String,
        vocabulary: Vec<VocabItem>,
        grammar: Vec<GrammarItem>,
    ) -> MessageId {
        self.push_assistant_inner(speech_text, display_text, vocabulary, grammar, Some(0))
    }

    fn push_assistant_inner(
        &mut self,
        speech_text: String,
        display_text: String,
        vocabulary: Vec<VocabItem>,
        grammar: Vec<GrammarItem>,
        revealed: Option<usize>,
    ) -> MessageId {
        let id = self.clock.next();
        self.messages.push(Message {
            id,
            role: Role::Assistant,
            original_text: None,
            display_text,
            speech_text,
            is_valid: true,
            explanation: None,
            vocabulary,
            grammar,
            audio: None,
            revealed,
        });
        id
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    fn get_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// Attach audio to a message.  Returns `false` when the message is
    /// unknown or already has a handle.
    pub fn attach_audio(&mut self, id: MessageId, handle: AudioHandle) -> bool {
        match self.get_mut(id) {
            Some(m) if m.audio.is_none() => {
                m.audio = Some(handle);
                true
            }
            _ => false,
        }
    }

    /// Grow the visible prefix of a message to `chars` characters.
    ///
    /// Never shrinks it.  Reaching the full length marks the message as
    /// fully shown.  Returns `true` when something changed.
    pub fn reveal(&mut self, id: MessageId, chars: usize) -> bool {
        let Some(m) = self.get_mut(id) else {
            return false;
        };
        let Some(current) = m.revealed else {
            return false;
        };
        if chars <= current {
            return false;
        }
        let total = m.display_text.chars().count();
        m.revealed = (chars < total).then_some(chars);
        true
    }

    /// Owned copy of the whole log.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Owned copy of the last `n` messages.
    pub fn recent(&self, n: usize) -> Vec<Message> {
        let skip = self.messages.len().saturating_sub(n);
        self.messages[skip..].to_vec()
    }

    /// Owned copy of the last `n` messages created before `id`.
    pub fn recent_before(&self, id: MessageId, n: usize) -> Vec<Message> {
        let end = self
            .messages
            .iter()
            .position(|m| m.id >= id)
            .unwrap_or(self.messages.len());
        let start = end.saturating_sub(n);
        self.messages[start..end].to_vec()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Start a new conversation.  Ids keep increasing across resets.
    pub fn reset(&mut self) {
        self.messages.clear();
    }
}

// ---------------------------------------------------------------------------
// SharedLog
// ---------------------------------------------------------------------------

/// Thread-safe handle to a [`MessageLog`].  Do not hold the lock across
/// `.await` points.
pub type SharedLog = Arc<Mutex<MessageLog>>;

pub fn new_shared_log() -> SharedLog {
    Arc::new(Mutex::new(MessageLog::new()))
}

/// Lock the log, recovering from poisoning.
pub fn lock_log(log: &SharedLog) -> MutexGuard<'_, MessageLog> {
    log.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_strictly_increase_within_one_tick() {
        let mut clock = IdClock::new();
        let ids: Vec<_> = (0..100).map(|_| clock.next()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn user_message_validity_follows_explanation() {
        let mut log = MessageLog::new();
        let ok = log.push_user("안녕".into(), "안녕.".into(), None);
        let bad = log.push_user("밥".into(), "밥을 먹었어요?".into(), Some("Thiếu vị ngữ.".into()));

        assert!(log.get(ok).unwrap().is_valid);
        let bad = log.get(bad).unwrap();
        assert!(!bad.is_valid);
        assert_eq!(bad.original_text.as_deref(), Some("밥"));
        assert_eq!(bad.explanation.as_deref(), Some("Thiếu vị ngữ."));
    }

    #[test]
    fn first_audio_handle_wins() {
        let mut log = MessageLog::new();
        let id = log.push_assistant("네".into(), "네".into(), vec![], vec![]);

        let first = AudioHandle::for_message(id, vec![1]);
        assert!(log.attach_audio(id, first.clone()));
        assert!(!log.attach_audio(id, AudioHandle::for_message(id, vec![2])));
        assert_eq!(log.get(id).unwrap().audio.as_ref(), Some(&first));
        assert!(!log.attach_audio(MessageId(1), first));
    }

    #[test]
    fn reveal_only_grows() {
        let mut log = MessageLog::new();
        let id = log.push_assistant_hidden("안녕하세요".into(), "안녕하세요".into(), vec![], vec![]);
        assert_eq!(log.get(id).unwrap().visible_text(), "");

        assert!(log.reveal(id, 2));
        assert!(!log.reveal(id, 1));
        assert_eq!(log.get(id).unwrap().visible_text(), "안녕");

        assert!(log.reveal(id, 5));
        assert_eq!(log.get(id).unwrap().revealed, None);
        assert!(!log.reveal(id, 6));
        assert_eq!(log.get(id).unwrap().visible_text(), "안녕하세요");
    }

    #[test]
    fn visible_messages_ignore_reveal() {
        let mut log = MessageLog::new();
        let id = log.push_assistant("네".into(), "네".into(), vec![], vec![]);
        assert!(!log.reveal(id, 1));
    }

    #[test]
    fn recent_before_excludes_the_anchor() {
        let mut log = MessageLog::new();
        let a = log.push_user("가".into(), "가".into(), None);
        let b = log.push_assistant("나".into(), "나".into(), vec![], vec![]);
        let c = log.push_user("다".into(), "다".into(), None);

        let before_c: Vec<_> = log.recent_before(c, 6).iter().map(|m| m.id).collect();
        assert_eq!(before_c, vec![a, b]);
        let last_one: Vec<_> = log.recent_before(c, 1).iter().map(|m| m.id).collect();
        assert_eq!(last_one, vec![b]);
        assert_eq!(log.recent(2).len(), 2);
    }

    #[test]
    fn reset_keeps_ids_increasing() {
        let mut log = MessageLog::new();
        let before = log.push_user("가".into(), "가".into(), None);
        log.reset();
        assert!(log.is_empty());
        let after = log.push_user("나".into(), "나".into(), None);
        assert!(after > before);
    }

    #[test]
    fn display_normalisation() {
        assert_eq!(normalize_display("하나,,둘,, 셋.."), "하나,둘, 셋.");
        assert_eq!(normalize_display("그대로예요."), "그대로예요.");
    }
}
