//! Rolling conversation context for the correction and teaching prompts.
//!
//! [`ContextWindow`] is built from an explicit snapshot of the message log
//! at call time.  It keeps only the last *N* turns; older turns are dropped,
//! never summarised.

use crate::conversation::{Message, Role};

/// One prior turn as the model sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextTurn {
    pub role: Role,
    pub text: String,
}

/// The last *N* turns of the conversation, oldest first.
///
/// # Example
/// ```rust
/// use voice_tutor::tutor::ContextWindow;
///
/// let window = ContextWindow::from_messages(&[], 6);
/// assert!(window.is_empty());
/// assert_eq!(window.transcript(), "First message");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextWindow {
    turns: Vec<ContextTurn>,
}

impl ContextWindow {
    /// Take the last `max_turns` messages of `snapshot`.
    pub fn from_messages(snapshot: &[Message], max_turns: usize) -> Self {
        let skip = snapshot.len().saturating_sub(max_turns);
        let turns = snapshot
            .iter()
            .skip(skip)
            .map(|m| ContextTurn {
                role: m.role,
                text: m.display_text.clone(),
            })
            .collect();
        Self { turns }
    }

    pub fn turns(&self) -> &[ContextTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Compact `User:` / `AI:` transcript for the correction prompt.
    pub fn transcript(&self) -> String {
        if self.turns.is_empty() {
            return "First message".to_string();
        }
        self.turns
            .iter()
            .map(|t| match t.role {
                Role::User => format!("User: {}", t.text),
                Role::Assistant => format!("AI: {}", t.text),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Chat-completion messages for the teaching prompt.
    pub fn chat_messages(&self) -> Vec<serde_json::Value> {
        self.turns
            .iter()
            .map(|t| {
                serde_json::json!({
                    "role": t.role.as_str(),
                    "content": t.text,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
