//! Turn phase reported to the front-end.

/// Where the orchestrator is in the current turn.
///
/// ```text
/// Idle ──submit──▶ Correcting ──Rejected──▶ Idle
///                             ──Accepted──▶ Teaching ──reply──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    /// Ready for the next utterance.
    #[default]
    Idle,

    /// Stage 1 is running.
    Correcting,

    /// Stage 1 accepted the utterance; stage 2 is running.
    Teaching,
}

impl TurnPhase {
    /// Returns `true` while a turn is outstanding.  The front-end refuses
    /// new input while busy.
    ///
    /// ```
    /// use voice_tutor::conversation::TurnPhase;
    ///
    /// assert!(!TurnPhase::Idle.is_busy());
    /// assert!(TurnPhase::Correcting.is_busy());
    /// assert!(TurnPhase::Teaching.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        matches!(self, TurnPhase::Correcting | TurnPhase::Teaching)
    }

    /// A short label for a status line.
    pub fn label(&self) -> &'static str {
        match self {
            TurnPhase::Idle => "Ready",
            TurnPhase::Correcting => "Checking",
            TurnPhase::Teaching => "Replying",
        }
    }
}
