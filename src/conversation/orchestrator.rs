//! Turn orchestrator — drives correction → (teaching) → playback for one
//! utterance at a time.
//!
//! [`TurnOrchestrator`] owns the [`SharedLog`] and reports progress as
//! [`TurnEvent`]s over an unbounded `tokio::sync::mpsc` channel.  It can be
//! called directly ([`submit`](TurnOrchestrator::submit)) or driven by
//! [`TurnCommand`]s with [`run`](TurnOrchestrator::run).
//!
//! # Turn flow
//!
//! ```text
//! Submit(utterance)
//!   └─▶ tutor.correct(snapshot)                          [Correcting]
//!         ├─ Err      → Accepted(original)  (fail open, no retry)
//!         ├─ Rejected → user message (invalid) → done    [Idle]
//!         └─ Accepted → user message (valid)
//!               └─▶ tutor.teach(fresh snapshot)          [Teaching]
//!                     ├─ Err → fixed "please repeat" reply
//!                     └─▶ normalise, filter annotations
//!                           → assistant message           [Idle]
//!                           └─▶ spawn playback (fire-and-forget)
//! ```
//!
//! The log lock is never held across an `.await`.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::{AppConfig, SessionSettings};
use crate::notice::Notice;
use crate::playback::{run_reveal, AudioHandle, PlaybackSynchronizer, RevealPlan};
use crate::tutor::{fail_open, fail_safe, filter_annotations, ContextWindow, TutorModel, Verdict};

use super::message::{lock_log, normalize_display, Message, MessageId, SharedLog};
use super::state::TurnPhase;

// ---------------------------------------------------------------------------
// Events, commands, errors
// ---------------------------------------------------------------------------

/// Progress reported to the front-end.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    Phase(TurnPhase),
    /// Stage 1 finished; sent before stage 2 starts.
    UserMessage(Message),
    AssistantMessage(Message),
    AudioReady { id: MessageId, handle: AudioHandle },
    /// `visible_chars` of the message's display text are now shown.
    Reveal { id: MessageId, visible_chars: usize },
    Notice(Notice),
}

/// Input accepted by [`TurnOrchestrator::run`].
#[derive(Debug, Clone)]
pub enum TurnCommand {
    Submit(String),
    Replay(MessageId),
    UpdateSettings(SessionSettings),
    Reset,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("utterance is empty after trimming")]
    EmptyUtterance,
}

/// Messages created by one [`submit`](TurnOrchestrator::submit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnOutcome {
    pub user: MessageId,
    /// `None` when stage 1 rejected the utterance.
    pub assistant: Option<MessageId>,
}

// ---------------------------------------------------------------------------
// TurnOptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TurnOptions {
    /// Prior messages passed to each stage.
    pub context_window: usize,
    pub fallback_reply: String,
    /// Reveal assistant text progressively, paced to the audio.
    pub reveal_text: bool,
    pub min_reveal_interval: Duration,
}

impl TurnOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            context_window: config.tutor.context_window,
            fallback_reply: config.tutor.fallback_reply.clone(),
            reveal_text: config.speech.reveal_text,
            min_reveal_interval: config.speech.min_reveal_interval(),
        }
    }
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// TurnOrchestrator
// ---------------------------------------------------------------------------

pub struct TurnOrchestrator {
    log: SharedLog,
    tutor: Arc<dyn TutorModel>,
    playback: Option<Arc<PlaybackSynchronizer>>,
    events: mpsc::UnboundedSender<TurnEvent>,
    settings: SessionSettings,
    options: TurnOptions,
    phase: TurnPhase,
}

impl TurnOrchestrator {
    pub fn new(
        log: SharedLog,
        tutor: Arc<dyn TutorModel>,
        events: mpsc::UnboundedSender<TurnEvent>,
        settings: SessionSettings,
        options: TurnOptions,
    ) -> Self {
        Self {
            log,
            tutor,
            playback: None,
            events,
            settings,
            options,
            phase: TurnPhase::Idle,
        }
    }

    /// Speak assistant replies through `playback`.
    pub fn with_playback(mut self, playback: Arc<PlaybackSynchronizer>) -> Self {
        self.playback = Some(playback);
        self
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn log(&self) -> &SharedLog {
        &self.log
    }

    // -----------------------------------------------------------------------
    // Command loop
    // -----------------------------------------------------------------------

    /// Process commands until `commands` is closed.
    pub async fn run(mut self, mut commands: mpsc::Receiver<TurnCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                TurnCommand::Submit(text) => {
                    if let Err(e) = self.submit(&text).await {
                        log::debug!("conversation: submit refused: {e}");
                        self.emit(TurnEvent::Notice(Notice::EmptyUtterance));
                    }
                }
                TurnCommand::Replay(id) => self.replay(id),
                TurnCommand::UpdateSettings(settings) => self.update_settings(settings),
                TurnCommand::Reset => self.reset(),
            }
        }

        log::info!("conversation: command channel closed, orchestrator shutting down");
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Run one turn for `utterance`.
    ///
    /// The user message is emitted as soon as stage 1 resolves.  Provider
    /// failures never surface here: stage 1 fails open and stage 2 falls
    /// back to a fixed reply.
    pub async fn submit(&mut self, utterance: &str) -> Result<TurnOutcome, TurnError> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Err(TurnError::EmptyUtterance);
        }

        // ── Stage 1: correction ─────────────────────────────────────────
        self.set_phase(TurnPhase::Correcting);
        let context = self.context(None);

        let verdict = match self.tutor.correct(utterance, &context).await {
            Ok(verdict) => verdict,
            Err(e) => {
                log::warn!("conversation: correction failed, accepting as-is: {e}");
                fail_open(utterance)
            }
        };
        log::debug!("conversation: verdict accepted={}", verdict.is_accepted());

        let (user_id, corrected) = {
            let mut log = lock_log(&self.log);
            let (id, corrected) = match verdict {
                Verdict::Accepted { corrected_text } => {
                    let id = log.push_user(utterance.to_string(), corrected_text.clone(), None);
                    (id, Some(corrected_text))
                }
                Verdict::Rejected {
                    corrected_text,
                    explanation,
                } => {
                    let id = log.push_user(utterance.to_string(), corrected_text, Some(explanation));
                    (id, None)
                }
            };
            if let Some(message) = log.get(id) {
                self.emit(TurnEvent::UserMessage(message.clone()));
            }
            (id, corrected)
        };

        let Some(corrected) = corrected else {
            self.set_phase(TurnPhase::Idle);
            return Ok(TurnOutcome {
                user: user_id,
                assistant: None,
            });
        };

        // ── Stage 2: teaching ───────────────────────────────────────────
        self.set_phase(TurnPhase::Teaching);
        let context = self.context(Some(user_id));

        let reply = match self.tutor.teach(&corrected, &context, &self.settings).await {
            Ok(extraction) => {
                if extraction.is_degraded() {
                    log::debug!("conversation: using degraded teaching reply");
                }
                extraction.into_inner()
            }
            Err(e) => {
                log::warn!("conversation: teaching failed, using fallback reply: {e}");
                fail_safe(&self.options.fallback_reply).into_inner()
            }
        };

        let display = normalize_display(&reply.reply);
        let (vocabulary, grammar) = filter_annotations(&display, reply.vocabulary, reply.grammar);
        let reveal = self.options.reveal_text && self.playback.is_some();

        let assistant_id = {
            let mut log = lock_log(&self.log);
            let id = if reveal {
                log.push_assistant_hidden(reply.reply.clone(), display, vocabulary, grammar)
            } else {
                log.push_assistant(reply.reply.clone(), display, vocabulary, grammar)
            };
            if let Some(message) = log.get(id) {
                self.emit(TurnEvent::AssistantMessage(message.clone()));
            }
            id
        };

        self.spawn_playback(assistant_id, reply.reply, reveal);
        self.set_phase(TurnPhase::Idle);

        Ok(TurnOutcome {
            user: user_id,
            assistant: Some(assistant_id),
        })
    }

    /// Play a message's audio again.  Fetches only if it was never fetched.
    pub fn replay(&self, id: MessageId) {
        let text = lock_log(&self.log).get(id).map(|m| m.speech_text.clone());
        match text {
            Some(text) => self.spawn_playback(id, text, false),
            None => log::warn!("conversation: replay requested for unknown message {id}"),
        }
    }

    pub fn update_settings(&mut self, settings: SessionSettings) {
        log::debug!(
            "conversation: settings updated (voice={:?}, rate={:.1})",
            settings.voice,
            settings.speech_rate()
        );
        self.settings = settings;
    }

    /// Clear the conversation and silence playback.
    pub fn reset(&mut self) {
        lock_log(&self.log).reset();
        if let Some(player) = &self.playback {
            player.stop();
            player.clear();
        }
        self.set_phase(TurnPhase::Idle);
        log::info!("conversation: reset");
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Fresh snapshot of the last N messages, optionally only those before
    /// `before`.
    fn context(&self, before: Option<MessageId>) -> ContextWindow {
        let n = self.options.context_window;
        let log = lock_log(&self.log);
        let recent = match before {
            Some(id) => log.recent_before(id, n),
            None => log.recent(n),
        };
        ContextWindow::from_messages(&recent, n)
    }

    fn spawn_playback(&self, id: MessageId, text: String, reveal: bool) {
        let Some(player) = self.playback.clone() else {
            return;
        };
        let task = PlaybackTask {
            player,
            log: Arc::clone(&self.log),
            events: self.events.clone(),
            settings: self.settings.clone(),
            min_reveal_interval: self.options.min_reveal_interval,
        };
        tokio::spawn(task.run(id, text, reveal));
    }

    fn set_phase(&mut self, phase: TurnPhase) {
        if self.phase != phase {
            log::debug!("conversation: {} → {}", self.phase.label(), phase.label());
            self.phase = phase;
            self.emit(TurnEvent::Phase(phase));
        }
    }

    fn emit(&self, event: TurnEvent) {
        send_event(&self.events, event);
    }
}

fn send_event(events: &mpsc::UnboundedSender<TurnEvent>, event: TurnEvent) {
    if events.send(event).is_err() {
        log::debug!("conversation: event receiver dropped");
    }
}

// ---------------------------------------------------------------------------
// PlaybackTask
// ---------------------------------------------------------------------------

/// Background playback for one message.  Failures here never touch the
/// message's validity.
struct PlaybackTask {
    player: Arc<PlaybackSynchronizer>,
    log: SharedLog,
    events: mpsc::UnboundedSender<TurnEvent>,
    settings: SessionSettings,
    min_reveal_interval: Duration,
}

impl PlaybackTask {
    async fn run(self, id: MessageId, text: String, reveal: bool) {
        let duration = match self.player.play(id, &text, &self.settings).await {
            Ok(report) => {
                if lock_log(&self.log).attach_audio(id, report.handle.clone()) {
                    send_event(
                        &self.events,
                        TurnEvent::AudioReady {
                            id,
                            handle: report.handle,
                        },
                    );
                }
                report.duration
            }
            Err(e) => {
                log::warn!("conversation: playback for message {id} failed: {e}");
                send_event(&self.events, TurnEvent::Notice(Notice::PlaybackUnavailable));
                if reveal {
                    self.show_all(id);
                }
                return;
            }
        };

        if !reveal {
            return;
        }

        let total = match lock_log(&self.log).get(id) {
            Some(m) => m.display_text.chars().count(),
            None => return,
        };
        let plan = RevealPlan::new(duration, total, self.min_reveal_interval);

        run_reveal(plan, |visible| {
            let mut log = lock_log(&self.log);
            if log.get(id).is_none() {
                return false;
            }
            if log.reveal(id, visible) {
                send_event(
                    &self.events,
                    TurnEvent::Reveal {
                        id,
                        visible_chars: visible,
                    },
                );
            }
            true
        })
        .await;
    }

    fn show_all(&self, id: MessageId) {
        let mut log = lock_log(&self.log);
        let Some(total) = log.get(id).map(|m| m.display_text.chars().count()) else {
            return;
        };
        if log.reveal(id, total) {
            send_event(
                &self.events,
                TurnEvent::Reveal {
                    id,
                    visible_chars: total,
                },
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
