//! Conversation module: the message log and the two-stage turn orchestrator.
//!
//! # Architecture
//!
//! ```text
//! TurnCommand (mpsc) ─▶ TurnOrchestrator::run()   ← async tokio task
//!                           │
//!                           ├─ Submit  → correct → (teach) → MessageLog
//!                           ├─ Replay  → PlaybackSynchronizer (cached)
//!                           ├─ UpdateSettings
//!                           └─ Reset
//!
//! TurnEvent (mpsc) ◀── Phase / UserMessage / AssistantMessage /
//!                      AudioReady / Reveal / Notice
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use voice_tutor::config::AppConfig;
//! use voice_tutor::conversation::{new_shared_log, TurnCommand, TurnOptions, TurnOrchestrator};
//! use voice_tutor::relay::HttpRelay;
//! use voice_tutor::tutor::{FailOpenTutor, RelayTutor};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let relay = Arc::new(HttpRelay::new(config.relay.url.clone()));
//!     let tutor = Arc::new(FailOpenTutor::new(
//!         RelayTutor::from_config(relay, &config.tutor),
//!         &config.tutor.fallback_reply,
//!     ));
//!
//!     let (event_tx, mut event_rx) = mpsc::unbounded_channel();
//!     let (command_tx, command_rx) = mpsc::channel(16);
//!     let orchestrator = TurnOrchestrator::new(
//!         new_shared_log(),
//!         tutor,
//!         event_tx,
//!         config.session.clone(),
//!         TurnOptions::from_config(&config),
//!     );
//!     tokio::spawn(orchestrator.run(command_rx));
//!
//!     command_tx.send(TurnCommand::Submit("안녕하세요".into())).await.unwrap();
//!     while let Some(event) = event_rx.recv().await {
//!         println!("{event:?}");
//!     }
//! }
//! ```

pub mod message;
pub mod orchestrator;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use message::{
    lock_log, new_shared_log, normalize_display, IdClock, Message, MessageId, MessageLog, Role,
    SharedLog,
};
pub use orchestrator::{
    TurnCommand, TurnError, TurnEvent, TurnOptions, TurnOrchestrator, TurnOutcome,
};
pub use state::TurnPhase;
