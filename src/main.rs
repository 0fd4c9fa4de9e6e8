//! Application entry point — Korean conversation tutor.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime (current-thread).
//! 4. Check the microphone; print a persistent banner when access fails.
//! 5. Build the tutor ([`FailOpenTutor`] over [`RelayTutor`]) and the
//!    playback synchronizer (falling back to [`SilentOutput`]).
//! 6. Build voice input ([`VoiceCapture`] over [`RelayTranscriber`]) when
//!    the microphone is usable.
//! 7. Spawn the [`TurnOrchestrator`] command loop.
//! 8. Run the line-based front-end until `/quit` or end of input.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use voice_tutor::{
    capture::{
        new_shared_recording, probe_permission, CaptureState, CpalMicrophone, EventOutcome,
        RecognitionEvent, RelayTranscriber, ReleaseOutcome, SentenceKind, VoiceCapture,
    },
    config::{AppConfig, CaptureConfig, SessionSettings, Voice},
    conversation::{
        new_shared_log, Message, MessageId, TurnCommand, TurnEvent, TurnOptions,
        TurnOrchestrator, TurnPhase,
    },
    notice::{Locale, Notice},
    playback::{AudioOutput, PlaybackSynchronizer, RelaySynthesizer, RodioOutput, SilentOutput},
    relay::{HttpRelay, Relay},
    tutor::{FailOpenTutor, RelayTutor},
};

/// Speech-rate step for `/faster` and `/slower`.
const RATE_STEP: f32 = 0.1;

// ---------------------------------------------------------------------------
// Front-end commands
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum Input {
    Say(String),
    Talk,
    Replay,
    Voice(Voice),
    Faster,
    Slower,
    Reset,
    Quit,
    Help,
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return Input::Say(line.to_string());
    };

    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("talk"), None) => Input::Talk,
        (Some("replay"), None) => Input::Replay,
        (Some("voice"), Some("female")) => Input::Voice(Voice::Female),
        (Some("voice"), Some("male")) => Input::Voice(Voice::Male),
        (Some("faster"), None) => Input::Faster,
        (Some("slower"), None) => Input::Slower,
        (Some("reset"), None) => Input::Reset,
        (Some("quit") | Some("exit"), None) => Input::Quit,
        (Some("help"), None) => Input::Help,
        _ => Input::Unknown(line.to_string()),
    }
}

/// Answer to "question or statement?" after a voice capture.  `None`
/// cancels.
fn parse_confirmation(line: &str) -> Option<SentenceKind> {
    match line.trim() {
        "?" => Some(SentenceKind::Question),
        "" | "." => Some(SentenceKind::Statement),
        _ => None,
    }
}

const HELP: &str = "\
  <text>               say something in Korean
  /talk                speak instead; Enter stops listening
  /replay              play the last reply again
  /voice female|male   change the reply voice
  /faster, /slower     change the speech rate
  /reset               start a new conversation
  /quit                leave";

// ---------------------------------------------------------------------------
// Terminal rendering
// ---------------------------------------------------------------------------

/// Prints turn events.  Assistant messages that are revealed progressively
/// are printed piece by piece as `Reveal` events arrive.
struct Screen {
    locale: Locale,
    /// Hidden assistant messages and how many characters are on screen.
    revealing: HashMap<MessageId, (Message, usize)>,
}

impl Screen {
    fn new(locale: Locale) -> Self {
        Self {
            locale,
            revealing: HashMap::new(),
        }
    }

    fn notice(&self, notice: Notice) {
        let text = notice.text(self.locale);
        if notice.is_persistent() {
            println!("\n  *** {text} ***\n");
        } else {
            println!("  ! {text}");
        }
    }

    fn show(&mut self, event: TurnEvent) {
        match event {
            TurnEvent::Phase(TurnPhase::Idle) => {}
            TurnEvent::Phase(phase) => println!("  … {}", phase.label()),
            TurnEvent::UserMessage(m) => print_user(&m),
            TurnEvent::AssistantMessage(m) => match m.revealed {
                Some(shown) => {
                    print!("tutor> ");
                    let _ = std::io::stdout().flush();
                    self.revealing.insert(m.id, (m, shown));
                }
                None => {
                    println!("tutor> {}", m.display_text);
                    print_annotations(&m);
                }
            },
            TurnEvent::Reveal { id, visible_chars } => self.reveal(id, visible_chars),
            TurnEvent::AudioReady { id, handle } => {
                log::debug!("audio ready for message {id} ({} bytes)", handle.len());
            }
            TurnEvent::Notice(notice) => self.notice(notice),
        }
    }

    fn reveal(&mut self, id: MessageId, visible: usize) {
        let Some((message, shown)) = self.revealing.get_mut(&id) else {
            return;
        };
        let piece: String = message
            .display_text
            .chars()
            .skip(*shown)
            .take(visible.saturating_sub(*shown))
            .collect();
        print!("{piece}");
        let _ = std::io::stdout().flush();
        *shown = visible.max(*shown);

        if *shown >= message.display_text.chars().count() {
            println!();
            if let Some((message, _)) = self.revealing.remove(&id) {
                print_annotations(&message);
            }
        }
    }
}

fn print_user(m: &Message) {
    if m.is_valid {
        println!("  you> {}", m.display_text);
        return;
    }
    println!("  you> {}  ✗", m.original_text.as_deref().unwrap_or_default());
    println!("   ->  {}", m.display_text);
    if let Some(explanation) = &m.explanation {
        println!("       {explanation}");
    }
}

fn print_annotations(m: &Message) {
    for v in &m.vocabulary {
        match &v.pronunciation {
            Some(p) => println!("       · {} [{p}] — {}", v.surface_form, v.meaning),
            None => println!("       · {} — {}", v.surface_form, v.meaning),
        }
    }
    for g in &m.grammar {
        println!("       ※ {} — {}", g.pattern, g.explanation);
    }
}

// ---------------------------------------------------------------------------
// Voice input
// ---------------------------------------------------------------------------

/// Push-to-talk over the terminal: `/talk` presses, Enter releases.
struct VoiceInput {
    capture: VoiceCapture<RelayTranscriber, CpalMicrophone>,
    events: mpsc::UnboundedReceiver<(u64, RecognitionEvent)>,
}

impl VoiceInput {
    fn new(relay: Arc<dyn Relay>, config: &CaptureConfig) -> Self {
        let recording = new_shared_recording();
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = RelayTranscriber::new(relay, Arc::clone(&recording), tx, config);
        Self {
            capture: VoiceCapture::new(engine, CpalMicrophone::with_recording(recording), config),
            events: rx,
        }
    }

    fn press(&mut self, screen: &Screen) {
        match self.capture.press() {
            Ok(_) => println!("  listening… press Enter when done"),
            Err(e) => {
                log::warn!("voice capture could not start: {e}");
                if let Some(notice) = e.notice() {
                    screen.notice(notice);
                }
            }
        }
    }

    /// Transcribe what was heard and end the capture.
    async fn release(&mut self, screen: &Screen) {
        self.capture.engine().finish().await;
        self.drain(screen);
        if self.capture.state() != CaptureState::Capturing {
            return;
        }

        match self.capture.release() {
            Ok(ReleaseOutcome::Confirm(prompt)) => {
                println!("  heard: {}", prompt.transcript);
                println!("  ? question   . or Enter statement   anything else cancels");
            }
            Ok(ReleaseOutcome::Retry(reason)) => screen.notice(reason.notice()),
            Err(e) => log::warn!("voice capture: {e}"),
        }
        self.drain(screen);
    }

    /// Answer the confirmation prompt; returns the text to submit.
    fn confirm(&mut self, line: &str) -> Option<String> {
        let Some(kind) = parse_confirmation(line) else {
            self.capture.cancel();
            println!("  cancelled");
            return None;
        };
        match self.capture.confirm(kind) {
            Ok(text) => Some(text),
            Err(e) => {
                log::warn!("voice capture: {e}");
                None
            }
        }
    }

    fn drain(&mut self, screen: &Screen) {
        while let Ok((generation, event)) = self.events.try_recv() {
            if let EventOutcome::Aborted(notice) = self.capture.handle_event(generation, event) {
                screen.notice(notice);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Front-end loop
// ---------------------------------------------------------------------------

async fn run_frontend(
    mut settings: SessionSettings,
    locale: Locale,
    mut voice: Result<VoiceInput, Notice>,
    commands: mpsc::Sender<TurnCommand>,
    mut events: mpsc::UnboundedReceiver<TurnEvent>,
) -> anyhow::Result<()> {
    let mut screen = Screen::new(locale);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut phase = TurnPhase::Idle;
    let mut last_reply: Option<MessageId> = None;

    println!("{HELP}\n");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                if let Ok(v) = voice.as_mut() {
                    match v.capture.state() {
                        CaptureState::Capturing => {
                            v.release(&screen).await;
                            continue;
                        }
                        CaptureState::Confirming => {
                            let Some(text) = v.confirm(&line) else {
                                continue;
                            };
                            if commands.send(TurnCommand::Submit(text)).await.is_err() {
                                log::error!("orchestrator stopped");
                                break;
                            }
                            continue;
                        }
                        CaptureState::Idle => {}
                    }
                }

                let command = match parse_input(&line) {
                    Input::Talk if phase.is_busy() => {
                        println!("  … {}", phase.label());
                        continue;
                    }
                    Input::Talk => {
                        match voice.as_mut() {
                            Ok(v) => v.press(&screen),
                            Err(notice) => screen.notice(*notice),
                        }
                        continue;
                    }
                    Input::Say(text) if phase.is_busy() => {
                        log::debug!("input ignored while {}: {text}", phase.label());
                        println!("  … {}", phase.label());
                        continue;
                    }
                    Input::Say(text) => TurnCommand::Submit(text),
                    Input::Replay => match last_reply {
                        Some(id) => TurnCommand::Replay(id),
                        None => continue,
                    },
                    Input::Voice(choice) => {
                        settings.voice = choice;
                        TurnCommand::UpdateSettings(settings.clone())
                    }
                    Input::Faster => {
                        settings.adjust_speech_rate(RATE_STEP);
                        println!("  speech rate {:.1}", settings.speech_rate());
                        TurnCommand::UpdateSettings(settings.clone())
                    }
                    Input::Slower => {
                        settings.adjust_speech_rate(-RATE_STEP);
                        println!("  speech rate {:.1}", settings.speech_rate());
                        TurnCommand::UpdateSettings(settings.clone())
                    }
                    Input::Reset => {
                        last_reply = None;
                        screen.revealing.clear();
                        TurnCommand::Reset
                    }
                    Input::Quit => break,
                    Input::Help => {
                        println!("{HELP}");
                        continue;
                    }
                    Input::Unknown(text) => {
                        println!("  unknown command: {text}");
                        continue;
                    }
                };
                if commands.send(command).await.is_err() {
                    log::error!("orchestrator stopped");
                    break;
                }
            }
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                match &event {
                    TurnEvent::Phase(p) => phase = *p,
                    TurnEvent::AssistantMessage(m) => {
                        last_reply = Some(m.id);
                    }
                    _ => {}
                }
                screen.show(event);
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Korean tutor starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4. Microphone check
    let locale = config.ui.locale;
    let microphone = probe_permission(&mut CpalMicrophone::new()).notice();
    if let Some(notice) = microphone {
        Screen::new(locale).notice(notice);
    }

    rt.block_on(async move {
        // 5. Tutor and playback
        let relay: Arc<dyn Relay> = Arc::new(HttpRelay::new(config.relay.url.clone()));
        log::info!("Relay: {}", config.relay.url);

        let tutor = Arc::new(FailOpenTutor::new(
            RelayTutor::from_config(Arc::clone(&relay), &config.tutor),
            &config.tutor.fallback_reply,
        ));

        let output: Arc<dyn AudioOutput> = match RodioOutput::open() {
            Ok(output) => Arc::new(output),
            Err(e) => {
                log::warn!("Audio output unavailable ({e}); replies will be silent");
                Arc::new(SilentOutput)
            }
        };
        let playback = Arc::new(PlaybackSynchronizer::new(
            Arc::new(RelaySynthesizer::from_config(Arc::clone(&relay), &config.speech)),
            output,
        ));

        // 6. Voice input
        let voice = match microphone {
            None => Ok(VoiceInput::new(relay, &config.capture)),
            Some(notice) => Err(notice),
        };

        // 7. Orchestrator
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel::<TurnCommand>(16);

        let orchestrator = TurnOrchestrator::new(
            new_shared_log(),
            tutor,
            event_tx,
            config.session.clone(),
            TurnOptions::from_config(&config),
        )
        .with_playback(playback);
        tokio::spawn(orchestrator.run(command_rx));

        // 8. Front-end
        run_frontend(config.session.clone(), locale, voice, command_tx, event_rx).await
    })?;

    log::info!("Korean tutor shutting down");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_utterances() {
        assert_eq!(parse_input("  저는 학생이에요  "), Input::Say("저는 학생이에요".into()));
        assert_eq!(parse_input(""), Input::Say(String::new()));
    }

    #[test]
    fn slash_commands() {
        assert_eq!(parse_input("/talk"), Input::Talk);
        assert_eq!(parse_input("/replay"), Input::Replay);
        assert_eq!(parse_input("/voice male"), Input::Voice(Voice::Male));
        assert_eq!(parse_input("/voice  female"), Input::Voice(Voice::Female));
        assert_eq!(parse_input("/faster"), Input::Faster);
        assert_eq!(parse_input("/slower"), Input::Slower);
        assert_eq!(parse_input("/reset"), Input::Reset);
        assert_eq!(parse_input("/quit"), Input::Quit);
    }

    #[test]
    fn confirmation_answers() {
        assert_eq!(parse_confirmation("?"), Some(SentenceKind::Question));
        assert_eq!(parse_confirmation(" . "), Some(SentenceKind::Statement));
        assert_eq!(parse_confirmation(""), Some(SentenceKind::Statement));
        assert_eq!(parse_confirmation("no"), None);
    }

    #[test]
    fn malformed_commands_are_unknown() {
        assert_eq!(parse_input("/voice robot"), Input::Unknown("/voice robot".into()));
        assert_eq!(parse_input("/replay now"), Input::Unknown("/replay now".into()));
    }
}
