//! Wake word listening
//!
//! A low-duty recognition session that waits for a trigger phrase. Besides
//! the trigger phrase it also recognizes direct work-order commands, and
//! proceed commands while a workflow session is active.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::capability::{ErrorPolicy, RecognitionErrorKind, SpeechCapability};
use super::recognition::{RecognitionEvent, RecognitionSession};
use crate::classifier::{classify_command, is_proceed, normalize_transcript};

/// State of the wake word listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Not listening
    Stopped,
    /// Waiting for a trigger phrase or command
    Listening,
}

/// Event emitted by the listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeEvent {
    /// Trigger phrase heard; the listener has stopped itself
    Wake,
    /// Command heard without a trigger phrase (raw transcript)
    Command(String),
    /// Listening failed in a way the user should be told about
    Unavailable(RecognitionErrorKind),
    /// Listener stopped on its own
    Stopped,
}

/// Outcome of matching one final transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeMatch {
    /// Transcript contains a trigger phrase
    Wake,
    /// Transcript is a command
    Command,
    /// Nothing to act on
    None,
}

/// Pure transcript matcher used by the listener
#[derive(Debug, Clone)]
pub struct WakeMatcher {
    phrases: Vec<String>,
    session_active: Arc<AtomicBool>,
}

impl WakeMatcher {
    /// Create a matcher for the given trigger phrases
    ///
    /// `session_active` gates proceed commands.
    #[must_use]
    pub fn new(phrases: &[String], session_active: Arc<AtomicBool>) -> Self {
        let phrases: Vec<String> = phrases
            .iter()
            .map(|p| normalize_transcript(p))
            .filter(|p| !p.is_empty())
            .collect();

        tracing::debug!(wake_phrases = ?phrases, "wake matcher initialized");

        Self {
            phrases,
            session_active,
        }
    }

    /// Classify a final transcript
    #[must_use]
    pub fn check(&self, transcript: &str) -> WakeMatch {
        let padded = format!(" {} ", normalize_transcript(transcript));

        if self
            .phrases
            .iter()
            .any(|phrase| padded.contains(&format!(" {phrase} ")))
        {
            tracing::info!(transcript, "wake phrase detected");
            return WakeMatch::Wake;
        }

        if classify_command(transcript).is_some() {
            return WakeMatch::Command;
        }

        if self.session_active.load(Ordering::SeqCst) && is_proceed(transcript) {
            return WakeMatch::Command;
        }

        WakeMatch::None
    }
}

/// Listens for a trigger phrase on its own recognition session
pub struct WakeWordListener {
    session: Arc<RecognitionSession>,
    translator: JoinHandle<()>,
}

impl WakeWordListener {
    /// Create a listener and the receiver its events are delivered to
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new(
        capability: Arc<dyn SpeechCapability>,
        matcher: WakeMatcher,
        restart_delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<WakeEvent>) {
        let (session, session_rx) = RecognitionSession::new(capability, restart_delay);
        let session = Arc::new(session);
        let (tx, rx) = mpsc::unbounded_channel();

        let translator = tokio::spawn(translate(
            session_rx,
            Arc::clone(&session),
            matcher,
            tx,
        ));

        (
            Self {
                session,
                translator,
            },
            rx,
        )
    }

    /// Start listening; false if already listening or unavailable
    pub fn start(&self) -> bool {
        let started = self.session.start();
        if started {
            tracing::debug!("wake word listener started");
        }
        started
    }

    /// Stop listening
    pub async fn stop(&self) {
        if self.session.is_listening() {
            tracing::debug!("wake word listener stopping");
        }
        self.session.stop().await;
    }

    /// Current listener state
    #[must_use]
    pub fn state(&self) -> ListenerState {
        if self.session.is_listening() {
            ListenerState::Listening
        } else {
            ListenerState::Stopped
        }
    }

    /// Whether the listener is listening
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.state() == ListenerState::Listening
    }
}

impl Drop for WakeWordListener {
    fn drop(&mut self) {
        self.translator.abort();
    }
}

async fn translate(
    mut session_rx: mpsc::UnboundedReceiver<RecognitionEvent>,
    session: Arc<RecognitionSession>,
    matcher: WakeMatcher,
    tx: mpsc::UnboundedSender<WakeEvent>,
) {
    while let Some(event) = session_rx.recv().await {
        let out = match event {
            RecognitionEvent::Final(transcript) => match matcher.check(&transcript) {
                WakeMatch::Wake => {
                    session.stop().await;
                    Some(WakeEvent::Wake)
                }
                WakeMatch::Command => {
                    tracing::info!(transcript = %transcript, "command heard while wake listening");
                    Some(WakeEvent::Command(transcript))
                }
                WakeMatch::None => {
                    tracing::trace!(transcript = %transcript, "no wake phrase");
                    None
                }
            },
            RecognitionEvent::Interim(_) => None,
            RecognitionEvent::Failed(kind) => {
                (kind.policy() == ErrorPolicy::Surface).then_some(WakeEvent::Unavailable(kind))
            }
            RecognitionEvent::Ended => Some(WakeEvent::Stopped),
        };

        if let Some(out) = out {
            if tx.send(out).is_err() {
                break;
            }
        }
    }
}
