//! Speech recognition session
//!
//! Wraps a continuous capability with a start/stop lifecycle, applies the
//! error policy, and restarts after an unexpected end while the session
//! still wants to listen.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::capability::{ErrorPolicy, RecognitionErrorKind, SpeechCapability, SpeechEvent};

/// Event delivered to the owner of a recognition session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Advisory partial transcript
    Interim(String),
    /// Committed transcript
    Final(String),
    /// An error the owner should know about
    Failed(RecognitionErrorKind),
    /// Session stopped on its own and will not restart
    Ended,
}

/// A start/stop wrapper around one speech capability
pub struct RecognitionSession {
    capability: Arc<dyn SpeechCapability>,
    wants_listen: Arc<AtomicBool>,
    restart_delay: Duration,
    events: mpsc::UnboundedSender<RecognitionEvent>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl RecognitionSession {
    /// Create a session and the receiver its events are delivered to
    #[must_use]
    pub fn new(
        capability: Arc<dyn SpeechCapability>,
        restart_delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<RecognitionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                capability,
                wants_listen: Arc::new(AtomicBool::new(false)),
                restart_delay,
                events: tx,
                pump: Mutex::new(None),
            },
            rx,
        )
    }

    /// Start listening
    ///
    /// Returns false if the session is already listening or the capability
    /// refused to start.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(&self) -> bool {
        if self.wants_listen.swap(true, Ordering::SeqCst) {
            return false;
        }

        // Subscribe before starting so no early event is missed
        let rx = self.capability.subscribe();
        if !self.capability.start_continuous() {
            self.wants_listen.store(false, Ordering::SeqCst);
            tracing::debug!("speech capability refused to start");
            return false;
        }

        let pump = tokio::spawn(pump(
            rx,
            Arc::clone(&self.capability),
            Arc::clone(&self.wants_listen),
            self.restart_delay,
            self.events.clone(),
        ));
        if let Some(previous) = self.lock_pump().replace(pump) {
            previous.abort();
        }

        tracing::debug!("recognition started");
        true
    }

    /// Stop listening
    ///
    /// Safe to call when nothing was recognized yet or the session is
    /// already stopped; always resolves.
    pub async fn stop(&self) {
        let was_listening = self.wants_listen.swap(false, Ordering::SeqCst);
        if let Some(pump) = self.lock_pump().take() {
            pump.abort();
        }
        if was_listening || self.capability.is_active() {
            self.capability.stop_continuous().await;
            tracing::debug!("recognition stopped");
        }
    }

    /// Whether the session wants to be listening
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.wants_listen.load(Ordering::SeqCst)
    }

    fn lock_pump(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pump.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for RecognitionSession {
    fn drop(&mut self) {
        if let Some(pump) = self.lock_pump().take() {
            pump.abort();
        }
    }
}

/// Translate capability events into session events
async fn pump(
    mut rx: broadcast::Receiver<SpeechEvent>,
    capability: Arc<dyn SpeechCapability>,
    wants_listen: Arc<AtomicBool>,
    restart_delay: Duration,
    events: mpsc::UnboundedSender<RecognitionEvent>,
) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "recognition events lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => {
                wants_listen.store(false, Ordering::SeqCst);
                let _ = events.send(RecognitionEvent::Ended);
                return;
            }
        };

        match event {
            SpeechEvent::Result {
                transcript,
                is_final,
            } => {
                let transcript = transcript.trim().to_string();
                if transcript.is_empty() {
                    continue;
                }
                let event = if is_final {
                    tracing::debug!(transcript = %transcript, "final transcript");
                    RecognitionEvent::Final(transcript)
                } else {
                    RecognitionEvent::Interim(transcript)
                };
                let _ = events.send(event);
            }
            SpeechEvent::Error(kind) => match kind.policy() {
                ErrorPolicy::Ignore => {
                    tracing::debug!(error = %kind, "ignoring recognition error");
                }
                ErrorPolicy::Surface => {
                    tracing::warn!(error = %kind, "recognition unavailable");
                    wants_listen.store(false, Ordering::SeqCst);
                    capability.stop_continuous().await;
                    let _ = events.send(RecognitionEvent::Failed(kind));
                    let _ = events.send(RecognitionEvent::Ended);
                    return;
                }
                ErrorPolicy::Defer => {
                    tracing::warn!(error = %kind, "recognition error");
                    let _ = events.send(RecognitionEvent::Failed(kind));
                }
                ErrorPolicy::StopQuietly => {
                    tracing::info!(error = %kind, "recognition aborted by environment");
                    wants_listen.store(false, Ordering::SeqCst);
                    capability.stop_continuous().await;
                    let _ = events.send(RecognitionEvent::Ended);
                    return;
                }
            },
            SpeechEvent::End => {
                if !wants_listen.load(Ordering::SeqCst) {
                    let _ = events.send(RecognitionEvent::Ended);
                    return;
                }

                tokio::time::sleep(restart_delay).await;

                // A stop may have been requested while we waited
                if !wants_listen.load(Ordering::SeqCst) {
                    let _ = events.send(RecognitionEvent::Ended);
                    return;
                }
                if capability.is_active() {
                    continue;
                }
                if capability.start_continuous() {
                    tracing::debug!("recognition auto-restarted");
                } else {
                    tracing::warn!("recognition could not be restarted");
                    wants_listen.store(false, Ordering::SeqCst);
                    let _ = events.send(RecognitionEvent::Ended);
                    return;
                }
            }
        }
    }
}
