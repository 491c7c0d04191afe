//! Speech collaborators for terminals and headless hosts

use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::capability::{SpeechCapability, SpeechEvent};
use super::tts::SpeechSynthesizer;
use crate::Result;

const EVENT_CAPACITY: usize = 64;

/// A recognizer driven by explicit calls instead of a microphone
///
/// The terminal front-end feeds `/voice` lines through it, so typed text
/// exercises the same path as recognized speech.
pub struct ManualSpeech {
    available: AtomicBool,
    active: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
    events: broadcast::Sender<SpeechEvent>,
}

impl ManualSpeech {
    /// Create an available, inactive recognizer
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            available: AtomicBool::new(true),
            active: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            events,
        }
    }

    /// Make future starts succeed or fail
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Deliver a final transcript if capturing
    ///
    /// Returns false when the recognizer is not active.
    pub fn say(&self, transcript: &str) -> bool {
        if !self.is_active() {
            return false;
        }
        self.emit(SpeechEvent::Result {
            transcript: transcript.to_string(),
            is_final: true,
        });
        true
    }

    /// Deliver an arbitrary recognizer event
    ///
    /// An `End` event marks the recognizer inactive.
    pub fn emit(&self, event: SpeechEvent) {
        if event == SpeechEvent::End {
            self.active.store(false, Ordering::SeqCst);
        }
        let _ = self.events.send(event);
    }

    /// Number of successful starts
    #[must_use]
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of stops that ended an active capture
    #[must_use]
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Default for ManualSpeech {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechCapability for ManualSpeech {
    fn start_continuous(&self) -> bool {
        if !self.available.load(Ordering::SeqCst) {
            return false;
        }
        if self.active.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        true
    }

    async fn stop_continuous(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            let _ = self.events.send(SpeechEvent::End);
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<SpeechEvent> {
        self.events.subscribe()
    }
}

/// Recognizer for hosts with no speech support
pub struct UnavailableSpeech {
    events: broadcast::Sender<SpeechEvent>,
}

impl UnavailableSpeech {
    /// Create the unavailable recognizer
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1);
        Self { events }
    }
}

impl Default for UnavailableSpeech {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechCapability for UnavailableSpeech {
    fn start_continuous(&self) -> bool {
        false
    }

    async fn stop_continuous(&self) {}

    fn is_active(&self) -> bool {
        false
    }

    fn subscribe(&self) -> broadcast::Receiver<SpeechEvent> {
        self.events.subscribe()
    }
}

/// Writes spoken text to a sink instead of a speaker
pub struct ConsoleSynthesizer<W> {
    sink: Mutex<W>,
}

impl<W: Write + Send> ConsoleSynthesizer<W> {
    /// Write utterances to `sink`
    pub const fn new(sink: W) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }
}

impl ConsoleSynthesizer<std::io::Stdout> {
    /// Write utterances to stdout
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

#[async_trait]
impl<W: Write + Send> SpeechSynthesizer for ConsoleSynthesizer<W> {
    async fn speak(&self, text: &str) -> Result<()> {
        let mut sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(sink, "(speaking) {text}")?;
        sink.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_speech_lifecycle() {
        let speech = ManualSpeech::new();
        let mut rx = speech.subscribe();

        assert!(!speech.say("too early"));
        assert!(speech.start_continuous());
        assert!(!speech.start_continuous());
        assert!(speech.say("next"));
        speech.stop_continuous().await;

        assert_eq!(
            rx.recv().await.unwrap(),
            SpeechEvent::Result {
                transcript: "next".to_string(),
                is_final: true
            }
        );
        assert_eq!(rx.recv().await.unwrap(), SpeechEvent::End);
        assert_eq!((speech.starts(), speech.stops()), (1, 1));
    }

    #[tokio::test]
    async fn unavailable_speech_never_starts() {
        let speech = ManualSpeech::new();
        speech.set_available(false);
        assert!(!speech.start_continuous());
        assert!(!UnavailableSpeech::new().start_continuous());
    }

    #[tokio::test]
    async fn console_synthesizer_writes_lines() {
        let synth = ConsoleSynthesizer::new(Vec::new());
        synth.speak("Step 1").await.unwrap();
        let out = synth.sink.into_inner().unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "(speaking) Step 1\n");
    }
}
