//! Text-to-speech output
//!
//! Playback is exclusive: a new utterance cancels the one in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::Result;

/// Something that can say text out loud
///
/// Dropping the returned future must stop playback.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak `text`, resolving when playback finishes
    async fn speak(&self, text: &str) -> Result<()>;
}

/// How an utterance ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// Played to completion
    Finished,
    /// Superseded by a newer utterance or cancelled
    Cancelled,
    /// Nothing to say
    Skipped,
}

/// Exclusive front for a synthesizer
pub struct Speaker {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    next_generation: AtomicU64,
    generation: watch::Sender<u64>,
    speaking: AtomicUsize,
}

impl Speaker {
    /// Wrap a synthesizer
    #[must_use]
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            synthesizer,
            next_generation: AtomicU64::new(0),
            generation,
            speaking: AtomicUsize::new(0),
        }
    }

    /// Speak `text`, cancelling anything currently playing
    ///
    /// # Errors
    ///
    /// Returns error if the synthesizer fails
    pub async fn say(&self, text: &str) -> Result<SpeakOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SpeakOutcome::Skipped);
        }

        let mine = self.supersede();
        let mut rx = self.generation.subscribe();
        let _speaking = SpeakingGuard::new(&self.speaking);

        tokio::select! {
            result = self.synthesizer.speak(text) => {
                result.map(|()| SpeakOutcome::Finished)
            }
            () = superseded(&mut rx, mine) => {
                tracing::debug!("utterance cancelled");
                Ok(SpeakOutcome::Cancelled)
            }
        }
    }

    /// Cancel any playback in flight
    pub fn cancel(&self) {
        self.supersede();
    }

    /// Whether an utterance is playing
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst) > 0
    }

    fn supersede(&self) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.generation.send_modify(|current| {
            *current = (*current).max(generation);
        });
        generation
    }
}

async fn superseded(rx: &mut watch::Receiver<u64>, mine: u64) {
    loop {
        if *rx.borrow_and_update() > mine {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

struct SpeakingGuard<'a>(&'a AtomicUsize);

impl<'a> SpeakingGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for SpeakingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    struct SlowSynth;

    #[async_trait]
    impl SpeechSynthesizer for SlowSynth {
        async fn speak(&self, _text: &str) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn new_utterance_cancels_previous() {
        let speaker = Arc::new(Speaker::new(Arc::new(SlowSynth)));

        let first = {
            let speaker = Arc::clone(&speaker);
            tokio::spawn(async move { speaker.say("first").await })
        };
        tokio::task::yield_now().await;
        assert!(speaker.is_speaking());

        let second = speaker.say("second").await.unwrap();
        assert_eq!(first.await.unwrap().unwrap(), SpeakOutcome::Cancelled);
        assert_eq!(second, SpeakOutcome::Finished);
        assert!(!speaker.is_speaking());
    }

    #[tokio::test]
    async fn blank_text_is_skipped() {
        let speaker = Speaker::new(Arc::new(SlowSynth));
        assert_eq!(speaker.say("  ").await.unwrap(), SpeakOutcome::Skipped);
    }
}
