//! Inactivity timer
//!
//! Closes a conversation surface after a period without user interaction.
//! When the deadline passes while something is still going on (recording,
//! a request in flight, typing, speech playback, feedback submission) the
//! timer re-arms instead of firing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Activity that keeps a surface alive
#[derive(Debug, Default)]
pub struct ActivityFlags {
    recording: AtomicBool,
    typing: AtomicBool,
    processing: AtomicUsize,
    speaking: AtomicUsize,
    feedback: AtomicUsize,
}

/// Kinds of counted activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Processing,
    Speaking,
    Feedback,
}

impl ActivityFlags {
    pub fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::SeqCst);
    }

    pub fn set_typing(&self, typing: bool) {
        self.typing.store(typing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Mark `activity` as running until the guard drops
    #[must_use]
    pub fn enter(&self, activity: Activity) -> ActivityGuard<'_> {
        let counter = self.counter(activity);
        counter.fetch_add(1, Ordering::SeqCst);
        ActivityGuard(counter)
    }

    /// Whether anything is going on
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
            || self.typing.load(Ordering::SeqCst)
            || self.processing.load(Ordering::SeqCst) > 0
            || self.speaking.load(Ordering::SeqCst) > 0
            || self.feedback.load(Ordering::SeqCst) > 0
    }

    const fn counter(&self, activity: Activity) -> &AtomicUsize {
        match activity {
            Activity::Processing => &self.processing,
            Activity::Speaking => &self.speaking,
            Activity::Feedback => &self.feedback,
        }
    }
}

/// Keeps an activity counted while alive
pub struct ActivityGuard<'a>(&'a AtomicUsize);

impl Drop for ActivityGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Deadline-based inactivity timer
pub struct ActivityTimer {
    timeout: Duration,
    deadline: Arc<Mutex<Instant>>,
    task: JoinHandle<()>,
}

impl ActivityTimer {
    /// Arm a timer that sends on `expired` once the surface has been idle
    /// for `timeout`
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn start(timeout: Duration, flags: Arc<ActivityFlags>, expired: mpsc::Sender<()>) -> Self {
        let deadline = Arc::new(Mutex::new(Instant::now() + timeout));
        let task = tokio::spawn(run(timeout, Arc::clone(&deadline), flags, expired));
        Self {
            timeout,
            deadline,
            task,
        }
    }

    /// Push the deadline out by a full timeout
    pub fn reset(&self) {
        *lock(&self.deadline) = Instant::now() + self.timeout;
    }

    /// Disarm the timer
    pub fn stop(&self) {
        self.task.abort();
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Drop for ActivityTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    timeout: Duration,
    deadline: Arc<Mutex<Instant>>,
    flags: Arc<ActivityFlags>,
    expired: mpsc::Sender<()>,
) {
    loop {
        let at = *lock(&deadline);
        tokio::time::sleep_until(at).await;

        let now = Instant::now();
        {
            let mut current = lock(&deadline);
            if now < *current {
                // Reset while we slept
                continue;
            }
            if flags.is_busy() {
                tracing::debug!("inactivity deadline reached while busy; re-arming");
                *current = now + timeout;
                continue;
            }
        }

        tracing::info!(timeout_secs = timeout.as_secs(), "conversation inactive");
        let _ = expired.send(()).await;
        return;
    }
}

fn lock(deadline: &Mutex<Instant>) -> std::sync::MutexGuard<'_, Instant> {
    deadline.lock().unwrap_or_else(|e| e.into_inner())
}
