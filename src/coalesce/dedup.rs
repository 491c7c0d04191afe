//! Short-horizon transcript echo suppression
//!
//! Recognizers occasionally emit the same final transcript twice. The
//! suppressor drops a request whose normalized text equals the immediately
//! preceding processed request within a fixed window.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::classifier::normalize_transcript;

/// Drops exact repeats of the previous request inside a short window
#[derive(Debug)]
pub struct DuplicateSuppressor {
    window: Duration,
    last: Mutex<Option<(String, Instant)>>,
}

impl DuplicateSuppressor {
    /// Create a suppressor with the given window
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            last: Mutex::new(None),
        }
    }

    /// Check `text` against the previous request.
    ///
    /// Returns `true` if this is a repeat within the window. Returns `false`
    /// otherwise and records `text` as the latest processed request.
    pub fn is_duplicate(&self, text: &str) -> bool {
        let normalized = normalize_transcript(text);
        let now = Instant::now();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());

        if let Some((prev, at)) = last.as_ref() {
            if *prev == normalized && now.duration_since(*at) < self.window {
                tracing::debug!(transcript = text, "duplicate transcript suppressed");
                return true;
            }
        }

        *last = Some((normalized, now));
        false
    }

    /// Forget the previous request
    pub fn clear(&self) {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Configured window
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }
}
