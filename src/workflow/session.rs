//! Local record of an active workflow session

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// How the session came to exist
///
/// Fixed at creation; decides which feedback endpoint is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Started or restarted; feedback by session and step number
    Fresh,
    /// Resumed from prior progress; feedback by step id
    Resumed,
}

/// Portable view of a session, used to hand it to another surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub work_order_id: String,
    pub origin: Origin,
    pub step_number: u32,
    pub step_id: Option<String>,
    /// Local identity of the session this was taken from
    pub generation: u64,
}

/// The active session
#[derive(Debug, Clone)]
pub struct Session {
    session_id: String,
    work_order_id: String,
    origin: Origin,
    step_number: u32,
    step_id: Option<String>,
    generation: u64,
    step_started_at: Instant,
    completed: bool,
}

impl Session {
    /// Create a session positioned on `step_number`
    ///
    /// `generation` identifies the start call that produced it; machines that
    /// shared that call share the generation.
    #[must_use]
    pub fn new(
        session_id: String,
        work_order_id: String,
        origin: Origin,
        step_number: u32,
        step_id: Option<String>,
        generation: u64,
    ) -> Self {
        Self {
            session_id,
            work_order_id,
            origin,
            step_number: step_number.max(1),
            step_id,
            generation,
            step_started_at: Instant::now(),
            completed: false,
        }
    }

    /// Rebuild a session handed over from another surface
    ///
    /// Keeps the original generation, so both surfaces issue calls under the
    /// same signature.
    #[must_use]
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            session_id: snapshot.session_id,
            work_order_id: snapshot.work_order_id,
            origin: snapshot.origin,
            step_number: snapshot.step_number.max(1),
            step_id: snapshot.step_id,
            generation: snapshot.generation,
            step_started_at: Instant::now(),
            completed: false,
        }
    }

    /// Server session id
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn work_order_id(&self) -> &str {
        &self.work_order_id
    }

    #[must_use]
    pub const fn origin(&self) -> Origin {
        self.origin
    }

    /// Current 1-based step
    #[must_use]
    pub const fn step_number(&self) -> u32 {
        self.step_number
    }

    #[must_use]
    pub fn step_id(&self) -> Option<&str> {
        self.step_id.as_deref()
    }

    /// Identity of the start call that created this session
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Call-signature token: server id plus start-call identity
    ///
    /// Equal for every surface holding this session; distinct even if the
    /// backend reuses a session id after a restart.
    #[must_use]
    pub fn token(&self) -> String {
        format!("{}~{}", self.session_id, self.generation)
    }

    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.completed
    }

    /// Whole seconds spent on the current step
    #[must_use]
    pub fn seconds_on_step(&self) -> u64 {
        self.step_started_at.elapsed().as_secs()
    }

    /// Move to the next step
    pub fn advance(&mut self, step_id: Option<String>) {
        self.step_number += 1;
        if step_id.is_some() {
            self.step_id = step_id;
        }
        self.step_started_at = Instant::now();
    }

    pub fn complete(&mut self) {
        self.completed = true;
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            work_order_id: self.work_order_id.clone(),
            origin: self.origin,
            step_number: self.step_number,
            step_id: self.step_id.clone(),
            generation: self.generation,
        }
    }
}
