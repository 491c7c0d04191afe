//! Process-wide call coalescing
//!
//! One `CallHub` is shared by every conversation surface so that calls
//! triggered from the wake-word path and from buttons are coalesced against
//! each other.

mod dedup;
mod singleflight;

use std::time::Duration;

pub use dedup::DuplicateSuppressor;
pub use singleflight::{Pending, SharedOutcome, SingleFlight};

use crate::backend::{Polarity, RagResponse, WorkflowResponse};
use crate::classifier::{CommandKind, normalize_transcript};

/// Shared single-flight registries and the transcript echo guard
#[derive(Debug)]
pub struct CallHub {
    workflow: SingleFlight<WorkflowResponse>,
    queries: SingleFlight<RagResponse>,
    recent: DuplicateSuppressor,
}

impl CallHub {
    /// Create a hub with the given duplicate window
    #[must_use]
    pub fn new(duplicate_window: Duration) -> Self {
        Self {
            workflow: SingleFlight::new(),
            queries: SingleFlight::new(),
            recent: DuplicateSuppressor::new(duplicate_window),
        }
    }

    /// Registry for start/resume/restart and feedback calls
    #[must_use]
    pub const fn workflow(&self) -> &SingleFlight<WorkflowResponse> {
        &self.workflow
    }

    /// Registry for general queries
    #[must_use]
    pub const fn queries(&self) -> &SingleFlight<RagResponse> {
        &self.queries
    }

    /// Echo guard for recognized/typed requests
    #[must_use]
    pub const fn recent(&self) -> &DuplicateSuppressor {
        &self.recent
    }
}

/// Deterministic call signatures
pub mod keys {
    use super::{CommandKind, Polarity, normalize_transcript};

    /// Step feedback issued by a proceed command
    #[must_use]
    pub fn feedback(session: &str, step: u32) -> String {
        format!("feedback:{session}:{step}")
    }

    /// Feedback marked on a specific message
    #[must_use]
    pub fn message_feedback(session: &str, step: u32, polarity: Polarity) -> String {
        format!("feedback:{session}:{step}:{polarity}")
    }

    /// Start/resume/restart of a work order
    #[must_use]
    pub fn work_order(work_order_id: &str, user_id: &str, kind: CommandKind) -> String {
        format!("workorder:{work_order_id}:{user_id}:{kind}")
    }

    /// General question
    #[must_use]
    pub fn query(text: &str) -> String {
        format!("query:{}", normalize_transcript(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_deterministic() {
        assert_eq!(keys::feedback("s1", 2), "feedback:s1:2");
        assert_eq!(
            keys::message_feedback("s1", 2, Polarity::Negative),
            "feedback:s1:2:negative"
        );
        assert_eq!(
            keys::work_order("WO-5", "u1", CommandKind::Restart),
            "workorder:WO-5:u1:restart"
        );
        assert_eq!(keys::query("What is  torque?"), keys::query("what is torque"));
    }
}
