//! Workflow change notifications

use serde::Serialize;

use super::session::Origin;

/// Emitted by the workflow machine after each applied change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    SessionStarted {
        session_id: String,
        work_order_id: String,
        origin: Origin,
        step_number: u32,
    },
    StepAdvanced {
        session_id: String,
        step_number: u32,
    },
    Completed {
        session_id: String,
        work_order_id: String,
    },
    /// Local session discarded (restart, surface closed)
    SessionCleared {
        session_id: Option<String>,
    },
    Failed {
        operation: &'static str,
        error: String,
    },
}
