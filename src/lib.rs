//! Work-order voice front-end
//!
//! Hands-free guidance through maintenance work orders. A technician starts,
//! resumes or restarts a work order by voice, is walked through its steps
//! one at a time, and reports each step done; anything else is answered as a
//! general question.
//!
//! - Transcript classification (work-order commands, step continuation, queries)
//! - Single-flight coalescing of backend calls and duplicate transcript suppression
//! - Wake word listening and command recognition sessions
//! - Workflow state machine over the work-order backend
//! - Conversation surfaces with inactivity auto-close
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 Conversation surface                  │
//! │  Wake word  │  Recognition  │  Timeline  │  Timer    │
//! └──────────────────────┬───────────────────────────────┘
//!                        │
//! ┌──────────────────────▼───────────────────────────────┐
//! │  Classifier  →  Workflow machine  →  Call hub         │
//! └──────────────────────┬───────────────────────────────┘
//!                        │
//! ┌──────────────────────▼───────────────────────────────┐
//! │               Work-order backend (HTTP)               │
//! └──────────────────────────────────────────────────────┘
//! ```

#[cfg(feature = "audio")]
pub mod audio;
pub mod backend;
pub mod classifier;
pub mod coalesce;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod speech;
pub mod timeline;
pub mod workflow;

pub use backend::{HttpBackend, WorkflowBackend};
pub use classifier::{CommandKind, Intent, classify};
pub use coalesce::CallHub;
pub use config::Config;
pub use error::{Error, Result};
pub use orchestrator::{
    CloseReason, Collaborators, ConversationSurface, HandoffStore, NavigationRequest, Navigator,
    RecognitionState, SurfaceKind, SurfaceSettings, SurfaceUpdate, TurnOutcome,
    VoiceOrchestrator,
};
pub use timeline::{Message, Sender, Timeline};
pub use workflow::{StepOutcome, WorkflowMachine, WorkflowState};
