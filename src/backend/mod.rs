//! Work-order backend client
//!
//! The `WorkflowBackend` trait is the seam between the orchestration core and
//! the HTTP endpoints; tests substitute scripted implementations.

mod http;
mod types;

use async_trait::async_trait;

pub use http::HttpBackend;
pub use types::{
    ChatFeedback, ChatQuery, CurrentStep, EstimatedTime, InputType, Polarity, Progress,
    RagQuery, RagResponse, ResponseKind, StepFeedback, WorkflowResponse,
};

use crate::Result;

/// Backend endpoints consumed by the workflow and the orchestrator
#[async_trait]
pub trait WorkflowBackend: Send + Sync {
    /// `POST /chat/query`: start, resume or restart a work order
    async fn chat_query(&self, request: &ChatQuery) -> Result<WorkflowResponse>;

    /// `POST /chat/feedback`: feedback addressed by session and step number
    async fn chat_feedback(&self, request: &ChatFeedback) -> Result<WorkflowResponse>;

    /// `POST /workorders/{id}/feedback`: feedback addressed by step id
    async fn step_feedback(
        &self,
        work_order_id: &str,
        request: &StepFeedback,
    ) -> Result<WorkflowResponse>;

    /// `POST /agentic-rag/query`: general question answering
    async fn rag_query(&self, request: &RagQuery) -> Result<RagResponse>;
}
