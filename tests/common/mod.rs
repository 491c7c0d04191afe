//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use workorder_voice::backend::{
    ChatFeedback, ChatQuery, CurrentStep, RagQuery, RagResponse, ResponseKind, StepFeedback,
    WorkflowBackend, WorkflowResponse,
};
use workorder_voice::config::{ConversationConfig, VoiceConfig};
use workorder_voice::speech::{ManualSpeech, SpeechCapability, SpeechSynthesizer};
use workorder_voice::{
    CallHub, Collaborators, Error, HandoffStore, NavigationRequest, Navigator, Result,
    SurfaceSettings,
};

/// A backend call as the scripted backend received it
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Query(ChatQuery),
    Feedback(ChatFeedback),
    StepFeedback(String, StepFeedback),
    Rag(RagQuery),
}

/// Backend that replays queued replies and records every call
///
/// An endpoint with nothing queued answers with a 500.
#[derive(Default)]
pub struct ScriptedBackend {
    starts: Mutex<VecDeque<Result<WorkflowResponse>>>,
    feedback: Mutex<VecDeque<Result<WorkflowResponse>>>,
    answers: Mutex<VecDeque<Result<RagResponse>>>,
    calls: Mutex<Vec<Recorded>>,
    latency: Mutex<Duration>,
}

impl ScriptedBackend {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a reply for `/chat/query`
    pub fn on_start(&self, reply: Result<WorkflowResponse>) {
        self.starts.lock().unwrap().push_back(reply);
    }

    /// Queue a reply shared by both feedback endpoints
    pub fn on_feedback(&self, reply: Result<WorkflowResponse>) {
        self.feedback.lock().unwrap().push_back(reply);
    }

    /// Queue a reply for `/agentic-rag/query`
    pub fn on_query(&self, reply: Result<RagResponse>) {
        self.answers.lock().unwrap().push_back(reply);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    #[must_use]
    pub fn start_calls(&self) -> usize {
        self.count(|c| matches!(c, Recorded::Query(_)))
    }

    #[must_use]
    pub fn feedback_calls(&self) -> usize {
        self.count(|c| matches!(c, Recorded::Feedback(_) | Recorded::StepFeedback(..)))
    }

    #[must_use]
    pub fn query_calls(&self) -> usize {
        self.count(|c| matches!(c, Recorded::Rag(_)))
    }

    fn count(&self, pred: impl Fn(&Recorded) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    async fn reply_with<T>(&self, call: Recorded, queue: &Mutex<VecDeque<Result<T>>>) -> Result<T> {
        self.calls.lock().unwrap().push(call);
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        queue.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(Error::Backend {
                status: 500,
                body: "unscripted".to_string(),
            })
        })
    }
}

#[async_trait]
impl WorkflowBackend for ScriptedBackend {
    async fn chat_query(&self, request: &ChatQuery) -> Result<WorkflowResponse> {
        self.reply_with(Recorded::Query(request.clone()), &self.starts)
            .await
    }

    async fn chat_feedback(&self, request: &ChatFeedback) -> Result<WorkflowResponse> {
        self.reply_with(Recorded::Feedback(request.clone()), &self.feedback)
            .await
    }

    async fn step_feedback(
        &self,
        work_order_id: &str,
        request: &StepFeedback,
    ) -> Result<WorkflowResponse> {
        let call = Recorded::StepFeedback(work_order_id.to_string(), request.clone());
        self.reply_with(call, &self.feedback).await
    }

    async fn rag_query(&self, request: &RagQuery) -> Result<RagResponse> {
        self.reply_with(Recorded::Rag(request.clone()), &self.answers)
            .await
    }
}

fn step(number: u32, step_id: Option<&str>) -> CurrentStep {
    CurrentStep {
        step_number: number,
        description: format!("Do step {number}"),
        estimated_time: None,
        step_id: step_id.map(str::to_string),
    }
}

fn reply(kind: ResponseKind, session_id: Option<&str>, message: &str) -> WorkflowResponse {
    WorkflowResponse {
        kind,
        session_id: session_id.map(str::to_string),
        message: message.to_string(),
        tts_text: None,
        current_step: None,
        progress: None,
        summary: None,
    }
}

/// `work_order_start` positioned on `number`
#[must_use]
pub fn started(session_id: &str, number: u32) -> WorkflowResponse {
    WorkflowResponse {
        current_step: Some(step(number, Some(&format!("step-{number}")))),
        ..reply(
            ResponseKind::WorkOrderStart,
            Some(session_id),
            &format!("Step {number}: Do step {number}"),
        )
    }
}

/// `next_step` positioned on `number`
#[must_use]
pub fn next_step(number: u32) -> WorkflowResponse {
    WorkflowResponse {
        current_step: Some(step(number, Some(&format!("step-{number}")))),
        ..reply(
            ResponseKind::NextStep,
            None,
            &format!("Step {number}: Do step {number}"),
        )
    }
}

#[must_use]
pub fn completed() -> WorkflowResponse {
    WorkflowResponse {
        summary: Some("All steps done".to_string()),
        ..reply(ResponseKind::WorkOrderComplete, None, "Work order complete.")
    }
}

/// Reply with `type: error`
#[must_use]
pub fn rejected(message: &str) -> WorkflowResponse {
    reply(ResponseKind::Error, None, message)
}

#[must_use]
pub fn answer(text: &str) -> RagResponse {
    RagResponse {
        success: true,
        result: text.to_string(),
        route: None,
        tts_text: None,
    }
}

#[must_use]
pub fn server_error() -> Error {
    Error::Backend {
        status: 503,
        body: "unavailable".to_string(),
    }
}

/// Synthesizer that records what it was asked to say
#[derive(Default)]
pub struct RecordingSynthesizer {
    spoken: Mutex<Vec<String>>,
}

impl RecordingSynthesizer {
    #[must_use]
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for RecordingSynthesizer {
    async fn speak(&self, text: &str) -> Result<()> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Navigator that records requests
#[derive(Default)]
pub struct RecordingNavigator {
    requests: Mutex<Vec<NavigationRequest>>,
}

impl RecordingNavigator {
    #[must_use]
    pub fn requests(&self) -> Vec<NavigationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, request: NavigationRequest) {
        self.requests.lock().unwrap().push(request);
    }
}

/// Surface settings with short delays
#[must_use]
pub fn settings() -> SurfaceSettings {
    SurfaceSettings {
        user_id: "tech-1".to_string(),
        voice: VoiceConfig {
            restart_delay: Duration::from_millis(10),
            stop_grace: Duration::from_millis(5),
            ..VoiceConfig::default()
        },
        conversation: ConversationConfig {
            inactivity_timeout: Duration::from_secs(60),
            duplicate_window: Duration::from_secs(2),
        },
    }
}

/// Every collaborator of a surface, with handles kept for assertions
pub struct Rig {
    pub backend: Arc<ScriptedBackend>,
    pub hub: Arc<CallHub>,
    pub wake: Arc<ManualSpeech>,
    pub command: Arc<ManualSpeech>,
    pub synthesizer: Arc<RecordingSynthesizer>,
    pub navigator: Arc<RecordingNavigator>,
    pub handoff: Arc<HandoffStore>,
}

impl Rig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            backend: ScriptedBackend::new(),
            hub: Arc::new(CallHub::new(Duration::from_secs(2))),
            wake: Arc::new(ManualSpeech::new()),
            command: Arc::new(ManualSpeech::new()),
            synthesizer: Arc::new(RecordingSynthesizer::default()),
            navigator: Arc::new(RecordingNavigator::default()),
            handoff: Arc::new(HandoffStore::new()),
        }
    }

    #[must_use]
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            backend: Arc::clone(&self.backend) as Arc<dyn WorkflowBackend>,
            hub: Arc::clone(&self.hub),
            wake_speech: Arc::clone(&self.wake) as Arc<dyn SpeechCapability>,
            command_speech: Arc::clone(&self.command) as Arc<dyn SpeechCapability>,
            synthesizer: Arc::clone(&self.synthesizer) as Arc<dyn SpeechSynthesizer>,
            navigator: Arc::clone(&self.navigator) as Arc<dyn Navigator>,
            handoff: Arc::clone(&self.handoff),
        }
    }
}

/// Poll `condition` until it holds, panicking after two seconds
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
