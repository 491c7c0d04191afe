//! Work-order workflow state machine
//!
//! Tracks the active session and its current step. Every backend call goes
//! through the shared single-flight registry, and a reply is applied only if
//! the session it was issued for is still current and still on the step it
//! was issued for. Coalesced or repeated feedback therefore advances a step
//! at most once.

mod events;
mod session;

use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;

pub use events::WorkflowEvent;
pub use session::{Origin, Session, SessionSnapshot};

use crate::backend::{
    ChatFeedback, ChatQuery, InputType, Polarity, ResponseKind, StepFeedback, WorkflowBackend,
    WorkflowResponse,
};
use crate::classifier::CommandKind;
use crate::coalesce::{CallHub, keys};
use crate::{Error, Result};

const EVENT_CAPACITY: usize = 64;

/// Where the machine is in the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    NoSession,
    /// Start, resume or restart call in flight
    Starting,
    /// Waiting for the technician to finish the current step
    StepActive,
    /// Feedback call in flight
    Submitting,
    /// Work order finished; terminal until a new start
    Complete,
    /// Last start attempt failed and no session exists
    Errored,
}

/// Result of a workflow operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// A session was created and positioned on its first step
    Started {
        snapshot: SessionSnapshot,
        text: String,
        spoken: String,
    },
    /// The session moved to the next step
    Advanced {
        snapshot: SessionSnapshot,
        text: String,
        spoken: String,
    },
    /// The work order finished
    Completed {
        snapshot: SessionSnapshot,
        text: String,
        spoken: String,
    },
    /// Another caller already applied this reply
    AlreadyApplied,
    /// The session changed while the call was in flight; reply dropped
    Discarded,
}

impl StepOutcome {
    /// Text to append to the timeline and text to speak, if any
    #[must_use]
    pub fn texts(&self) -> Option<(&str, &str)> {
        match self {
            Self::Started { text, spoken, .. }
            | Self::Advanced { text, spoken, .. }
            | Self::Completed { text, spoken, .. } => Some((text, spoken)),
            Self::AlreadyApplied | Self::Discarded => None,
        }
    }
}

/// Query text the backend recognizes for each command
#[must_use]
pub fn canonical_query(kind: CommandKind, work_order_id: &str) -> String {
    match kind {
        CommandKind::Start => format!("help me fix work order {work_order_id}"),
        CommandKind::Resume => format!("resume work order {work_order_id}"),
        CommandKind::Restart => format!("restart work order {work_order_id}"),
    }
}

#[derive(Debug)]
struct Inner {
    state: WorkflowState,
    session: Option<Session>,
    /// Bumped whenever the local session is discarded
    epoch: u64,
}

/// Everything needed to issue and later apply one feedback call
struct FeedbackCall {
    generation: u64,
    session_id: String,
    work_order_id: String,
    origin: Origin,
    step: u32,
    step_id: Option<String>,
    polarity: Polarity,
    notes: String,
    time_spent: u64,
}

impl FeedbackCall {
    fn new(session: &Session, step: u32, polarity: Polarity, notes: &str) -> Self {
        Self {
            generation: session.generation(),
            session_id: session.session_id().to_string(),
            work_order_id: session.work_order_id().to_string(),
            origin: session.origin(),
            step,
            step_id: session.step_id().map(str::to_string),
            polarity,
            notes: notes.trim().to_string(),
            time_spent: session.seconds_on_step(),
        }
    }

    fn feedback_text(&self) -> String {
        if self.notes.is_empty() {
            self.polarity.to_string()
        } else {
            format!("{}: {}", self.polarity, self.notes)
        }
    }
}

/// Drives one conversation's work-order session
pub struct WorkflowMachine {
    backend: Arc<dyn WorkflowBackend>,
    hub: Arc<CallHub>,
    user_id: String,
    inner: Mutex<Inner>,
    events: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowMachine {
    /// Create a machine with no session
    #[must_use]
    pub fn new(backend: Arc<dyn WorkflowBackend>, hub: Arc<CallHub>, user_id: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            hub,
            user_id: user_id.into(),
            inner: Mutex::new(Inner {
                state: WorkflowState::NoSession,
                session: None,
                epoch: 0,
            }),
            events,
        }
    }

    #[must_use]
    pub fn state(&self) -> WorkflowState {
        self.lock().state
    }

    /// Current session, if any
    #[must_use]
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.lock().session.as_ref().map(Session::snapshot)
    }

    /// Whether a session exists and has not completed
    #[must_use]
    pub fn has_active_session(&self) -> bool {
        self.lock()
            .session
            .as_ref()
            .is_some_and(|s| !s.is_completed())
    }

    /// Subscribe to workflow changes
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    /// Start a work order
    ///
    /// # Errors
    ///
    /// Returns error if the backend call fails or the reply is unusable
    pub async fn start(&self, work_order_id: &str, input: InputType) -> Result<StepOutcome> {
        self.begin(CommandKind::Start, work_order_id, input).await
    }

    /// Resume a work order where it was left
    ///
    /// # Errors
    ///
    /// Returns error if the backend call fails or the reply is unusable
    pub async fn resume(&self, work_order_id: &str, input: InputType) -> Result<StepOutcome> {
        self.begin(CommandKind::Resume, work_order_id, input).await
    }

    /// Restart a work order from step 1
    ///
    /// The local session is discarded before the call is issued.
    ///
    /// # Errors
    ///
    /// Returns error if the backend call fails or the reply is unusable
    pub async fn restart(&self, work_order_id: &str, input: InputType) -> Result<StepOutcome> {
        self.begin(CommandKind::Restart, work_order_id, input).await
    }

    /// Run a start, resume or restart command
    ///
    /// # Errors
    ///
    /// Returns error if the backend call fails or the reply is unusable
    pub async fn begin(
        &self,
        kind: CommandKind,
        work_order_id: &str,
        input: InputType,
    ) -> Result<StepOutcome> {
        let epoch = {
            let mut inner = self.lock();
            if kind == CommandKind::Restart {
                self.discard(&mut inner);
            }
            inner.state = WorkflowState::Starting;
            inner.epoch
        };

        tracing::info!(work_order_id, command = %kind, "starting work order session");

        let request = ChatQuery {
            query: canonical_query(kind, work_order_id),
            user_id: self.user_id.clone(),
            input_type: input,
        };
        let backend = Arc::clone(&self.backend);
        let pending = self.hub.workflow().acquire(
            &keys::work_order(work_order_id, &self.user_id, kind),
            move || async move { backend.chat_query(&request).await },
        );
        let joined = pending.joined();
        let generation = pending.call_id();
        let outcome = pending.await;

        let mut inner = self.lock();
        if inner.epoch != epoch {
            tracing::debug!(work_order_id, "session changed during start; reply dropped");
            return Ok(StepOutcome::Discarded);
        }

        let response = match outcome {
            Ok(response) => response,
            Err(e) => return Err(self.fail(&mut inner, "start", e)),
        };
        match response.kind {
            ResponseKind::WorkOrderStart => {}
            ResponseKind::Error => {
                let error = Error::BackendRejected(response.message);
                return Err(self.fail(&mut inner, "start", error));
            }
            other => {
                let error = Error::Workflow(format!("unexpected {other:?} reply to {kind}"));
                return Err(self.fail(&mut inner, "start", error));
            }
        }
        let Some(session_id) = response.session_id.clone() else {
            let error = Error::Workflow("start reply has no session id".to_string());
            return Err(self.fail(&mut inner, "start", error));
        };

        if joined
            && inner
                .session
                .as_ref()
                .is_some_and(|s| s.session_id() == session_id)
        {
            settle(&mut inner);
            return Ok(StepOutcome::AlreadyApplied);
        }

        let reported_step = response.current_step.as_ref().map_or(1, |s| s.step_number);
        let step = if kind == CommandKind::Restart { 1 } else { reported_step };
        let origin = if kind == CommandKind::Resume {
            Origin::Resumed
        } else {
            Origin::Fresh
        };
        let step_id = response.current_step.as_ref().and_then(|s| s.step_id.clone());

        let session = Session::new(
            session_id,
            work_order_id.to_string(),
            origin,
            step,
            step_id,
            generation,
        );
        let snapshot = session.snapshot();
        if let Some(previous) = inner.session.replace(session) {
            tracing::debug!(session_id = previous.session_id(), "replaced previous session");
        }
        inner.state = WorkflowState::StepActive;
        drop(inner);

        tracing::info!(
            session_id = %snapshot.session_id,
            work_order_id,
            step = snapshot.step_number,
            origin = ?origin,
            "work order session started"
        );
        self.emit(WorkflowEvent::SessionStarted {
            session_id: snapshot.session_id.clone(),
            work_order_id: work_order_id.to_string(),
            origin,
            step_number: snapshot.step_number,
        });

        let (text, spoken) = step_texts(&response);
        Ok(StepOutcome::Started {
            snapshot,
            text,
            spoken,
        })
    }

    /// Take over a session started by another surface
    pub fn adopt(&self, snapshot: SessionSnapshot) -> SessionSnapshot {
        let session = Session::from_snapshot(snapshot);
        let adopted = session.snapshot();

        let mut inner = self.lock();
        inner.session = Some(session);
        inner.state = WorkflowState::StepActive;
        drop(inner);

        tracing::debug!(session_id = %adopted.session_id, "adopted handed-off session");
        self.emit(WorkflowEvent::SessionStarted {
            session_id: adopted.session_id.clone(),
            work_order_id: adopted.work_order_id.clone(),
            origin: adopted.origin,
            step_number: adopted.step_number,
        });
        adopted
    }

    /// Report the current step done and move on
    ///
    /// # Errors
    ///
    /// Returns `NoSession` without a session, `SessionComplete` after
    /// completion, or the backend error; the step is unchanged on error
    pub async fn proceed(&self, polarity: Polarity, notes: &str) -> Result<StepOutcome> {
        let (call, key) = {
            let mut inner = self.lock();
            let session = inner.session.as_ref().ok_or(Error::NoSession)?;
            if session.is_completed() {
                return Err(Error::SessionComplete);
            }
            let step = session.step_number();
            let call = FeedbackCall::new(session, step, polarity, notes);
            let key = keys::feedback(&session.token(), step);
            inner.state = WorkflowState::Submitting;
            (call, key)
        };

        self.submit(call, key).await
    }

    /// Feedback attached to the message presenting `step` of `session_id`
    ///
    /// # Errors
    ///
    /// Returns `FeedbackRejected` if the message's session is not the
    /// current one or its step cannot take feedback, `SessionComplete` after
    /// completion, or the backend error
    pub async fn message_feedback(
        &self,
        session_id: &str,
        step: u32,
        polarity: Polarity,
    ) -> Result<StepOutcome> {
        let (call, key) = {
            let mut inner = self.lock();
            let session = inner
                .session
                .as_ref()
                .filter(|s| s.session_id() == session_id)
                .ok_or_else(|| {
                    Error::FeedbackRejected("message belongs to an inactive session".to_string())
                })?;
            if session.is_completed() {
                return Err(Error::SessionComplete);
            }
            let current = session.step_number();
            if step > current || (session.origin() == Origin::Resumed && step != current) {
                return Err(Error::FeedbackRejected(format!(
                    "step {step} is not the current step"
                )));
            }

            let call = FeedbackCall::new(session, step, polarity, "");
            let key = keys::message_feedback(&session.token(), step, polarity);
            if step == current {
                inner.state = WorkflowState::Submitting;
            }
            (call, key)
        };

        self.submit(call, key).await
    }

    /// Discard the local session
    pub fn clear(&self) {
        let mut inner = self.lock();
        self.discard(&mut inner);
    }

    async fn submit(&self, call: FeedbackCall, key: String) -> Result<StepOutcome> {
        let backend = Arc::clone(&self.backend);
        let pending = match call.origin {
            Origin::Fresh => {
                let request = ChatFeedback {
                    session_id: call.session_id.clone(),
                    step_number: call.step,
                    feedback: call.polarity,
                    notes: call.notes.clone(),
                    user_id: self.user_id.clone(),
                };
                self.hub.workflow().acquire(&key, move || async move {
                    backend.chat_feedback(&request).await
                })
            }
            Origin::Resumed => {
                let Some(step_id) = call.step_id.clone() else {
                    let error = Error::Workflow("resumed step has no step id".to_string());
                    return Err(self.fail(&mut self.lock(), "feedback", error));
                };
                let request = StepFeedback {
                    step_id,
                    feedback_text: call.feedback_text(),
                    time_spent: call.time_spent,
                };
                let work_order_id = call.work_order_id.clone();
                self.hub.workflow().acquire(&key, move || async move {
                    backend.step_feedback(&work_order_id, &request).await
                })
            }
        };

        tracing::debug!(session_id = %call.session_id, step = call.step, "submitting step feedback");
        let outcome = pending.await;

        let mut inner = self.lock();
        let result = self.apply_feedback(&mut inner, &call, outcome);
        drop(inner);

        if let Ok(applied) = &result {
            match applied {
                StepOutcome::Advanced { snapshot, .. } => {
                    self.emit(WorkflowEvent::StepAdvanced {
                        session_id: snapshot.session_id.clone(),
                        step_number: snapshot.step_number,
                    });
                }
                StepOutcome::Completed { snapshot, .. } => {
                    self.emit(WorkflowEvent::Completed {
                        session_id: snapshot.session_id.clone(),
                        work_order_id: snapshot.work_order_id.clone(),
                    });
                }
                _ => {}
            }
        }
        result
    }

    fn apply_feedback(
        &self,
        inner: &mut Inner,
        call: &FeedbackCall,
        outcome: Result<WorkflowResponse>,
    ) -> Result<StepOutcome> {
        let is_current = inner
            .session
            .as_ref()
            .is_some_and(|s| s.generation() == call.generation);
        if !is_current {
            tracing::debug!(session_id = %call.session_id, "session changed during feedback; reply dropped");
            return Ok(StepOutcome::Discarded);
        }

        let response = match outcome {
            Ok(response) => response,
            Err(e) => return Err(self.fail(inner, "feedback", e)),
        };

        match response.kind {
            ResponseKind::NextStep => {
                let Some(session) = inner.session.as_mut() else {
                    return Ok(StepOutcome::Discarded);
                };
                if session.is_completed() || session.step_number() != call.step {
                    settle(inner);
                    return Ok(StepOutcome::AlreadyApplied);
                }

                let reported = response.current_step.as_ref().map(|s| s.step_number);
                if reported.is_some_and(|n| n != call.step + 1) {
                    tracing::warn!(
                        expected = call.step + 1,
                        reported = ?reported,
                        "backend step number disagrees with local count"
                    );
                }
                session.advance(response.current_step.as_ref().and_then(|s| s.step_id.clone()));
                let snapshot = session.snapshot();
                inner.state = WorkflowState::StepActive;

                tracing::info!(session_id = %snapshot.session_id, step = snapshot.step_number, "step advanced");
                let (text, spoken) = step_texts(&response);
                Ok(StepOutcome::Advanced {
                    snapshot,
                    text,
                    spoken,
                })
            }
            ResponseKind::WorkOrderComplete => {
                let Some(session) = inner.session.as_mut() else {
                    return Ok(StepOutcome::Discarded);
                };
                if session.is_completed() || session.step_number() != call.step {
                    settle(inner);
                    return Ok(StepOutcome::AlreadyApplied);
                }

                session.complete();
                let snapshot = session.snapshot();
                inner.state = WorkflowState::Complete;

                tracing::info!(session_id = %snapshot.session_id, "work order complete");
                let (text, spoken) = completion_texts(&response);
                Ok(StepOutcome::Completed {
                    snapshot,
                    text,
                    spoken,
                })
            }
            ResponseKind::Error => {
                let error = Error::BackendRejected(response.message);
                Err(self.fail(inner, "feedback", error))
            }
            other => {
                let error = Error::Workflow(format!("unexpected {other:?} reply to feedback"));
                Err(self.fail(inner, "feedback", error))
            }
        }
    }

    fn discard(&self, inner: &mut Inner) {
        inner.epoch += 1;
        inner.state = WorkflowState::NoSession;
        if let Some(old) = inner.session.take() {
            tracing::debug!(session_id = old.session_id(), "session discarded");
            self.emit(WorkflowEvent::SessionCleared {
                session_id: Some(old.session_id().to_string()),
            });
        }
    }

    /// Restore a resting state after a failed call and report it
    fn fail(&self, inner: &mut Inner, operation: &'static str, error: Error) -> Error {
        settle(inner);
        if inner.session.is_none() {
            inner.state = WorkflowState::Errored;
        }
        tracing::warn!(operation, error = %error, "workflow call failed");
        self.emit(WorkflowEvent::Failed {
            operation,
            error: error.to_string(),
        });
        error
    }

    fn emit(&self, event: WorkflowEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Resting state implied by the session
fn settle(inner: &mut Inner) {
    inner.state = match &inner.session {
        Some(s) if s.is_completed() => WorkflowState::Complete,
        Some(_) => WorkflowState::StepActive,
        None => WorkflowState::NoSession,
    };
}

/// Timeline text and spoken text for a step reply
fn step_texts(response: &WorkflowResponse) -> (String, String) {
    let text = if response.message.trim().is_empty() {
        response.current_step.as_ref().map_or_else(String::new, |step| {
            let mut text = format!("Step {}: {}", step.step_number, step.description);
            if let Some(estimate) = &step.estimated_time {
                let _ = write!(text, " (about {estimate})");
            }
            text
        })
    } else {
        response.message.clone()
    };
    let spoken = spoken_or(response.spoken_text(), &text);
    (text, spoken)
}

/// Timeline text and spoken text for a completion reply
fn completion_texts(response: &WorkflowResponse) -> (String, String) {
    let mut text = if response.message.trim().is_empty() {
        "Work order complete.".to_string()
    } else {
        response.message.clone()
    };
    if let Some(summary) = response.summary.as_deref().filter(|s| !s.trim().is_empty()) {
        let _ = write!(text, "\n\n{summary}");
    }
    let spoken = spoken_or(response.spoken_text(), &text);
    (text, spoken)
}

fn spoken_or(spoken: &str, fallback: &str) -> String {
    if spoken.trim().is_empty() {
        fallback.to_string()
    } else {
        spoken.to_string()
    }
}
