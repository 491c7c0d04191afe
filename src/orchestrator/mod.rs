//! Voice orchestrator
//!
//! One `ConversationSurface` per open chat widget or work-order view. It
//! wires the wake word listener, the command recognition session, the
//! classifier, the workflow machine and the message timeline together, and
//! closes itself after a period of inactivity.
//!
//! Exactly one of the two recognizers listens at a time. Switching between
//! them is serialized: stop the active one, wait a short grace period, then
//! start the other.

mod navigation;
mod timer;

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

pub use navigation::{Handoff, HandoffStore, NavigationRequest, Navigator, PendingAction};
pub use timer::{Activity, ActivityFlags, ActivityGuard, ActivityTimer};

use crate::backend::{InputType, Polarity, RagQuery, WorkflowBackend};
use crate::classifier::{CommandKind, Intent, classify};
use crate::coalesce::{CallHub, keys};
use crate::config::{Config, ConversationConfig, VoiceConfig};
use crate::speech::{
    ErrorPolicy, RecognitionErrorKind, RecognitionEvent, RecognitionSession, Speaker,
    SpeechCapability, SpeechSynthesizer, WakeEvent, WakeMatcher, WakeWordListener,
};
use crate::timeline::{Message, Timeline};
use crate::workflow::{StepOutcome, WorkflowEvent, WorkflowMachine, WorkflowState};
use crate::{Error, Result};

const UPDATE_CAPACITY: usize = 128;

const APOLOGY: &str =
    "Sorry, I couldn't reach the work order service. Please try again in a moment.";
const NO_SESSION: &str =
    "There's no active work order. Say \"start work order\" followed by its number.";
const SESSION_COMPLETE: &str = "This work order is already complete.";
const VOICE_UNAVAILABLE: &str = "Voice input isn't available right now. You can type instead.";

/// Which view a surface belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceKind {
    /// Launcher chat; work-order commands navigate away and close it
    Widget,
    /// Detail view of one work order; its own commands are handled inline
    WorkOrder { work_order_id: String },
}

/// Which recognizer owns the microphone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionState {
    Idle,
    WakeListening,
    ActiveRecognition,
    /// A recognizer is being stopped before the other starts
    Stopping,
}

/// Why a surface closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// A work-order command moved the conversation elsewhere
    Navigated,
    /// Inactivity timeout
    Inactive,
    /// Closed by the host
    Dismissed,
}

/// Change notification for the host UI
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceUpdate {
    Message(Message),
    /// Advisory partial transcript
    Interim(String),
    Feedback { message_id: Uuid, polarity: Polarity },
    Closed(CloseReason),
}

/// What became of one utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Blank input or surface closed
    Ignored,
    /// Echo of the previous utterance
    Duplicate,
    Handled,
    /// Failed; the user was told
    Failed,
}

/// Collaborators shared with the host
#[derive(Clone)]
pub struct Collaborators {
    pub backend: Arc<dyn WorkflowBackend>,
    pub hub: Arc<CallHub>,
    /// Recognizer used by the wake word listener
    pub wake_speech: Arc<dyn SpeechCapability>,
    /// Recognizer used for explicit command capture
    pub command_speech: Arc<dyn SpeechCapability>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub navigator: Arc<dyn Navigator>,
    pub handoff: Arc<HandoffStore>,
}

/// Per-surface settings
#[derive(Debug, Clone)]
pub struct SurfaceSettings {
    pub user_id: String,
    pub voice: VoiceConfig,
    pub conversation: ConversationConfig,
}

impl SurfaceSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            user_id: config.backend.user_id.clone(),
            voice: config.voice.clone(),
            conversation: config.conversation,
        }
    }
}

/// Coordinates speech, classification and the workflow for one surface
pub struct VoiceOrchestrator {
    kind: SurfaceKind,
    settings: SurfaceSettings,
    backend: Arc<dyn WorkflowBackend>,
    hub: Arc<CallHub>,
    navigator: Arc<dyn Navigator>,
    handoff: Arc<HandoffStore>,
    workflow: WorkflowMachine,
    timeline: Mutex<Timeline>,
    wake: WakeWordListener,
    recognition: RecognitionSession,
    speaker: Speaker,
    /// Serializes recognizer transitions
    mic: tokio::sync::Mutex<()>,
    stopping: AtomicBool,
    /// Set by permission errors; cleared by an explicit start
    mic_blocked: AtomicBool,
    session_active: Arc<AtomicBool>,
    activity: Arc<ActivityFlags>,
    timer: ActivityTimer,
    open: AtomicBool,
    destroyed: AtomicBool,
    updates: broadcast::Sender<SurfaceUpdate>,
    shutdown: watch::Sender<bool>,
}

/// Owning handle for an open surface
///
/// Dropping it tears the surface down: the run loop stops, both recognizers
/// are released, and late results are discarded.
pub struct ConversationSurface {
    orchestrator: Arc<VoiceOrchestrator>,
    run_loop: JoinHandle<()>,
}

impl ConversationSurface {
    /// Open a surface and start wake word listening
    ///
    /// A work-order surface first picks up a session handed to it.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub async fn open(
        kind: SurfaceKind,
        settings: SurfaceSettings,
        collaborators: Collaborators,
    ) -> Self {
        let Collaborators {
            backend,
            hub,
            wake_speech,
            command_speech,
            synthesizer,
            navigator,
            handoff,
        } = collaborators;

        let session_active = Arc::new(AtomicBool::new(false));
        let matcher = WakeMatcher::new(&settings.voice.wake_phrases, Arc::clone(&session_active));
        let (wake, wake_rx) =
            WakeWordListener::new(wake_speech, matcher, settings.voice.restart_delay);
        let (recognition, recognition_rx) =
            RecognitionSession::new(command_speech, settings.voice.restart_delay);

        let activity = Arc::new(ActivityFlags::default());
        let (expired_tx, expired_rx) = mpsc::channel(1);
        let timer = ActivityTimer::start(
            settings.conversation.inactivity_timeout,
            Arc::clone(&activity),
            expired_tx,
        );

        let workflow = WorkflowMachine::new(
            Arc::clone(&backend),
            Arc::clone(&hub),
            settings.user_id.clone(),
        );
        let workflow_rx = workflow.subscribe();
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let orchestrator = Arc::new(VoiceOrchestrator {
            kind,
            settings,
            backend,
            hub,
            navigator,
            handoff,
            workflow,
            timeline: Mutex::new(Timeline::new()),
            wake,
            recognition,
            speaker: Speaker::new(synthesizer),
            mic: tokio::sync::Mutex::new(()),
            stopping: AtomicBool::new(false),
            mic_blocked: AtomicBool::new(false),
            session_active,
            activity,
            timer,
            open: AtomicBool::new(true),
            destroyed: AtomicBool::new(false),
            updates,
            shutdown,
        });

        let run_loop = tokio::spawn(run(
            Arc::clone(&orchestrator),
            wake_rx,
            recognition_rx,
            workflow_rx,
            expired_rx,
            shutdown_rx,
        ));

        tracing::info!(kind = ?orchestrator.kind, "conversation surface opened");
        orchestrator.pick_up_handoff().await;
        orchestrator.resume_wake_listening().await;

        Self {
            orchestrator,
            run_loop,
        }
    }

    /// Shared orchestrator behind this handle
    #[must_use]
    pub const fn orchestrator(&self) -> &Arc<VoiceOrchestrator> {
        &self.orchestrator
    }
}

impl Deref for ConversationSurface {
    type Target = VoiceOrchestrator;

    fn deref(&self) -> &Self::Target {
        &self.orchestrator
    }
}

impl Drop for ConversationSurface {
    fn drop(&mut self) {
        self.run_loop.abort();
        self.orchestrator.destroy();

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let orchestrator = Arc::clone(&self.orchestrator);
            runtime.spawn(async move { orchestrator.release_microphone().await });
        }
    }
}

impl VoiceOrchestrator {
    /// Handle typed input
    pub async fn submit_text(&self, text: &str) -> TurnOutcome {
        self.handle_utterance(text, InputType::Text).await
    }

    /// Handle a final transcript recognized outside this surface
    pub async fn submit_voice(&self, transcript: &str) -> TurnOutcome {
        self.handle_utterance(transcript, InputType::Voice).await
    }

    /// Run one utterance through suppression, classification and dispatch
    pub async fn handle_utterance(&self, text: &str, input: InputType) -> TurnOutcome {
        let text = text.trim();
        if text.is_empty() || !self.is_open() {
            return TurnOutcome::Ignored;
        }
        self.touch();

        if self.hub.recent().is_duplicate(text) {
            return TurnOutcome::Duplicate;
        }

        let outcome = {
            let _processing = self.activity.enter(Activity::Processing);
            self.append(Message::user(text, input == InputType::Voice));

            let intent = classify(text, self.workflow.has_active_session());
            tracing::info!(transcript = text, intent = ?intent, "utterance classified");

            let result = match intent {
                Intent::Start { work_order_id } => {
                    self.run_command(CommandKind::Start, work_order_id, input).await
                }
                Intent::Resume { work_order_id } => {
                    self.run_command(CommandKind::Resume, work_order_id, input).await
                }
                Intent::Restart { work_order_id } => {
                    self.run_command(CommandKind::Restart, work_order_id, input).await
                }
                Intent::Proceed => self.proceed().await,
                Intent::Query { text } => self.answer(&text).await,
            };

            match result {
                Ok(()) => TurnOutcome::Handled,
                Err(e) => {
                    self.report_failure(&e).await;
                    TurnOutcome::Failed
                }
            }
        };

        self.touch();
        self.resume_wake_listening().await;
        outcome
    }

    /// Attach feedback to a timeline message
    ///
    /// # Errors
    ///
    /// Returns `FeedbackRejected` without contacting the backend if the
    /// message is not tied to a step or already has feedback, or the error
    /// of the workflow call
    pub async fn mark_feedback(&self, message_id: Uuid, polarity: Polarity) -> Result<StepOutcome> {
        if !self.is_open() {
            return Err(Error::SurfaceClosed);
        }
        self.touch();
        let _feedback = self.activity.enter(Activity::Feedback);

        let (session_id, step) = self.lock_timeline().claim_feedback(message_id, polarity)?;
        self.publish(SurfaceUpdate::Feedback {
            message_id,
            polarity,
        });

        match self
            .workflow
            .message_feedback(&session_id, step, polarity)
            .await
        {
            Ok(outcome) => {
                self.sync_session_flag();
                self.present(&outcome).await;
                self.touch();
                Ok(outcome)
            }
            Err(e) => {
                self.lock_timeline().release_feedback(message_id);
                if e.is_backend() {
                    self.report_failure(&e).await;
                }
                Err(e)
            }
        }
    }

    /// Begin explicit command capture, stopping the wake word listener first
    ///
    /// Returns false if capture is already running, voice is disabled, or
    /// the recognizer refused to start.
    ///
    /// # Errors
    ///
    /// Returns `SurfaceClosed` if the surface closed
    pub async fn start_recognition(&self) -> Result<bool> {
        if !self.is_open() {
            return Err(Error::SurfaceClosed);
        }
        if !self.settings.voice.enabled {
            return Ok(false);
        }
        self.touch();
        self.mic_blocked.store(false, Ordering::SeqCst);

        let mic = self.mic.lock().await;
        if self.recognition.is_listening() {
            return Ok(false);
        }
        if self.wake.is_listening() {
            self.stopping.store(true, Ordering::SeqCst);
            self.wake.stop().await;
            tokio::time::sleep(self.settings.voice.stop_grace).await;
            self.stopping.store(false, Ordering::SeqCst);
        }
        if !self.is_open() {
            return Err(Error::SurfaceClosed);
        }

        self.speaker.cancel();
        let started = self.recognition.start();
        self.activity.set_recording(started);
        drop(mic);

        if started {
            tracing::info!("command recognition started");
        } else {
            self.append(Message::bot(VOICE_UNAVAILABLE));
            self.resume_wake_listening().await;
        }
        Ok(started)
    }

    /// Stop explicit command capture and go back to wake word listening
    pub async fn stop_recognition(&self) {
        self.finish_recognition().await;
        self.resume_wake_listening().await;
    }

    /// Report typing activity from the host
    pub fn set_typing(&self, typing: bool) {
        self.activity.set_typing(typing);
        self.touch();
    }

    /// Close the surface
    ///
    /// Stops both recognizers and any playback. Calls already in flight
    /// still complete and their results are still appended.
    pub async fn close(&self, reason: CloseReason) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);
        self.timer.stop();
        self.speaker.cancel();
        self.release_microphone().await;

        tracing::info!(reason = ?reason, "conversation surface closed");
        self.publish(SurfaceUpdate::Closed(reason));
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    #[must_use]
    pub const fn kind(&self) -> &SurfaceKind {
        &self.kind
    }

    /// Which recognizer currently owns the microphone
    #[must_use]
    pub fn recognition_state(&self) -> RecognitionState {
        if self.stopping.load(Ordering::SeqCst) {
            RecognitionState::Stopping
        } else if self.recognition.is_listening() {
            RecognitionState::ActiveRecognition
        } else if self.wake.is_listening() {
            RecognitionState::WakeListening
        } else {
            RecognitionState::Idle
        }
    }

    #[must_use]
    pub const fn workflow(&self) -> &WorkflowMachine {
        &self.workflow
    }

    #[must_use]
    pub fn workflow_state(&self) -> WorkflowState {
        self.workflow.state()
    }

    /// Copy of the timeline
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.lock_timeline().messages().to_vec()
    }

    /// Most recent message presenting a step
    #[must_use]
    pub fn last_step_message(&self) -> Option<Message> {
        self.lock_timeline().last_step().cloned()
    }

    /// Whether the surface is doing anything that keeps it alive
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.activity.is_busy()
    }

    /// Subscribe to timeline and lifecycle updates
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SurfaceUpdate> {
        self.updates.subscribe()
    }

    async fn run_command(
        &self,
        kind: CommandKind,
        work_order_id: String,
        input: InputType,
    ) -> Result<()> {
        let navigate_away = match &self.kind {
            SurfaceKind::Widget => true,
            SurfaceKind::WorkOrder {
                work_order_id: shown,
            } => *shown != work_order_id,
        };

        let outcome = self.workflow.begin(kind, &work_order_id, input).await?;
        self.sync_session_flag();
        if self.is_destroyed() {
            return Ok(());
        }

        let StepOutcome::Started {
            snapshot,
            text,
            spoken,
        } = outcome
        else {
            tracing::debug!(work_order_id, "start already applied elsewhere");
            return Ok(());
        };

        self.append(Message::step(
            text.clone(),
            snapshot.session_id.clone(),
            snapshot.step_number,
        ));

        if navigate_away {
            let request = NavigationRequest {
                work_order_id,
                action: kind,
                session: Some(snapshot),
                intro: Some(text),
            };
            self.handoff.record_navigation(&request);
            self.close(CloseReason::Navigated).await;
            tracing::info!(work_order_id = %request.work_order_id, "navigating to work order");
            self.navigator.navigate(request);
        } else {
            self.speak(&spoken).await;
        }
        Ok(())
    }

    async fn proceed(&self) -> Result<()> {
        let outcome = self.workflow.proceed(Polarity::Positive, "").await?;
        self.sync_session_flag();
        self.present(&outcome).await;
        Ok(())
    }

    async fn answer(&self, text: &str) -> Result<()> {
        let request = RagQuery {
            query: text.to_string(),
        };
        let backend = Arc::clone(&self.backend);
        let response = self
            .hub
            .queries()
            .acquire(&keys::query(text), move || async move {
                backend.rag_query(&request).await
            })
            .await?;

        if self.is_destroyed() {
            return Ok(());
        }
        if !response.success && response.result.trim().is_empty() {
            return Err(Error::BackendRejected("query was not answered".to_string()));
        }

        self.append(Message::bot(response.result.clone()));
        self.speak(response.spoken_text()).await;
        Ok(())
    }

    /// Append and speak the result of a workflow transition
    async fn present(&self, outcome: &StepOutcome) {
        if self.is_destroyed() {
            return;
        }
        match outcome {
            StepOutcome::Started {
                snapshot,
                text,
                spoken,
            }
            | StepOutcome::Advanced {
                snapshot,
                text,
                spoken,
            } => {
                self.append(Message::step(
                    text.clone(),
                    snapshot.session_id.clone(),
                    snapshot.step_number,
                ));
                self.speak(spoken).await;
            }
            StepOutcome::Completed { text, spoken, .. } => {
                self.append(Message::bot(text.clone()));
                self.speak(spoken).await;
            }
            StepOutcome::AlreadyApplied | StepOutcome::Discarded => {
                tracing::debug!(outcome = ?outcome, "nothing to present");
            }
        }
    }

    async fn report_failure(&self, error: &Error) {
        let text = match error.root() {
            Error::SurfaceClosed => return,
            Error::NoSession => NO_SESSION,
            Error::SessionComplete => SESSION_COMPLETE,
            _ => APOLOGY,
        };
        tracing::warn!(error = %error, "turn failed");
        if self.is_destroyed() {
            return;
        }
        self.append(Message::bot(text));
        self.speak(text).await;
    }

    fn report_recognition_error(&self, kind: RecognitionErrorKind) {
        self.activity.set_recording(false);
        self.mic_blocked.store(true, Ordering::SeqCst);
        let text = kind.user_message().unwrap_or(VOICE_UNAVAILABLE);
        tracing::warn!(error = %kind, "voice input unavailable");
        self.append(Message::bot(text));
    }

    /// Pick up a session or action handed to this work-order surface
    async fn pick_up_handoff(&self) {
        let SurfaceKind::WorkOrder { work_order_id } = &self.kind else {
            return;
        };
        let Some(handoff) = self.handoff.take_for(work_order_id) else {
            return;
        };

        if let Some(snapshot) = handoff.session {
            let adopted = self.workflow.adopt(snapshot);
            self.sync_session_flag();
            let text = handoff
                .intro
                .unwrap_or_else(|| format!("Continuing at step {}.", adopted.step_number));
            self.append(Message::step(
                text.clone(),
                adopted.session_id,
                adopted.step_number,
            ));
            self.speak(&text).await;
        } else if let Some(pending) = handoff.pending_action {
            tracing::debug!(work_order_id = %pending.work_order_id, action = %pending.action, "running handed-off action");
            if let Err(e) = self
                .run_command(pending.action, pending.work_order_id, InputType::Voice)
                .await
            {
                self.report_failure(&e).await;
            }
        }
    }

    async fn on_wake_event(&self, event: WakeEvent) {
        match event {
            WakeEvent::Wake => {
                if let Err(e) = self.start_recognition().await {
                    tracing::debug!(error = %e, "wake ignored");
                }
            }
            WakeEvent::Command(transcript) => {
                self.pause_wake_listening().await;
                self.handle_utterance(&transcript, InputType::Voice).await;
            }
            WakeEvent::Unavailable(kind) => self.report_recognition_error(kind),
            WakeEvent::Stopped => tracing::debug!("wake word listener stopped"),
        }
    }

    async fn on_recognition_event(&self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Interim(text) => self.publish(SurfaceUpdate::Interim(text)),
            RecognitionEvent::Final(transcript) => {
                self.finish_recognition().await;
                self.handle_utterance(&transcript, InputType::Voice).await;
            }
            RecognitionEvent::Failed(kind) => self.on_recognition_failed(kind),
            RecognitionEvent::Ended => {
                self.activity.set_recording(false);
                self.resume_wake_listening().await;
            }
        }
    }

    fn on_recognition_failed(&self, kind: RecognitionErrorKind) {
        if kind.policy() == ErrorPolicy::Surface {
            self.report_recognition_error(kind);
        } else {
            tracing::debug!(error = %kind, "recognition error; continuing");
        }
    }

    fn on_workflow_event(&self, event: &WorkflowEvent) {
        match event {
            WorkflowEvent::SessionStarted {
                session_id,
                work_order_id,
                ..
            } => self.handoff.session_started(session_id, work_order_id),
            WorkflowEvent::StepAdvanced {
                session_id,
                step_number,
            } => self
                .handoff
                .step_completed(session_id, step_number.saturating_sub(1)),
            WorkflowEvent::Completed { session_id, .. } => {
                self.handoff.session_ended(Some(session_id));
            }
            WorkflowEvent::SessionCleared { session_id } => {
                self.handoff.session_ended(session_id.as_deref());
            }
            WorkflowEvent::Failed { .. } => {}
        }
    }

    /// Start the wake word listener unless closed or capturing a command
    async fn resume_wake_listening(&self) {
        if !self.settings.voice.enabled
            || !self.is_open()
            || self.mic_blocked.load(Ordering::SeqCst)
        {
            return;
        }

        let _mic = self.mic.lock().await;
        if !self.is_open() || self.recognition.is_listening() || self.wake.is_listening() {
            return;
        }
        if !self.wake.start() {
            tracing::debug!("wake word listener unavailable");
        }
    }

    async fn pause_wake_listening(&self) {
        let _mic = self.mic.lock().await;
        if self.wake.is_listening() {
            self.stopping.store(true, Ordering::SeqCst);
            self.wake.stop().await;
            tokio::time::sleep(self.settings.voice.stop_grace).await;
            self.stopping.store(false, Ordering::SeqCst);
        }
    }

    async fn finish_recognition(&self) {
        let _mic = self.mic.lock().await;
        if self.recognition.is_listening() {
            self.stopping.store(true, Ordering::SeqCst);
            self.recognition.stop().await;
            tokio::time::sleep(self.settings.voice.stop_grace).await;
            self.stopping.store(false, Ordering::SeqCst);
        }
        self.activity.set_recording(false);
    }

    async fn release_microphone(&self) {
        let _mic = self.mic.lock().await;
        self.recognition.stop().await;
        self.wake.stop().await;
        self.activity.set_recording(false);
    }

    /// Synchronous part of teardown
    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.shutdown.send(true);
            tracing::debug!("conversation surface destroyed");
        }
        self.timer.stop();
        self.speaker.cancel();
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    async fn speak(&self, text: &str) {
        if !self.settings.voice.enabled || self.is_destroyed() {
            return;
        }
        let _speaking = self.activity.enter(Activity::Speaking);
        if let Err(e) = self.speaker.say(text).await {
            tracing::warn!(error = %e, "speech playback failed");
        }
    }

    fn append(&self, message: Message) {
        if self.is_destroyed() {
            return;
        }
        self.lock_timeline().push(message.clone());
        self.publish(SurfaceUpdate::Message(message));
    }

    fn publish(&self, update: SurfaceUpdate) {
        // No subscribers is fine
        let _ = self.updates.send(update);
    }

    fn sync_session_flag(&self) {
        self.session_active
            .store(self.workflow.has_active_session(), Ordering::SeqCst);
    }

    fn touch(&self) {
        self.timer.reset();
    }

    fn lock_timeline(&self) -> MutexGuard<'_, Timeline> {
        self.timeline.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Event loop of one surface; ends on close
async fn run(
    orchestrator: Arc<VoiceOrchestrator>,
    mut wake_rx: mpsc::UnboundedReceiver<WakeEvent>,
    mut recognition_rx: mpsc::UnboundedReceiver<RecognitionEvent>,
    mut workflow_rx: broadcast::Receiver<WorkflowEvent>,
    mut expired_rx: mpsc::Receiver<()>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            Some(event) = wake_rx.recv() => match event {
                // Block the microphone before a following end event resumes it
                WakeEvent::Unavailable(kind) => orchestrator.report_recognition_error(kind),
                event => {
                    let orchestrator = Arc::clone(&orchestrator);
                    tokio::spawn(async move { orchestrator.on_wake_event(event).await });
                }
            },
            Some(event) = recognition_rx.recv() => match event {
                RecognitionEvent::Failed(kind) => orchestrator.on_recognition_failed(kind),
                RecognitionEvent::Interim(text) => orchestrator.publish(SurfaceUpdate::Interim(text)),
                event => {
                    let orchestrator = Arc::clone(&orchestrator);
                    tokio::spawn(async move { orchestrator.on_recognition_event(event).await });
                }
            },
            event = workflow_rx.recv() => match event {
                Ok(event) => orchestrator.on_workflow_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "workflow events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            Some(()) = expired_rx.recv() => {
                orchestrator.close(CloseReason::Inactive).await;
                break;
            }
        }
    }
    tracing::debug!("conversation run loop finished");
}
