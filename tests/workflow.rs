//! Workflow state machine integration tests

use std::sync::Arc;
use std::time::Duration;

use workorder_voice::backend::{InputType, Polarity};
use workorder_voice::workflow::{Origin, WorkflowEvent};
use workorder_voice::{CallHub, Error, StepOutcome, WorkflowMachine, WorkflowState};

mod common;
use common::{Recorded, ScriptedBackend, completed, next_step, rejected, server_error, started};

fn machine(backend: &Arc<ScriptedBackend>) -> WorkflowMachine {
    WorkflowMachine::new(
        Arc::clone(backend) as _,
        Arc::new(CallHub::new(Duration::from_secs(2))),
        "tech-1",
    )
}

#[tokio::test]
async fn test_start_positions_session_on_reported_step() {
    let backend = ScriptedBackend::new();
    backend.on_start(Ok(started("s1", 1)));
    let workflow = machine(&backend);
    let mut events = workflow.subscribe();

    let outcome = workflow.start("WO-20241008", InputType::Voice).await.unwrap();

    let StepOutcome::Started { snapshot, text, .. } = outcome else {
        panic!("expected a started session, got {outcome:?}");
    };
    assert_eq!(snapshot.session_id, "s1");
    assert_eq!(snapshot.step_number, 1);
    assert_eq!(snapshot.origin, Origin::Fresh);
    assert_eq!(text, "Step 1: Do step 1");
    assert_eq!(workflow.state(), WorkflowState::StepActive);

    let Recorded::Query(query) = &backend.calls()[0] else {
        panic!("expected a chat query");
    };
    assert_eq!(query.query, "help me fix work order WO-20241008");
    assert_eq!(query.user_id, "tech-1");
    assert_eq!(query.input_type, InputType::Voice);

    assert!(matches!(
        events.try_recv().unwrap(),
        WorkflowEvent::SessionStarted { step_number: 1, .. }
    ));
}

#[tokio::test]
async fn test_concurrent_proceeds_advance_once() {
    let backend = ScriptedBackend::new();
    backend.on_start(Ok(started("s1", 2)));
    backend.on_feedback(Ok(next_step(3)));
    let workflow = machine(&backend);
    workflow.start("WO-5", InputType::Text).await.unwrap();

    backend.set_latency(Duration::from_millis(30));
    let (first, second) = tokio::join!(
        workflow.proceed(Polarity::Positive, ""),
        workflow.proceed(Polarity::Positive, ""),
    );

    let outcomes = [first.unwrap(), second.unwrap()];
    let advanced = outcomes
        .iter()
        .filter(|o| matches!(o, StepOutcome::Advanced { .. }))
        .count();
    assert_eq!(advanced, 1);
    assert!(outcomes.contains(&StepOutcome::AlreadyApplied));
    assert_eq!(backend.feedback_calls(), 1);
    assert_eq!(workflow.snapshot().unwrap().step_number, 3);
}

#[tokio::test]
async fn test_fresh_feedback_addresses_session_and_step() {
    let backend = ScriptedBackend::new();
    backend.on_start(Ok(started("s1", 1)));
    backend.on_feedback(Ok(next_step(2)));
    let workflow = machine(&backend);
    workflow.start("WO-5", InputType::Text).await.unwrap();

    workflow
        .proceed(Polarity::Negative, "  cover was stuck ")
        .await
        .unwrap();

    let Recorded::Feedback(feedback) = &backend.calls()[1] else {
        panic!("expected chat feedback");
    };
    assert_eq!(feedback.session_id, "s1");
    assert_eq!(feedback.step_number, 1);
    assert_eq!(feedback.feedback, Polarity::Negative);
    assert_eq!(feedback.notes, "cover was stuck");
}

#[tokio::test]
async fn test_resumed_session_uses_step_feedback() {
    let backend = ScriptedBackend::new();
    backend.on_start(Ok(started("s9", 4)));
    backend.on_feedback(Ok(next_step(5)));
    let workflow = machine(&backend);

    let outcome = workflow.resume("WO-12", InputType::Voice).await.unwrap();
    let StepOutcome::Started { snapshot, .. } = outcome else {
        panic!("expected a started session");
    };
    assert_eq!(snapshot.origin, Origin::Resumed);
    assert_eq!(snapshot.step_number, 4);

    workflow.proceed(Polarity::Positive, "").await.unwrap();

    let Recorded::StepFeedback(work_order_id, feedback) = &backend.calls()[1] else {
        panic!("expected step feedback");
    };
    assert_eq!(work_order_id, "WO-12");
    assert_eq!(feedback.step_id, "step-4");
    assert_eq!(feedback.feedback_text, "positive");
    assert_eq!(workflow.snapshot().unwrap().step_id.as_deref(), Some("step-5"));
}

#[tokio::test]
async fn test_completion_is_terminal() {
    let backend = ScriptedBackend::new();
    backend.on_start(Ok(started("s1", 1)));
    backend.on_feedback(Ok(completed()));
    let workflow = machine(&backend);
    workflow.start("WO-5", InputType::Text).await.unwrap();

    let outcome = workflow.proceed(Polarity::Positive, "").await.unwrap();
    let StepOutcome::Completed { text, .. } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert!(text.contains("All steps done"));
    assert_eq!(workflow.state(), WorkflowState::Complete);
    assert!(!workflow.has_active_session());

    let again = workflow.proceed(Polarity::Positive, "").await;
    assert!(matches!(again, Err(Error::SessionComplete)));
    assert_eq!(backend.feedback_calls(), 1);
}

#[tokio::test]
async fn test_restart_resets_to_first_step() {
    let backend = ScriptedBackend::new();
    backend.on_start(Ok(started("s1", 3)));
    backend.on_start(Ok(started("s2", 4)));
    let workflow = machine(&backend);
    workflow.start("WO-5", InputType::Text).await.unwrap();
    let mut events = workflow.subscribe();

    let outcome = workflow.restart("WO-5", InputType::Text).await.unwrap();

    let StepOutcome::Started { snapshot, .. } = outcome else {
        panic!("expected a started session");
    };
    assert_eq!(snapshot.session_id, "s2");
    assert_eq!(snapshot.step_number, 1);
    assert!(matches!(
        events.try_recv().unwrap(),
        WorkflowEvent::SessionCleared { session_id: Some(id) } if id == "s1"
    ));
}

#[tokio::test]
async fn test_failed_feedback_leaves_step_unchanged() {
    let backend = ScriptedBackend::new();
    backend.on_start(Ok(started("s1", 2)));
    backend.on_feedback(Err(server_error()));
    backend.on_feedback(Ok(rejected("step not found")));
    backend.on_feedback(Ok(next_step(3)));
    let workflow = machine(&backend);
    workflow.start("WO-5", InputType::Text).await.unwrap();

    let err = workflow.proceed(Polarity::Positive, "").await.unwrap_err();
    assert!(err.is_backend());
    assert_eq!(workflow.state(), WorkflowState::StepActive);
    assert_eq!(workflow.snapshot().unwrap().step_number, 2);

    let err = workflow.proceed(Polarity::Positive, "").await.unwrap_err();
    assert!(matches!(err.root(), Error::BackendRejected(msg) if msg == "step not found"));
    assert_eq!(workflow.snapshot().unwrap().step_number, 2);

    // The failed calls released their slot
    workflow.proceed(Polarity::Positive, "").await.unwrap();
    assert_eq!(workflow.snapshot().unwrap().step_number, 3);
    assert_eq!(backend.feedback_calls(), 3);
}

#[tokio::test]
async fn test_failed_start_is_errored() {
    let backend = ScriptedBackend::new();
    backend.on_start(Ok(rejected("unknown work order")));
    let workflow = machine(&backend);

    let err = workflow.start("WO-404", InputType::Text).await.unwrap_err();

    assert!(matches!(err.root(), Error::BackendRejected(_)));
    assert_eq!(workflow.state(), WorkflowState::Errored);
    assert!(workflow.snapshot().is_none());
}

#[tokio::test]
async fn test_proceed_without_session() {
    let backend = ScriptedBackend::new();
    let workflow = machine(&backend);

    let err = workflow.proceed(Polarity::Positive, "").await.unwrap_err();

    assert!(matches!(err, Error::NoSession));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_start_reply_after_clear_is_discarded() {
    let backend = ScriptedBackend::new();
    backend.on_start(Ok(started("s1", 1)));
    backend.set_latency(Duration::from_millis(30));
    let workflow = machine(&backend);

    let (outcome, ()) = tokio::join!(workflow.start("WO-5", InputType::Text), async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        workflow.clear();
    });

    assert_eq!(outcome.unwrap(), StepOutcome::Discarded);
    assert!(workflow.snapshot().is_none());
    assert_eq!(workflow.state(), WorkflowState::NoSession);
}

#[tokio::test]
async fn test_message_feedback_on_resumed_session_needs_current_step() {
    let backend = ScriptedBackend::new();
    backend.on_start(Ok(started("s1", 3)));
    backend.on_feedback(Ok(next_step(4)));
    let workflow = machine(&backend);
    workflow.resume("WO-5", InputType::Text).await.unwrap();

    let err = workflow
        .message_feedback("s1", 2, Polarity::Positive)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FeedbackRejected(_)));
    assert_eq!(backend.feedback_calls(), 0);

    let err = workflow
        .message_feedback("other", 3, Polarity::Positive)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FeedbackRejected(_)));

    let outcome = workflow
        .message_feedback("s1", 3, Polarity::Negative)
        .await
        .unwrap();
    assert!(matches!(outcome, StepOutcome::Advanced { .. }));
    assert_eq!(backend.feedback_calls(), 1);
}

#[tokio::test]
async fn test_two_machines_share_one_start_call() {
    let backend = ScriptedBackend::new();
    backend.on_start(Ok(started("s1", 1)));
    backend.set_latency(Duration::from_millis(30));
    let hub = Arc::new(CallHub::new(Duration::from_secs(2)));
    let a = WorkflowMachine::new(Arc::clone(&backend) as _, Arc::clone(&hub), "tech-1");
    let b = WorkflowMachine::new(Arc::clone(&backend) as _, Arc::clone(&hub), "tech-1");

    let (first, second) = tokio::join!(
        a.start("WO-5", InputType::Voice),
        b.start("WO-5", InputType::Text),
    );

    assert!(matches!(first.unwrap(), StepOutcome::Started { .. }));
    assert!(matches!(second.unwrap(), StepOutcome::Started { .. }));
    assert_eq!(backend.start_calls(), 1);
}

#[tokio::test]
async fn test_adopted_session_coalesces_feedback_with_origin() {
    let backend = ScriptedBackend::new();
    backend.on_start(Ok(started("s1", 2)));
    backend.on_feedback(Ok(next_step(3)));
    let hub = Arc::new(CallHub::new(Duration::from_secs(2)));
    let a = WorkflowMachine::new(Arc::clone(&backend) as _, Arc::clone(&hub), "tech-1");
    let b = WorkflowMachine::new(Arc::clone(&backend) as _, Arc::clone(&hub), "tech-1");
    a.start("WO-5", InputType::Voice).await.unwrap();
    b.adopt(a.snapshot().unwrap());

    backend.set_latency(Duration::from_millis(50));
    let (first, second) = tokio::join!(
        a.proceed(Polarity::Positive, ""),
        b.proceed(Polarity::Positive, ""),
    );

    assert!(matches!(first.unwrap(), StepOutcome::Advanced { .. }));
    assert!(matches!(second.unwrap(), StepOutcome::Advanced { .. }));
    assert_eq!(backend.feedback_calls(), 1);
    assert_eq!(a.snapshot().unwrap().step_number, 3);
    assert_eq!(b.snapshot().unwrap().step_number, 3);
}

#[tokio::test]
async fn test_shared_start_call_coalesces_later_feedback() {
    let backend = ScriptedBackend::new();
    backend.on_start(Ok(started("s1", 1)));
    backend.on_feedback(Ok(next_step(2)));
    backend.set_latency(Duration::from_millis(30));
    let hub = Arc::new(CallHub::new(Duration::from_secs(2)));
    let a = WorkflowMachine::new(Arc::clone(&backend) as _, Arc::clone(&hub), "tech-1");
    let b = WorkflowMachine::new(Arc::clone(&backend) as _, Arc::clone(&hub), "tech-1");
    let _ = tokio::join!(
        a.start("WO-5", InputType::Voice),
        b.start("WO-5", InputType::Text),
    );

    let (first, second) = tokio::join!(
        a.proceed(Polarity::Positive, ""),
        b.proceed(Polarity::Positive, ""),
    );

    assert!(first.is_ok() && second.is_ok());
    assert_eq!(backend.start_calls(), 1);
    assert_eq!(backend.feedback_calls(), 1);
    assert_eq!(b.snapshot().unwrap().step_number, 2);
}
