//! Recognition session and wake word listener tests
//!
//! Driven through `ManualSpeech`, so no audio hardware is needed

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use workorder_voice::speech::{
    ListenerState, ManualSpeech, RecognitionErrorKind, RecognitionEvent, RecognitionSession,
    SpeechCapability, SpeechEvent, WakeEvent, WakeMatcher, WakeWordListener,
};

mod common;
use common::eventually;

const RESTART_DELAY: Duration = Duration::from_millis(10);

fn session() -> (
    Arc<ManualSpeech>,
    RecognitionSession,
    UnboundedReceiver<RecognitionEvent>,
) {
    let speech = Arc::new(ManualSpeech::new());
    let (session, rx) = RecognitionSession::new(Arc::clone(&speech) as _, RESTART_DELAY);
    (speech, session, rx)
}

async fn next<T>(rx: &mut UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

async fn quiet<T: std::fmt::Debug>(rx: &mut UnboundedReceiver<T>) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    if let Ok(event) = rx.try_recv() {
        panic!("unexpected event {event:?}");
    }
}

#[tokio::test]
async fn test_final_and_interim_results() {
    let (speech, session, mut rx) = session();
    assert!(session.start());

    speech.emit(SpeechEvent::Result {
        transcript: "start work".to_string(),
        is_final: false,
    });
    assert!(speech.say("  start work order 5 "));

    assert_eq!(
        next(&mut rx).await,
        RecognitionEvent::Interim("start work".to_string())
    );
    assert_eq!(
        next(&mut rx).await,
        RecognitionEvent::Final("start work order 5".to_string())
    );
    assert!(session.is_listening());
}

#[tokio::test]
async fn test_start_twice_is_refused() {
    let (speech, session, _rx) = session();

    assert!(session.start());
    assert!(!session.start());
    assert_eq!(speech.starts(), 1);
}

#[tokio::test]
async fn test_unavailable_capability_does_not_start() {
    let (speech, session, _rx) = session();
    speech.set_available(false);

    assert!(!session.start());
    assert!(!session.is_listening());
}

#[tokio::test]
async fn test_unexpected_end_restarts() {
    let (speech, session, mut rx) = session();
    session.start();

    speech.emit(SpeechEvent::End);

    eventually("restart", || speech.starts() == 2).await;
    assert!(speech.is_active());
    assert!(session.is_listening());
    quiet(&mut rx).await;
}

#[tokio::test]
async fn test_stop_during_restart_delay_wins() {
    let (speech, session, _rx) = session();
    session.start();

    speech.emit(SpeechEvent::End);
    session.stop().await;

    tokio::time::sleep(RESTART_DELAY * 5).await;
    assert_eq!(speech.starts(), 1);
    assert!(!speech.is_active());
    assert!(!session.is_listening());
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let (speech, session, mut rx) = session();

    session.stop().await;
    session.start();
    session.stop().await;
    session.stop().await;

    assert_eq!(speech.stops(), 1);
    assert!(!session.is_listening());
    quiet(&mut rx).await;
}

#[tokio::test]
async fn test_permission_error_stops_and_reports() {
    let (speech, session, mut rx) = session();
    session.start();

    speech.emit(SpeechEvent::Error(RecognitionErrorKind::NotAllowed));

    assert_eq!(
        next(&mut rx).await,
        RecognitionEvent::Failed(RecognitionErrorKind::NotAllowed)
    );
    assert_eq!(next(&mut rx).await, RecognitionEvent::Ended);
    assert!(!session.is_listening());
    assert!(!speech.is_active());
}

#[tokio::test]
async fn test_network_error_keeps_listening() {
    let (speech, session, mut rx) = session();
    session.start();

    speech.emit(SpeechEvent::Error(RecognitionErrorKind::Network));

    assert_eq!(
        next(&mut rx).await,
        RecognitionEvent::Failed(RecognitionErrorKind::Network)
    );
    assert!(session.is_listening());
    assert!(speech.is_active());
}

#[tokio::test]
async fn test_no_speech_is_ignored() {
    let (speech, session, mut rx) = session();
    session.start();

    speech.emit(SpeechEvent::Error(RecognitionErrorKind::NoSpeech));

    quiet(&mut rx).await;
    assert!(session.is_listening());
}

#[tokio::test]
async fn test_abort_stops_quietly() {
    let (speech, session, mut rx) = session();
    session.start();

    speech.emit(SpeechEvent::Error(RecognitionErrorKind::Aborted));

    assert_eq!(next(&mut rx).await, RecognitionEvent::Ended);
    assert!(!session.is_listening());
}

#[tokio::test]
async fn test_failed_restart_ends_session() {
    let (speech, session, mut rx) = session();
    session.start();

    speech.set_available(false);
    speech.emit(SpeechEvent::End);

    assert_eq!(next(&mut rx).await, RecognitionEvent::Ended);
    assert!(!session.is_listening());
}

fn wake_listener(
    session_active: bool,
) -> (
    Arc<ManualSpeech>,
    WakeWordListener,
    UnboundedReceiver<WakeEvent>,
) {
    let speech = Arc::new(ManualSpeech::new());
    let matcher = WakeMatcher::new(
        &["hey assistant".to_string()],
        Arc::new(AtomicBool::new(session_active)),
    );
    let (listener, rx) = WakeWordListener::new(Arc::clone(&speech) as _, matcher, RESTART_DELAY);
    (speech, listener, rx)
}

#[tokio::test]
async fn test_wake_phrase_stops_listener() {
    let (speech, listener, mut rx) = wake_listener(false);
    assert!(listener.start());
    assert_eq!(listener.state(), ListenerState::Listening);

    speech.say("Hey assistant");

    assert_eq!(next(&mut rx).await, WakeEvent::Wake);
    assert_eq!(listener.state(), ListenerState::Stopped);
    assert!(!speech.is_active());
}

#[tokio::test]
async fn test_direct_command_is_forwarded() {
    let (speech, listener, mut rx) = wake_listener(false);
    listener.start();

    speech.say("what time is it");
    speech.say("resume work order 12");

    assert_eq!(
        next(&mut rx).await,
        WakeEvent::Command("resume work order 12".to_string())
    );
    assert!(listener.is_listening());
}

#[tokio::test]
async fn test_proceed_needs_active_session() {
    let (speech, listener, mut rx) = wake_listener(false);
    listener.start();
    speech.say("next");
    quiet(&mut rx).await;

    let (speech, listener, mut rx) = wake_listener(true);
    listener.start();
    speech.say("next");
    assert_eq!(next(&mut rx).await, WakeEvent::Command("next".to_string()));
}

#[tokio::test]
async fn test_listener_reports_unavailable_microphone() {
    let (speech, listener, mut rx) = wake_listener(false);
    listener.start();

    speech.emit(SpeechEvent::Error(RecognitionErrorKind::AudioCapture));

    assert_eq!(
        next(&mut rx).await,
        WakeEvent::Unavailable(RecognitionErrorKind::AudioCapture)
    );
    assert_eq!(next(&mut rx).await, WakeEvent::Stopped);
    assert!(!listener.is_listening());
}
