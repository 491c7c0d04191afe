//! Hand-off between conversation surfaces
//!
//! A launcher surface that receives a work-order command starts the session,
//! records it here, asks the host to navigate, and closes. The work-order
//! surface opened by the host picks the session up from the store.

use std::sync::Mutex;

use serde::Serialize;

use crate::classifier::CommandKind;
use crate::workflow::SessionSnapshot;

/// Request for the host to show a work order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationRequest {
    pub work_order_id: String,
    pub action: CommandKind,
    /// Session already started for the work order
    pub session: Option<SessionSnapshot>,
    /// Step text to present on arrival
    pub intro: Option<String>,
}

/// Host hook that opens the work-order view
pub trait Navigator: Send + Sync {
    fn navigate(&self, request: NavigationRequest);
}

/// Work-order action requested but not yet carried out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub work_order_id: String,
    pub action: CommandKind,
}

/// Shared record of the active session across surfaces
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handoff {
    pub current_session_id: Option<String>,
    pub current_work_order: Option<String>,
    pub pending_action: Option<PendingAction>,
    /// Highest step reported done
    pub completed_step: Option<u32>,
    pub session: Option<SessionSnapshot>,
    pub intro: Option<String>,
}

/// Explicit hand-off channel between surfaces
#[derive(Debug, Default)]
pub struct HandoffStore {
    inner: Mutex<Handoff>,
}

impl HandoffStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a navigation so the target surface can pick it up
    pub fn record_navigation(&self, request: &NavigationRequest) {
        let mut handoff = self.lock();
        handoff.current_work_order = Some(request.work_order_id.clone());
        handoff.current_session_id = request.session.as_ref().map(|s| s.session_id.clone());
        handoff.session.clone_from(&request.session);
        handoff.intro.clone_from(&request.intro);
        handoff.completed_step = None;
        handoff.pending_action = if request.session.is_some() {
            None
        } else {
            Some(PendingAction {
                work_order_id: request.work_order_id.clone(),
                action: request.action,
            })
        };
    }

    /// Take what was handed to `work_order_id`
    ///
    /// The session and pending action are consumed; the current-session
    /// fields stay for other observers.
    pub fn take_for(&self, work_order_id: &str) -> Option<Handoff> {
        let mut handoff = self.lock();
        if handoff.current_work_order.as_deref() != Some(work_order_id) {
            return None;
        }
        if handoff.session.is_none() && handoff.pending_action.is_none() {
            return None;
        }

        let taken = handoff.clone();
        handoff.session = None;
        handoff.pending_action = None;
        handoff.intro = None;
        Some(taken)
    }

    /// Note a session started by a surface
    pub fn session_started(&self, session_id: &str, work_order_id: &str) {
        let mut handoff = self.lock();
        handoff.current_session_id = Some(session_id.to_string());
        handoff.current_work_order = Some(work_order_id.to_string());
        handoff.completed_step = None;
    }

    /// Note that `step` was reported done
    pub fn step_completed(&self, session_id: &str, step: u32) {
        let mut handoff = self.lock();
        if handoff.current_session_id.as_deref() == Some(session_id) {
            handoff.completed_step = Some(handoff.completed_step.map_or(step, |s| s.max(step)));
        }
    }

    /// Forget the current session
    pub fn session_ended(&self, session_id: Option<&str>) {
        let mut handoff = self.lock();
        if session_id.is_none() || handoff.current_session_id.as_deref() == session_id {
            handoff.current_session_id = None;
            handoff.completed_step = None;
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Handoff {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Handoff> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Origin;

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            session_id: "s1".to_string(),
            work_order_id: "WO-5".to_string(),
            origin: Origin::Fresh,
            step_number: 1,
            step_id: None,
            generation: 1,
        }
    }

    #[test]
    fn handed_off_session_is_taken_once() {
        let store = HandoffStore::new();
        store.record_navigation(&NavigationRequest {
            work_order_id: "WO-5".to_string(),
            action: CommandKind::Start,
            session: Some(snapshot()),
            intro: Some("Step 1".to_string()),
        });

        assert!(store.take_for("WO-6").is_none());
        let taken = store.take_for("WO-5").unwrap();
        assert_eq!(taken.session, Some(snapshot()));
        assert!(taken.pending_action.is_none());
        assert!(store.take_for("WO-5").is_none());
        assert_eq!(store.snapshot().current_session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn navigation_without_session_leaves_pending_action() {
        let store = HandoffStore::new();
        store.record_navigation(&NavigationRequest {
            work_order_id: "WO-7".to_string(),
            action: CommandKind::Resume,
            session: None,
            intro: None,
        });
        let taken = store.take_for("WO-7").unwrap();
        assert_eq!(
            taken.pending_action,
            Some(PendingAction {
                work_order_id: "WO-7".to_string(),
                action: CommandKind::Resume,
            })
        );
    }

    #[test]
    fn completed_step_tracks_current_session_only() {
        let store = HandoffStore::new();
        store.session_started("s1", "WO-5");
        store.step_completed("s1", 2);
        store.step_completed("other", 9);
        store.step_completed("s1", 1);
        assert_eq!(store.snapshot().completed_step, Some(2));

        store.session_ended(Some("s1"));
        assert!(store.snapshot().current_session_id.is_none());
    }
}
