//! Conversation timeline
//!
//! Ordered user and assistant messages. Assistant messages that present a
//! workflow step carry the session and step they belong to so feedback can
//! be attached to them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::backend::Polarity;
use crate::{Error, Result};

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// One timeline entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub text: String,
    pub sender: Sender,
    pub is_voice: bool,
    pub session_id: Option<String>,
    pub step_number: Option<u32>,
    pub feedback: Option<Polarity>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn new(text: impl Into<String>, sender: Sender) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            sender,
            is_voice: false,
            session_id: None,
            step_number: None,
            feedback: None,
            created_at: Utc::now(),
        }
    }

    /// A user message
    #[must_use]
    pub fn user(text: impl Into<String>, is_voice: bool) -> Self {
        Self {
            is_voice,
            ..Self::new(text, Sender::User)
        }
    }

    /// An assistant message not tied to a workflow step
    #[must_use]
    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(text, Sender::Bot)
    }

    /// An assistant message presenting a workflow step
    #[must_use]
    pub fn step(text: impl Into<String>, session_id: impl Into<String>, step_number: u32) -> Self {
        Self {
            session_id: Some(session_id.into()),
            step_number: Some(step_number),
            ..Self::new(text, Sender::Bot)
        }
    }

    /// Whether feedback can be attached to this message
    #[must_use]
    pub const fn is_trackable(&self) -> bool {
        self.session_id.is_some() && self.step_number.is_some()
    }
}

/// Ordered list of messages
#[derive(Debug, Default, Clone)]
pub struct Timeline {
    messages: Vec<Message>,
}

impl Timeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return its id
    pub fn push(&mut self, message: Message) -> Uuid {
        let id = message.id;
        self.messages.push(message);
        id
    }

    /// Look up a message
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent message that presents a step
    #[must_use]
    pub fn last_step(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_trackable())
    }

    /// Reserve the feedback slot of a message
    ///
    /// Returns the session id and step number the feedback applies to.
    ///
    /// # Errors
    ///
    /// Returns `FeedbackRejected` if the message is unknown, does not
    /// present a step, or already has feedback
    pub fn claim_feedback(&mut self, id: Uuid, polarity: Polarity) -> Result<(String, u32)> {
        let message = self
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::FeedbackRejected("unknown message".to_string()))?;

        let (Some(session_id), Some(step)) = (message.session_id.clone(), message.step_number)
        else {
            return Err(Error::FeedbackRejected(
                "message is not tied to a workflow step".to_string(),
            ));
        };

        if message.feedback.is_some() {
            return Err(Error::FeedbackRejected(
                "feedback already recorded".to_string(),
            ));
        }

        message.feedback = Some(polarity);
        Ok((session_id, step))
    }

    /// Undo a claim after the backend call failed
    pub fn release_feedback(&mut self, id: Uuid) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
            message.feedback = None;
        }
    }
}
