//! Wire types for the work-order backend endpoints

use serde::{Deserialize, Deserializer, Serialize};

/// How the user produced an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    /// Typed into the chat box
    Text,
    /// Recognized from speech
    Voice,
}

/// Feedback polarity for a workflow step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    /// Step went fine
    Positive,
    /// Step had problems
    Negative,
}

impl Polarity {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
        }
    }
}

impl std::fmt::Display for Polarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `POST /chat/query` body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatQuery {
    pub query: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub input_type: InputType,
}

/// `POST /chat/feedback` body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatFeedback {
    pub session_id: String,
    pub step_number: u32,
    pub feedback: Polarity,
    pub notes: String,
    pub user_id: String,
}

/// `POST /workorders/{id}/feedback` body, addressed by step id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepFeedback {
    pub step_id: String,
    pub feedback_text: String,
    /// Seconds spent on the step
    pub time_spent: u64,
}

/// `POST /agentic-rag/query` body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RagQuery {
    pub query: String,
}

/// Discriminator of a workflow response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// Session started (fresh, resumed or restarted)
    WorkOrderStart,
    /// Feedback accepted; `current_step` is the next step
    NextStep,
    /// Feedback accepted; the work order is done
    WorkOrderComplete,
    /// Backend could not honor the request
    Error,
    /// Any other reply type (e.g. a plain chat answer)
    #[serde(other)]
    Other,
}

/// Estimated duration of a step, sent either as minutes or free text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EstimatedTime {
    Minutes(u64),
    Text(String),
}

impl std::fmt::Display for EstimatedTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minutes(m) => write!(f, "{m} min"),
            Self::Text(t) => f.write_str(t),
        }
    }
}

/// The step a session is positioned on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentStep {
    pub step_number: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub estimated_time: Option<EstimatedTime>,
    /// Server-side step identifier; required for resumed-origin feedback
    #[serde(default, deserialize_with = "opt_id")]
    pub step_id: Option<String>,
}

/// Work-order completion progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: u32,
    pub total: u32,
    pub percentage: f64,
}

/// Response of the start, feedback and step-feedback endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResponse {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    #[serde(default, deserialize_with = "opt_id")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub tts_text: Option<String>,
    #[serde(default)]
    pub current_step: Option<CurrentStep>,
    #[serde(default)]
    pub progress: Option<Progress>,
    /// Optional completion summary
    #[serde(default)]
    pub summary: Option<String>,
}

impl WorkflowResponse {
    /// Text to speak: `tts_text` when present, otherwise the message
    #[must_use]
    pub fn spoken_text(&self) -> &str {
        self.tts_text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.message)
    }
}

/// Response of `POST /agentic-rag/query`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagResponse {
    pub success: bool,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub tts_text: Option<String>,
}

impl RagResponse {
    /// Text to speak: `tts_text` when present, otherwise the result
    #[must_use]
    pub fn spoken_text(&self) -> &str {
        self.tts_text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.result)
    }
}

/// Accept identifiers sent either as strings or integers
fn opt_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(Option::<RawId>::deserialize(deserializer)?.map(|raw| match raw {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    }))
}
