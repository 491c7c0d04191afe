//! Error types for the work-order voice front-end

use std::sync::Arc;

use thiserror::Error;

use crate::speech::RecognitionErrorKind;

/// Result type alias for work-order voice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while orchestrating voice and workflow calls
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Backend answered with a non-success status
    #[error("backend error {status}: {body}")]
    Backend {
        /// HTTP status code
        status: u16,
        /// Response body (possibly empty)
        body: String,
    },

    /// Backend answered successfully but reported `type: error`
    #[error("backend rejected request: {0}")]
    BackendRejected(String),

    /// Backend call exceeded the configured timeout
    #[error("backend request timed out")]
    Timeout,

    /// Speech recognition error
    #[error("recognition error: {0}")]
    Recognition(RecognitionErrorKind),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Workflow protocol error (unexpected response for the current state)
    #[error("workflow error: {0}")]
    Workflow(String),

    /// An operation required an active work-order session
    #[error("no active work order session")]
    NoSession,

    /// The session already completed; no further feedback is accepted
    #[error("work order session is complete")]
    SessionComplete,

    /// Feedback was rejected locally without contacting the backend
    #[error("feedback rejected: {0}")]
    FeedbackRejected(String),

    /// The conversation surface was closed before the operation finished
    #[error("conversation surface is closed")]
    SurfaceClosed,

    /// Outcome of a coalesced call, shared between every waiter
    #[error(transparent)]
    Shared(#[from] Arc<Error>),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing error
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Unwrap shared outcomes down to the originating error
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Shared(inner) => inner.root(),
            other => other,
        }
    }

    /// Whether the failure came from the backend round-trip
    #[must_use]
    pub fn is_backend(&self) -> bool {
        matches!(
            self.root(),
            Self::Backend { .. } | Self::BackendRejected(_) | Self::Timeout | Self::Http(_)
        )
    }
}
