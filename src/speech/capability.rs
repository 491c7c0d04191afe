//! Continuous speech-to-text capability interface

use async_trait::async_trait;
use tokio::sync::broadcast;

/// Event emitted by a continuous recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    /// Recognized text; only final results are acted upon
    Result {
        /// Transcript text
        transcript: String,
        /// Whether the recognizer committed to this text
        is_final: bool,
    },
    /// Recognizer reported an error
    Error(RecognitionErrorKind),
    /// Recognizer stopped producing results
    End,
}

/// Recognizer error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecognitionErrorKind {
    /// Silence timeout
    NoSpeech,
    /// Microphone could not be opened
    AudioCapture,
    /// Microphone permission denied
    NotAllowed,
    /// Configured language is unsupported
    LanguageNotSupported,
    /// Recognition service refused the session
    ServiceNotAllowed,
    /// Recognition service unreachable
    Network,
    /// Session aborted by the environment (e.g. audio policy)
    Aborted,
    /// Anything the recognizer reports that is not listed above
    Other,
}

/// How a recognition session reacts to an error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Keep listening
    Ignore,
    /// Stop, tell the user, and stay stopped until explicit action
    Surface,
    /// Log and let the caller decide whether to restart
    Defer,
    /// Stop without auto-restart and without a user message
    StopQuietly,
}

impl RecognitionErrorKind {
    /// Parse a recognizer error code (e.g. `"no-speech"`)
    #[must_use]
    pub fn parse(code: &str) -> Self {
        match code.trim().to_lowercase().as_str() {
            "no-speech" => Self::NoSpeech,
            "audio-capture" => Self::AudioCapture,
            "not-allowed" => Self::NotAllowed,
            "language-not-supported" => Self::LanguageNotSupported,
            "service-not-allowed" => Self::ServiceNotAllowed,
            "network" => Self::Network,
            "aborted" => Self::Aborted,
            _ => Self::Other,
        }
    }

    /// Error code as reported by recognizers
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoSpeech => "no-speech",
            Self::AudioCapture => "audio-capture",
            Self::NotAllowed => "not-allowed",
            Self::LanguageNotSupported => "language-not-supported",
            Self::ServiceNotAllowed => "service-not-allowed",
            Self::Network => "network",
            Self::Aborted => "aborted",
            Self::Other => "other",
        }
    }

    /// Reaction policy for this kind
    #[must_use]
    pub const fn policy(self) -> ErrorPolicy {
        match self {
            Self::NoSpeech => ErrorPolicy::Ignore,
            Self::AudioCapture
            | Self::NotAllowed
            | Self::LanguageNotSupported
            | Self::ServiceNotAllowed => ErrorPolicy::Surface,
            Self::Network | Self::Other => ErrorPolicy::Defer,
            Self::Aborted => ErrorPolicy::StopQuietly,
        }
    }

    /// Message shown to the user for surfaced errors
    #[must_use]
    pub const fn user_message(self) -> Option<&'static str> {
        match self {
            Self::AudioCapture => Some("I can't access a microphone. Check that one is connected."),
            Self::NotAllowed | Self::ServiceNotAllowed => {
                Some("Microphone access was denied. Allow it and tap the mic to try again.")
            }
            Self::LanguageNotSupported => Some("Voice input isn't supported for this language."),
            Self::NoSpeech | Self::Network | Self::Aborted | Self::Other => None,
        }
    }
}

impl std::fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A continuous speech-to-text engine
///
/// Events are delivered to every subscriber; a subscription is released
/// when its receiver is dropped.
#[async_trait]
pub trait SpeechCapability: Send + Sync {
    /// Begin continuous recognition
    ///
    /// Returns false if already active or recognition is unavailable.
    fn start_continuous(&self) -> bool;

    /// Stop recognition; resolves once the engine has stopped
    async fn stop_continuous(&self);

    /// Whether the engine is currently capturing
    fn is_active(&self) -> bool;

    /// Subscribe to recognizer events
    fn subscribe(&self) -> broadcast::Receiver<SpeechEvent>;
}
