//! Speech input and output
//!
//! - `capability` - continuous recognizer interface and error policy
//! - `recognition` - start/stop session with guarded auto-restart
//! - `wake_word` - trigger phrase listener
//! - `tts` - exclusive text-to-speech playback
//! - `console` - terminal and headless collaborators

mod capability;
mod console;
mod recognition;
mod tts;
mod wake_word;

pub use capability::{ErrorPolicy, RecognitionErrorKind, SpeechCapability, SpeechEvent};
pub use console::{ConsoleSynthesizer, ManualSpeech, UnavailableSpeech};
pub use recognition::{RecognitionEvent, RecognitionSession};
pub use tts::{SpeakOutcome, Speaker, SpeechSynthesizer};
pub use wake_word::{ListenerState, WakeEvent, WakeMatch, WakeMatcher, WakeWordListener};
