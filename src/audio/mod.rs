//! Microphone and cloud speech collaborators
//!
//! Built with the `audio` feature. Capture and playback use the default
//! devices; recognition and synthesis go through `OpenAI`.

mod capture;
mod cloud_tts;
mod playback;
mod whisper;

pub use capture::{MicCapture, SAMPLE_RATE, Segmenter, samples_to_wav};
pub use cloud_tts::OpenAiSynthesizer;
pub use playback::{Playback, decode_mp3};
pub use whisper::{Transcriber, WhisperSpeech};
