//! Configuration management for the work-order voice front-end

pub mod file;

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::{Error, Result};

use file::ConfigFile;

/// Default backend base URL
const DEFAULT_BACKEND_URL: &str = "http://localhost:8000/";

/// Default wake phrase
pub const DEFAULT_WAKE_PHRASE: &str = "hey assistant";

/// Work-order voice configuration
#[derive(Debug)]
pub struct Config {
    /// Backend connection configuration
    pub backend: BackendConfig,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// Conversation surface configuration
    pub conversation: ConversationConfig,

    /// API keys for cloud speech services
    pub api_keys: ApiKeys,
}

/// Backend connection configuration
#[derive(Debug)]
pub struct BackendConfig {
    /// Base URL; endpoint paths are joined onto it
    pub base_url: Url,

    /// User identifier sent with chat and feedback calls
    pub user_id: String,

    /// Bearer token acquired outside this crate (from `WOV_API_TOKEN`)
    pub api_token: Option<SecretString>,

    /// Per-request timeout
    pub timeout: Duration,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Enable voice input
    pub enabled: bool,

    /// Wake phrases, normalized to lowercase
    pub wake_phrases: Vec<String>,

    /// Delay before a recognizer that ended unexpectedly is restarted
    pub restart_delay: Duration,

    /// Grace delay after stopping one recognizer before starting the other
    pub stop_grace: Duration,

    /// STT model for cloud transcription (e.g. "whisper-1")
    pub stt_model: String,

    /// TTS model for cloud synthesis (e.g. "tts-1")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wake_phrases: vec![DEFAULT_WAKE_PHRASE.to_string()],
            restart_delay: Duration::from_millis(300),
            stop_grace: Duration::from_millis(250),
            stt_model: "whisper-1".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 1.0,
        }
    }
}

/// Conversation surface configuration
#[derive(Debug, Clone, Copy)]
pub struct ConversationConfig {
    /// Idle time after which an open surface closes itself
    pub inactivity_timeout: Duration,

    /// Window in which an identical transcript is treated as a recognizer echo
    pub duplicate_window: Duration,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: Duration::from_secs(120),
            duplicate_window: Duration::from_secs(2),
        }
    }
}

/// API keys for external services
#[derive(Debug, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (for Whisper and TTS with the `audio` feature)
    pub openai: Option<SecretString>,
}

impl Config {
    /// Load configuration from the environment and the TOML config file
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn load(disable_voice: bool) -> Result<Self> {
        let fc = file::load_config_file();
        Self::resolve(fc, |key| std::env::var(key).ok(), disable_voice)
    }

    /// Resolve configuration with priority env > file > default
    ///
    /// # Errors
    ///
    /// Returns error if the backend URL is invalid or a duration is zero
    pub fn resolve(
        fc: ConfigFile,
        env: impl Fn(&str) -> Option<String>,
        disable_voice: bool,
    ) -> Result<Self> {
        let env_u64 = |key: &str| env(key).and_then(|v| v.trim().parse::<u64>().ok());

        let raw_url = env("WOV_BACKEND_URL")
            .or(fc.backend.url)
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        let backend = BackendConfig {
            base_url: parse_base_url(&raw_url)?,
            user_id: env("WOV_USER_ID")
                .or(fc.backend.user_id)
                .unwrap_or_else(|| "local-user".to_string()),
            api_token: env("WOV_API_TOKEN").map(SecretString::from),
            timeout: Duration::from_secs(
                env_u64("WOV_TIMEOUT_SECS")
                    .or(fc.backend.timeout_secs)
                    .unwrap_or(30),
            ),
        };

        let defaults = VoiceConfig::default();
        let wake_phrases = env("WOV_WAKE_PHRASE")
            .map(|v| v.split(',').map(ToString::to_string).collect::<Vec<_>>())
            .or(fc.voice.wake_phrases)
            .unwrap_or(defaults.wake_phrases);
        let wake_phrases: Vec<String> = wake_phrases
            .into_iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();

        let voice = VoiceConfig {
            enabled: !disable_voice && fc.voice.enabled.unwrap_or(true),
            wake_phrases,
            restart_delay: fc
                .voice
                .restart_delay_ms
                .map_or(defaults.restart_delay, Duration::from_millis),
            stop_grace: fc
                .voice
                .stop_grace_ms
                .map_or(defaults.stop_grace, Duration::from_millis),
            stt_model: env("WOV_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or(defaults.stt_model),
            tts_model: env("WOV_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or(defaults.tts_model),
            tts_voice: fc.voice.tts_voice.unwrap_or(defaults.tts_voice),
            tts_speed: fc.voice.tts_speed.unwrap_or(defaults.tts_speed),
        };

        let conversation_defaults = ConversationConfig::default();
        let conversation = ConversationConfig {
            inactivity_timeout: env_u64("WOV_INACTIVITY_SECS")
                .or(fc.conversation.inactivity_secs)
                .map_or(conversation_defaults.inactivity_timeout, Duration::from_secs),
            duplicate_window: fc
                .conversation
                .duplicate_window_ms
                .map_or(conversation_defaults.duplicate_window, Duration::from_millis),
        };

        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY")
                .or(fc.api_keys.openai)
                .map(SecretString::from),
        };

        let config = Self {
            backend,
            voice,
            conversation,
            api_keys,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.backend.timeout.is_zero() {
            return Err(Error::Config("backend timeout must be non-zero".to_string()));
        }
        if self.conversation.inactivity_timeout.is_zero() {
            return Err(Error::Config(
                "inactivity timeout must be non-zero".to_string(),
            ));
        }
        if self.voice.enabled && self.voice.wake_phrases.is_empty() {
            return Err(Error::Config(
                "at least one wake phrase is required when voice is enabled".to_string(),
            ));
        }
        if !(0.25..=4.0).contains(&self.voice.tts_speed) {
            return Err(Error::Config(format!(
                "tts speed {} outside 0.25..=4.0",
                self.voice.tts_speed
            )));
        }
        Ok(())
    }
}

/// Parse a backend base URL, ensuring it ends with a slash so joins keep the path
fn parse_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&with_slash)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "backend url must be http(s): {trimmed}"
        )));
    }
    Ok(url)
}
