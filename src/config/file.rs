//! TOML configuration file loading
//!
//! Supports `~/.config/workorder-voice/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Backend connection settings
    #[serde(default)]
    pub backend: BackendFileConfig,

    /// Voice/recognition settings
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Conversation surface settings
    #[serde(default)]
    pub conversation: ConversationFileConfig,

    /// API keys for cloud speech services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Backend connection configuration
#[derive(Debug, Default, Deserialize)]
pub struct BackendFileConfig {
    /// Base URL of the work-order backend
    pub url: Option<String>,

    /// User identifier sent with chat and feedback calls
    pub user_id: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Enable voice input/output
    pub enabled: Option<bool>,

    /// Wake phrases (e.g. "hey assistant")
    pub wake_phrases: Option<Vec<String>>,

    /// Delay before auto-restarting recognition after an unexpected end
    pub restart_delay_ms: Option<u64>,

    /// Grace delay between stopping one recognizer and starting the other
    pub stop_grace_ms: Option<u64>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f64>,
}

/// Conversation surface configuration
#[derive(Debug, Default, Deserialize)]
pub struct ConversationFileConfig {
    /// Auto-close a surface after this many idle seconds
    pub inactivity_secs: Option<u64>,

    /// Window in which an identical transcript is dropped as an echo
    pub duplicate_window_ms: Option<u64>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    config_file_path().map_or_else(ConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Missing or malformed files fall back to defaults with a warning.
pub fn load_config_file_from(path: &Path) -> ConfigFile {
    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/workorder-voice/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("workorder-voice").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let fc = load_config_file_from(&dir.path().join("absent.toml"));
        assert!(fc.backend.url.is_none());
        assert!(fc.voice.wake_phrases.is_none());
    }

    #[test]
    fn partial_file_overlays_only_given_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[backend]\nurl = \"http://backend:9000\"\n\n[voice]\nwake_phrases = [\"hey foreman\"]\n",
        )
        .unwrap();

        let fc = load_config_file_from(&path);
        assert_eq!(fc.backend.url.as_deref(), Some("http://backend:9000"));
        assert_eq!(fc.voice.wake_phrases, Some(vec!["hey foreman".to_string()]));
        assert!(fc.conversation.inactivity_secs.is_none());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[backend\nurl = ").unwrap();

        let fc = load_config_file_from(&path);
        assert!(fc.backend.url.is_none());
    }
}
