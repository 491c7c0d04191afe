//! `OpenAI` text-to-speech with local playback

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::playback::{Playback, decode_mp3};
use crate::config::VoiceConfig;
use crate::speech::SpeechSynthesizer;
use crate::{Error, Result};

const SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";

/// Speaks through `OpenAI` TTS and the default output device
pub struct OpenAiSynthesizer {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    voice: String,
    speed: f64,
    playback: Playback,
}

impl OpenAiSynthesizer {
    /// # Errors
    ///
    /// Returns error if the API key is empty or no output device exists
    pub fn new(api_key: SecretString, voice: &VoiceConfig) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: voice.tts_model.clone(),
            voice: voice.tts_voice.clone(),
            speed: voice.tts_speed,
            playback: Playback::new()?,
        })
    }

    /// Synthesize `text` to MP3 bytes
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f64,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post(SPEECH_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSynthesizer {
    async fn speak(&self, text: &str) -> Result<()> {
        let audio = self.synthesize(text).await?;
        let samples = decode_mp3(&audio)?;
        tracing::debug!(samples = samples.len(), "playing synthesized speech");
        self.playback.play(samples).await
    }
}
