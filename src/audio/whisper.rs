//! Continuous recognition from the microphone via `OpenAI` Whisper
//!
//! A capture thread segments microphone audio into utterances; each
//! utterance is transcribed and published as a final result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::capture::{MicCapture, SAMPLE_RATE, Segmenter, samples_to_wav};
use crate::speech::{RecognitionErrorKind, SpeechCapability, SpeechEvent};
use crate::{Error, Result};

const TRANSCRIPTION_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Poll interval of the capture thread
const CAPTURE_TICK: Duration = Duration::from_millis(100);

#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Whisper transcription client
pub struct Transcriber {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
}

impl Transcriber {
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn new(api_key: SecretString, model: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        })
    }

    /// Transcribe WAV audio
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the API rejects it
    pub async fn transcribe(&self, audio: Vec<u8>) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post(TRANSCRIPTION_URL)
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Recognition(RecognitionErrorKind::Network));
        }

        let result: WhisperResponse = response.json().await?;
        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }
}

enum Captured {
    Utterance(Vec<f32>),
    Failed(RecognitionErrorKind),
}

struct Worker {
    stop: Arc<AtomicBool>,
    thread: std::thread::JoinHandle<()>,
    forward: JoinHandle<()>,
}

/// Microphone-backed speech capability
pub struct WhisperSpeech {
    transcriber: Arc<Transcriber>,
    events: broadcast::Sender<SpeechEvent>,
    active: Arc<AtomicBool>,
    worker: Mutex<Option<Worker>>,
}

impl WhisperSpeech {
    #[must_use]
    pub fn new(transcriber: Transcriber) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            transcriber: Arc::new(transcriber),
            events,
            active: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    fn lock_worker(&self) -> std::sync::MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SpeechCapability for WhisperSpeech {
    fn start_continuous(&self) -> bool {
        if self.active.swap(true, Ordering::SeqCst) {
            return false;
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = {
            let stop = Arc::clone(&stop);
            std::thread::Builder::new()
                .name("mic-capture".to_string())
                .spawn(move || capture_loop(&stop, &tx))
        };
        let thread = match thread {
            Ok(thread) => thread,
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn capture thread");
                self.active.store(false, Ordering::SeqCst);
                return false;
            }
        };

        let forward = tokio::spawn(forward(
            rx,
            Arc::clone(&self.transcriber),
            self.events.clone(),
            Arc::clone(&self.active),
        ));

        *self.lock_worker() = Some(Worker {
            stop,
            thread,
            forward,
        });
        true
    }

    async fn stop_continuous(&self) {
        let Some(worker) = self.lock_worker().take() else {
            return;
        };

        worker.stop.store(true, Ordering::SeqCst);
        worker.forward.abort();
        let thread = worker.thread;
        if !matches!(
            tokio::task::spawn_blocking(move || thread.join()).await,
            Ok(Ok(()))
        ) {
            tracing::warn!("capture thread did not shut down cleanly");
        }

        if self.active.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(SpeechEvent::End);
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<SpeechEvent> {
        self.events.subscribe()
    }
}

fn capture_loop(stop: &AtomicBool, tx: &mpsc::UnboundedSender<Captured>) {
    let mut mic = match MicCapture::new().and_then(|mut mic| mic.start().map(|()| mic)) {
        Ok(mic) => mic,
        Err(e) => {
            tracing::error!(error = %e, "microphone unavailable");
            let _ = tx.send(Captured::Failed(RecognitionErrorKind::AudioCapture));
            return;
        }
    };

    let mut segmenter = Segmenter::default();
    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(CAPTURE_TICK);
        if let Some(utterance) = segmenter.push(&mic.take_buffer()) {
            if tx.send(Captured::Utterance(utterance)).is_err() {
                break;
            }
        }
    }
    mic.stop();
}

async fn forward(
    mut rx: mpsc::UnboundedReceiver<Captured>,
    transcriber: Arc<Transcriber>,
    events: broadcast::Sender<SpeechEvent>,
    active: Arc<AtomicBool>,
) {
    while let Some(captured) = rx.recv().await {
        let event = match captured {
            Captured::Failed(kind) => SpeechEvent::Error(kind),
            Captured::Utterance(samples) => {
                let transcript = match samples_to_wav(&samples, SAMPLE_RATE) {
                    Ok(wav) => transcriber.transcribe(wav).await,
                    Err(e) => Err(e),
                };
                match transcript {
                    Ok(text) if text.trim().is_empty() => {
                        SpeechEvent::Error(RecognitionErrorKind::NoSpeech)
                    }
                    Ok(text) => SpeechEvent::Result {
                        transcript: text,
                        is_final: true,
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "transcription failed");
                        SpeechEvent::Error(RecognitionErrorKind::Network)
                    }
                }
            }
        };
        let _ = events.send(event);
    }

    // Capture thread exited on its own
    if active.swap(false, Ordering::SeqCst) {
        let _ = events.send(SpeechEvent::End);
    }
}
