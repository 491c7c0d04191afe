use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use workorder_voice::backend::Polarity;
use workorder_voice::orchestrator::{Collaborators, SurfaceSettings};
use workorder_voice::speech::{
    ConsoleSynthesizer, ManualSpeech, SpeechCapability, SpeechSynthesizer,
};
use workorder_voice::{
    CallHub, CloseReason, Config, ConversationSurface, HandoffStore, HttpBackend, Message,
    NavigationRequest, Navigator, Sender, SurfaceKind, SurfaceUpdate, classify,
};

/// Work-order voice assistant console
#[derive(Parser)]
#[command(name = "workorder-voice", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable voice input and speech output
    #[arg(long, env = "WOV_DISABLE_VOICE")]
    disable_voice: bool,

    /// Listen on the microphone and speak replies aloud
    #[cfg(feature = "audio")]
    #[arg(long)]
    mic: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive conversation (default)
    Chat {
        /// Open the view of this work order instead of the launcher
        #[arg(long)]
        work_order: Option<String>,
    },
    /// Classify an utterance and print the intent as JSON
    Classify {
        /// Utterance text
        text: String,
        /// Treat a work-order session as active
        #[arg(long)]
        session: bool,
    },
    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn,workorder_voice=info",
        1 => "info,workorder_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    #[cfg(feature = "audio")]
    let use_mic = cli.mic;
    #[cfg(not(feature = "audio"))]
    let use_mic = false;

    match cli.command.unwrap_or(Command::Chat { work_order: None }) {
        Command::Classify { text, session } => {
            let intent = classify(&text, session);
            println!("{}", serde_json::to_string_pretty(&intent)?);
            Ok(())
        }
        Command::Config => {
            let config = Config::load(cli.disable_voice)?;
            println!("{config:#?}");
            Ok(())
        }
        Command::Chat { work_order } => {
            let config = Config::load(cli.disable_voice)?;
            chat(config, work_order, use_mic).await
        }
    }
}

/// Routes navigation requests back to the console loop
struct ChannelNavigator(mpsc::UnboundedSender<NavigationRequest>);

impl Navigator for ChannelNavigator {
    fn navigate(&self, request: NavigationRequest) {
        let _ = self.0.send(request);
    }
}

/// Recognizers fed by `/voice` lines
struct ManualInputs {
    wake: Arc<ManualSpeech>,
    command: Arc<ManualSpeech>,
}

struct Speech {
    wake: Arc<dyn SpeechCapability>,
    command: Arc<dyn SpeechCapability>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    manual: Option<ManualInputs>,
}

fn console_speech() -> Speech {
    let wake = Arc::new(ManualSpeech::new());
    let command = Arc::new(ManualSpeech::new());
    Speech {
        wake: Arc::clone(&wake) as Arc<dyn SpeechCapability>,
        command: Arc::clone(&command) as Arc<dyn SpeechCapability>,
        synthesizer: Arc::new(ConsoleSynthesizer::stdout()),
        manual: Some(ManualInputs { wake, command }),
    }
}

#[cfg(feature = "audio")]
fn microphone_speech(config: &Config) -> anyhow::Result<Speech> {
    use anyhow::Context;
    use workorder_voice::audio::{OpenAiSynthesizer, Transcriber, WhisperSpeech};

    let key = config
        .api_keys
        .openai
        .clone()
        .context("OPENAI_API_KEY is required for --mic")?;
    let model = config.voice.stt_model.clone();

    Ok(Speech {
        wake: Arc::new(WhisperSpeech::new(Transcriber::new(key.clone(), model.clone())?)),
        command: Arc::new(WhisperSpeech::new(Transcriber::new(key.clone(), model)?)),
        synthesizer: Arc::new(OpenAiSynthesizer::new(key, &config.voice)?),
        manual: None,
    })
}

#[cfg(not(feature = "audio"))]
fn microphone_speech(_config: &Config) -> anyhow::Result<Speech> {
    anyhow::bail!("built without the `audio` feature")
}

async fn chat(config: Config, work_order: Option<String>, use_mic: bool) -> anyhow::Result<()> {
    let speech = if use_mic {
        microphone_speech(&config)?
    } else {
        console_speech()
    };

    let settings = SurfaceSettings::from_config(&config);
    let hub = Arc::new(CallHub::new(config.conversation.duplicate_window));
    let backend = Arc::new(HttpBackend::new(config.backend)?);
    let (nav_tx, mut nav_rx) = mpsc::unbounded_channel();

    let collaborators = Collaborators {
        backend,
        hub,
        wake_speech: Arc::clone(&speech.wake),
        command_speech: Arc::clone(&speech.command),
        synthesizer: Arc::clone(&speech.synthesizer),
        navigator: Arc::new(ChannelNavigator(nav_tx)),
        handoff: Arc::new(HandoffStore::new()),
    };

    let launcher = work_order.map_or(SurfaceKind::Widget, |id| SurfaceKind::WorkOrder {
        work_order_id: id,
    });
    let mut surface =
        ConversationSurface::open(launcher, settings.clone(), collaborators.clone()).await;
    let mut printer = spawn_printer(&surface);

    println!("Type a message, /voice <text> to speak, /up or /down to rate a step, /quit to exit.");
    if settings.voice.enabled {
        println!("Say \"{}\" to start voice capture.", settings.voice.wake_phrases.join("\" or \""));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            Some(request) = nav_rx.recv() => {
                println!("-- opening work order {} --", request.work_order_id);
                printer.abort();
                let kind = SurfaceKind::WorkOrder { work_order_id: request.work_order_id };
                surface = ConversationSurface::open(kind, settings.clone(), collaborators.clone()).await;
                print_history(&surface);
                printer = spawn_printer(&surface);
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !surface.is_open() {
                    printer.abort();
                    surface = ConversationSurface::open(SurfaceKind::Widget, settings.clone(), collaborators.clone()).await;
                    printer = spawn_printer(&surface);
                }
                if !handle_line(&surface, &speech, &line).await {
                    break;
                }
            }
        }
    }

    surface.close(CloseReason::Dismissed).await;
    printer.abort();
    Ok(())
}

/// Input line of the console
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Quit,
    Rate(Polarity),
    Voice(&'a str),
    Listen,
    StopListening,
    Text(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    match line {
        "" => Input::Empty,
        "/quit" | "/exit" => Input::Quit,
        "/up" => Input::Rate(Polarity::Positive),
        "/down" => Input::Rate(Polarity::Negative),
        "/listen" => Input::Listen,
        "/stop" => Input::StopListening,
        _ => line
            .strip_prefix("/voice ")
            .map_or(Input::Text(line), |text| Input::Voice(text.trim())),
    }
}

/// Returns false when the user asked to quit
async fn handle_line(surface: &ConversationSurface, speech: &Speech, line: &str) -> bool {
    match parse_input(line) {
        Input::Empty => {}
        Input::Quit => return false,
        Input::Text(text) => {
            surface.submit_text(text).await;
        }
        Input::Voice(text) => {
            let heard = speech
                .manual
                .as_ref()
                .is_some_and(|m| m.command.say(text) || m.wake.say(text));
            if !heard {
                surface.submit_voice(text).await;
            }
        }
        Input::Rate(polarity) => match surface.last_step_message() {
            Some(message) => {
                if let Err(e) = surface.mark_feedback(message.id, polarity).await {
                    println!("!! {e}");
                }
            }
            None => println!("!! no step to rate yet"),
        },
        Input::Listen => match surface.start_recognition().await {
            Ok(true) => println!("-- listening --"),
            Ok(false) => println!("!! voice capture unavailable"),
            Err(e) => println!("!! {e}"),
        },
        Input::StopListening => surface.stop_recognition().await,
    }
    true
}

fn spawn_printer(surface: &ConversationSurface) -> JoinHandle<()> {
    let mut updates = surface.subscribe();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(SurfaceUpdate::Message(message)) => print_message(&message),
                Ok(SurfaceUpdate::Interim(text)) => println!("   ... {text}"),
                Ok(SurfaceUpdate::Feedback { polarity, .. }) => println!("-- marked {polarity} --"),
                Ok(SurfaceUpdate::Closed(reason)) => {
                    match reason {
                        CloseReason::Inactive => println!("-- closed after inactivity --"),
                        CloseReason::Navigated | CloseReason::Dismissed => {}
                    }
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn print_history(surface: &ConversationSurface) {
    for message in surface.messages() {
        print_message(&message);
    }
}

fn print_message(message: &Message) {
    match (message.sender, message.step_number) {
        (Sender::User, _) if message.is_voice => println!("you (voice): {}", message.text),
        (Sender::User, _) => {}
        (Sender::Bot, Some(step)) => println!("assistant [step {step}]: {}", message.text),
        (Sender::Bot, None) => println!("assistant: {}", message.text),
    }
}
