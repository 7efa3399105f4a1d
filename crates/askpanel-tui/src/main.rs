use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use askpanel_core::{
    CommandSpeech, Config, Dispatcher, HttpProbe, OpenAIClient, Operation, Outcome, Session,
    SessionSettings, SpeechEvent, VoiceBridge,
};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;

mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "askpanel", version)]
#[command(about = "Chat panel for OpenAI models with voice input and read-aloud")]
struct Cli {
    /// OpenAI API key (overrides OPENAI_API_KEY and the config file)
    #[arg(long)]
    api_key: Option<String>,
    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Speech language, e.g. zh-CN or en-US
    #[arg(short, long)]
    language: Option<String>,
    /// Fixed max output length (overrides the preset selector)
    #[arg(long)]
    max_tokens: Option<u32>,
    /// Fixed randomness (overrides the preset selector)
    #[arg(long)]
    temperature: Option<f32>,
    /// Disable voice input and read-aloud
    #[arg(long)]
    no_speech: bool,
    /// Hide the tuning options bar
    #[arg(long)]
    hide_options: bool,
    /// Initial operation, e.g. ChatAdvanced or ImageGeneration
    #[arg(short, long, value_parser = parse_operation)]
    operation: Option<Operation>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question and print the transcript
    Ask {
        /// Your question
        prompt: String,
    },
}

fn parse_operation(s: &str) -> Result<Operation, String> {
    Operation::from_str(s).ok_or_else(|| {
        let names: Vec<&str> = Operation::all().iter().map(|op| op.as_str()).collect();
        format!("unknown operation '{}', expected one of: {}", s, names.join(", "))
    })
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(language) = &self.language {
            config.speech_language = language.clone();
        }
        if self.max_tokens.is_some() {
            config.max_tokens = self.max_tokens;
        }
        if self.temperature.is_some() {
            config.temperature = self.temperature;
        }
        if self.no_speech {
            config.enable_speech = false;
        }
        if self.hide_options {
            config.show_options = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    cli.apply(&mut config);

    match &cli.command {
        Some(Commands::Ask { .. }) => logging::init_stderr(),
        None => {
            let path = logging::init_file()?;
            info!(log = %path.display(), "askpanel starting");
        }
    }

    let api_key = config.resolve_api_key(cli.api_key.as_deref())?;
    let client = match &config.base_url {
        Some(base_url) => OpenAIClient::with_base_url(&api_key, base_url),
        None => OpenAIClient::new(&api_key),
    };
    let mut dispatcher = Dispatcher::new(Arc::new(client));
    if config.probe_image_urls {
        dispatcher = dispatcher.with_probe(Arc::new(HttpProbe::new()));
    }

    let mut settings = SessionSettings::from(&config);
    if let Some(operation) = cli.operation {
        settings.operation = operation;
    }

    match cli.command {
        Some(Commands::Ask { prompt }) => ask(&config, settings, dispatcher, prompt).await,
        None => {
            let initial = settings.clone();
            let settings = run_panel(&config, settings, dispatcher).await?;
            save_voice_toggles(cli.config.as_deref(), &initial, &settings)
        }
    }
}

/// Writes back the F5-F7 voice toggles the user changed during the session.
/// Only changed fields are touched, so CLI overrides never leak into the file.
fn save_voice_toggles(path: Option<&Path>, before: &SessionSettings, after: &SessionSettings) -> Result<()> {
    let changed = [
        before.continuous_conversation != after.continuous_conversation,
        before.auto_send != after.auto_send,
        before.auto_speak != after.auto_speak,
    ];
    if !changed.contains(&true) {
        return Ok(());
    }

    let mut config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if changed[0] {
        config.continuous_conversation = after.continuous_conversation;
    }
    if changed[1] {
        config.auto_send = after.auto_send;
    }
    if changed[2] {
        config.auto_speak = after.auto_speak;
    }

    info!("saving voice settings");
    match path {
        Some(path) => config.save_to(path),
        None => config.save(),
    }
}

fn build_voice(config: &Config, events: mpsc::UnboundedSender<SpeechEvent>) -> VoiceBridge {
    let engine = CommandSpeech::new(
        config.speak_command.clone(),
        config.listen_command.clone(),
        events,
    );
    VoiceBridge::new(Arc::new(engine))
}

/// Runs the panel until quit and hands back the final settings.
async fn run_panel(
    config: &Config,
    settings: SessionSettings,
    dispatcher: Dispatcher,
) -> Result<SessionSettings> {
    let mut events = EventHandler::new();

    let voice = if settings.speech_enabled {
        let (speech_tx, speech_rx) = mpsc::unbounded_channel();
        events.forward_speech(speech_rx);
        Some(build_voice(config, speech_tx))
    } else {
        None
    };

    let mut app = App::new(Session::new(settings), dispatcher, voice, events.sender());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event).await?,
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    if let Some(voice) = &app.voice {
        let _ = voice.stop().await;
    }
    tui::restore()?;
    info!("askpanel exiting");
    result.map(|()| app.session.settings)
}

/// Runs a single turn without the terminal UI.
async fn ask(
    config: &Config,
    mut settings: SessionSettings,
    dispatcher: Dispatcher,
    prompt: String,
) -> Result<()> {
    // One question only, so never re-arm listening
    settings.continuous_conversation = false;

    let voice = if settings.speech_enabled {
        let (speech_tx, _speech_rx) = mpsc::unbounded_channel();
        Some(build_voice(config, speech_tx))
    } else {
        None
    };

    let mut session = Session::new(settings);
    session.prompt = prompt;
    let outcome = session
        .run_turn(&dispatcher, voice.as_ref())
        .await
        .ok_or_else(|| anyhow!("the question is empty"))?;

    print!("{}", session.transcript().text());
    if let Some(image) = session.image() {
        println!("{}", ui::describe_image(image));
    }

    // Let read-aloud finish before the speaker process is dropped
    if let Some(voice) = &voice {
        if session.settings.auto_speak {
            voice.wait_until_quiet().await;
        }
    }

    match outcome {
        Outcome::Failure { reason } => Err(anyhow!("{} ({})", session.placeholder.text(), reason)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_operation_is_case_insensitive() {
        assert_eq!(parse_operation("imagegeneration"), Ok(Operation::ImageGeneration));
        assert!(parse_operation("Poetry").unwrap_err().contains("ChatBasic"));
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "askpanel",
            "--language",
            "en-US",
            "--max-tokens",
            "300",
            "--no-speech",
            "--hide-options",
        ])
        .unwrap();
        let mut config = Config::new();
        cli.apply(&mut config);

        assert_eq!(config.speech_language, "en-US");
        assert_eq!(config.max_tokens, Some(300));
        assert_eq!(config.temperature, None);
        assert!(!config.enable_speech);
        assert!(!config.show_options);
    }

    #[test]
    fn test_changed_voice_toggles_are_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let stored = Config {
            speech_language: "en-US".to_string(),
            ..Config::new()
        };
        stored.save_to(&path).unwrap();

        // --no-speech was passed this run; only F7 was pressed
        let before = SessionSettings {
            speech_enabled: false,
            ..SessionSettings::from(&stored)
        };
        let after = SessionSettings {
            auto_speak: false,
            ..before.clone()
        };
        save_voice_toggles(Some(&path), &before, &after).unwrap();

        let saved = Config::load_from(&path).unwrap();
        assert!(!saved.auto_speak);
        assert!(saved.enable_speech);
        assert!(saved.continuous_conversation);
        assert_eq!(saved.speech_language, "en-US");
    }

    #[test]
    fn test_unchanged_toggles_leave_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let settings = SessionSettings::default();

        save_voice_toggles(Some(&path), &settings, &settings).unwrap();

        assert!(!path.exists());
    }

    #[test]
    fn test_ask_subcommand() {
        let cli = Cli::try_parse_from(["askpanel", "-o", "Chatbot", "ask", "hello there"]).unwrap();
        assert_eq!(cli.operation, Some(Operation::Chatbot));
        match cli.command {
            Some(Commands::Ask { prompt }) => assert_eq!(prompt, "hello there"),
            None => panic!("expected ask"),
        }
    }
}
