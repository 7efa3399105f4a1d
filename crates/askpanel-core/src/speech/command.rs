//! Speech through external programs: a synthesizer such as `espeak-ng` or
//! `say`, and an optional recognizer that prints what it heard on stdout.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{RecognitionOptions, SpeechEngine, SpeechEvent};
use crate::error::PanelError;

/// Placeholder replaced by the speech language in command templates.
pub const LANGUAGE_PLACEHOLDER: &str = "{lang}";

pub fn default_speak_command() -> String {
    if cfg!(target_os = "macos") {
        "say".to_string()
    } else {
        "espeak-ng -v {lang}".to_string()
    }
}

/// Splits a command template into program and arguments, substituting the language.
fn build_argv(template: &str, language: &str) -> Result<Vec<String>> {
    let argv: Vec<String> = template
        .split_whitespace()
        .map(|part| part.replace(LANGUAGE_PLACEHOLDER, language))
        .collect();
    if argv.is_empty() {
        return Err(anyhow!("empty speech command"));
    }
    Ok(argv)
}

pub struct CommandSpeech {
    speak_command: String,
    listen_command: Option<String>,
    events: mpsc::UnboundedSender<SpeechEvent>,
    speaker: Mutex<Option<Child>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    listening: Arc<AtomicBool>,
}

impl CommandSpeech {
    pub fn new(
        speak_command: String,
        listen_command: Option<String>,
        events: mpsc::UnboundedSender<SpeechEvent>,
    ) -> Self {
        Self {
            speak_command,
            listen_command,
            events,
            speaker: Mutex::new(None),
            listener: Mutex::new(None),
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    fn emit(&self, event: SpeechEvent) {
        let _ = self.events.send(event);
    }
}

/// Runs the recognizer to completion and reports what it heard.
async fn recognize(mut command: Command) -> SpeechEvent {
    let output = match command.output().await {
        Ok(output) => output,
        Err(e) => return SpeechEvent::Error(format!("could not start recognizer: {}", e)),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("recognizer exited with {}", output.status)
        } else {
            stderr
        };
        return SpeechEvent::Error(message);
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() {
        SpeechEvent::Error("no speech detected".to_string())
    } else {
        SpeechEvent::Result(text)
    }
}

#[async_trait]
impl SpeechEngine for CommandSpeech {
    async fn start_recognition(&self, language: &str, options: RecognitionOptions) -> Result<()> {
        let template = self
            .listen_command
            .as_deref()
            .ok_or_else(|| PanelError::Recognition("no listen_command configured".to_string()))?;
        let argv = build_argv(template, language)?;
        debug!(?argv, ?options, "spawning recognizer");

        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut listener = self.listener.lock().await;
        if let Some(previous) = listener.take() {
            previous.abort();
        }

        self.listening.store(true, Ordering::SeqCst);
        self.emit(SpeechEvent::BusyChanged(true));

        let events = self.events.clone();
        let listening = self.listening.clone();
        *listener = Some(tokio::spawn(async move {
            let event = recognize(command).await;
            listening.store(false, Ordering::SeqCst);
            let _ = events.send(SpeechEvent::BusyChanged(false));
            let _ = events.send(event);
        }));
        Ok(())
    }

    async fn stop_recognition(&self) -> Result<()> {
        if let Some(handle) = self.listener.lock().await.take() {
            // Dropping the aborted task drops the child, which kills it.
            handle.abort();
            if self.listening.swap(false, Ordering::SeqCst) {
                self.emit(SpeechEvent::BusyChanged(false));
            }
        }
        Ok(())
    }

    async fn speak(&self, text: &str, language: &str) -> Result<()> {
        let argv = build_argv(&self.speak_command, language)?;
        let mut speaker = self.speaker.lock().await;
        if let Some(mut previous) = speaker.take() {
            let _ = previous.kill().await;
        }

        let child = Command::new(&argv[0])
            .args(&argv[1..])
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PanelError::Speech(format!("could not start `{}`: {}", argv[0], e)))?;
        *speaker = Some(child);
        Ok(())
    }

    async fn stop_speaking(&self) -> Result<()> {
        if let Some(mut child) = self.speaker.lock().await.take() {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "could not stop speech command");
            }
        }
        Ok(())
    }

    async fn is_busy(&self) -> bool {
        self.listening.load(Ordering::SeqCst) || self.is_speaking().await
    }

    async fn is_speaking(&self) -> bool {
        let mut speaker = self.speaker.lock().await;
        let running = match speaker.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        };
        if !running {
            *speaker = None;
        }
        running
    }

    fn can_listen(&self) -> bool {
        self.listen_command.is_some()
    }
}
