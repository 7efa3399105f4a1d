//! Session state and the turn lifecycle.
//!
//! A turn is `begin_turn` -> [`Dispatcher::dispatch`] -> `apply_outcome`,
//! optionally followed by read-aloud and, in continuous conversation, by
//! listening again once the speaker has gone quiet. The TUI drives these
//! steps from its event loop; [`Session::run_turn`] runs them back to back.

use tracing::warn;

use crate::config::Config;
use crate::dispatcher::{Dispatcher, Outcome, TurnRequest};
use crate::operation::{
    max_tokens_preset_index, temperature_preset_index, Operation, DEFAULT_MAX_TOKENS,
    DEFAULT_TEMPERATURE, MAX_TOKEN_PRESETS, TEMPERATURE_PRESETS,
};
use crate::speech::VoiceBridge;
use crate::transcript::Transcript;

/// Hint text shown in the empty prompt field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placeholder {
    #[default]
    Idle,
    Thinking,
    Communicating,
    WaitingForSpeech,
    Listening,
    Apology,
}

impl Placeholder {
    pub fn text(&self) -> &'static str {
        match self {
            Placeholder::Idle => "Ask me anything; pick an operation first.",
            Placeholder::Thinking => "Thinking...",
            Placeholder::Communicating => "Speaking...",
            Placeholder::WaitingForSpeech => "Waiting for speech to finish...",
            Placeholder::Listening => "Listening...",
            Placeholder::Apology => "The AI wandered off. Ask again, or pick another operation.",
        }
    }
}

/// Line appended to the transcript whenever listening starts.
pub const LISTENING_LINE: &str = "Listening...";

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub operation: Operation,
    pub show_options: bool,
    pub speech_enabled: bool,
    pub speech_language: String,
    /// Fixed values that win over the preset selectors.
    pub max_tokens_override: Option<u32>,
    pub temperature_override: Option<f32>,
    pub continuous_conversation: bool,
    pub auto_send: bool,
    pub auto_speak: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            operation: Operation::default(),
            show_options: true,
            speech_enabled: true,
            speech_language: "zh-CN".to_string(),
            max_tokens_override: None,
            temperature_override: None,
            continuous_conversation: true,
            auto_send: true,
            auto_speak: true,
        }
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            operation: Operation::default(),
            show_options: config.show_options,
            speech_enabled: config.enable_speech,
            speech_language: config.speech_language.clone(),
            max_tokens_override: config.max_tokens,
            temperature_override: config.temperature,
            // Listening again needs a recognizer
            continuous_conversation: config.continuous_conversation
                && config.listen_command.is_some(),
            auto_send: config.auto_send,
            auto_speak: config.auto_speak,
        }
    }
}

/// What has to happen after an outcome has been rendered.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TurnFollowUp {
    /// Text to read aloud.
    pub speak: Option<String>,
    /// Re-arm listening once read-aloud has finished.
    pub listen_again: bool,
}

pub struct Session {
    pub prompt: String,
    pub placeholder: Placeholder,
    pub operation: Operation,
    pub max_tokens_idx: usize,
    pub temperature_idx: usize,
    pub settings: SessionSettings,
    /// Mirrors the speech engine's busy flag for the microphone indicator.
    pub voice_busy: bool,
    transcript: Transcript,
    image: Option<String>,
}

impl Session {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            prompt: String::new(),
            placeholder: Placeholder::Idle,
            operation: settings.operation,
            max_tokens_idx: max_tokens_preset_index(DEFAULT_MAX_TOKENS),
            temperature_idx: temperature_preset_index(DEFAULT_TEMPERATURE),
            settings,
            voice_busy: false,
            transcript: Transcript::new(),
            image: None,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn max_tokens(&self) -> u32 {
        self.settings
            .max_tokens_override
            .unwrap_or(MAX_TOKEN_PRESETS[self.max_tokens_idx])
    }

    pub fn temperature(&self) -> f32 {
        self.settings
            .temperature_override
            .unwrap_or(TEMPERATURE_PRESETS[self.temperature_idx])
    }

    fn speaks(&self) -> bool {
        self.settings.speech_enabled && self.settings.auto_speak
    }

    fn converses(&self) -> bool {
        self.settings.speech_enabled && self.settings.continuous_conversation
    }

    /// Reads the prompt and opens a new turn. Blank input does nothing.
    pub fn begin_turn(&mut self) -> Option<TurnRequest> {
        if self.prompt.trim().is_empty() {
            return None;
        }

        let prompt = std::mem::take(&mut self.prompt);
        self.transcript.begin_turn(&prompt, &self.operation.label());
        self.placeholder = Placeholder::Thinking;
        self.image = None;

        Some(TurnRequest {
            operation: self.operation,
            prompt,
            max_tokens: self.max_tokens(),
            temperature: self.temperature(),
        })
    }

    /// Renders the outcome of the current turn.
    pub fn apply_outcome(&mut self, outcome: &Outcome) -> TurnFollowUp {
        let mut follow_up = TurnFollowUp::default();

        match outcome {
            Outcome::Text(text) => {
                self.transcript.push_answer(text);
                self.transcript.push_separator();
                if self.speaks() {
                    follow_up.speak = Some(text.clone());
                }
                follow_up.listen_again = self.converses();
            }
            Outcome::Image(reference) => {
                self.image = Some(reference.clone());
                self.transcript.push_separator();
                follow_up.listen_again = self.converses();
            }
            Outcome::Empty => {
                self.transcript.push_separator();
            }
            Outcome::Failure { .. } => {
                self.placeholder = Placeholder::Apology;
                if self.speaks() {
                    follow_up.speak = Some(Placeholder::Apology.text().to_string());
                }
                return follow_up;
            }
        }

        self.placeholder = if follow_up.speak.is_some() {
            Placeholder::Communicating
        } else {
            Placeholder::Idle
        };
        follow_up
    }

    /// Read-aloud has been handed to the engine.
    pub fn finish_speaking(&mut self) {
        if self.placeholder == Placeholder::Communicating {
            self.placeholder = Placeholder::Idle;
        }
    }

    pub fn begin_waiting_for_speech(&mut self) {
        self.placeholder = Placeholder::WaitingForSpeech;
    }

    pub fn begin_listening(&mut self) {
        self.placeholder = Placeholder::Listening;
        self.transcript.push_line(LISTENING_LINE);
    }

    /// Puts recognized speech into the prompt. Returns true when the prompt
    /// should be submitted automatically.
    pub fn on_recognized(&mut self, text: &str) -> bool {
        self.prompt = text.to_string();
        if self.placeholder == Placeholder::Listening {
            self.placeholder = Placeholder::Idle;
        }
        self.settings.auto_send
    }

    pub fn on_recognition_error(&mut self, message: &str) {
        self.transcript.push_error(message);
        if self.placeholder == Placeholder::Listening {
            self.placeholder = Placeholder::Idle;
        }
    }

    pub fn clear(&mut self) {
        self.prompt.clear();
        self.transcript.clear();
        self.image = None;
    }

    pub fn escape(&mut self) {
        self.prompt.clear();
    }

    pub fn select_operation(&mut self, operation: Operation) {
        self.operation = operation;
    }

    pub fn next_operation(&mut self) {
        self.operation = self.operation.next();
    }

    pub fn prev_operation(&mut self) {
        self.operation = self.operation.prev();
    }

    pub fn cycle_max_tokens(&mut self) {
        self.max_tokens_idx = (self.max_tokens_idx + 1) % MAX_TOKEN_PRESETS.len();
    }

    pub fn cycle_temperature(&mut self) {
        self.temperature_idx = (self.temperature_idx + 1) % TEMPERATURE_PRESETS.len();
    }

    pub fn toggle_continuous_conversation(&mut self) {
        self.settings.continuous_conversation = !self.settings.continuous_conversation;
    }

    pub fn toggle_auto_send(&mut self) {
        self.settings.auto_send = !self.settings.auto_send;
    }

    pub fn toggle_auto_speak(&mut self) {
        self.settings.auto_speak = !self.settings.auto_speak;
    }

    /// Runs one whole turn in order: dispatch, render, read aloud, and in
    /// continuous conversation wait for quiet and listen again.
    pub async fn run_turn(
        &mut self,
        dispatcher: &Dispatcher,
        voice: Option<&VoiceBridge>,
    ) -> Option<Outcome> {
        let request = self.begin_turn()?;
        let outcome = dispatcher.dispatch(&request).await;
        let follow_up = self.apply_outcome(&outcome);

        let Some(voice) = voice else {
            return Some(outcome);
        };
        let language = self.settings.speech_language.clone();

        if let Some(text) = follow_up.speak {
            if let Err(e) = voice.speak(&text, &language).await {
                warn!(error = %e, "read-aloud failed");
            }
            self.finish_speaking();
        }

        if follow_up.listen_again {
            self.begin_waiting_for_speech();
            voice.wait_until_quiet().await;
            self.begin_listening();
            if let Err(e) = voice.start_listening(&language).await {
                self.on_recognition_error(&e.to_string());
            }
        }

        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockAiService;
    use crate::speech::{MockSpeech, SpeechCall};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    fn quiet_settings() -> SessionSettings {
        SessionSettings {
            speech_enabled: false,
            ..SessionSettings::default()
        }
    }

    fn dispatcher(ai: MockAiService) -> Dispatcher {
        Dispatcher::new(Arc::new(ai))
    }

    #[tokio::test]
    async fn test_hello_turn() {
        let mut session = Session::new(quiet_settings());
        let dispatcher = dispatcher(MockAiService::replying(Some("hi there")));
        session.prompt = "hello".to_string();

        let outcome = session.run_turn(&dispatcher, None).await;

        assert_eq!(outcome, Some(Outcome::Text("hi there".to_string())));
        assert_eq!(
            session.transcript().lines(),
            vec!["Q: hello", "[ChatBasic]", "A: hi there", ""]
        );
        assert!(session.prompt.is_empty());
        assert!(session.image().is_none());
        assert_eq!(session.placeholder, Placeholder::Idle);
    }

    #[tokio::test]
    async fn test_blank_submit_is_a_no_op() {
        let ai = Arc::new(MockAiService::replying(Some("never")));
        let dispatcher = Dispatcher::new(ai.clone());
        let mut session = Session::new(quiet_settings());
        session.prompt = "  \t ".to_string();

        assert!(session.run_turn(&dispatcher, None).await.is_none());
        assert_eq!(session.prompt, "  \t ");
        assert!(session.transcript().is_empty());
        assert!(ai.calls().is_empty());
    }

    #[tokio::test]
    async fn test_twenty_one_turns_roll_over() {
        let mut session = Session::new(quiet_settings());
        let dispatcher = dispatcher(MockAiService::replying(Some("ok")));

        for i in 1..=21 {
            session.prompt = format!("question {}", i);
            session.run_turn(&dispatcher, None).await;
        }

        assert_eq!(
            session.transcript().lines(),
            vec!["Q: question 21", "[ChatBasic]", "A: ok", ""]
        );
    }

    #[test]
    fn test_begin_turn_sets_thinking_and_clears_image() {
        let mut session = Session::new(quiet_settings());
        session.prompt = "draw a cat".to_string();
        session.select_operation(Operation::ImageGeneration);
        session.begin_turn();
        session.apply_outcome(&Outcome::Image("https://img/1.png".to_string()));
        assert_eq!(session.image(), Some("https://img/1.png"));

        session.prompt = "draw a dog".to_string();
        let request = session.begin_turn().unwrap();

        assert_eq!(request.operation, Operation::ImageGeneration);
        assert_eq!(session.placeholder, Placeholder::Thinking);
        assert!(session.image().is_none());
        assert!(session.prompt.is_empty());
    }

    #[test]
    fn test_image_outcome_has_no_answer_line() {
        let mut session = Session::new(SessionSettings::default());
        session.prompt = "draw a cat".to_string();
        session.select_operation(Operation::ImageGeneration);
        session.begin_turn();

        let follow_up = session.apply_outcome(&Outcome::Image("data:image/jpg;base64,AAAA".to_string()));

        assert_eq!(session.image(), Some("data:image/jpg;base64,AAAA"));
        assert_eq!(session.transcript().lines(), vec!["Q: draw a cat", "[ImageGeneration]", ""]);
        assert!(!session.transcript().text().contains("A:"));
        assert!(follow_up.speak.is_none());
        assert!(follow_up.listen_again);
    }

    #[test]
    fn test_empty_outcome_only_adds_separator() {
        let mut session = Session::new(SessionSettings::default());
        session.prompt = "q".to_string();
        session.begin_turn();

        let follow_up = session.apply_outcome(&Outcome::Empty);

        assert_eq!(session.transcript().lines(), vec!["Q: q", "[ChatBasic]", ""]);
        assert_eq!(follow_up, TurnFollowUp::default());
    }

    #[tokio::test]
    async fn test_failure_speaks_apology() {
        let speech = Arc::new(MockSpeech::new());
        let voice = VoiceBridge::new(speech.clone());
        let mut session = Session::new(SessionSettings {
            continuous_conversation: false,
            ..SessionSettings::default()
        });
        let dispatcher = dispatcher(MockAiService::replying(None));
        session.prompt = "hello".to_string();

        let outcome = session.run_turn(&dispatcher, Some(&voice)).await.unwrap();

        assert!(outcome.is_failure());
        assert_eq!(session.placeholder, Placeholder::Apology);
        assert_eq!(speech.spoken(), vec![Placeholder::Apology.text().to_string()]);
        assert_eq!(session.transcript().lines(), vec!["Q: hello", "[ChatBasic]"]);
    }

    #[test]
    fn test_failure_without_auto_speak_stays_silent() {
        let mut session = Session::new(SessionSettings {
            auto_speak: false,
            ..SessionSettings::default()
        });
        session.prompt = "hello".to_string();
        session.begin_turn();

        let follow_up = session.apply_outcome(&Outcome::Failure { reason: "timeout".to_string() });

        assert_eq!(session.placeholder, Placeholder::Apology);
        assert!(follow_up.speak.is_none());
        assert!(!follow_up.listen_again);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_conversation_listens_after_speech_ends() {
        let speech = Arc::new(MockSpeech::new());
        speech.set_speaking_for_polls(2);
        let voice = VoiceBridge::new(speech.clone());
        let mut session = Session::new(SessionSettings::default());
        let dispatcher = dispatcher(MockAiService::replying(Some("hi there")));
        session.prompt = "hello".to_string();

        let start = Instant::now();
        session.run_turn(&dispatcher, Some(&voice)).await;

        assert_eq!(
            speech.calls(),
            vec![
                SpeechCall::Speak { text: "hi there".to_string(), language: "zh-CN".to_string() },
                SpeechCall::StartRecognition {
                    language: "zh-CN".to_string(),
                    options: Default::default(),
                },
            ]
        );
        assert_eq!(speech.speaking_checks().len(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
        assert_eq!(session.placeholder, Placeholder::Listening);
        assert_eq!(session.transcript().lines().last(), Some(&LISTENING_LINE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_listen_failure_becomes_transcript_error() {
        let speech = Arc::new(MockSpeech::new());
        speech.fail_recognition(true);
        let voice = VoiceBridge::new(speech);
        let mut session = Session::new(SessionSettings::default());
        let dispatcher = dispatcher(MockAiService::replying(Some("hi")));
        session.prompt = "hello".to_string();

        session.run_turn(&dispatcher, Some(&voice)).await;

        assert_eq!(
            session.transcript().lines().last(),
            Some(&"Error: microphone unavailable")
        );
        assert_eq!(session.placeholder, Placeholder::Idle);
    }

    #[test]
    fn test_recognized_text_fills_prompt() {
        let mut session = Session::new(SessionSettings::default());
        session.begin_listening();

        assert!(session.on_recognized("what time is it"));
        assert_eq!(session.prompt, "what time is it");
        assert_eq!(session.placeholder, Placeholder::Idle);

        session.toggle_auto_send();
        assert!(!session.on_recognized("again"));
    }

    #[test]
    fn test_recognition_error_is_logged_to_transcript() {
        let mut session = Session::new(SessionSettings::default());
        session.on_recognition_error("not-allowed");
        assert_eq!(session.transcript().lines(), vec!["Error: not-allowed"]);
    }

    #[test]
    fn test_clear_and_escape() {
        let mut session = Session::new(quiet_settings());
        session.prompt = "first".to_string();
        session.begin_turn();
        session.apply_outcome(&Outcome::Image("https://img/1.png".to_string()));
        session.prompt = "draft".to_string();

        session.escape();
        assert!(session.prompt.is_empty());
        assert!(!session.transcript().is_empty());
        assert!(session.image().is_some());

        session.prompt = "draft".to_string();
        session.clear();
        assert!(session.prompt.is_empty());
        assert!(session.transcript().is_empty());
        assert!(session.image().is_none());
    }

    #[test]
    fn test_overrides_win_over_presets() {
        let mut session = Session::new(quiet_settings());
        assert_eq!(session.max_tokens(), 500);
        assert_eq!(session.temperature(), 0.5);

        session.cycle_max_tokens();
        session.cycle_temperature();
        assert_eq!(session.max_tokens(), 2000);
        assert_eq!(session.temperature(), 0.6);

        session.settings.max_tokens_override = Some(42);
        session.settings.temperature_override = Some(0.0);
        session.prompt = "q".to_string();
        let request = session.begin_turn().unwrap();
        assert_eq!(request.max_tokens, 42);
        assert_eq!(request.temperature, 0.0);
    }

    #[test]
    fn test_default_config_without_recognizer_never_listens_again() {
        let mut session = Session::new(SessionSettings::from(&Config::new()));
        assert!(!session.settings.continuous_conversation);
        session.prompt = "q".to_string();
        session.begin_turn();

        let follow_up = session.apply_outcome(&Outcome::Text("a".to_string()));

        assert!(follow_up.speak.is_some());
        assert!(!follow_up.listen_again);

        let config = Config {
            listen_command: Some("whisper-listen {lang}".to_string()),
            ..Config::new()
        };
        assert!(SessionSettings::from(&config).continuous_conversation);
    }

    #[test]
    fn test_speech_disabled_never_speaks_or_listens() {
        let mut session = Session::new(quiet_settings());
        session.prompt = "q".to_string();
        session.begin_turn();
        let follow_up = session.apply_outcome(&Outcome::Text("a".to_string()));
        assert_eq!(follow_up, TurnFollowUp::default());
    }
}
