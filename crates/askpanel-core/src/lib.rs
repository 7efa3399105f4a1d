pub mod ai;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod operation;
pub mod session;
pub mod speech;
pub mod transcript;

// Re-export main types for convenience
pub use ai::{AiService, ChatRequest, MockAiService, OpenAIClient};
pub use config::Config;
pub use dispatcher::{Dispatcher, HttpProbe, Outcome, TurnRequest, UrlProbe};
pub use error::PanelError;
pub use operation::{Operation, MAX_TOKEN_PRESETS, TEMPERATURE_PRESETS};
pub use session::{Placeholder, Session, SessionSettings, TurnFollowUp};
pub use speech::{CommandSpeech, MockSpeech, RecognitionOptions, SpeechEngine, SpeechEvent, VoiceBridge};
pub use transcript::Transcript;
