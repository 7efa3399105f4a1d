//! Voice input and read-aloud.
//!
//! A [`SpeechEngine`] does the actual recognition and synthesis. Results of a
//! recognition arrive later as [`SpeechEvent`]s on the channel the engine was
//! built with. [`VoiceBridge`] holds the timing rules the panel relies on.

pub mod command;
pub mod mock;

pub use command::CommandSpeech;
pub use mock::{MockSpeech, SpeechCall};

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

/// How often the speaking flag is re-checked while waiting for read-aloud to end.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Pause between a recognition result and the automatic submit.
pub const AUTO_SEND_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Result(String),
    Error(String),
    BusyChanged(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecognitionOptions {
    pub continuous: bool,
    pub interim_results: bool,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            continuous: false,
            interim_results: true,
        }
    }
}

#[async_trait]
pub trait SpeechEngine: Send + Sync {
    async fn start_recognition(&self, language: &str, options: RecognitionOptions) -> Result<()>;

    async fn stop_recognition(&self) -> Result<()>;

    /// Starts reading `text` aloud and returns without waiting for it to finish.
    async fn speak(&self, text: &str, language: &str) -> Result<()>;

    async fn stop_speaking(&self) -> Result<()>;

    /// True while recognizing or speaking.
    async fn is_busy(&self) -> bool;

    async fn is_speaking(&self) -> bool;

    /// Whether this engine has a recognizer at all.
    fn can_listen(&self) -> bool {
        true
    }
}

#[derive(Clone)]
pub struct VoiceBridge {
    engine: Arc<dyn SpeechEngine>,
    options: RecognitionOptions,
}

impl VoiceBridge {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        Self {
            engine,
            options: RecognitionOptions::default(),
        }
    }

    pub async fn start_listening(&self, language: &str) -> Result<()> {
        debug!(language, "starting recognition");
        self.engine.start_recognition(language, self.options).await
    }

    /// Microphone off: stops recognition and any read-aloud in progress.
    pub async fn stop(&self) -> Result<()> {
        self.engine.stop_recognition().await?;
        self.engine.stop_speaking().await
    }

    pub async fn speak(&self, text: &str, language: &str) -> Result<()> {
        debug!(language, chars = text.chars().count(), "speaking");
        self.engine.speak(text, language).await
    }

    /// Sleeps one interval, then keeps polling until the engine stops
    /// speaking. Returns the number of polls made.
    pub async fn wait_until_quiet(&self) -> u32 {
        let mut polls = 0;
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            polls += 1;
            if !self.engine.is_speaking().await {
                return polls;
            }
        }
    }

    /// Waits briefly after a recognition result; true when the recognizer
    /// has gone idle and the prompt may be submitted.
    pub async fn ready_for_auto_send(&self) -> bool {
        tokio::time::sleep(AUTO_SEND_DELAY).await;
        !self.engine.is_busy().await
    }

    pub async fn is_busy(&self) -> bool {
        self.engine.is_busy().await
    }

    pub fn can_listen(&self) -> bool {
        self.engine.can_listen()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_quiet_polls_every_two_seconds() {
        let engine = Arc::new(MockSpeech::new());
        engine.set_speaking_for_polls(2);
        let bridge = VoiceBridge::new(engine.clone());

        let start = Instant::now();
        let polls = bridge.wait_until_quiet().await;

        assert_eq!(polls, 3);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
        let offsets: Vec<_> = engine
            .speaking_checks()
            .into_iter()
            .map(|at| at.duration_since(start))
            .collect();
        assert_eq!(
            offsets,
            vec![Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(6)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_quiet_always_waits_one_interval() {
        let bridge = VoiceBridge::new(Arc::new(MockSpeech::new()));
        let start = Instant::now();
        assert_eq!(bridge.wait_until_quiet().await, 1);
        assert_eq!(start.elapsed(), POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_send_waits_for_idle_recognizer() {
        let engine = Arc::new(MockSpeech::new());
        let bridge = VoiceBridge::new(engine.clone());

        engine.set_busy(true);
        assert!(!bridge.ready_for_auto_send().await);

        engine.set_busy(false);
        let start = Instant::now();
        assert!(bridge.ready_for_auto_send().await);
        assert_eq!(start.elapsed(), AUTO_SEND_DELAY);
    }

    #[tokio::test]
    async fn test_listening_uses_language_and_default_options() {
        let engine = Arc::new(MockSpeech::new());
        let bridge = VoiceBridge::new(engine.clone());

        bridge.start_listening("zh-CN").await.unwrap();
        bridge.stop().await.unwrap();

        assert_eq!(
            engine.calls(),
            vec![
                SpeechCall::StartRecognition {
                    language: "zh-CN".to_string(),
                    options: RecognitionOptions { continuous: false, interim_results: true },
                },
                SpeechCall::StopRecognition,
                SpeechCall::StopSpeaking,
            ]
        );
    }
}
