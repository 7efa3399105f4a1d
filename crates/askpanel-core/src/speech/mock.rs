//! Scripted [`SpeechEngine`] for tests.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::time::Instant;

use super::{RecognitionOptions, SpeechEngine};

#[derive(Debug, Clone, PartialEq)]
pub enum SpeechCall {
    StartRecognition { language: String, options: RecognitionOptions },
    StopRecognition,
    Speak { text: String, language: String },
    StopSpeaking,
}

#[derive(Default)]
pub struct MockSpeech {
    calls: Mutex<Vec<SpeechCall>>,
    busy: AtomicBool,
    speaking_polls: AtomicU32,
    speaking_checks: Mutex<Vec<Instant>>,
    fail_recognition: AtomicBool,
    no_recognizer: AtomicBool,
}

impl MockSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    /// `is_speaking` answers true for the next `polls` checks, then false.
    pub fn set_speaking_for_polls(&self, polls: u32) {
        self.speaking_polls.store(polls, Ordering::SeqCst);
    }

    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }

    pub fn fail_recognition(&self, fail: bool) {
        self.fail_recognition.store(fail, Ordering::SeqCst);
    }

    /// Behave like an engine with synthesis only.
    pub fn without_recognizer(self) -> Self {
        self.no_recognizer.store(true, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<SpeechCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SpeechCall::Speak { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// When each `is_speaking` check happened.
    pub fn speaking_checks(&self) -> Vec<Instant> {
        self.speaking_checks.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: SpeechCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl SpeechEngine for MockSpeech {
    async fn start_recognition(&self, language: &str, options: RecognitionOptions) -> Result<()> {
        self.record(SpeechCall::StartRecognition {
            language: language.to_string(),
            options,
        });
        if self.fail_recognition.load(Ordering::SeqCst) {
            return Err(anyhow!("microphone unavailable"));
        }
        Ok(())
    }

    async fn stop_recognition(&self) -> Result<()> {
        self.record(SpeechCall::StopRecognition);
        Ok(())
    }

    async fn speak(&self, text: &str, language: &str) -> Result<()> {
        self.record(SpeechCall::Speak {
            text: text.to_string(),
            language: language.to_string(),
        });
        Ok(())
    }

    async fn stop_speaking(&self) -> Result<()> {
        self.record(SpeechCall::StopSpeaking);
        Ok(())
    }

    async fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    async fn is_speaking(&self) -> bool {
        if let Ok(mut checks) = self.speaking_checks.lock() {
            checks.push(Instant::now());
        }
        self.speaking_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn can_listen(&self) -> bool {
        !self.no_recognizer.load(Ordering::SeqCst)
    }
}
