//! Scripted [`AiService`] for tests and offline runs.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{AiService, ChatRequest};

/// One recorded call, in the shape it reached the service.
#[derive(Debug, Clone, PartialEq)]
pub enum AiCall {
    Chat(ChatRequest),
    Completion { prompt: String, max_tokens: u32, temperature: f32 },
    NlToSql(String),
    Chatbot(String),
    Extract(String),
    GenerateImage { prompt: String, raw: bool },
}

type Reply = std::result::Result<Option<String>, String>;

/// Replies are consumed in order; once the queue is empty the fallback is used.
pub struct MockAiService {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: Mutex<Vec<AiCall>>,
}

impl MockAiService {
    pub fn replying(text: Option<&str>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Ok(text.map(str::to_string)),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push_reply(&self, text: Option<&str>) {
        self.lock_replies().push_back(Ok(text.map(str::to_string)));
    }

    pub fn push_failure(&self, message: &str) {
        self.lock_replies().push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> Vec<AiCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<Reply>> {
        self.replies.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: AiCall) -> Result<Option<String>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        let reply = self.lock_replies().pop_front().unwrap_or_else(|| self.fallback.clone());
        reply.map_err(|message| anyhow!(message))
    }
}

#[async_trait]
impl AiService for MockAiService {
    async fn chat(&self, request: ChatRequest) -> Result<Option<String>> {
        self.record(AiCall::Chat(request))
    }

    async fn completion(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<Option<String>> {
        self.record(AiCall::Completion {
            prompt: prompt.to_string(),
            max_tokens,
            temperature,
        })
    }

    async fn nl_to_sql(&self, prompt: &str) -> Result<Option<String>> {
        self.record(AiCall::NlToSql(prompt.to_string()))
    }

    async fn chatbot(&self, prompt: &str) -> Result<Option<String>> {
        self.record(AiCall::Chatbot(prompt.to_string()))
    }

    async fn extract(&self, prompt: &str) -> Result<Option<String>> {
        self.record(AiCall::Extract(prompt.to_string()))
    }

    async fn generate_image(&self, prompt: &str, raw: bool) -> Result<Option<String>> {
        self.record(AiCall::GenerateImage {
            prompt: prompt.to_string(),
            raw,
        })
    }
}
