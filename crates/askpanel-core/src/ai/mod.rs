//! Remote AI capability used by the dispatcher.
//!
//! Every call may succeed with text, succeed with nothing (`None`), or fail.
//! The dispatcher decides what each of those means for the panel.

pub mod mock;
pub mod openai;

pub use mock::{AiCall, MockAiService};
pub use openai::OpenAIClient;

use anyhow::Result;
use async_trait::async_trait;

/// Parameters of a chat call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Model tag such as `gpt4` or `gpt4-32k`; `None` uses the client default.
    pub model: Option<String>,
    pub home_assistant: bool,
}

#[async_trait]
pub trait AiService: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<Option<String>>;

    async fn completion(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<Option<String>>;

    async fn nl_to_sql(&self, prompt: &str) -> Result<Option<String>>;

    async fn chatbot(&self, prompt: &str) -> Result<Option<String>>;

    async fn extract(&self, prompt: &str) -> Result<Option<String>>;

    /// Returns an image URL, or base64 image data when `raw` is set.
    async fn generate_image(&self, prompt: &str, raw: bool) -> Result<Option<String>>;
}
