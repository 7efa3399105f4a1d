use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use super::{AiService, ChatRequest};
use crate::error::PanelError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

const CHAT_MODEL: &str = "gpt-3.5-turbo";
const COMPLETION_MODEL: &str = "gpt-3.5-turbo-instruct";

const HOME_ASSISTANT_PROMPT: &str = "You are a smart home assistant. Answer briefly and conversationally. \
When the user asks to control a device, confirm the device, the room, and the action you would take.";

const SQL_PROMPT: &str = "### Postgres SQL tables, with their properties:\n\
#\n\
# Employee(id, name, department_id)\n\
# Department(id, name, address)\n\
# Salary_Payments(id, employee_id, amount, date)\n\
#\n\
### A query to answer: ";

const CHATBOT_PROMPT: &str = "The following is a conversation with an AI assistant. \
The assistant is helpful, creative, clever, and very friendly.\n\nHuman: ";

const EXTRACT_PROMPT: &str = "Extract the important entities mentioned in the text below. \
First extract all company names, then extract all people names, then extract specific topics \
which fit the content and finally extract general overarching themes.\n\n\
Desired format:\nCompany names: <comma_separated_list_of_company_names>\n\
People names: -||-\nSpecific topics: -||-\nGeneral themes: -||-\n\nText: ";

#[derive(Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAIChatChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChatChoice>,
}

#[derive(Serialize)]
struct OpenAICompletionRequest {
    model: String,
    prompt: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Deserialize)]
struct OpenAICompletionChoice {
    text: String,
}

#[derive(Deserialize)]
struct OpenAICompletionResponse {
    choices: Vec<OpenAICompletionChoice>,
}

#[derive(Serialize)]
struct OpenAIImageRequest {
    prompt: String,
    n: u32,
    size: String,
    response_format: String,
}

#[derive(Deserialize)]
struct OpenAIImageData {
    url: Option<String>,
    b64_json: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIImageResponse {
    data: Vec<OpenAIImageData>,
}

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAIClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Maps the panel's model tags onto API model ids.
    pub fn resolve_model(tag: Option<&str>) -> String {
        match tag {
            None => CHAT_MODEL.to_string(),
            Some("gpt4") => "gpt-4".to_string(),
            Some("gpt4-32k") => "gpt-4-32k".to_string(),
            Some(other) => other.to_string(),
        }
    }

    async fn post<T: Serialize, R: DeserializeOwned>(&self, path: &str, body: &T) -> Result<R> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "openai request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(PanelError::Remote(format!("{}: {}", status, text)).into());
        }

        Ok(response.json().await?)
    }

    async fn complete(
        &self,
        prompt: String,
        max_tokens: u32,
        temperature: f32,
        stop: &[&str],
    ) -> Result<Option<String>> {
        let request = OpenAICompletionRequest {
            model: COMPLETION_MODEL.to_string(),
            prompt,
            max_tokens,
            temperature,
            stop: stop.iter().map(|s| s.to_string()).collect(),
        };

        let response: OpenAICompletionResponse = self.post("/v1/completions", &request).await?;
        Ok(response.choices.first().map(|c| c.text.trim().to_string()))
    }
}

#[async_trait]
impl AiService for OpenAIClient {
    async fn chat(&self, request: ChatRequest) -> Result<Option<String>> {
        let mut messages = Vec::new();
        if request.home_assistant {
            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: HOME_ASSISTANT_PROMPT.to_string(),
            });
        }
        messages.push(OpenAIMessage {
            role: "user".to_string(),
            content: request.prompt,
        });

        let body = OpenAIChatRequest {
            model: Self::resolve_model(request.model.as_deref()),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response: OpenAIChatResponse = self.post("/v1/chat/completions", &body).await?;
        Ok(response.choices.into_iter().next().and_then(|c| c.message.content))
    }

    async fn completion(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<Option<String>> {
        self.complete(prompt.to_string(), max_tokens, temperature, &[]).await
    }

    async fn nl_to_sql(&self, prompt: &str) -> Result<Option<String>> {
        let prompt = format!("{}{}\nSELECT", SQL_PROMPT, prompt);
        let sql = self.complete(prompt, 150, 0.0, &["#", ";"]).await?;
        Ok(sql.map(|body| format!("SELECT {}", body)))
    }

    async fn chatbot(&self, prompt: &str) -> Result<Option<String>> {
        let prompt = format!("{}{}\nAI:", CHATBOT_PROMPT, prompt);
        self.complete(prompt, 150, 0.9, &[" Human:", " AI:"]).await
    }

    async fn extract(&self, prompt: &str) -> Result<Option<String>> {
        let prompt = format!("{}{}", EXTRACT_PROMPT, prompt);
        self.complete(prompt, 256, 0.0, &[]).await
    }

    async fn generate_image(&self, prompt: &str, raw: bool) -> Result<Option<String>> {
        let request = OpenAIImageRequest {
            prompt: prompt.to_string(),
            n: 1,
            size: "512x512".to_string(),
            response_format: if raw { "b64_json" } else { "url" }.to_string(),
        };

        let response: OpenAIImageResponse = self.post("/v1/images/generations", &request).await?;
        Ok(response
            .data
            .into_iter()
            .next()
            .and_then(|d| if raw { d.b64_json } else { d.url.or(d.b64_json) }))
    }
}
