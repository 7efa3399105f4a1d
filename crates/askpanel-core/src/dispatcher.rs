//! Turns one submission into exactly one remote call and normalizes the reply.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::ai::{AiService, ChatRequest};
use crate::error::PanelError;
use crate::operation::Operation;

/// Prefix applied to inline base64 image data so it can be displayed as-is.
pub const IMAGE_DATA_PREFIX: &str = "data:image/jpg;base64,";

/// Everything the dispatcher needs for a single submission.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub operation: Operation,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// The normalized result of one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Text(String),
    /// An image URL or a `data:` URI.
    Image(String),
    Empty,
    Failure { reason: String },
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure { .. })
    }

    fn failure(reason: impl Into<String>) -> Self {
        Outcome::Failure { reason: reason.into() }
    }
}

/// Checks that a generated image URL is reachable before it is shown.
#[async_trait]
pub trait UrlProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<()>;
}

/// Issues a GET and drops the response without reading the body.
#[derive(Clone, Default)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UrlProbe for HttpProbe {
    async fn probe(&self, url: &str) -> Result<()> {
        let result = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(_response) => Ok(()),
            Err(source) => Err(PanelError::ImageFetch {
                url: url.to_string(),
                source,
            }
            .into()),
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    ai: Arc<dyn AiService>,
    probe: Option<Arc<dyn UrlProbe>>,
}

impl Dispatcher {
    pub fn new(ai: Arc<dyn AiService>) -> Self {
        Self { ai, probe: None }
    }

    /// Enables reachability checks on generated image URLs.
    pub fn with_probe(mut self, probe: Arc<dyn UrlProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub async fn dispatch(&self, request: &TurnRequest) -> Outcome {
        debug!(operation = request.operation.as_str(), "dispatching turn");

        let result = self.call(request).await;
        let outcome = match result {
            Err(e) => Outcome::failure(e.to_string()),
            Ok(None) => Outcome::failure("the AI service returned nothing"),
            Ok(Some(reply)) if reply.is_empty() => Outcome::Empty,
            Ok(Some(reply)) if request.operation.produces_image() => self.image_outcome(reply).await,
            Ok(Some(reply)) => Outcome::Text(reply),
        };

        if let Outcome::Failure { reason } = &outcome {
            warn!(operation = request.operation.as_str(), %reason, "turn failed");
        }
        outcome
    }

    async fn call(&self, request: &TurnRequest) -> Result<Option<String>> {
        let prompt = request.prompt.as_str();
        let chat = |model: Option<&str>, home_assistant: bool| ChatRequest {
            prompt: request.prompt.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            model: model.map(str::to_string),
            home_assistant,
        };

        match request.operation {
            Operation::ChatBasic => self.ai.chat(chat(None, false)).await,
            Operation::ChatAdvanced => self.ai.chat(chat(Some("gpt4"), false)).await,
            Operation::ChatAdvancedLarge => self.ai.chat(chat(Some("gpt4-32k"), false)).await,
            Operation::ChatHomeAssistant => self.ai.chat(chat(None, true)).await,
            Operation::RawCompletion => {
                self.ai
                    .completion(prompt, request.max_tokens, request.temperature)
                    .await
            }
            Operation::NaturalLanguageToSQL => self.ai.nl_to_sql(prompt).await,
            Operation::Chatbot => self.ai.chatbot(prompt).await,
            Operation::ExtractInformation => self.ai.extract(prompt).await,
            Operation::ImageGeneration => self.ai.generate_image(prompt, false).await,
        }
    }

    async fn image_outcome(&self, reply: String) -> Outcome {
        if !reply.starts_with("http") {
            return Outcome::Image(format!("{}{}", IMAGE_DATA_PREFIX, reply));
        }
        if let Some(probe) = &self.probe {
            if let Err(e) = probe.probe(&reply).await {
                return Outcome::failure(e.to_string());
            }
        }
        Outcome::Image(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AiCall, MockAiService};
    use anyhow::anyhow;
    use std::sync::Mutex;

    struct RecordingProbe {
        fail: bool,
        urls: Mutex<Vec<String>>,
    }

    impl RecordingProbe {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self { fail, urls: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl UrlProbe for RecordingProbe {
        async fn probe(&self, url: &str) -> Result<()> {
            self.urls.lock().unwrap().push(url.to_string());
            if self.fail {
                Err(anyhow!("connection refused"))
            } else {
                Ok(())
            }
        }
    }

    fn request(operation: Operation) -> TurnRequest {
        TurnRequest {
            operation,
            prompt: "hello".to_string(),
            max_tokens: 500,
            temperature: 0.5,
        }
    }

    async fn call_shape(operation: Operation) -> AiCall {
        let ai = Arc::new(MockAiService::replying(Some("ok")));
        Dispatcher::new(ai.clone()).dispatch(&request(operation)).await;
        let calls = ai.calls();
        assert_eq!(calls.len(), 1, "{:?} must issue exactly one call", operation);
        calls.into_iter().next().unwrap()
    }

    fn chat(model: Option<&str>, home_assistant: bool) -> AiCall {
        AiCall::Chat(ChatRequest {
            prompt: "hello".to_string(),
            max_tokens: 500,
            temperature: 0.5,
            model: model.map(str::to_string),
            home_assistant,
        })
    }

    #[tokio::test]
    async fn test_each_operation_maps_to_one_call_shape() {
        assert_eq!(call_shape(Operation::ChatBasic).await, chat(None, false));
        assert_eq!(call_shape(Operation::ChatAdvanced).await, chat(Some("gpt4"), false));
        assert_eq!(call_shape(Operation::ChatAdvancedLarge).await, chat(Some("gpt4-32k"), false));
        assert_eq!(call_shape(Operation::ChatHomeAssistant).await, chat(None, true));
        assert_eq!(
            call_shape(Operation::RawCompletion).await,
            AiCall::Completion { prompt: "hello".to_string(), max_tokens: 500, temperature: 0.5 }
        );
        assert_eq!(call_shape(Operation::NaturalLanguageToSQL).await, AiCall::NlToSql("hello".to_string()));
        assert_eq!(call_shape(Operation::Chatbot).await, AiCall::Chatbot("hello".to_string()));
        assert_eq!(call_shape(Operation::ExtractInformation).await, AiCall::Extract("hello".to_string()));
        assert_eq!(
            call_shape(Operation::ImageGeneration).await,
            AiCall::GenerateImage { prompt: "hello".to_string(), raw: false }
        );
    }

    #[tokio::test]
    async fn test_text_empty_and_failure_normalization() {
        let ai = Arc::new(MockAiService::replying(Some("hi there")));
        ai.push_reply(Some(""));
        ai.push_reply(None);
        ai.push_failure("503 Service Unavailable");
        let dispatcher = Dispatcher::new(ai);
        let req = request(Operation::ChatBasic);

        assert_eq!(dispatcher.dispatch(&req).await, Outcome::Empty);
        assert!(dispatcher.dispatch(&req).await.is_failure());
        match dispatcher.dispatch(&req).await {
            Outcome::Failure { reason } => assert!(reason.contains("503")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(dispatcher.dispatch(&req).await, Outcome::Text("hi there".to_string()));
    }

    #[tokio::test]
    async fn test_empty_image_reply_is_empty() {
        let ai = Arc::new(MockAiService::replying(Some("")));
        let outcome = Dispatcher::new(ai).dispatch(&request(Operation::ImageGeneration)).await;
        assert_eq!(outcome, Outcome::Empty);
    }

    #[tokio::test]
    async fn test_inline_image_gets_data_uri() {
        let ai = Arc::new(MockAiService::replying(Some("iVBORw0KGgo=")));
        let outcome = Dispatcher::new(ai).dispatch(&request(Operation::ImageGeneration)).await;
        assert_eq!(outcome, Outcome::Image("data:image/jpg;base64,iVBORw0KGgo=".to_string()));
    }

    #[tokio::test]
    async fn test_image_url_is_probed_and_used_directly() {
        let url = "https://images.example.com/cat.png";
        let ai = Arc::new(MockAiService::replying(Some(url)));
        let probe = RecordingProbe::new(false);
        let dispatcher = Dispatcher::new(ai).with_probe(probe.clone());

        let outcome = dispatcher.dispatch(&request(Operation::ImageGeneration)).await;

        assert_eq!(outcome, Outcome::Image(url.to_string()));
        assert_eq!(*probe.urls.lock().unwrap(), vec![url.to_string()]);
    }

    #[tokio::test]
    async fn test_unreachable_image_url_is_a_failure() {
        let ai = Arc::new(MockAiService::replying(Some("https://images.example.com/gone.png")));
        let dispatcher = Dispatcher::new(ai).with_probe(RecordingProbe::new(true));

        let outcome = dispatcher.dispatch(&request(Operation::ImageGeneration)).await;

        assert!(outcome.is_failure());
    }

    // Port 9 (discard) is closed on any normal machine, so the connect is refused.
    const UNREACHABLE_IMAGE: &str = "http://127.0.0.1:9/x.png";

    #[tokio::test]
    async fn test_http_probe_reports_image_fetch_error() {
        let err = HttpProbe::new().probe(UNREACHABLE_IMAGE).await.unwrap_err();

        match err.downcast_ref::<PanelError>() {
            Some(PanelError::ImageFetch { url, .. }) => assert_eq!(url, UNREACHABLE_IMAGE),
            other => panic!("expected ImageFetch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_image_with_http_probe_is_a_failure() {
        let ai = Arc::new(MockAiService::replying(Some(UNREACHABLE_IMAGE)));
        let dispatcher = Dispatcher::new(ai).with_probe(Arc::new(HttpProbe::new()));

        let outcome = dispatcher.dispatch(&request(Operation::ImageGeneration)).await;

        match outcome {
            Outcome::Failure { reason } => assert!(reason.contains(UNREACHABLE_IMAGE)),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_url_answer_from_chat_stays_text() {
        let ai = Arc::new(MockAiService::replying(Some("https://www.rust-lang.org")));
        let outcome = Dispatcher::new(ai).dispatch(&request(Operation::ChatBasic)).await;
        assert_eq!(outcome, Outcome::Text("https://www.rust-lang.org".to_string()));
    }
}
