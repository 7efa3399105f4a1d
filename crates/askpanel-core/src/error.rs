use thiserror::Error;

/// Failures surfaced by the panel. None of them end the session.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("no OpenAI API key: pass --api-key, set OPENAI_API_KEY, or add openai_api_key to the config file")]
    MissingApiKey,

    #[error("AI service error: {0}")]
    Remote(String),

    #[error("could not fetch generated image {url}: {source}")]
    ImageFetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("speech recognition failed: {0}")]
    Recognition(String),

    #[error("speech synthesis failed: {0}")]
    Speech(String),

    #[error("config error: {0}")]
    Config(String),
}
