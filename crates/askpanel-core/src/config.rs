use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

use crate::error::PanelError;
use crate::speech::command::default_speak_command;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub base_url: Option<String>,
    pub show_options: bool,
    pub enable_speech: bool,
    pub speech_language: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub continuous_conversation: bool,
    pub auto_send: bool,
    pub auto_speak: bool,
    pub probe_image_urls: bool,
    pub speak_command: String,
    pub listen_command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            openai_api_key: None,
            base_url: None,
            show_options: true,
            enable_speech: true,
            speech_language: "zh-CN".to_string(),
            max_tokens: None,
            temperature: None,
            continuous_conversation: true,
            auto_send: true,
            auto_speak: true,
            probe_image_urls: true,
            speak_command: default_speak_command(),
            listen_command: None,
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| PanelError::Config(format!("{}: {}", config_path.display(), e)))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    /// Picks the API key: explicit override, then `OPENAI_API_KEY`, then the file.
    pub fn resolve_api_key(&self, explicit: Option<&str>) -> Result<String, PanelError> {
        Self::pick_api_key(
            explicit,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
            self.openai_api_key.as_deref(),
        )
    }

    fn pick_api_key(
        explicit: Option<&str>,
        env: Option<&str>,
        file: Option<&str>,
    ) -> Result<String, PanelError> {
        [explicit, env, file]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|key| !key.is_empty())
            .map(str::to_string)
            .ok_or(PanelError::MissingApiKey)
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("askpanel").join("config.json"))
    }
}
