use serde::{Deserialize, Serialize};

/// Max-length choices offered by the options bar.
pub const MAX_TOKEN_PRESETS: [u32; 11] = [5, 20, 100, 300, 500, 2000, 3000, 4000, 5000, 10000, 20000];
pub const DEFAULT_MAX_TOKENS: u32 = 500;

/// Randomness choices offered by the options bar.
pub const TEMPERATURE_PRESETS: [f32; 7] = [0.1, 0.2, 0.5, 0.6, 0.7, 0.8, 0.9];
pub const DEFAULT_TEMPERATURE: f32 = 0.5;

/// The kind of request a submission turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Operation {
    #[default]
    ChatBasic,
    ChatAdvanced,
    ChatAdvancedLarge,
    ChatHomeAssistant,
    RawCompletion,
    NaturalLanguageToSQL,
    Chatbot,
    ExtractInformation,
    ImageGeneration,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ChatBasic => "ChatBasic",
            Operation::ChatAdvanced => "ChatAdvanced",
            Operation::ChatAdvancedLarge => "ChatAdvancedLarge",
            Operation::ChatHomeAssistant => "ChatHomeAssistant",
            Operation::RawCompletion => "RawCompletion",
            Operation::NaturalLanguageToSQL => "NaturalLanguageToSQL",
            Operation::Chatbot => "Chatbot",
            Operation::ExtractInformation => "ExtractInformation",
            Operation::ImageGeneration => "ImageGeneration",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::all()
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s.trim()))
    }

    pub fn all() -> Vec<Operation> {
        vec![
            Operation::ChatBasic,
            Operation::ChatAdvanced,
            Operation::ChatAdvancedLarge,
            Operation::ChatHomeAssistant,
            Operation::RawCompletion,
            Operation::NaturalLanguageToSQL,
            Operation::Chatbot,
            Operation::ExtractInformation,
            Operation::ImageGeneration,
        ]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Operation::ChatBasic => "Chat (GPT-3.5)",
            Operation::ChatAdvanced => "Chat (GPT-4)",
            Operation::ChatAdvancedLarge => "Chat (GPT-4 32k)",
            Operation::ChatHomeAssistant => "Home Assistant",
            Operation::RawCompletion => "Completion",
            Operation::NaturalLanguageToSQL => "Text to SQL",
            Operation::Chatbot => "Chatbot",
            Operation::ExtractInformation => "Extract Information",
            Operation::ImageGeneration => "Image (DALL-E)",
        }
    }

    /// Transcript label written under each question, e.g. `[ChatBasic]`.
    pub fn label(&self) -> String {
        format!("[{}]", self.as_str())
    }

    /// Whether a successful result is displayed as an image instead of text.
    pub fn produces_image(&self) -> bool {
        matches!(self, Operation::ImageGeneration)
    }

    pub fn next(&self) -> Operation {
        let all = Self::all();
        let i = all.iter().position(|op| op == self).unwrap_or(0);
        all[(i + 1) % all.len()]
    }

    pub fn prev(&self) -> Operation {
        let all = Self::all();
        let i = all.iter().position(|op| op == self).unwrap_or(0);
        all[(i + all.len() - 1) % all.len()]
    }
}

/// Index of the preset closest to `value`, used to seed the selectors.
pub fn max_tokens_preset_index(value: u32) -> usize {
    MAX_TOKEN_PRESETS
        .iter()
        .enumerate()
        .min_by_key(|(_, &p)| p.abs_diff(value))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

pub fn temperature_preset_index(value: f32) -> usize {
    TEMPERATURE_PRESETS
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (*a - value).abs().total_cmp(&(*b - value).abs())
        })
        .map(|(i, _)| i)
        .unwrap_or(0)
}
