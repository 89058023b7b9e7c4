use crate::config::ModelsConfig;
use crate::inference::LlmModel;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const CHATGPT_BASE_URL: &str = "https://api.openai.com";
pub const MISTRAL_BASE_URL: &str = "https://api.mistral.ai";
pub const ALBERT_BASE_URL: &str = "https://albert.api.etalab.gouv.fr";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmFamily {
    ChatGpt,
    Mistral,
    Albert,
}

impl fmt::Display for LlmFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmFamily::ChatGpt => write!(f, "chatgpt"),
            LlmFamily::Mistral => write!(f, "mistral"),
            LlmFamily::Albert => write!(f, "albert"),
        }
    }
}

impl LlmFamily {
    pub fn from_base_url(base_url: &str) -> Option<Self> {
        match base_url {
            CHATGPT_BASE_URL => Some(LlmFamily::ChatGpt),
            MISTRAL_BASE_URL => Some(LlmFamily::Mistral),
            ALBERT_BASE_URL => Some(LlmFamily::Albert),
            _ => None,
        }
    }
}

/// The generation models the gateway may hand to the inference API
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    chatgpt: LlmModel,
    mistral: LlmModel,
    albert: LlmModel,
}

impl ModelCatalog {
    pub fn from_config(config: &ModelsConfig) -> Self {
        let model = |base_url: &str, name: &str, api_key: &str| LlmModel {
            base_url: base_url.to_string(),
            name: name.to_string(),
            api_key: api_key.to_string(),
        };

        Self {
            chatgpt: model(CHATGPT_BASE_URL, &config.chatgpt_name, &config.chatgpt_api_key),
            mistral: model(MISTRAL_BASE_URL, &config.mistral_name, &config.mistral_api_key),
            albert: model(ALBERT_BASE_URL, &config.albert_name, &config.albert_api_key),
        }
    }

    /// Model used when the client does not pin one. Mistral is the only one in rotation.
    pub fn default_model(&self) -> &LlmModel {
        &self.mistral
    }

    /// Model used by the legacy reformulation step
    pub fn reformulation_model(&self) -> &LlmModel {
        &self.albert
    }

    pub fn by_name(&self, name: &str) -> Option<&LlmModel> {
        if name.is_empty() {
            return None;
        }
        self.all().into_iter().find(|model| model.name == name)
    }

    pub fn family(model: &LlmModel) -> Option<LlmFamily> {
        LlmFamily::from_base_url(&model.base_url)
    }

    fn all(&self) -> [&LlmModel; 3] {
        [&self.chatgpt, &self.mistral, &self.albert]
    }
}
