use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum_macros::{Display, EnumIter, EnumString};

use super::{base::Provider, configs::OpenAiProviderConfig, openai::OpenAiCompatibleProvider};

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

#[derive(EnumIter, EnumString, Display, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Groq,
    OpenAi,
    Ollama,
}

impl ProviderType {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderType::Groq => GROQ_BASE_URL,
            ProviderType::OpenAi => OPENAI_BASE_URL,
            ProviderType::Ollama => OLLAMA_BASE_URL,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderType::Ollama)
    }
}

pub fn get_provider(
    provider_type: ProviderType,
    config: OpenAiProviderConfig,
) -> Result<Arc<dyn Provider>> {
    if provider_type.requires_api_key() && config.api_key.is_none() {
        bail!("{} requires an api key", provider_type);
    }
    Ok(Arc::new(OpenAiCompatibleProvider::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    fn config(api_key: Option<&str>) -> OpenAiProviderConfig {
        OpenAiProviderConfig {
            base_url: GROQ_BASE_URL.to_string(),
            api_key: api_key.map(String::from),
            model: "llama3-8b-8192".to_string(),
            temperature: None,
            max_tokens: None,
        }
    }

    #[test]
    fn test_provider_type_names() {
        assert_eq!(ProviderType::OpenAi.to_string(), "openai");
        assert_eq!(ProviderType::from_str("Groq").unwrap(), ProviderType::Groq);
        assert_eq!(ProviderType::iter().count(), 3);
    }

    #[test]
    fn test_get_provider_requires_key() {
        assert!(get_provider(ProviderType::Groq, config(None)).is_err());
        let provider = get_provider(ProviderType::Groq, config(Some("k"))).unwrap();
        assert_eq!(provider.model(), "llama3-8b-8192");
        assert!(get_provider(ProviderType::Ollama, config(None)).is_ok());
    }
}
