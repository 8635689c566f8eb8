use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum_macros::{Display, EnumString};

use crate::crew::ModelTier;
use crate::errors::{to_env_var, ConfigError};
use crate::providers::configs::OpenAiProviderConfig;
use crate::providers::factory::ProviderType;
use crate::tools::search::{DEFAULT_MAX_RESULTS, TAVILY_HOST};

/// Read from the working directory when no explicit file is given
pub const DEFAULT_CONFIG_FILE: &str = "tripcrew.toml";

const ENV_PREFIX: &str = "TRIPCREW";
const GROQ_API_KEY: &str = "GROQ_API_KEY";
const TAVILY_API_KEY: &str = "TAVILY_API_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    #[serde(rename = "type", default = "default_provider_type")]
    pub provider_type: ProviderType,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Overrides the provider type's default endpoint
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_primary_model")]
    pub primary_model: String,
    #[serde(default = "default_secondary_model")]
    pub secondary_model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
}

impl ProviderSettings {
    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.provider_type.default_base_url().to_string())
    }

    pub fn model(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Primary => &self.primary_model,
            ModelTier::Secondary => &self.secondary_model,
        }
    }

    pub fn config_for(&self, tier: ModelTier) -> OpenAiProviderConfig {
        OpenAiProviderConfig {
            base_url: self.base_url(),
            api_key: self.api_key.clone(),
            model: self.model(tier).to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// A decision backend picks each speaker, falling back to the phase rotation
    Auto,
    /// The fixed phase rotation
    Rotation,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationSettings {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default = "default_selection")]
    pub selection: SelectionMode,
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls_per_turn: usize,
}

impl ConversationSettings {
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            selection: default_selection(),
            context_messages: default_context_messages(),
            turn_timeout_secs: default_turn_timeout_secs(),
            max_tool_calls_per_turn: default_max_tool_calls(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    /// Without a key, search runs in degraded mode
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_search_url")]
    pub base_url: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_search_url(),
            max_results: default_max_results(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl CacheSettings {
    pub fn dir(&self) -> Option<PathBuf> {
        self.dir
            .clone()
            .or_else(|| crate::providers::cache::CachedProvider::default_dir(self.seed))
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            seed: default_seed(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub provider: ProviderSettings,
    #[serde(default)]
    pub conversation: ConversationSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub cache: CacheSettings,
}

impl Settings {
    /// Load from `tripcrew.toml` (if present) and the environment
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Layered: built-in defaults, then the config file, then `TRIPCREW_*` variables.
    /// `GROQ_API_KEY` and `TAVILY_API_KEY` fill in keys that are not set otherwise.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut builder = Config::builder()
            .set_default("provider.type", default_provider_type().to_string())?
            .set_default("provider.primary_model", default_primary_model())?
            .set_default("provider.secondary_model", default_secondary_model())?;

        if let Ok(key) = env::var(GROQ_API_KEY) {
            builder = builder.set_default("provider.api_key", key)?;
        }
        if let Ok(key) = env::var(TAVILY_API_KEY) {
            builder = builder.set_default("search.api_key", key)?;
        }

        builder = match config_file {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::from(Path::new(DEFAULT_CONFIG_FILE)).required(false)),
        };

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = match config.try_deserialize() {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    return Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    });
                } else if let config::ConfigError::NotFound(field) = &err {
                    return Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    });
                }
                return Err(ConfigError::Other(err));
            }
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.provider_type.requires_api_key() && self.provider.api_key.is_none() {
            return Err(ConfigError::MissingEnvVar {
                env_var: to_env_var("provider.api_key"),
            });
        }
        Ok(())
    }
}

fn default_provider_type() -> ProviderType {
    ProviderType::Groq
}

fn default_primary_model() -> String {
    "llama3-70b-8192".to_string()
}

fn default_secondary_model() -> String {
    "llama3-8b-8192".to_string()
}

fn default_max_rounds() -> usize {
    crate::conversation::DEFAULT_MAX_ROUNDS
}

fn default_selection() -> SelectionMode {
    SelectionMode::Auto
}

fn default_context_messages() -> usize {
    crate::executor::DEFAULT_CONTEXT_MESSAGES
}

fn default_turn_timeout_secs() -> u64 {
    crate::agent::DEFAULT_TURN_TIMEOUT.as_secs()
}

fn default_max_tool_calls() -> usize {
    crate::executor::DEFAULT_MAX_TOOL_CALLS
}

fn default_search_url() -> String {
    TAVILY_HOST.to_string()
}

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

fn default_cache_enabled() -> bool {
    true
}

fn default_seed() -> u64 {
    42
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("TRIPCREW_") || key == GROQ_API_KEY || key == TAVILY_API_KEY {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        env::set_var("TRIPCREW_PROVIDER__API_KEY", "test-key");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.provider.provider_type, ProviderType::Groq);
        assert_eq!(settings.provider.api_key.as_deref(), Some("test-key"));
        assert_eq!(settings.provider.base_url(), "https://api.groq.com/openai/v1");
        assert_eq!(settings.provider.primary_model, "llama3-70b-8192");
        assert_eq!(settings.provider.secondary_model, "llama3-8b-8192");
        assert_eq!(settings.conversation.max_rounds, 35);
        assert_eq!(settings.conversation.selection, SelectionMode::Auto);
        assert_eq!(settings.conversation.turn_timeout(), Duration::from_secs(60));
        assert_eq!(settings.search.api_key, None);
        assert_eq!(settings.search.max_results, 3);
        assert_eq!(settings.cache.seed, 42);

        clean_env();
    }

    #[test]
    #[serial]
    fn test_fallback_keys() {
        clean_env();
        env::set_var(GROQ_API_KEY, "groq-key");
        env::set_var(TAVILY_API_KEY, "tavily-key");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.provider.api_key.as_deref(), Some("groq-key"));
        assert_eq!(settings.search.api_key.as_deref(), Some("tavily-key"));

        // the prefixed variable wins over the fallback
        env::set_var("TRIPCREW_PROVIDER__API_KEY", "explicit");
        let settings = Settings::new().unwrap();
        assert_eq!(settings.provider.api_key.as_deref(), Some("explicit"));

        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_api_key() {
        clean_env();
        match Settings::new() {
            Err(ConfigError::MissingEnvVar { env_var }) => {
                assert_eq!(env_var, "TRIPCREW_PROVIDER__API_KEY")
            }
            other => panic!("expected missing key error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    #[serial]
    fn test_ollama_needs_no_key() {
        clean_env();
        env::set_var("TRIPCREW_PROVIDER__TYPE", "ollama");
        env::set_var("TRIPCREW_CONVERSATION__SELECTION", "rotation");
        env::set_var("TRIPCREW_CONVERSATION__MAX_ROUNDS", "12");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.provider.provider_type, ProviderType::Ollama);
        assert_eq!(settings.provider.base_url(), "http://localhost:11434/v1");
        assert_eq!(settings.conversation.selection, SelectionMode::Rotation);
        assert_eq!(settings.conversation.max_rounds, 12);

        let config = settings.provider.config_for(ModelTier::Secondary);
        assert_eq!(config.model, "llama3-8b-8192");
        assert_eq!(config.api_key, None);

        clean_env();
    }

    #[test]
    #[serial]
    fn test_config_file_layer() {
        clean_env();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[provider]
type = "openai"
api_key = "from-file"
primary_model = "gpt-4o"

[cache]
enabled = false
seed = 7
"#
        )
        .unwrap();
        env::set_var("TRIPCREW_PROVIDER__PRIMARY_MODEL", "gpt-4o-mini");

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.provider.provider_type, ProviderType::OpenAi);
        assert_eq!(settings.provider.api_key.as_deref(), Some("from-file"));
        assert_eq!(settings.provider.primary_model, "gpt-4o-mini");
        assert!(!settings.cache.enabled);
        assert_eq!(settings.cache.seed, 7);

        clean_env();
    }
}
