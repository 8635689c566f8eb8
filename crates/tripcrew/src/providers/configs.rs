use serde::{Deserialize, Serialize};

/// Connection settings for an OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiProviderConfig {
    /// Base url up to and including the api version, e.g. `https://api.groq.com/openai/v1`
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}
