use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Completion, PromptContext, Provider, Usage};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_openai_context_length_error, messages_to_openai_spec, openai_response_to_completion,
    openai_usage, tools_to_openai_spec,
};

/// Chat completions over any OpenAI-compatible API (Groq, OpenAI, Ollama)
pub struct OpenAiCompatibleProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        // The executor enforces the per-turn timeout, this only guards against stuck sockets
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;

        Ok(Self { client, config })
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let mut request = self.client.post(&url).json(&payload);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }
        let response = request.send().await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                if let Some(err) = body.get("error").and_then(check_openai_context_length_error) {
                    return Err(err.into());
                }
                Err(anyhow!("Request failed: {}\nResponse: {}", status, body))
            }
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, context: &PromptContext) -> Result<(Completion, Usage)> {
        let mut messages = vec![json!({
            "role": "system",
            "content": context.system,
        })];
        messages.extend(messages_to_openai_spec(&context.messages, &context.agent));

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages,
        });

        let tools_spec = tools_to_openai_spec(&context.tools)?;
        if !tools_spec.is_empty() {
            payload["tools"] = json!(tools_spec);
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }
        if let Some(tokens) = self.config.max_tokens {
            payload["max_tokens"] = json!(tokens);
        }

        let response = self.post(payload).await?;

        if let Some(error) = response.get("error") {
            if let Some(err) = check_openai_context_length_error(error) {
                return Err(err.into());
            }
            return Err(anyhow!("API error: {}", error));
        }

        let completion = openai_response_to_completion(&response)?;
        Ok((completion, openai_usage(&response)))
    }
}
