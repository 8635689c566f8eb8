use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::tool::{Tool, ToolCall};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// Everything a backend needs to produce the next turn for one agent
#[derive(Debug, Clone, Serialize)]
pub struct PromptContext {
    /// The agent being prompted; its own turns are rendered as assistant turns
    pub agent: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<Tool>,
}

/// What a backend returned: narration, a tool request, or both
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub tool_call: Option<ToolCall>,
}

impl Completion {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            content: text.into(),
            tool_call: None,
        }
    }

    pub fn tool_call(tool_call: ToolCall) -> Self {
        Self {
            content: String::new(),
            tool_call: Some(tool_call),
        }
    }

    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.content = text.into();
        self
    }
}

/// Base trait for inference backends (Groq, OpenAI, Ollama, ...)
#[async_trait]
pub trait Provider: Send + Sync {
    /// Identifies the model behind this provider, used in replay cache keys
    fn model(&self) -> &str;

    /// Generate the next turn for the agent described by `context`
    async fn complete(&self, context: &PromptContext) -> Result<(Completion, Usage)>;
}
