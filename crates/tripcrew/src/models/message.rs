use super::role::Role;
use super::tool::ToolCall;
use crate::errors::ToolResult;
use chrono::Utc;

/// Speaker name used for entries produced by the tool side-channel
pub const TOOL_SPEAKER: &str = "tool";

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolResponse {
    /// Id of the [`ToolCall`] this answers
    pub call_id: String,
    pub tool_name: String,
    pub output: ToolResult<String>,
}

impl ToolResponse {
    /// The text an agent sees for this result. Failures are rendered, never raised.
    pub fn as_text(&self) -> String {
        match &self.output {
            Ok(text) => text.clone(),
            Err(e) => format!("The tool call returned the following error:\n{}", e),
        }
    }

    pub fn is_error(&self) -> bool {
        self.output.is_err()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
/// One transcript entry
pub struct Message {
    pub speaker: String,
    pub role: Role,
    pub created: i64,
    /// Text payload, empty for a pure tool-call request
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResponse>,
    /// Set when the speaker's turn could not be completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl Message {
    fn new<S: Into<String>>(speaker: S, role: Role) -> Self {
        Message {
            speaker: speaker.into(),
            role,
            created: Utc::now().timestamp(),
            content: String::new(),
            tool_call: None,
            tool_result: None,
            failure: None,
        }
    }

    /// Create a new user message with the current timestamp
    pub fn user<S: Into<String>>(speaker: S) -> Self {
        Self::new(speaker, Role::User)
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant<S: Into<String>>(speaker: S) -> Self {
        Self::new(speaker, Role::Assistant)
    }

    /// Create the entry that answers a tool call
    pub fn tool_result(call: &ToolCall, output: ToolResult<String>) -> Self {
        let mut message = Self::new(TOOL_SPEAKER, Role::Tool);
        message.tool_result = Some(ToolResponse {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            output,
        });
        message
    }

    /// Record that a speaker's turn failed
    pub fn failed_turn<S: Into<String>, R: Into<String>>(speaker: S, reason: R) -> Self {
        let reason = reason.into();
        let mut message = Self::new(speaker, Role::Assistant);
        message.content = format!("[turn failed: {}]", reason);
        message.failure = Some(reason);
        message
    }

    /// Add text content to the message
    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.content = text.into();
        self
    }

    /// Add a tool request to the message
    pub fn with_tool_call(mut self, tool_call: ToolCall) -> Self {
        self.tool_call = Some(tool_call);
        self
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Whether an agent said something in this entry, as opposed to a tool result,
    /// a failed turn or an empty tool request
    pub fn is_content_bearing(&self) -> bool {
        self.role != Role::Tool && !self.is_failed() && !self.content.trim().is_empty()
    }

    /// Content-bearing and not asking for a tool
    pub fn is_plain_content(&self) -> bool {
        self.is_content_bearing() && self.tool_call.is_none()
    }
}
