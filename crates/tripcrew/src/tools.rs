use async_trait::async_trait;
use serde_json::Value;

use crate::errors::ToolResult;
use crate::models::tool::Tool;

pub mod clock;
pub mod itinerary;
pub mod registry;
pub mod search;

pub use registry::ToolRegistry;

/// A function exposed to the conversation
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// The name, description and argument schema offered to the backend
    fn spec(&self) -> &Tool;

    fn name(&self) -> &str {
        &self.spec().name
    }

    /// Run the tool. Errors are returned as values and end up in the transcript.
    async fn invoke(&self, arguments: Value) -> ToolResult<String>;
}

/// Read a required string argument
pub(crate) fn string_arg<'a>(arguments: &'a Value, key: &str) -> ToolResult<&'a str> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            crate::errors::ToolError::InvalidParameters(format!(
                "missing required string argument '{}'",
                key
            ))
        })
}
