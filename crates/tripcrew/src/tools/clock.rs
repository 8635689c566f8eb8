use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde_json::{json, Value};

use super::ToolHandler;
use crate::errors::ToolResult;
use crate::models::tool::Tool;

pub const CLOCK_TOOL: &str = "get_current_date";

/// Reports today's date as `YYYY-MM-DD`
pub struct ClockTool {
    spec: Tool,
    fixed: Option<NaiveDate>,
}

impl Default for ClockTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockTool {
    pub fn new() -> Self {
        Self {
            spec: Tool::new(
                CLOCK_TOOL,
                "Returns the current date in YYYY-MM-DD format.",
                json!({"type": "object", "properties": {}}),
            ),
            fixed: None,
        }
    }

    /// A clock that always reports `date`
    pub fn fixed(date: NaiveDate) -> Self {
        Self {
            fixed: Some(date),
            ..Self::new()
        }
    }

    pub fn now(&self) -> String {
        self.fixed
            .unwrap_or_else(|| Local::now().date_naive())
            .format("%Y-%m-%d")
            .to_string()
    }
}

#[async_trait]
impl ToolHandler for ClockTool {
    fn spec(&self) -> &Tool {
        &self.spec
    }

    async fn invoke(&self, _arguments: Value) -> ToolResult<String> {
        Ok(self.now())
    }
}
