use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::ToolHandler;
use crate::errors::{ToolError, ToolResult};
use crate::models::tool::{Tool, ToolCall};

const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Maps tool names to the collaborators that serve them
#[derive(Clone)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a handler under its own name, replacing any previous one
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.name().to_string();
        if self.handlers.insert(name.clone(), handler).is_some() {
            warn!(tool = %name, "replacing previously registered tool");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Specs for the requested tools that are actually registered, in the given order
    pub fn specs<'a, I>(&self, names: I) -> Vec<Tool>
    where
        I: IntoIterator<Item = &'a String>,
    {
        names
            .into_iter()
            .filter_map(|name| self.handlers.get(name))
            .map(|handler| handler.spec().clone())
            .collect()
    }

    /// Invoke a tool. Unknown names yield [`ToolError::NotFound`]; every other failure,
    /// including a timeout, comes back as a value rather than propagating.
    pub async fn invoke(&self, call: &ToolCall) -> ToolResult<String> {
        info!(tool = %call.name, id = %call.id, arguments = %call.arguments, "invoking tool");

        let handler = self
            .handlers
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        let result = match tokio::time::timeout(self.timeout, handler.invoke(call.arguments.clone()))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ToolError::ExecutionError(format!(
                "{} timed out after {}s",
                call.name,
                self.timeout.as_secs()
            ))),
        };

        if let Err(e) = &result {
            warn!(tool = %call.name, id = %call.id, error = %e, "tool call failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct EchoTool {
        spec: Tool,
    }

    impl EchoTool {
        fn new() -> Self {
            Self {
                spec: Tool::new(
                    "echo",
                    "Echoes back the input",
                    json!({"type": "object", "properties": {"message": {"type": "string"}}, "required": ["message"]}),
                ),
            }
        }
    }

    #[async_trait]
    impl ToolHandler for EchoTool {
        fn spec(&self) -> &Tool {
            &self.spec
        }

        async fn invoke(&self, arguments: Value) -> ToolResult<String> {
            Ok(super::super::string_arg(&arguments, "message")?.to_string())
        }
    }

    struct SlowTool {
        spec: Tool,
    }

    #[async_trait]
    impl ToolHandler for SlowTool {
        fn spec(&self) -> &Tool {
            &self.spec
        }

        async fn invoke(&self, _arguments: Value) -> ToolResult<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    #[tokio::test]
    async fn test_invoke_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new()));

        let call = ToolCall::new("1", "echo", json!({"message": "hi"}));
        assert_eq!(registry.invoke(&call).await, Ok("hi".to_string()));
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool() {
        let registry = ToolRegistry::new();
        let call = ToolCall::new("1", "missing", json!({}));
        assert_eq!(
            registry.invoke(&call).await,
            Err(ToolError::NotFound("missing".to_string()))
        );
    }

    #[tokio::test]
    async fn test_bad_arguments_become_a_value() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new()));

        let call = ToolCall::new("1", "echo", json!({"wrong": 1}));
        assert!(matches!(
            registry.invoke(&call).await,
            Err(ToolError::InvalidParameters(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_becomes_execution_error() {
        let mut registry = ToolRegistry::new().with_timeout(Duration::from_millis(20));
        registry.register(Arc::new(SlowTool {
            spec: Tool::new("slow", "Takes its time", json!({"type": "object"})),
        }));

        let call = ToolCall::new("1", "slow", json!({}));
        match registry.invoke(&call).await {
            Err(ToolError::ExecutionError(msg)) => assert!(msg.contains("timed out")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_specs_filters_unregistered() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new()));

        let wanted = vec!["echo".to_string(), "missing".to_string()];
        let specs = registry.specs(&wanted);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "echo");
        assert_eq!(registry.names(), vec!["echo"]);
    }
}
