use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures that happen while serving a tool call. These never escape a turn:
/// they are rendered into the transcript so the agents can react to them.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Agent {agent} is not permitted to use tool {tool}")]
    Unauthorized { agent: String, tool: String },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
}

pub type ToolResult<T> = Result<T, ToolError>;

/// Driver-level failures. Anything in here breaks the conversation state machine.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConversationError {
    #[error("Invalid conversation configuration: {0}")]
    InvalidConfiguration(String),

    #[error("No valid next speaker: {0}")]
    NoValidSpeaker(String),

    #[error("Backend unavailable for {agent}: {reason}")]
    BackendUnavailable { agent: String, reason: String },

    #[error("Conversation was cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a plan did not produce a clean, signal-terminated artifact.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanError {
    #[error("The conversation finished but no formatted itinerary from {producer} was found")]
    ExtractionFailure { producer: String },

    #[error("The conversation hit the limit of {max_rounds} rounds before the user accepted a plan; the result may be incomplete")]
    RoundLimitExceeded { max_rounds: usize },

    #[error("The conversation failed: {0}")]
    ConversationFailure(String),

    #[error("The conversation was cancelled after {rounds} rounds")]
    Cancelled { rounds: usize },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration, set the {env_var} environment variable")]
    MissingEnvVar { env_var: String },

    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

/// Maps a settings path such as `provider.api_key` to the environment variable that sets it.
pub fn to_env_var(field: &str) -> String {
    format!("TRIPCREW_{}", field.replace('.', "__").to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_env_var() {
        assert_eq!(to_env_var("provider.api_key"), "TRIPCREW_PROVIDER__API_KEY");
        assert_eq!(to_env_var("type"), "TRIPCREW_TYPE");
    }

    #[test]
    fn test_tool_error_roundtrips_through_json() {
        let err = ToolError::Unauthorized {
            agent: "Activity_Planner".to_string(),
            tool: "format_trip_itinerary".to_string(),
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: ToolError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
        assert!(back.to_string().contains("not permitted"));
    }
}
