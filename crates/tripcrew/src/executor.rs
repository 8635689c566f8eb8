use serde::Serialize;
use tracing::{debug, info, warn};

use crate::agent::{roster, AgentDescriptor, ParticipantInfo};
use crate::errors::{ConversationError, ToolError};
use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::prompt_template::load_prompt_file;
use crate::providers::base::{Completion, PromptContext};
use crate::tools::ToolRegistry;
use crate::transcript::Transcript;

pub const DEFAULT_CONTEXT_MESSAGES: usize = 24;
pub const DEFAULT_MAX_TOOL_CALLS: usize = 4;

/// Attempts per backend call: the first try plus one retry
const BACKEND_ATTEMPTS: usize = 2;

#[derive(Serialize)]
struct AgentPrompt<'a> {
    name: &'a str,
    instructions: &'a str,
    participants: Vec<ParticipantInfo<'a>>,
    tools: &'a [Tool],
}

/// Drives one participant through one turn and writes the outcome to the transcript.
///
/// A turn may request tools: each request is appended together with its result and the
/// agent is prompted again, until it answers with content or runs out of tool calls.
/// Turn-internal failures never escape; they end up in the transcript as failed turns or
/// tool errors.
pub struct TurnExecutor {
    registry: ToolRegistry,
    context_messages: usize,
    max_tool_calls: usize,
}

impl TurnExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            context_messages: DEFAULT_CONTEXT_MESSAGES,
            max_tool_calls: DEFAULT_MAX_TOOL_CALLS,
        }
    }

    /// How many recent messages are sent along with the opening request
    pub fn with_context_messages(mut self, context_messages: usize) -> Self {
        self.context_messages = context_messages;
        self
    }

    pub fn with_max_tool_calls(mut self, max_tool_calls: usize) -> Self {
        self.max_tool_calls = max_tool_calls;
        self
    }

    fn system_prompt(
        &self,
        agent: &AgentDescriptor,
        participants: &[AgentDescriptor],
        tools: &[Tool],
    ) -> Result<String, ConversationError> {
        let prompt = AgentPrompt {
            name: &agent.name,
            instructions: &agent.instructions,
            participants: roster(participants),
            tools,
        };
        load_prompt_file("agent.md", &prompt).map_err(|e| {
            ConversationError::Internal(format!(
                "failed to render the prompt for {}: {}",
                agent.name, e
            ))
        })
    }

    async fn complete(
        &self,
        agent: &AgentDescriptor,
        context: &PromptContext,
    ) -> Result<Completion, ConversationError> {
        let backend = &agent.backend;
        let mut reason = String::new();

        for attempt in 1..=BACKEND_ATTEMPTS {
            match tokio::time::timeout(backend.timeout, backend.provider.complete(context)).await
            {
                Ok(Ok((completion, usage))) => {
                    debug!(agent = %agent.name, ?usage, "backend responded");
                    return Ok(completion);
                }
                Ok(Err(e)) => reason = e.to_string(),
                Err(_) => reason = format!("timed out after {}s", backend.timeout.as_secs()),
            }
            warn!(agent = %agent.name, attempt, error = %reason, "backend call failed");
        }

        Err(ConversationError::BackendUnavailable {
            agent: agent.name.clone(),
            reason,
        })
    }

    /// Run one turn for `agent` and return the message that closed it: either the agent's
    /// content or a failed-turn record. Tool requests and results made along the way are
    /// appended before it.
    pub async fn run_turn(
        &self,
        agent: &AgentDescriptor,
        participants: &[AgentDescriptor],
        transcript: &mut Transcript,
    ) -> Result<Message, ConversationError> {
        let tools = self.registry.specs(&agent.permitted_tools);
        let system = self.system_prompt(agent, participants, &tools)?;
        let mut tool_calls = 0;

        loop {
            let context = PromptContext {
                agent: agent.name.clone(),
                system: system.clone(),
                messages: transcript.window(self.context_messages),
                tools: tools.clone(),
            };

            let completion = match self.complete(agent, &context).await {
                Ok(completion) => completion,
                Err(e) => return Ok(record_failure(transcript, agent, e.to_string())),
            };

            let Some(call) = completion.tool_call else {
                if completion.content.trim().is_empty() {
                    return Ok(record_failure(
                        transcript,
                        agent,
                        "the backend returned an empty response",
                    ));
                }
                let message = Message::assistant(&agent.name).with_text(completion.content);
                transcript.append(message.clone());
                return Ok(message);
            };

            if tool_calls == self.max_tool_calls {
                return Ok(record_failure(
                    transcript,
                    agent,
                    format!(
                        "requested more than {} tool calls in one turn",
                        self.max_tool_calls
                    ),
                ));
            }
            tool_calls += 1;

            transcript.append(
                Message::assistant(&agent.name)
                    .with_text(completion.content)
                    .with_tool_call(call.clone()),
            );

            let output = if agent.may_use(&call.name) {
                self.registry.invoke(&call).await
            } else {
                warn!(agent = %agent.name, tool = %call.name, "rejected unauthorized tool request");
                Err(ToolError::Unauthorized {
                    agent: agent.name.clone(),
                    tool: call.name.clone(),
                })
            };
            transcript.append(Message::tool_result(&call, output));
        }
    }
}

fn record_failure<R: Into<String>>(
    transcript: &mut Transcript,
    agent: &AgentDescriptor,
    reason: R,
) -> Message {
    let message = Message::failed_turn(&agent.name, reason);
    info!(agent = %agent.name, reason = ?message.failure, "turn failed");
    transcript.append(message.clone());
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Backend;
    use crate::errors::ToolResult;
    use crate::models::role::Role;
    use crate::models::tool::ToolCall;
    use crate::providers::mock::{MockProvider, Scripted};
    use crate::tools::ToolHandler;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct CountingTool {
        spec: Tool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ToolHandler for CountingTool {
        fn spec(&self) -> &Tool {
            &self.spec
        }

        async fn invoke(&self, _arguments: Value) -> ToolResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("lots of beaches".to_string())
        }
    }

    fn registry(calls: Arc<AtomicUsize>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CountingTool {
            spec: Tool::new("search_web", "Searches", json!({"type": "object"})),
            calls,
        }));
        registry
    }

    fn opening() -> Transcript {
        let mut transcript = Transcript::new();
        transcript.append(Message::user("User_Proxy").with_text("3 days by the sea"));
        transcript
    }

    fn search_call(id: &str) -> Completion {
        Completion::tool_call(ToolCall::new(id, "search_web", json!({"query": "beaches"})))
    }

    #[tokio::test]
    async fn test_content_turn() {
        let provider = Arc::new(MockProvider::replies(vec![Completion::text("Day 1: beach")]));
        let agent = AgentDescriptor::new("Planner", "Plan days.", Backend::new(provider.clone()));
        let executor = TurnExecutor::new(ToolRegistry::new());
        let mut transcript = opening();

        let message = executor
            .run_turn(&agent, &[agent.clone()], &mut transcript)
            .await
            .unwrap();

        assert_eq!(message.content, "Day 1: beach");
        assert_eq!(message.speaker, "Planner");
        assert_eq!(transcript.len(), 2);

        let calls = provider.calls();
        assert!(calls[0].system.contains("You are Planner"));
        assert!(calls[0].system.contains("Plan days."));
        assert!(calls[0].tools.is_empty());
    }

    #[tokio::test]
    async fn test_permitted_tool_call_then_content() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(MockProvider::replies(vec![
            search_call("c1").with_text("Let me look that up."),
            Completion::text("Varkala has cliffs."),
        ]));
        let agent = AgentDescriptor::new("Researcher", "", Backend::new(provider.clone()))
            .with_tools(["search_web"]);
        let executor = TurnExecutor::new(registry(calls.clone()));
        let mut transcript = opening();

        let message = executor
            .run_turn(&agent, &[agent.clone()], &mut transcript)
            .await
            .unwrap();

        assert_eq!(message.content, "Varkala has cliffs.");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let entries = transcript.all();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[1].content, "Let me look that up.");
        assert!(entries[1].tool_call.is_some());
        assert_eq!(entries[2].role, Role::Tool);
        assert_eq!(entries[2].tool_result.as_ref().unwrap().call_id, "c1");

        // the second prompt carries the tool result and the offered tool spec
        let prompts = provider.calls();
        assert_eq!(prompts[1].messages.len(), 3);
        assert_eq!(prompts[1].tools[0].name, "search_web");
    }

    #[tokio::test]
    async fn test_unauthorized_tool_never_reaches_registry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(MockProvider::replies(vec![
            search_call("c1"),
            Completion::text("Fine, from memory then."),
        ]));
        let agent = AgentDescriptor::new("Reviewer", "", Backend::new(provider));
        let executor = TurnExecutor::new(registry(calls.clone()));
        let mut transcript = opening();

        executor
            .run_turn(&agent, &[agent.clone()], &mut transcript)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let rejection = transcript.all()[2].tool_result.clone().unwrap();
        assert_eq!(
            rejection.output,
            Err(ToolError::Unauthorized {
                agent: "Reviewer".to_string(),
                tool: "search_web".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_backend_timeout_is_retried_once_then_recorded() {
        let provider = Arc::new(MockProvider::new(vec![Scripted::Hang, Scripted::Hang]));
        let backend = Backend::new(provider.clone()).with_timeout(Duration::from_millis(20));
        let agent = AgentDescriptor::new("Reviewer", "", backend);
        let executor = TurnExecutor::new(ToolRegistry::new());
        let mut transcript = opening();

        let message = executor
            .run_turn(&agent, &[agent.clone()], &mut transcript)
            .await
            .unwrap();

        assert!(message.is_failed());
        assert!(message.content.contains("timed out"));
        assert_eq!(provider.calls().len(), 2);
        assert_eq!(transcript.last(), Some(&message));
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let provider = Arc::new(MockProvider::new(vec![
            Scripted::Fail("connection reset".to_string()),
            Scripted::Reply(Completion::text("Looks good")),
        ]));
        let agent = AgentDescriptor::new("Reviewer", "", Backend::new(provider));
        let executor = TurnExecutor::new(ToolRegistry::new());
        let mut transcript = opening();

        let message = executor
            .run_turn(&agent, &[agent.clone()], &mut transcript)
            .await
            .unwrap();
        assert_eq!(message.content, "Looks good");
    }

    #[tokio::test]
    async fn test_tool_budget_exhausted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(MockProvider::replies(vec![
            search_call("c1"),
            search_call("c2"),
            search_call("c3"),
        ]));
        let agent = AgentDescriptor::new("Researcher", "", Backend::new(provider))
            .with_tools(["search_web"]);
        let executor = TurnExecutor::new(registry(calls.clone())).with_max_tool_calls(2);
        let mut transcript = opening();

        let message = executor
            .run_turn(&agent, &[agent.clone()], &mut transcript)
            .await
            .unwrap();

        assert!(message.is_failed());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // opening, two request/result pairs, failure
        assert_eq!(transcript.len(), 6);
    }

    #[tokio::test]
    async fn test_empty_response_fails_the_turn() {
        let provider = Arc::new(MockProvider::replies(vec![Completion::text("   ")]));
        let agent = AgentDescriptor::new("Planner", "", Backend::new(provider));
        let executor = TurnExecutor::new(ToolRegistry::new());
        let mut transcript = opening();

        let message = executor
            .run_turn(&agent, &[agent.clone()], &mut transcript)
            .await
            .unwrap();
        assert!(message.is_failed());
        assert!(!message.is_content_bearing());
    }
}
