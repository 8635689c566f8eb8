use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::warn;

use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};
use crate::providers::base::{Completion, Usage};

/// Convert the transcript into OpenAI chat messages, as seen by `perspective`.
///
/// The agent's own turns become assistant turns and its own tool calls are sent as native
/// tool calls followed by their tool results. Everyone else speaks as a named user, and
/// tool activity that belongs to other agents is rendered as plain text.
pub fn messages_to_openai_spec(messages: &[Message], perspective: &str) -> Vec<Value> {
    let mut spec = Vec::new();
    let mut own_calls = HashSet::new();

    for message in messages {
        if message.role == Role::Tool {
            let Some(result) = &message.tool_result else {
                continue;
            };
            if own_calls.contains(&result.call_id) {
                spec.push(json!({
                    "role": "tool",
                    "tool_call_id": result.call_id,
                    "content": result.as_text(),
                }));
            } else {
                spec.push(json!({
                    "role": "user",
                    "name": sanitize_function_name(&message.speaker),
                    "content": format!("Result of {} ({}):\n{}", result.tool_name, result.call_id, result.as_text()),
                }));
            }
            continue;
        }

        if message.speaker == perspective {
            // Our own failed turns carry nothing the model should imitate
            if message.is_failed() {
                continue;
            }
            let mut converted = json!({"role": "assistant"});
            if !message.content.is_empty() {
                converted["content"] = json!(message.content);
            }
            if let Some(call) = &message.tool_call {
                own_calls.insert(call.id.clone());
                converted["tool_calls"] = json!([{
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": sanitize_function_name(&call.name),
                        "arguments": call.arguments.to_string(),
                    }
                }]);
            }
            if converted.get("content").is_some() || converted.get("tool_calls").is_some() {
                spec.push(converted);
            }
            continue;
        }

        let mut text = message.content.clone();
        if let Some(call) = &message.tool_call {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&format!("[requested {} with {}]", call.name, call.arguments));
        }
        if text.is_empty() {
            continue;
        }
        spec.push(json!({
            "role": "user",
            "name": sanitize_function_name(&message.speaker),
            "content": text,
        }));
    }

    spec
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

/// Convert OpenAI's API response to a [`Completion`]
pub fn openai_response_to_completion(response: &Value) -> Result<Completion> {
    let original = response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| anyhow!("Response has no choices: {}", response))?;

    let mut completion = Completion::default();
    if let Some(text) = original.get("content").and_then(|t| t.as_str()) {
        completion.content = text.to_string();
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(|t| t.as_array()) {
        if tool_calls.len() > 1 {
            warn!(
                count = tool_calls.len(),
                "backend requested several tools at once, only the first is executed"
            );
        }
        if let Some(tool_call) = tool_calls.first() {
            let id = tool_call["id"].as_str().unwrap_or_default().to_string();
            let name = tool_call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let raw_arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();

            // Unparseable arguments are passed through as a string so the tool rejects them
            // and the agent sees why
            let arguments = if raw_arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str::<Value>(raw_arguments)
                    .unwrap_or_else(|_| Value::String(raw_arguments.to_string()))
            };

            let id = if id.is_empty() {
                format!("call_{}", uuid::Uuid::new_v4().simple())
            } else {
                id
            };
            completion.tool_call = Some(ToolCall::new(id, name, arguments));
        }
    }

    Ok(completion)
}

pub fn openai_usage(data: &Value) -> Usage {
    let Some(usage) = data.get("usage") else {
        return Usage::default();
    };

    let read = |key: &str| usage.get(key).and_then(|v| v.as_i64()).map(|v| v as i32);
    let input_tokens = read("prompt_tokens");
    let output_tokens = read("completion_tokens");
    let total_tokens = read("total_tokens").or_else(|| match (input_tokens, output_tokens) {
        (Some(input), Some(output)) => Some(input + output),
        _ => None,
    });

    Usage::new(input_tokens, output_tokens, total_tokens)
}

/// OpenAI only accepts `[a-zA-Z0-9_-]` in function and participant names
pub fn sanitize_function_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}
