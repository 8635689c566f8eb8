#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tripcrew::agent::{AgentDescriptor, Backend};
use tripcrew::errors::ToolResult;
use tripcrew::models::tool::{Tool, ToolCall};
use tripcrew::providers::base::{Completion, PromptContext, Provider, Usage};
use tripcrew::tools::ToolHandler;

pub enum Step {
    Say(String),
    Call(ToolCall),
    Fail(String),
    Hang,
}

pub fn say<S: Into<String>>(text: S) -> Step {
    Step::Say(text.into())
}

pub fn call(id: &str, name: &str, arguments: Value) -> Step {
    Step::Call(ToolCall::new(id, name, arguments))
}

/// A backend shared by several agents, scripted per agent name
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    prompted: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, agent: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(agent.to_string(), steps.into());
        self
    }

    /// Agent names in the order they were prompted, one entry per backend call
    pub fn prompted(&self) -> Vec<String> {
        self.prompted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, context: &PromptContext) -> Result<(Completion, Usage)> {
        self.prompted.lock().unwrap().push(context.agent.clone());
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&context.agent)
            .and_then(VecDeque::pop_front);

        match next {
            None => Ok((
                Completion::text(format!("{} has nothing to add.", context.agent)),
                Usage::default(),
            )),
            Some(Step::Say(text)) => Ok((Completion::text(text), Usage::default())),
            Some(Step::Call(call)) => Ok((Completion::tool_call(call), Usage::default())),
            Some(Step::Fail(reason)) => Err(anyhow!(reason)),
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(anyhow!("hung"))
            }
        }
    }
}

pub fn agent(name: &str, provider: &Arc<ScriptedProvider>) -> AgentDescriptor {
    AgentDescriptor::new(name, format!("You are {}.", name), Backend::new(provider.clone()))
        .with_description(format!("{} role", name))
}

/// Counts invocations so tests can prove a call never reached the registry
pub struct CountingTool {
    spec: Tool,
    pub calls: Arc<AtomicUsize>,
}

impl CountingTool {
    pub fn new(name: &str) -> Self {
        Self {
            spec: Tool::new(name, "Counts its calls", serde_json::json!({"type": "object"})),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolHandler for CountingTool {
    fn spec(&self) -> &Tool {
        &self.spec
    }

    async fn invoke(&self, _arguments: Value) -> ToolResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("counted".to_string())
    }
}
