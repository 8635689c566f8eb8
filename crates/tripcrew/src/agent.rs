use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::providers::base::Provider;

pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(60);

/// The inference configuration an agent speaks through
#[derive(Clone)]
pub struct Backend {
    pub provider: Arc<dyn Provider>,
    /// Upper bound for one completion; a turn that exceeds it is retried once
    pub timeout: Duration,
}

impl Backend {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            timeout: DEFAULT_TURN_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("model", &self.provider.model())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Static configuration of one participant
#[derive(Clone, Debug)]
pub struct AgentDescriptor {
    /// Unique within a conversation, used as the routing key
    pub name: String,
    /// One-line responsibility, shown to the other agents and to delegated selection
    pub description: String,
    pub instructions: String,
    pub backend: Backend,
    pub permitted_tools: BTreeSet<String>,
    pub is_human_proxy: bool,
}

impl AgentDescriptor {
    pub fn new<N, I>(name: N, instructions: I, backend: Backend) -> Self
    where
        N: Into<String>,
        I: Into<String>,
    {
        Self {
            name: name.into(),
            description: String::new(),
            instructions: instructions.into(),
            backend,
            permitted_tools: BTreeSet::new(),
            is_human_proxy: false,
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permitted_tools.extend(tools.into_iter().map(Into::into));
        self
    }

    /// Mark this agent as the user's representative
    pub fn human_proxy(mut self) -> Self {
        self.is_human_proxy = true;
        self
    }

    pub fn may_use(&self, tool: &str) -> bool {
        self.permitted_tools.contains(tool)
    }
}

/// How a participant is introduced to the others in system prompts
#[derive(Debug, Serialize)]
pub struct ParticipantInfo<'a> {
    pub name: &'a str,
    pub description: &'a str,
}

pub fn roster(participants: &[AgentDescriptor]) -> Vec<ParticipantInfo<'_>> {
    participants
        .iter()
        .map(|agent| ParticipantInfo {
            name: &agent.name,
            description: &agent.description,
        })
        .collect()
}
