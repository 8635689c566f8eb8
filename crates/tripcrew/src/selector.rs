use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::agent::{roster, AgentDescriptor, Backend, ParticipantInfo};
use crate::errors::ConversationError;
use crate::prompt_template::load_prompt_file;
use crate::providers::base::PromptContext;
use crate::transcript::Transcript;

/// Name the decision backend is prompted as
pub const SELECTOR_NAME: &str = "speaker_selector";

/// What a selector may look at when choosing the next speaker
pub struct SelectionContext<'a> {
    pub transcript: &'a Transcript,
    pub participants: &'a [AgentDescriptor],
    pub last_speaker: Option<&'a str>,
    /// Number of rounds already completed
    pub round: usize,
}

/// Decides who speaks next. Only called after a content-bearing turn has completed.
#[async_trait]
pub trait SpeakerSelector: Send + Sync {
    async fn select_next(
        &self,
        context: &SelectionContext<'_>,
    ) -> Result<String, ConversationError>;

    /// Reject configurations this selector can never serve, before the first round
    fn validate(&self, _participants: &[AgentDescriptor]) -> Result<(), ConversationError> {
        Ok(())
    }
}

/// Deterministic cycling over a fixed schedule
#[derive(Debug, Clone, Default)]
pub struct Rotation {
    phases: Option<Vec<String>>,
}

impl Rotation {
    /// Cycle through participants in declaration order, skipping the human proxy
    pub fn declaration_order() -> Self {
        Self { phases: None }
    }

    /// Cycle through an explicit phase list. Names may repeat and the human proxy
    /// speaks only where it is listed.
    pub fn phases<I, S>(phases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            phases: Some(phases.into_iter().map(Into::into).collect()),
        }
    }

    pub fn schedule<'a>(&'a self, participants: &'a [AgentDescriptor]) -> Vec<&'a str> {
        match &self.phases {
            Some(phases) => phases.iter().map(String::as_str).collect(),
            None => participants
                .iter()
                .filter(|agent| !agent.is_human_proxy)
                .map(|agent| agent.name.as_str())
                .collect(),
        }
    }

    /// The speaker for the given round
    pub fn pick(
        &self,
        participants: &[AgentDescriptor],
        round: usize,
    ) -> Result<String, ConversationError> {
        let schedule = self.schedule(participants);
        if schedule.is_empty() {
            return Err(ConversationError::NoValidSpeaker(
                "the rotation schedule is empty".to_string(),
            ));
        }

        let name = schedule[round % schedule.len()];
        if !participants.iter().any(|agent| agent.name == name) {
            return Err(ConversationError::NoValidSpeaker(format!(
                "rotation names {} which is not a participant",
                name
            )));
        }
        Ok(name.to_string())
    }
}

#[async_trait]
impl SpeakerSelector for Rotation {
    async fn select_next(
        &self,
        context: &SelectionContext<'_>,
    ) -> Result<String, ConversationError> {
        self.pick(context.participants, context.round)
    }

    fn validate(&self, participants: &[AgentDescriptor]) -> Result<(), ConversationError> {
        let schedule = self.schedule(participants);
        if schedule.is_empty() {
            return Err(ConversationError::InvalidConfiguration(
                "the rotation schedule is empty".to_string(),
            ));
        }
        match schedule
            .iter()
            .find(|name| !participants.iter().any(|agent| agent.name == **name))
        {
            Some(name) => Err(ConversationError::InvalidConfiguration(format!(
                "rotation names {} which is not a participant",
                name
            ))),
            None => Ok(()),
        }
    }
}

/// Asks a decision backend to pick the next speaker, falling back to a rotation for any
/// round where the backend fails or answers with something that is not a participant.
pub struct DelegatedSelection {
    decider: Backend,
    fallback: Rotation,
    context_messages: usize,
}

#[derive(Serialize)]
struct SelectorPrompt<'a> {
    participants: Vec<ParticipantInfo<'a>>,
    names: Vec<&'a str>,
}

impl DelegatedSelection {
    pub fn new(decider: Backend, fallback: Rotation) -> Self {
        Self {
            decider,
            fallback,
            context_messages: 24,
        }
    }

    pub fn with_context_messages(mut self, context_messages: usize) -> Self {
        self.context_messages = context_messages;
        self
    }

    async fn ask(&self, context: &SelectionContext<'_>) -> Result<String, String> {
        let prompt = SelectorPrompt {
            participants: roster(context.participants),
            names: context
                .participants
                .iter()
                .map(|agent| agent.name.as_str())
                .collect(),
        };
        let system = load_prompt_file("selector.md", &prompt).map_err(|e| e.to_string())?;
        let request = PromptContext {
            agent: SELECTOR_NAME.to_string(),
            system,
            messages: context.transcript.window(self.context_messages),
            tools: vec![],
        };

        match tokio::time::timeout(self.decider.timeout, self.decider.provider.complete(&request))
            .await
        {
            Ok(Ok((completion, _))) => Ok(completion.content),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "timed out after {}s",
                self.decider.timeout.as_secs()
            )),
        }
    }
}

/// Resolve a decision backend reply to a participant name. Only an exact name, ignoring
/// case and surrounding quotes or punctuation, is accepted.
pub fn match_participant(reply: &str, participants: &[AgentDescriptor]) -> Option<String> {
    let candidate =
        reply.trim_matches(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'));
    let by_lowercase: HashMap<String, &str> = participants
        .iter()
        .map(|agent| (agent.name.to_lowercase(), agent.name.as_str()))
        .collect();
    by_lowercase
        .get(&candidate.to_lowercase())
        .map(|name| name.to_string())
}

#[async_trait]
impl SpeakerSelector for DelegatedSelection {
    async fn select_next(
        &self,
        context: &SelectionContext<'_>,
    ) -> Result<String, ConversationError> {
        match self.ask(context).await {
            Ok(reply) => match match_participant(&reply, context.participants) {
                Some(name) => {
                    debug!(round = context.round, speaker = %name, "delegated selection");
                    return Ok(name);
                }
                None => warn!(
                    round = context.round,
                    reply = %reply,
                    "decision backend named no participant, using rotation"
                ),
            },
            Err(reason) => warn!(
                round = context.round,
                error = %reason,
                "decision backend failed, using rotation"
            ),
        }
        self.fallback.pick(context.participants, context.round)
    }

    fn validate(&self, participants: &[AgentDescriptor]) -> Result<(), ConversationError> {
        self.fallback.validate(participants)
    }
}
