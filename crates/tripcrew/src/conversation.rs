use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strum_macros::Display;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::AgentDescriptor;
use crate::errors::ConversationError;
use crate::executor::TurnExecutor;
use crate::models::message::{Message, TOOL_SPEAKER};
use crate::models::role::Role;
use crate::selector::{Rotation, SelectionContext, SpeakerSelector};
use crate::tools::ToolRegistry;
use crate::transcript::Transcript;

/// The token the human proxy ends its message with to accept the result
pub const TERMINATION_TOKEN: &str = "TERMINATE";

/// Speaker of the opening message when no participant is a human proxy
pub const OPENING_SPEAKER: &str = "user";

pub const DEFAULT_MAX_ROUNDS: usize = 35;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Running,
    TerminatedBySignal,
    TerminatedByRoundLimit,
    Failed,
    Cancelled,
}

/// Decides whether a human-proxy message ends the conversation.
/// Matching is exact: the trimmed content must end with the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationPredicate {
    token: String,
}

impl Default for TerminationPredicate {
    fn default() -> Self {
        Self::ends_with(TERMINATION_TOKEN)
    }
}

impl TerminationPredicate {
    pub fn ends_with<S: Into<String>>(token: S) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn is_satisfied_by(&self, message: &Message) -> bool {
        message.is_content_bearing() && message.content.trim_end().ends_with(&self.token)
    }
}

/// Which participant produces the final artifact and how it is delimited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactContract {
    pub producer: String,
    pub sentinel: String,
}

impl ArtifactContract {
    pub fn new<P: Into<String>, S: Into<String>>(producer: P, sentinel: S) -> Self {
        Self {
            producer: producer.into(),
            sentinel: sentinel.into(),
        }
    }

    /// The latest plain-content message from the producer that carries the sentinel,
    /// with the sentinel removed. Earlier drafts are ignored.
    pub fn extract(&self, transcript: &Transcript) -> Option<String> {
        transcript
            .all()
            .iter()
            .rev()
            .find(|message| {
                message.speaker == self.producer
                    && message.is_plain_content()
                    && message.content.contains(&self.sentinel)
            })
            .map(|message| message.content.replace(&self.sentinel, "").trim().to_string())
    }
}

/// What is left of a conversation once it stops running
#[derive(Debug)]
pub struct ConversationOutcome {
    pub id: String,
    pub status: ConversationStatus,
    pub rounds: usize,
    pub max_rounds: usize,
    pub transcript: Transcript,
    /// Extracted on a clean stop, and on a round-limit stop when a draft exists
    pub artifact: Option<String>,
    /// Why the run failed or was cancelled
    pub error: Option<String>,
}

impl ConversationOutcome {
    pub fn transcript_log(&self) -> String {
        self.transcript.render_log()
    }
}

/// One run over a fresh transcript. Consumed by [`Conversation::run`], so nothing
/// outlives the request it was built for.
pub struct Conversation {
    id: String,
    participants: Vec<AgentDescriptor>,
    selector: Box<dyn SpeakerSelector>,
    executor: TurnExecutor,
    termination: TerminationPredicate,
    artifact: Option<ArtifactContract>,
    max_rounds: usize,
    cancel: CancellationToken,
    transcript: Transcript,
}

pub struct ConversationBuilder {
    participants: Vec<AgentDescriptor>,
    selector: Option<Box<dyn SpeakerSelector>>,
    executor: Option<TurnExecutor>,
    termination: TerminationPredicate,
    artifact: Option<ArtifactContract>,
    max_rounds: usize,
    cancel: Option<CancellationToken>,
    observer: Option<UnboundedSender<Message>>,
}

impl ConversationBuilder {
    pub fn new(participants: Vec<AgentDescriptor>) -> Self {
        Self {
            participants,
            selector: None,
            executor: None,
            termination: TerminationPredicate::default(),
            artifact: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
            cancel: None,
            observer: None,
        }
    }

    /// Defaults to a rotation in declaration order
    pub fn selector<S: SpeakerSelector + 'static>(mut self, selector: S) -> Self {
        self.selector = Some(Box::new(selector));
        self
    }

    /// Defaults to an executor with no tools registered
    pub fn executor(mut self, executor: TurnExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn termination(mut self, termination: TerminationPredicate) -> Self {
        self.termination = termination;
        self
    }

    pub fn artifact(mut self, contract: ArtifactContract) -> Self {
        self.artifact = Some(contract);
        self
    }

    pub fn max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Receive a copy of every message as it is appended
    pub fn observer(mut self, observer: UnboundedSender<Message>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> Result<Conversation, ConversationError> {
        validate_participants(&self.participants)?;

        if self.max_rounds == 0 {
            return Err(ConversationError::InvalidConfiguration(
                "max_rounds must be at least 1".to_string(),
            ));
        }

        if let Some(contract) = &self.artifact {
            if !self
                .participants
                .iter()
                .any(|agent| agent.name == contract.producer)
            {
                return Err(ConversationError::InvalidConfiguration(format!(
                    "artifact producer {} is not a participant",
                    contract.producer
                )));
            }
            if contract.sentinel.is_empty() {
                return Err(ConversationError::InvalidConfiguration(
                    "the artifact sentinel is empty".to_string(),
                ));
            }
        }

        let selector = self
            .selector
            .unwrap_or_else(|| Box::new(Rotation::declaration_order()));
        selector.validate(&self.participants)?;

        let transcript = match self.observer {
            Some(observer) => Transcript::new().with_observer(observer),
            None => Transcript::new(),
        };

        Ok(Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            participants: self.participants,
            selector,
            executor: self
                .executor
                .unwrap_or_else(|| TurnExecutor::new(ToolRegistry::new())),
            termination: self.termination,
            artifact: self.artifact,
            max_rounds: self.max_rounds,
            cancel: self.cancel.unwrap_or_default(),
            transcript,
        })
    }
}

fn validate_participants(participants: &[AgentDescriptor]) -> Result<(), ConversationError> {
    if participants.is_empty() {
        return Err(ConversationError::InvalidConfiguration(
            "a conversation needs at least one participant".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for agent in participants {
        if agent.name.trim().is_empty() {
            return Err(ConversationError::InvalidConfiguration(
                "participant names must not be empty".to_string(),
            ));
        }
        if agent.name == TOOL_SPEAKER || agent.name == OPENING_SPEAKER {
            return Err(ConversationError::InvalidConfiguration(format!(
                "{} is a reserved speaker name",
                agent.name
            )));
        }
        if !names.insert(agent.name.as_str()) {
            return Err(ConversationError::InvalidConfiguration(format!(
                "participant name {} is used more than once",
                agent.name
            )));
        }
    }

    let proxies = participants.iter().filter(|a| a.is_human_proxy).count();
    if proxies > 1 {
        return Err(ConversationError::InvalidConfiguration(format!(
            "at most one human proxy is allowed, found {}",
            proxies
        )));
    }
    Ok(())
}

impl Conversation {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn participants(&self) -> &[AgentDescriptor] {
        &self.participants
    }

    /// Post the opening request and run rounds until a stop condition fires.
    ///
    /// The opening message is attributed to the human proxy when there is one and does
    /// not count as a round.
    pub async fn run<S: Into<String>>(mut self, opening: S) -> ConversationOutcome {
        let opener = self
            .participants
            .iter()
            .find(|agent| agent.is_human_proxy)
            .map(|agent| agent.name.clone())
            .unwrap_or_else(|| OPENING_SPEAKER.to_string());
        self.transcript
            .append(Message::user(opener).with_text(opening));

        info!(
            conversation = %self.id,
            participants = self.participants.len(),
            max_rounds = self.max_rounds,
            "conversation started"
        );

        let mut rounds = 0;
        let mut last_speaker: Option<String> = None;

        let (status, error) = loop {
            if self.cancel.is_cancelled() {
                break (
                    ConversationStatus::Cancelled,
                    Some(ConversationError::Cancelled.to_string()),
                );
            }
            if rounds == self.max_rounds {
                break (ConversationStatus::TerminatedByRoundLimit, None);
            }

            let selected = {
                let context = SelectionContext {
                    transcript: &self.transcript,
                    participants: &self.participants,
                    last_speaker: last_speaker.as_deref(),
                    round: rounds,
                };
                self.selector.select_next(&context).await
            };
            let speaker = match selected {
                Ok(speaker) => speaker,
                Err(e) => break (ConversationStatus::Failed, Some(e.to_string())),
            };
            let Some(agent) = self.participants.iter().find(|a| a.name == speaker) else {
                let e = ConversationError::NoValidSpeaker(format!(
                    "{} is not a participant",
                    speaker
                ));
                break (ConversationStatus::Failed, Some(e.to_string()));
            };

            debug!(conversation = %self.id, round = rounds + 1, speaker = %agent.name, "turn");
            if let Err(e) = self
                .executor
                .run_turn(agent, &self.participants, &mut self.transcript)
                .await
            {
                break (ConversationStatus::Failed, Some(e.to_string()));
            }
            rounds += 1;

            // the opening request is never a signal, even though the proxy posts it
            let accepted = agent.is_human_proxy
                && self.transcript.last_content_bearing().is_some_and(|latest| {
                    latest.role == Role::Assistant
                        && latest.speaker == agent.name
                        && self.termination.is_satisfied_by(latest)
                });
            if accepted {
                break (ConversationStatus::TerminatedBySignal, None);
            }
            last_speaker = Some(speaker);
        };

        let artifact = match status {
            ConversationStatus::TerminatedBySignal | ConversationStatus::TerminatedByRoundLimit => {
                self.artifact
                    .as_ref()
                    .and_then(|contract| contract.extract(&self.transcript))
            }
            _ => None,
        };

        match &error {
            Some(reason) => warn!(conversation = %self.id, %status, rounds, error = %reason, "conversation stopped"),
            None => info!(conversation = %self.id, %status, rounds, "conversation finished"),
        }

        ConversationOutcome {
            id: self.id,
            status,
            rounds,
            max_rounds: self.max_rounds,
            transcript: self.transcript,
            artifact,
            error,
        }
    }
}
