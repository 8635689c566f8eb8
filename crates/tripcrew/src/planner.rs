use anyhow::Result;
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::Backend;
use crate::conversation::{ConversationBuilder, ConversationOutcome, ConversationStatus};
use crate::crew::{
    artifact_contract, kickoff, phase_rotation, tool_registry, travel_crew, CrewBackends,
    CrewContext, ModelTier, ITINERARY_COMPILER,
};
use crate::errors::PlanError;
use crate::executor::TurnExecutor;
use crate::models::message::Message;
use crate::providers::base::Provider;
use crate::providers::cache::CachedProvider;
use crate::providers::factory::get_provider;
use crate::selector::DelegatedSelection;
use crate::settings::{ConversationSettings, SelectionMode, Settings};
use crate::tools::clock::ClockTool;
use crate::tools::search::{SearchProvider, SearchTool, TavilySearch, DEFAULT_MAX_RESULTS};

/// Per-call hooks for a single plan
#[derive(Default)]
pub struct PlanOptions {
    /// Receives every transcript entry as it is appended
    pub observer: Option<UnboundedSender<Message>>,
    /// Checked between rounds
    pub cancel: Option<CancellationToken>,
}

/// What the caller gets back from [`Planner::plan`]. Anything other than a clean,
/// accepted plan carries an explanation in `error`.
#[derive(Debug)]
pub struct PlanReport {
    pub conversation_id: String,
    pub status: ConversationStatus,
    /// The formatted itinerary, without the sentinel
    pub artifact: Option<String>,
    pub error: Option<PlanError>,
    pub transcript_log: String,
    pub transcript: Vec<Message>,
    pub rounds: usize,
}

impl PlanReport {
    fn from_outcome(outcome: ConversationOutcome) -> Self {
        let error = match outcome.status {
            ConversationStatus::TerminatedBySignal if outcome.artifact.is_some() => None,
            ConversationStatus::TerminatedBySignal => Some(PlanError::ExtractionFailure {
                producer: ITINERARY_COMPILER.to_string(),
            }),
            ConversationStatus::TerminatedByRoundLimit => Some(PlanError::RoundLimitExceeded {
                max_rounds: outcome.max_rounds,
            }),
            ConversationStatus::Cancelled => Some(PlanError::Cancelled {
                rounds: outcome.rounds,
            }),
            ConversationStatus::Failed | ConversationStatus::Running => {
                Some(PlanError::ConversationFailure(
                    outcome
                        .error
                        .clone()
                        .unwrap_or_else(|| "the conversation stopped unexpectedly".to_string()),
                ))
            }
        };

        Self {
            transcript_log: outcome.transcript_log(),
            conversation_id: outcome.id,
            status: outcome.status,
            artifact: outcome.artifact,
            error,
            transcript: outcome.transcript.into_messages(),
            rounds: outcome.rounds,
        }
    }

    fn not_started(reason: String) -> Self {
        Self {
            conversation_id: String::new(),
            status: ConversationStatus::Failed,
            artifact: None,
            error: Some(PlanError::ConversationFailure(reason)),
            transcript_log: String::new(),
            transcript: Vec::new(),
            rounds: 0,
        }
    }

    /// Signal-terminated with an extracted itinerary
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn explanation(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

/// Entry point for turning a free-text trip request into an itinerary.
///
/// A planner only holds configuration. Every call builds a fresh crew and transcript,
/// so concurrent plans never share conversation state.
pub struct Planner {
    backends: CrewBackends,
    decider: Backend,
    search: Option<Arc<dyn SearchProvider>>,
    search_max_results: usize,
    fixed_date: Option<NaiveDate>,
    conversation: ConversationSettings,
}

impl Planner {
    pub fn new(backends: CrewBackends) -> Self {
        Self {
            decider: backends.primary.clone(),
            backends,
            search: None,
            search_max_results: DEFAULT_MAX_RESULTS,
            fixed_date: None,
            conversation: ConversationSettings::default(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = settings.conversation.turn_timeout();
        let backend = |tier: ModelTier| -> Result<Backend> {
            let mut provider: Arc<dyn Provider> = get_provider(
                settings.provider.provider_type,
                settings.provider.config_for(tier),
            )?;
            if settings.cache.enabled {
                if let Some(dir) = settings.cache.dir() {
                    provider = Arc::new(CachedProvider::new(provider, settings.cache.seed, dir));
                }
            }
            Ok(Backend::new(provider).with_timeout(timeout))
        };

        let backends = CrewBackends::new(backend(ModelTier::Primary)?, backend(ModelTier::Secondary)?);
        let mut planner = Self::new(backends).with_conversation_settings(settings.conversation.clone());

        match &settings.search.api_key {
            Some(key) => {
                let provider = TavilySearch::new(settings.search.base_url.clone(), key.clone())?;
                planner = planner.with_search(Arc::new(provider));
            }
            None => info!("no search api key configured, web search runs in degraded mode"),
        }
        planner.search_max_results = settings.search.max_results;
        Ok(planner)
    }

    pub fn with_search(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(provider);
        self
    }

    /// Backend used to pick speakers in [`SelectionMode::Auto`]
    pub fn with_decider(mut self, decider: Backend) -> Self {
        self.decider = decider;
        self
    }

    pub fn with_conversation_settings(mut self, conversation: ConversationSettings) -> Self {
        self.conversation = conversation;
        self
    }

    /// Report this date from the clock tool instead of today
    pub fn with_fixed_date(mut self, date: NaiveDate) -> Self {
        self.fixed_date = Some(date);
        self
    }

    pub async fn plan(&self, request: &str) -> PlanReport {
        self.plan_with(request, PlanOptions::default()).await
    }

    pub async fn plan_with(&self, request: &str, options: PlanOptions) -> PlanReport {
        if request.trim().is_empty() {
            return PlanReport::not_started("the trip request is empty".to_string());
        }

        let clock = match self.fixed_date {
            Some(date) => ClockTool::fixed(date),
            None => ClockTool::new(),
        };
        let search = SearchTool::new(self.search.clone())
            .with_default_max_results(self.search_max_results);
        let context = CrewContext::new(clock.now(), search.is_enabled());
        let participants = match travel_crew(&self.backends, &context) {
            Ok(participants) => participants,
            Err(e) => return PlanReport::not_started(e.to_string()),
        };

        let executor = TurnExecutor::new(tool_registry(search, clock))
            .with_context_messages(self.conversation.context_messages)
            .with_max_tool_calls(self.conversation.max_tool_calls_per_turn);

        let mut builder = ConversationBuilder::new(participants)
            .executor(executor)
            .artifact(artifact_contract())
            .max_rounds(self.conversation.max_rounds);
        builder = match self.conversation.selection {
            SelectionMode::Rotation => builder.selector(phase_rotation()),
            SelectionMode::Auto => builder.selector(
                DelegatedSelection::new(self.decider.clone(), phase_rotation())
                    .with_context_messages(self.conversation.context_messages),
            ),
        };
        if let Some(observer) = options.observer {
            builder = builder.observer(observer);
        }
        if let Some(cancel) = options.cancel {
            builder = builder.cancel_token(cancel);
        }

        let conversation = match builder.build() {
            Ok(conversation) => conversation,
            Err(e) => return PlanReport::not_started(e.to_string()),
        };
        info!(
            conversation = %conversation.id(),
            participants = conversation.participants().len(),
            selection = %self.conversation.selection,
            "planning trip"
        );

        PlanReport::from_outcome(conversation.run(kickoff(request)).await)
    }
}
