//! The travel-planning team: roles, their tools, the phase order and the proxy that
//! accepts the finished itinerary on the traveller's behalf.

use anyhow::Result;
use async_trait::async_trait;
use indoc::formatdoc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum_macros::{Display, EnumString};

use crate::agent::{AgentDescriptor, Backend};
use crate::conversation::{ArtifactContract, TERMINATION_TOKEN};
use crate::errors::ConversationError;
use crate::prompt_template::load_prompt_file;
use crate::providers::base::{Completion, PromptContext, Provider, Usage};
use crate::selector::Rotation;
use crate::tools::clock::{ClockTool, CLOCK_TOOL};
use crate::tools::itinerary::{ItineraryFormatTool, FORMAT_TOOL, ITINERARY_SENTINEL};
use crate::tools::search::{SearchTool, SEARCH_TOOL};
use crate::tools::ToolRegistry;

pub const USER_PROXY: &str = "User_Proxy";
pub const REQUIREMENTS_ANALYST: &str = "Travel_Requirements_Analyst";
pub const DESTINATION_RESEARCHER: &str = "Destination_Researcher";
pub const ACTIVITY_PLANNER: &str = "Activity_Planner";
pub const LOGISTICS_COORDINATOR: &str = "Logistics_Coordinator";
pub const ITINERARY_COMPILER: &str = "Itinerary_Compiler";
pub const REVIEW_AGENT: &str = "Review_And_Refinement_Agent";

/// Capability tier of the backend a role speaks through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Primary,
    Secondary,
}

#[derive(Debug, Clone)]
pub struct CrewBackends {
    pub primary: Backend,
    pub secondary: Backend,
}

impl CrewBackends {
    pub fn new(primary: Backend, secondary: Backend) -> Self {
        Self { primary, secondary }
    }

    /// Every role on the same backend
    pub fn uniform(backend: Backend) -> Self {
        Self::new(backend.clone(), backend)
    }

    pub fn for_tier(&self, tier: ModelTier) -> Backend {
        match tier {
            ModelTier::Primary => self.primary.clone(),
            ModelTier::Secondary => self.secondary.clone(),
        }
    }
}

/// Per-request facts baked into the role instructions
#[derive(Debug, Clone, Serialize)]
pub struct CrewContext {
    pub current_date: String,
    pub search_enabled: bool,
    pub format_tool: &'static str,
}

impl CrewContext {
    pub fn new<S: Into<String>>(current_date: S, search_enabled: bool) -> Self {
        Self {
            current_date: current_date.into(),
            search_enabled,
            format_tool: FORMAT_TOOL,
        }
    }
}

struct Role {
    name: &'static str,
    description: &'static str,
    template: &'static str,
    tier: ModelTier,
    tools: &'static [&'static str],
}

const ROLES: [Role; 6] = [
    Role {
        name: REQUIREMENTS_ANALYST,
        description: "Clarifies and summarises the traveller's requirements",
        template: "crew/requirements_analyst.md",
        tier: ModelTier::Primary,
        tools: &[],
    },
    Role {
        name: DESTINATION_RESEARCHER,
        description: "Researches destinations, seasons, entry points and practicalities",
        template: "crew/destination_researcher.md",
        tier: ModelTier::Primary,
        tools: &[SEARCH_TOOL, CLOCK_TOOL],
    },
    Role {
        name: ACTIVITY_PLANNER,
        description: "Suggests activities, attractions and dining with cost estimates",
        template: "crew/activity_planner.md",
        tier: ModelTier::Primary,
        tools: &[SEARCH_TOOL],
    },
    Role {
        name: LOGISTICS_COORDINATOR,
        description: "Advises on transport, accommodation areas and getting around",
        template: "crew/logistics_coordinator.md",
        tier: ModelTier::Primary,
        tools: &[SEARCH_TOOL],
    },
    Role {
        name: ITINERARY_COMPILER,
        description: "Compiles the day-by-day itinerary and presents the formatted plan",
        template: "crew/itinerary_compiler.md",
        tier: ModelTier::Primary,
        tools: &[FORMAT_TOOL],
    },
    Role {
        name: REVIEW_AGENT,
        description: "Reviews draft itineraries against the requirements",
        template: "crew/review_agent.md",
        tier: ModelTier::Secondary,
        tools: &[],
    },
];

fn render_role(template: &str, context: &CrewContext) -> Result<String, ConversationError> {
    load_prompt_file(template, context).map_err(|e| {
        ConversationError::InvalidConfiguration(format!("failed to render {}: {}", template, e))
    })
}

/// Fresh descriptors for one request. The proxy comes first, then the roles in phase order.
pub fn travel_crew(
    backends: &CrewBackends,
    context: &CrewContext,
) -> Result<Vec<AgentDescriptor>, ConversationError> {
    let proxy = AgentDescriptor::new(
        USER_PROXY,
        render_role("crew/user_proxy.md", context)?,
        Backend::new(Arc::new(ProxyConfirmation::new())),
    )
    .with_description("Represents the traveller and accepts the final itinerary")
    .human_proxy();

    let mut crew = vec![proxy];
    for role in &ROLES {
        crew.push(
            AgentDescriptor::new(
                role.name,
                render_role(role.template, context)?,
                backends.for_tier(role.tier),
            )
            .with_description(role.description)
            .with_tools(role.tools.iter().copied()),
        );
    }
    Ok(crew)
}

/// Requirements, research, activities, logistics, compile, review, compile, then the
/// proxy confirms
pub fn phase_rotation() -> Rotation {
    Rotation::phases([
        REQUIREMENTS_ANALYST,
        DESTINATION_RESEARCHER,
        ACTIVITY_PLANNER,
        LOGISTICS_COORDINATOR,
        ITINERARY_COMPILER,
        REVIEW_AGENT,
        ITINERARY_COMPILER,
        USER_PROXY,
    ])
}

pub fn artifact_contract() -> ArtifactContract {
    ArtifactContract::new(ITINERARY_COMPILER, ITINERARY_SENTINEL)
}

pub fn tool_registry(search: SearchTool, clock: ClockTool) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(search));
    registry.register(Arc::new(clock));
    registry.register(Arc::new(ItineraryFormatTool::new()));
    registry
}

/// The opening message the proxy posts on the traveller's behalf
pub fn kickoff(request: &str) -> String {
    formatdoc! {"
        Hello team, I need your help planning a trip. Here's my initial thought: '{request}'.
        {analyst} should start by clarifying the details.
        {compiler} is responsible for drafting the plan, getting it reviewed by {reviewer}, \
        then calling the '{format_tool}' tool and presenting the formatted output from that tool to me.
        I ({proxy}) will end the conversation once I receive the complete formatted itinerary.",
        request = request.trim(),
        analyst = REQUIREMENTS_ANALYST,
        compiler = ITINERARY_COMPILER,
        reviewer = REVIEW_AGENT,
        format_tool = FORMAT_TOOL,
        proxy = USER_PROXY,
    }
}

/// Deterministic backend for the user proxy: accepts once the compiler's latest message
/// carries a formatted itinerary, and asks the team to continue otherwise.
pub struct ProxyConfirmation {
    producer: String,
    sentinel: String,
}

impl Default for ProxyConfirmation {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyConfirmation {
    pub fn new() -> Self {
        Self {
            producer: ITINERARY_COMPILER.to_string(),
            sentinel: ITINERARY_SENTINEL.to_string(),
        }
    }

    fn has_final_plan(&self, context: &PromptContext) -> bool {
        context
            .messages
            .iter()
            .rev()
            .find(|m| m.speaker == self.producer && m.is_content_bearing())
            .is_some_and(|m| m.tool_call.is_none() && m.content.contains(&self.sentinel))
    }
}

#[async_trait]
impl Provider for ProxyConfirmation {
    fn model(&self) -> &str {
        "user-proxy"
    }

    async fn complete(&self, context: &PromptContext) -> Result<(Completion, Usage)> {
        let reply = if self.has_final_plan(context) {
            format!(
                "Thank you, team. The formatted itinerary is exactly what I needed. {}",
                TERMINATION_TOKEN
            )
        } else {
            format!(
                "Thanks, everyone. I have not received the formatted itinerary yet. \
                 {}, please finalise the plan, call {} and present its output to me.",
                self.producer, FORMAT_TOOL
            )
        };
        Ok((Completion::text(reply), Usage::default()))
    }
}
