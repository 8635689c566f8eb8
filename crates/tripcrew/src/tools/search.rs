use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use super::{string_arg, ToolHandler};
use crate::errors::{ToolError, ToolResult};
use crate::models::tool::Tool;

pub const SEARCH_TOOL: &str = "search_web";
pub const TAVILY_HOST: &str = "https://api.tavily.com";
pub const DEFAULT_MAX_RESULTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// A web search backend
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

pub struct TavilySearch {
    client: Client,
    host: String,
    api_key: String,
}

impl TavilySearch {
    pub fn new(host: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            host: host.into(),
            api_key: api_key.into(),
        })
    }
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let url = format!("{}/search", self.host.trim_end_matches('/'));
        let payload = json!({
            "api_key": self.api_key,
            "query": query,
            "search_depth": "basic",
            "max_results": max_results,
        });

        let response = self.client.post(&url).json(&payload).send().await?;
        match response.status() {
            StatusCode::OK => {
                let body: TavilyResponse = response.json().await?;
                Ok(body
                    .results
                    .into_iter()
                    .map(|r| SearchHit {
                        title: r.title,
                        url: r.url,
                        snippet: r.content,
                    })
                    .collect())
            }
            status => Err(anyhow!("Search request failed: {}", status)),
        }
    }
}

/// The `search_web` tool. Without a provider it runs in degraded mode and
/// tells the agents to answer from their own knowledge.
pub struct SearchTool {
    spec: Tool,
    provider: Option<Arc<dyn SearchProvider>>,
    default_max_results: usize,
}

impl SearchTool {
    pub fn new(provider: Option<Arc<dyn SearchProvider>>) -> Self {
        Self {
            spec: Tool::new(
                SEARCH_TOOL,
                "Searches the web and returns the top results with title, url and a snippet.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "What to search for"},
                        "max_results": {"type": "integer", "description": "How many results to return", "default": DEFAULT_MAX_RESULTS}
                    },
                    "required": ["query"]
                }),
            ),
            provider,
            default_max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// A search tool with no provider configured
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn with_default_max_results(mut self, max_results: usize) -> Self {
        self.default_max_results = max_results.max(1);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    pub fn degraded_response(query: &str) -> String {
        format!(
            "(Web-search disabled) please answer from internal knowledge: {}",
            query
        )
    }
}

pub fn format_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No results found.".to_string();
    }
    hits.iter()
        .map(|hit| format!("• {} – {}\n  {}", hit.title, hit.url, hit.snippet))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl ToolHandler for SearchTool {
    fn spec(&self) -> &Tool {
        &self.spec
    }

    async fn invoke(&self, arguments: Value) -> ToolResult<String> {
        let Some(provider) = &self.provider else {
            let query = arguments
                .get("query")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            return Ok(Self::degraded_response(query.trim()));
        };

        let query = string_arg(&arguments, "query")?.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidParameters(
                "search_web needs a non-empty 'query'".to_string(),
            ));
        }

        let max_results = arguments
            .get("max_results")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(self.default_max_results)
            .clamp(1, 10);

        match provider.search(query, max_results).await {
            Ok(hits) => Ok(format_hits(&hits)),
            Err(e) => {
                warn!(error = %e, query, "search_web failed");
                Err(ToolError::ExecutionError(format!("Error in search_web: {}", e)))
            }
        }
    }
}
