use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use triage_ai::{
    AnthropicClient, AnthropicConfig, ChatRequest, ChatResponse, LlmClient, TriageAiError,
};
use triage_github::{GatewayConfig, GithubGateway, RepoRef};
use triage_tools::{BraveSearchClient, BraveSearchConfig, ToolContext};

use crate::ServerConfig;

#[derive(Debug, Clone)]
/// Model settings applied to every conversation.
pub struct AgentSettings {
    pub model: String,
    pub max_steps: usize,
    pub max_tokens: u32,
    pub tool_timeout_ms: u64,
}

#[derive(Clone)]
/// Immutable collaborators shared by all request handlers.
pub struct AppState {
    pub gateway: Arc<GithubGateway>,
    pub llm: Arc<dyn LlmClient>,
    pub search: Arc<BraveSearchClient>,
    pub agent: AgentSettings,
    /// Window for the recent open issues listing.
    pub recent_days: u64,
}

impl AppState {
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let repo = RepoRef::new(&config.github_owner, &config.github_repo)
            .context("invalid repository settings")?;
        let mut gateway_config = GatewayConfig::for_repo(repo, config.github_token.clone());
        gateway_config.api_base = config.github_api_base.clone();
        gateway_config.graphql_url = config.github_graphql_url.clone();
        gateway_config.request_timeout_ms = config.request_timeout_ms;
        gateway_config.retry_max_attempts = config.retry_max_attempts;
        gateway_config.retry_base_delay_ms = config.retry_base_delay_ms;
        gateway_config.page_limit = config.issue_page_limit;
        if config.github_token.trim().is_empty() {
            tracing::warn!("GITHUB_TOKEN is not set; GitHub requests are unauthenticated");
        }
        let gateway = GithubGateway::new(gateway_config).context("failed to build GitHub gateway")?;

        let llm: Arc<dyn LlmClient> = match AnthropicClient::new(AnthropicConfig {
            api_base: config.anthropic_api_base.clone(),
            api_key: config.anthropic_api_key.clone(),
            request_timeout_ms: 120_000,
            max_retries: 2,
            retry_budget_ms: 0,
            retry_jitter: true,
        }) {
            Ok(client) => Arc::new(client),
            Err(TriageAiError::MissingApiKey) => {
                tracing::warn!("ANTHROPIC_API_KEY is not set; model endpoints will fail");
                Arc::new(UnconfiguredLlm)
            }
            Err(error) => return Err(error).context("failed to build Anthropic client"),
        };

        if config.brave_api_key.trim().is_empty() {
            tracing::warn!("BRAVE_API_KEY is not set; external search will degrade");
        }
        let search = BraveSearchClient::new(BraveSearchConfig {
            api_base: config.brave_api_base.clone(),
            api_key: config.brave_api_key.clone(),
            request_timeout_ms: config.request_timeout_ms,
        })
        .context("failed to build search client")?;

        Ok(Self {
            gateway: Arc::new(gateway),
            llm,
            search: Arc::new(search),
            agent: AgentSettings {
                model: config.model.clone(),
                max_steps: config.max_steps,
                max_tokens: config.max_tokens,
                tool_timeout_ms: config.tool_timeout_ms,
            },
            recent_days: config.recent_days,
        })
    }

    /// Advisory tools get three quarters of the tool timeout so they can
    /// degrade before the agent gives up on the call.
    pub fn tool_context(&self) -> ToolContext {
        let advisory_ms = (self.agent.tool_timeout_ms.saturating_mul(3) / 4).max(1);
        ToolContext::new(self.gateway.clone(), self.search.clone())
            .with_advisory_timeout(Duration::from_millis(advisory_ms))
    }
}

/// Stand-in used when no Anthropic key is configured.
struct UnconfiguredLlm;

#[async_trait]
impl LlmClient for UnconfiguredLlm {
    async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, TriageAiError> {
        Err(TriageAiError::MissingApiKey)
    }
}
