use std::fmt;

use crate::GatewayError;

pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_GITHUB_GRAPHQL_URL: &str = "https://api.github.com/graphql";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, GatewayError> {
        let owner = owner.into().trim().to_string();
        let name = name.into().trim().to_string();
        if owner.is_empty() || name.is_empty() || owner.contains('/') || name.contains('/') {
            return Err(GatewayError::InvalidConfig(format!(
                "invalid repository '{owner}/{name}', expected owner/repo"
            )));
        }
        Ok(Self { owner, name })
    }

    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        let (owner, name) = raw.trim().split_once('/').ok_or_else(|| {
            GatewayError::InvalidConfig(format!("invalid repository '{raw}', expected owner/repo"))
        })?;
        Self::new(owner, name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone)]
/// Connection settings for [`crate::GithubGateway`], built once at start-up.
pub struct GatewayConfig {
    pub api_base: String,
    pub graphql_url: String,
    /// Empty means unauthenticated requests.
    pub token: String,
    pub repo: RepoRef,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
    /// Page cap applied when a listing does not pass its own.
    pub page_limit: usize,
}

impl GatewayConfig {
    pub fn for_repo(repo: RepoRef, token: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_GITHUB_API_BASE.to_string(),
            graphql_url: DEFAULT_GITHUB_GRAPHQL_URL.to_string(),
            token: token.into(),
            repo,
            request_timeout_ms: 10_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
            page_limit: 10,
        }
    }
}
