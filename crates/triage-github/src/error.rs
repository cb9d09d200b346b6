use thiserror::Error;

#[derive(Debug, Error)]
/// Failures surfaced by [`crate::GithubGateway`]; never swallowed at this layer.
pub enum GatewayError {
    #[error("github {0}: not found")]
    NotFound(String),
    #[error("github api {operation} rejected credentials with status {status}: {message}")]
    Unauthorized {
        operation: String,
        status: u16,
        message: String,
    },
    #[error("github api {operation} failed with status {status}: {message}")]
    GitHubApi {
        operation: String,
        status: u16,
        message: String,
    },
    #[error("github graphql {operation} returned errors: {message}")]
    GraphQl { operation: String, message: String },
    #[error("github api {operation} request failed: {source}")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("github api {operation} did not complete within {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
    #[error("failed to decode github {operation}: {message}")]
    Decode { operation: String, message: String },
    #[error("invalid github gateway configuration: {0}")]
    InvalidConfig(String),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// HTTP status reported by GitHub, when the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound(_) => Some(404),
            Self::Unauthorized { status, .. } | Self::GitHubApi { status, .. } => Some(*status),
            Self::Transport { source, .. } => source.status().map(|status| status.as_u16()),
            Self::GraphQl { .. }
            | Self::Timeout { .. }
            | Self::Decode { .. }
            | Self::InvalidConfig(_) => None,
        }
    }
}
