use clap::Parser;

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u32(value: &str) -> Result<u32, String> {
    let parsed = value
        .parse::<u32>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "triage-server",
    about = "GitHub issue and discussion triage assistant backend",
    version
)]
pub struct ServerConfig {
    #[arg(
        long,
        env = "TRIAGE_BIND",
        default_value = "127.0.0.1:3000",
        help = "Socket address the HTTP server binds to"
    )]
    pub bind: String,

    #[arg(
        long = "github-token",
        env = "GITHUB_TOKEN",
        default_value = "",
        hide_env_values = true,
        help = "GitHub token; requests are unauthenticated when empty"
    )]
    pub github_token: String,

    #[arg(
        long = "github-owner",
        env = "GITHUB_REPOSITORY_OWNER",
        default_value = "posit-dev"
    )]
    pub github_owner: String,

    #[arg(
        long = "github-repo",
        env = "GITHUB_REPOSITORY_NAME",
        default_value = "positron"
    )]
    pub github_repo: String,

    #[arg(
        long = "github-api-base",
        env = "TRIAGE_GITHUB_API_BASE",
        default_value = "https://api.github.com"
    )]
    pub github_api_base: String,

    #[arg(
        long = "github-graphql-url",
        env = "TRIAGE_GITHUB_GRAPHQL_URL",
        default_value = "https://api.github.com/graphql"
    )]
    pub github_graphql_url: String,

    #[arg(
        long = "request-timeout-ms",
        env = "TRIAGE_REQUEST_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64,
        help = "Timeout applied to every outbound HTTP request"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "retry-max-attempts",
        env = "TRIAGE_RETRY_MAX_ATTEMPTS",
        default_value_t = 3,
        value_parser = parse_positive_usize
    )]
    pub retry_max_attempts: usize,

    #[arg(
        long = "retry-base-delay-ms",
        env = "TRIAGE_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        value_parser = parse_positive_u64
    )]
    pub retry_base_delay_ms: u64,

    #[arg(
        long = "issue-page-limit",
        env = "TRIAGE_ISSUE_PAGE_LIMIT",
        default_value_t = 10,
        value_parser = parse_positive_usize,
        help = "Maximum pages of 100 issues fetched per listing"
    )]
    pub issue_page_limit: usize,

    #[arg(
        long = "recent-days",
        env = "TRIAGE_RECENT_DAYS",
        default_value_t = 7,
        value_parser = parse_positive_u64,
        help = "Window, in days, for the recent open issues listing"
    )]
    pub recent_days: u64,

    #[arg(
        long = "anthropic-api-key",
        env = "ANTHROPIC_API_KEY",
        default_value = "",
        hide_env_values = true
    )]
    pub anthropic_api_key: String,

    #[arg(
        long = "anthropic-api-base",
        env = "TRIAGE_ANTHROPIC_API_BASE",
        default_value = "https://api.anthropic.com/v1"
    )]
    pub anthropic_api_base: String,

    #[arg(
        long,
        env = "TRIAGE_MODEL",
        default_value = "claude-3-5-sonnet-latest"
    )]
    pub model: String,

    #[arg(
        long = "max-tokens",
        env = "TRIAGE_MAX_TOKENS",
        default_value_t = 4_096,
        value_parser = parse_positive_u32
    )]
    pub max_tokens: u32,

    #[arg(
        long = "max-steps",
        env = "TRIAGE_MAX_STEPS",
        default_value_t = 10,
        value_parser = parse_positive_usize,
        help = "Model requests allowed per tool-demo conversation turn"
    )]
    pub max_steps: usize,

    #[arg(
        long = "tool-timeout-ms",
        env = "TRIAGE_TOOL_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64
    )]
    pub tool_timeout_ms: u64,

    #[arg(
        long = "brave-api-key",
        env = "BRAVE_API_KEY",
        default_value = "",
        hide_env_values = true
    )]
    pub brave_api_key: String,

    #[arg(
        long = "brave-api-base",
        env = "TRIAGE_BRAVE_API_BASE",
        default_value = "https://api.search.brave.com"
    )]
    pub brave_api_base: String,
}
