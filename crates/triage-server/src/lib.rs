//! HTTP backend for the GitHub triage assistant.

mod bootstrap;
mod config;
mod error;
mod prompt;
mod routes;
mod state;
mod tool_demo;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;

pub use bootstrap::init_tracing;
pub use config::ServerConfig;
pub use prompt::{triage_system_prompt, LABEL_SUGGESTION_PROMPT};
pub use routes::{
    APPLY_LABELS_ENDPOINT, DISCUSSIONS_ENDPOINT, HEALTH_ENDPOINT, ISSUES_ENDPOINT,
    ISSUES_WITHOUT_STATUS_ENDPOINT, LABELS_ENDPOINT, SUGGEST_LABELS_ENDPOINT, TOOL_DEMO_ENDPOINT,
};
pub use state::{AgentSettings, AppState};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(HEALTH_ENDPOINT, get(routes::handle_health))
        .route(ISSUES_ENDPOINT, get(routes::handle_list_issues))
        .route(
            ISSUES_WITHOUT_STATUS_ENDPOINT,
            get(routes::handle_issues_without_status),
        )
        .route(LABELS_ENDPOINT, get(routes::handle_list_labels))
        .route(DISCUSSIONS_ENDPOINT, get(routes::handle_list_discussions))
        .route(APPLY_LABELS_ENDPOINT, post(routes::handle_apply_labels))
        .route(SUGGEST_LABELS_ENDPOINT, post(routes::handle_suggest_labels))
        .route(TOOL_DEMO_ENDPOINT, post(tool_demo::handle_tool_demo))
        .with_state(state)
}

/// Binds the configured address and serves until ctrl-c.
pub async fn run_server(config: ServerConfig) -> Result<()> {
    let bind_addr: SocketAddr = config
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.bind))?;
    let state = Arc::new(AppState::from_config(&config)?);
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind triage server on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve triage server address")?;
    tracing::info!(
        addr = %local_addr,
        repo = %state.gateway.repo(),
        model = %state.agent.model,
        "triage server listening"
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("triage server exited unexpectedly")?;
    Ok(())
}
