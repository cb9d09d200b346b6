//! GitHub data endpoints and the single-shot label suggestion.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use triage_ai::{ChatRequest, Message};
use triage_github::{Issue, IssueQuery};

use crate::error::ApiError;
use crate::prompt::{LABEL_SUGGESTION_PROMPT, LABEL_SUGGESTION_TEMPERATURE};
use crate::state::AppState;

pub const HEALTH_ENDPOINT: &str = "/healthz";
pub const ISSUES_ENDPOINT: &str = "/api/github/issues";
pub const ISSUES_WITHOUT_STATUS_ENDPOINT: &str = "/api/github/issues-without-status";
pub const LABELS_ENDPOINT: &str = "/api/github/labels";
pub const DISCUSSIONS_ENDPOINT: &str = "/api/github/discussions";
pub const APPLY_LABELS_ENDPOINT: &str = "/api/github/apply-labels";
pub const SUGGEST_LABELS_ENDPOINT: &str = "/api/github/suggest-labels";
pub const TOOL_DEMO_ENDPOINT: &str = "/api/tool-demo";

const DISCUSSION_LIST_LIMIT: u32 = 20;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyLabelsRequest {
    issue_number: u64,
    labels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SuggestLabelsRequest {
    prompt: String,
}

pub(crate) fn parse_body<T>(body: &Bytes) -> Result<T, ApiError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_slice(body)
        .map_err(|error| ApiError::bad_request(format!("invalid request body: {error}")))
}

/// Start of the recency window, clamped to the earliest representable instant.
fn recent_window_start(now: DateTime<Utc>, days: u64) -> DateTime<Utc> {
    i64::try_from(days)
        .ok()
        .and_then(TimeDelta::try_days)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn issue_summary(issue: &Issue) -> Value {
    json!({
        "number": issue.number,
        "title": issue.title,
        "state": issue.state.as_str(),
        "created_at": issue.created_at,
        "body": issue.body,
        "labels": issue.labels,
    })
}

pub(crate) async fn handle_health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

pub(crate) async fn handle_list_issues(State(state): State<Arc<AppState>>) -> Response {
    let since = recent_window_start(Utc::now(), state.recent_days);
    match state.gateway.list_issues(&IssueQuery::open_since(since)).await {
        Ok(issues) => {
            let issues = issues.iter().map(issue_summary).collect::<Vec<_>>();
            Json(json!({ "total": issues.len(), "issues": issues })).into_response()
        }
        Err(error) => {
            tracing::error!(%error, "listing recent issues failed");
            ApiError::internal("Failed to fetch GitHub issues").into_response()
        }
    }
}

pub(crate) async fn handle_issues_without_status(State(state): State<Arc<AppState>>) -> Response {
    match state.gateway.list_issues_without_status().await {
        Ok(issues) => Json(json!({ "total": issues.len(), "issues": issues })).into_response(),
        Err(error) => {
            tracing::error!(%error, "listing issues without status failed");
            ApiError::internal("Failed to fetch GitHub issues without status").into_response()
        }
    }
}

pub(crate) async fn handle_list_labels(State(state): State<Arc<AppState>>) -> Response {
    match state.gateway.list_labels().await {
        Ok(labels) => Json(labels).into_response(),
        Err(error) => {
            tracing::error!(%error, "listing labels failed");
            ApiError::internal("Failed to fetch GitHub labels").into_response()
        }
    }
}

pub(crate) async fn handle_list_discussions(State(state): State<Arc<AppState>>) -> Response {
    match state.gateway.list_discussions(DISCUSSION_LIST_LIMIT).await {
        Ok(page) => Json(json!({
            "total": page.total_count,
            "discussions": page.discussions,
        }))
        .into_response(),
        Err(error) => {
            tracing::error!(%error, "listing discussions failed");
            ApiError::internal("Failed to fetch GitHub discussions").into_response()
        }
    }
}

pub(crate) async fn handle_apply_labels(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Response {
    let request = match parse_body::<ApplyLabelsRequest>(&body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    match state
        .gateway
        .set_labels(request.issue_number, &request.labels)
        .await
    {
        Ok(()) => {
            tracing::info!(
                issue_number = request.issue_number,
                labels = request.labels.len(),
                "labels applied"
            );
            Json(json!({ "success": true })).into_response()
        }
        Err(error) => {
            tracing::error!(issue_number = request.issue_number, %error, "applying labels failed");
            ApiError::internal("Failed to apply labels").into_response()
        }
    }
}

pub(crate) async fn handle_suggest_labels(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Response {
    let request = match parse_body::<SuggestLabelsRequest>(&body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    let chat = ChatRequest {
        model: state.agent.model.clone(),
        messages: vec![
            Message::system(LABEL_SUGGESTION_PROMPT),
            Message::user(request.prompt),
        ],
        tools: Vec::new(),
        max_tokens: Some(state.agent.max_tokens),
        temperature: Some(LABEL_SUGGESTION_TEMPERATURE),
    };
    match state.llm.complete(chat).await {
        Ok(response) => Json(json!({
            "role": "assistant",
            "content": response.message.text_content(),
        }))
        .into_response(),
        Err(error) => {
            tracing::error!(%error, "label suggestion request failed");
            ApiError::internal("Failed to process AI request").into_response()
        }
    }
}
