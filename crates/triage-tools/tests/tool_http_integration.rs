use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use httpmock::prelude::*;
use serde_json::{json, Value};
use triage_agent::{Agent, AgentConfig, AgentTool, RunOutcome};
use triage_ai::{
    ChatRequest, ChatResponse, ChatUsage, ContentBlock, LlmClient, Message, MessageRole, ToolCall,
    TriageAiError,
};
use triage_github::{GatewayConfig, GithubGateway, RepoRef};
use triage_tools::{
    register_triage_tools, BraveSearchClient, BraveSearchConfig, GetDiscussionByIdTool,
    GetGithubIssueTool, GetIssueActivityTool, GetRepositoryLabelsTool, SearchExternalContentTool,
    SearchIssuesByLabelsTool, SetIssueStatusTool, ToolContext,
};

fn gateway_for(server: &MockServer) -> Arc<GithubGateway> {
    let mut config = GatewayConfig::for_repo(RepoRef::parse("owner/repo").expect("repo"), "token");
    config.api_base = server.base_url();
    config.graphql_url = format!("{}/graphql", server.base_url());
    config.request_timeout_ms = 2_000;
    config.retry_max_attempts = 1;
    config.retry_base_delay_ms = 1;
    Arc::new(GithubGateway::new(config).expect("gateway"))
}

fn slow_gateway_for(server: &MockServer, request_timeout_ms: u64) -> Arc<GithubGateway> {
    let mut config = GatewayConfig::for_repo(RepoRef::parse("owner/repo").expect("repo"), "token");
    config.api_base = server.base_url();
    config.graphql_url = format!("{}/graphql", server.base_url());
    config.request_timeout_ms = request_timeout_ms;
    config.retry_max_attempts = 3;
    config.retry_base_delay_ms = 50;
    Arc::new(GithubGateway::new(config).expect("gateway"))
}

fn search_client(api_base: String) -> Arc<BraveSearchClient> {
    Arc::new(
        BraveSearchClient::new(BraveSearchConfig {
            api_base,
            api_key: "brave-key".to_string(),
            request_timeout_ms: 1_000,
        })
        .expect("search client"),
    )
}

fn context_for(server: &MockServer) -> ToolContext {
    ToolContext::new(gateway_for(server), search_client(server.base_url()))
}

fn timestamp(days_ago: i64) -> String {
    (Utc::now() - Duration::days(days_ago) - Duration::hours(1))
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn issue_json(number: u64, state_reason: Value, created_at: &str, labels: Value) -> Value {
    json!({
        "number": number,
        "title": format!("Issue {number}"),
        "body": "Steps to reproduce",
        "state": if state_reason.is_null() { "open" } else { "closed" },
        "state_reason": state_reason,
        "created_at": created_at,
        "updated_at": created_at,
        "labels": labels,
        "user": {"login": "reporter"},
        "assignees": [],
        "comments": 2
    })
}

#[tokio::test]
async fn integration_get_github_issue_reports_not_found_for_missing_issue() {
    let server = MockServer::start();
    let missing = server.mock(|when, then| {
        when.method(GET).path("/repos/owner/repo/issues/999999");
        then.status(404).json_body(json!({"message": "Not Found"}));
    });

    let result = GetGithubIssueTool::new(context_for(&server))
        .execute(json!({"issueNumber": 999999}))
        .await;

    missing.assert();
    assert!(result.is_error);
    assert_eq!(result.content["success"], false);
    assert_eq!(result.content["error"]["code"], "NOT_FOUND");
    assert_eq!(
        result.content["error"]["message"],
        "Unable to fetch issue #999999. The issue might not exist."
    );
}

#[tokio::test]
async fn functional_get_github_issue_returns_chat_view() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/repos/owner/repo/issues/12");
        then.status(200).json_body(issue_json(
            12,
            Value::Null,
            "2026-01-05T10:00:00Z",
            json!(["needs triage", {"name": "bug", "color": "d73a4a"}]),
        ));
    });

    let result = GetGithubIssueTool::new(context_for(&server))
        .execute(json!({"issueNumber": 12}))
        .await;

    assert!(!result.is_error);
    let data = &result.content["data"];
    assert_eq!(data["number"], 12);
    assert_eq!(data["state"], "open");
    assert_eq!(data["author"], "reporter");
    assert_eq!(
        data["labels"],
        json!([
            {"name": "needs triage", "color": "default"},
            {"name": "bug", "color": "d73a4a"}
        ])
    );
}

#[tokio::test]
async fn integration_issue_activity_flags_stale_issue_without_events() {
    let server = MockServer::start();
    let updated_at = timestamp(10);
    server.mock(|when, then| {
        when.method(GET).path("/repos/owner/repo/issues/42");
        then.status(200)
            .json_body(issue_json(42, Value::Null, &updated_at, json!([])));
    });
    let timeline = server.mock(|when, then| {
        when.method(GET).path("/repos/owner/repo/issues/42/timeline");
        then.status(200).json_body(json!([]));
    });

    let result = GetIssueActivityTool::new(context_for(&server))
        .execute(json!({"issueNumber": 42, "lookbackPeriod": 7}))
        .await;

    timeline.assert();
    assert!(!result.is_error);
    let data = &result.content["data"];
    assert_eq!(data["daysSinceLastUpdate"], 10);
    assert_eq!(data["needsAttention"], true);
    assert_eq!(data["attentionReason"], "Issue has been inactive for 10 days");
    assert_eq!(data["activityTimeline"], json!([]));
}

#[tokio::test]
async fn regression_issue_activity_degrades_when_github_fails() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/repos/owner/repo/issues/5");
        then.status(404).json_body(json!({"message": "Not Found"}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/repos/owner/repo/issues/5/timeline");
        then.status(404).json_body(json!({"message": "Not Found"}));
    });

    let result = GetIssueActivityTool::new(context_for(&server))
        .execute(json!({"issueNumber": 5}))
        .await;

    assert!(!result.is_error);
    let data = &result.content["data"];
    assert_eq!(data["lastUpdateDate"], Value::Null);
    assert_eq!(data["participantCount"], 0);
    assert_eq!(data["needsAttention"], true);
    assert!(data["attentionReason"]
        .as_str()
        .is_some_and(|reason| reason.starts_with("Error retrieving activity: ")));
}

#[tokio::test]
async fn regression_hung_issue_fetch_degrades_activity_inside_tool_timeout() {
    let server = MockServer::start();
    let slow = server.mock(|when, then| {
        when.method(GET).path("/repos/owner/repo/issues/42");
        then.status(200)
            .delay(StdDuration::from_millis(2_000))
            .json_body(issue_json(42, Value::Null, &timestamp(1), json!([])));
    });
    server.mock(|when, then| {
        when.method(GET).path("/repos/owner/repo/issues/42/timeline");
        then.status(200).json_body(json!([]));
    });
    let context = ToolContext::new(
        slow_gateway_for(&server, 1_000),
        search_client(server.base_url()),
    );
    let client = ScriptedClient::with_responses(vec![
        tool_call_response("call-1", "getIssueActivity", json!({"issueNumber": 42})),
        text_response("Issue 42 needs a look."),
    ]);
    let mut agent = Agent::new(
        client,
        AgentConfig {
            tool_timeout_ms: 3_000,
            ..AgentConfig::default()
        },
    );
    register_triage_tools(&mut agent, &context);

    let run = agent.prompt("How active is issue 42?").await.expect("run");

    slow.assert_calls(1);
    assert_eq!(run.outcome, RunOutcome::Completed);
    let tool_message = run
        .new_messages
        .iter()
        .find(|message| message.role == MessageRole::Tool)
        .expect("tool result");
    assert!(!tool_message.is_error);
    let envelope: Value = serde_json::from_str(&tool_message.text_content()).expect("envelope");
    assert_eq!(envelope["success"], true);
    assert_eq!(envelope["data"]["needsAttention"], true);
    assert_eq!(envelope["data"]["lastUpdateDate"], Value::Null);
}

#[tokio::test]
async fn regression_issue_activity_stops_waiting_at_advisory_timeout() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/repos/owner/repo/issues/7");
        then.status(200)
            .delay(StdDuration::from_millis(1_500))
            .json_body(issue_json(7, Value::Null, &timestamp(1), json!([])));
    });
    server.mock(|when, then| {
        when.method(GET).path("/repos/owner/repo/issues/7/timeline");
        then.status(200).json_body(json!([]));
    });
    let context = context_for(&server).with_advisory_timeout(StdDuration::from_millis(200));

    let started = std::time::Instant::now();
    let result = GetIssueActivityTool::new(context)
        .execute(json!({"issueNumber": 7}))
        .await;

    assert!(started.elapsed() < StdDuration::from_millis(1_200));
    assert!(!result.is_error);
    let data = &result.content["data"];
    assert_eq!(data["needsAttention"], true);
    assert!(data["attentionReason"]
        .as_str()
        .is_some_and(|reason| reason.contains("timed out after 200ms")));
}

#[tokio::test]
async fn regression_get_github_issue_timeout_is_reported_as_github_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/repos/owner/repo/issues/3");
        then.status(200)
            .delay(StdDuration::from_millis(1_000))
            .json_body(issue_json(3, Value::Null, &timestamp(1), json!([])));
    });
    let context = ToolContext::new(slow_gateway_for(&server, 200), search_client(server.base_url()));

    let result = GetGithubIssueTool::new(context)
        .execute(json!({"issueNumber": 3}))
        .await;

    assert!(result.is_error);
    assert_eq!(result.content["error"]["code"], "GITHUB_API_ERROR");
}

#[tokio::test]
async fn regression_done_guard_blocks_write_for_non_completed_issue() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/repos/owner/repo/issues/77");
        then.status(200).json_body(issue_json(
            77,
            json!("not_planned"),
            "2026-01-05T10:00:00Z",
            json!([]),
        ));
    });
    let patch = server.mock(|when, then| {
        when.method(PATCH).path("/repos/owner/repo/issues/77");
        then.status(200).json_body(json!({}));
    });

    let result = SetIssueStatusTool::new(context_for(&server))
        .execute(json!({
            "issueNumber": 77,
            "currentStatus": "In Verification",
            "suggestedStatus": "Done",
            "reason": "Verified on nightly"
        }))
        .await;

    patch.assert_calls(0);
    assert!(result.is_error);
    assert_eq!(result.content["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(
        result.content["error"]["message"],
        "Failed to update status: Cannot set status to Done for non-completed issues"
    );
    assert_eq!(
        result.content["error"]["details"],
        json!({"previousStatus": "In Verification", "newStatus": "In Verification"})
    );
}

#[tokio::test]
async fn integration_set_issue_status_appends_annotation_without_checking_state_reason() {
    let server = MockServer::start();
    let fetch = server.mock(|when, then| {
        when.method(GET).path("/repos/owner/repo/issues/31");
        then.status(200).json_body(issue_json(
            31,
            json!("not_planned"),
            "2026-01-05T10:00:00Z",
            json!([]),
        ));
    });
    let patch = server.mock(|when, then| {
        when.method(PATCH)
            .path("/repos/owner/repo/issues/31")
            .json_body(json!({
                "body": "Steps to reproduce\n\nStatus: In Progress\nReason: Fix underway"
            }));
        then.status(200).json_body(issue_json(
            31,
            json!("not_planned"),
            "2026-01-05T10:00:00Z",
            json!([]),
        ));
    });

    let result = SetIssueStatusTool::new(context_for(&server))
        .execute(json!({
            "issueNumber": 31,
            "currentStatus": null,
            "suggestedStatus": "In Progress",
            "reason": "Fix underway"
        }))
        .await;

    fetch.assert();
    patch.assert();
    assert!(!result.is_error, "unexpected failure: {}", result.as_text());
    assert_eq!(
        result.content["data"],
        json!({
            "success": true,
            "previousStatus": "",
            "newStatus": "In Progress",
            "message": "Successfully updated issue #31 status to \"In Progress\". Reason: Fix underway"
        })
    );
}

#[tokio::test]
async fn integration_search_by_labels_unions_per_label_queries_newest_first() {
    let server = MockServer::start();
    let bugs = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/owner/repo/issues")
            .query_param("labels", "bug")
            .query_param("state", "all")
            .query_param("sort", "created")
            .query_param("direction", "desc");
        then.status(200).json_body(json!([
            issue_json(3, Value::Null, "2026-01-03T00:00:00Z", json!(["bug"])),
            issue_json(1, Value::Null, "2026-01-01T00:00:00Z", json!(["bug", "docs"])),
        ]));
    });
    let docs = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/owner/repo/issues")
            .query_param("labels", "docs");
        then.status(200).json_body(json!([
            issue_json(4, Value::Null, "2026-01-04T00:00:00Z", json!(["docs"])),
            issue_json(1, Value::Null, "2026-01-01T00:00:00Z", json!(["bug", "docs"])),
        ]));
    });

    let result = SearchIssuesByLabelsTool::new(context_for(&server))
        .execute(json!({"labels": ["bug", "docs"], "limit": 2}))
        .await;

    bugs.assert();
    docs.assert();
    assert!(!result.is_error);
    let data = &result.content["data"];
    assert_eq!(data["total"], 2);
    let numbers = data["issues"]
        .as_array()
        .expect("issues")
        .iter()
        .map(|issue| issue["number"].as_u64().unwrap_or_default())
        .collect::<Vec<_>>();
    assert_eq!(numbers, vec![4, 3]);
}

#[tokio::test]
async fn regression_empty_label_set_is_reported_as_not_found() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/repos/owner/repo/labels");
        then.status(200).json_body(json!([]));
    });

    let result = GetRepositoryLabelsTool::new(context_for(&server))
        .execute(json!({}))
        .await;

    assert!(result.is_error);
    assert_eq!(result.content["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn integration_get_discussion_returns_discussion_payload() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .body_includes("DiscussionById")
            .body_includes("D_kwDO9");
        then.status(200).json_body(json!({
            "data": {"node": {
                "id": "D_kwDO9",
                "title": "Kernel selection",
                "body": "Which interpreter is used?",
                "url": "https://github.com/owner/repo/discussions/9",
                "createdAt": "2026-01-01T00:00:00Z",
                "closed": false,
                "isAnswered": true,
                "author": {"login": "carol", "avatarUrl": "https://a", "url": "https://u"},
                "comments": {"totalCount": 0, "nodes": []}
            }}
        }));
    });

    let result = GetDiscussionByIdTool::new(context_for(&server))
        .execute(json!({"discussionId": "D_kwDO9"}))
        .await;

    assert!(!result.is_error, "unexpected failure: {}", result.as_text());
    assert_eq!(result.content["data"]["id"], "D_kwDO9");
    assert_eq!(result.content["data"]["isAnswered"], true);
}

#[tokio::test]
async fn integration_external_search_follows_summarizer_key() {
    let server = MockServer::start();
    let search = server.mock(|when, then| {
        when.method(GET)
            .path("/res/v1/web/search")
            .query_param("q", "positron plots blank")
            .query_param("summary", "1")
            .query_param("country", "us")
            .query_param("search_lang", "en")
            .query_param("result_filter", "web,discussions")
            .header("x-subscription-token", "brave-key");
        then.status(200).json_body(json!({
            "web": {"results": [{"title": "Plots pane", "url": "https://example.test"}]},
            "summarizer": {"key": "sum-key"}
        }));
    });
    let summarizer = server.mock(|when, then| {
        when.method(GET)
            .path("/res/v1/summarizer/search")
            .query_param("key", "sum-key")
            .query_param("entity_info", "1");
        then.status(200).json_body(json!({
            "summary": [{"type": "token", "data": "Known rendering issue"}],
            "entities": [{"name": "Positron"}]
        }));
    });

    let result = SearchExternalContentTool::new(context_for(&server))
        .execute(json!({
            "query": "positron plots blank",
            "result_filter": ["web", "discussions"]
        }))
        .await;

    search.assert();
    summarizer.assert();
    let data = &result.content["data"];
    assert_eq!(data["webResults"][0]["title"], "Plots pane");
    assert_eq!(data["summary"][0]["data"], "Known rendering issue");
    assert_eq!(data["entities"][0]["name"], "Positron");
}

#[tokio::test]
async fn regression_unreachable_search_provider_returns_empty_results() {
    let server = MockServer::start();
    let context = ToolContext::new(
        gateway_for(&server),
        search_client("http://127.0.0.1:9".to_string()),
    );

    let result = SearchExternalContentTool::new(context)
        .execute(json!({"query": "anything"}))
        .await;

    assert!(!result.is_error);
    let data = &result.content["data"];
    assert_eq!(data["webResults"], json!([]));
    assert_eq!(data["summary"], Value::Null);
    assert_eq!(data["entities"], json!([]));
    assert!(data["error"].as_str().is_some_and(|error| !error.is_empty()));
}

#[tokio::test]
async fn regression_search_http_error_skips_summarizer() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/res/v1/web/search");
        then.status(429).json_body(json!({"error": "rate limited"}));
    });
    let summarizer = server.mock(|when, then| {
        when.method(GET).path("/res/v1/summarizer/search");
        then.status(200).json_body(json!({}));
    });

    let result = SearchExternalContentTool::new(context_for(&server))
        .execute(json!({"query": "anything"}))
        .await;

    summarizer.assert_calls(0);
    assert_eq!(
        result.content["data"]["error"],
        "Brave Search API error: Too Many Requests"
    );
}

struct ScriptedClient {
    responses: Mutex<VecDeque<ChatResponse>>,
}

impl ScriptedClient {
    fn with_responses(responses: Vec<ChatResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
        })
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, TriageAiError> {
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .ok_or_else(|| TriageAiError::InvalidResponse("script exhausted".to_string()))
    }
}

fn text_response(text: &str) -> ChatResponse {
    ChatResponse {
        message: Message::assistant_text(text),
        finish_reason: Some("end_turn".to_string()),
        usage: ChatUsage::default(),
    }
}

fn tool_call_response(id: &str, name: &str, arguments: Value) -> ChatResponse {
    ChatResponse {
        message: Message::assistant_blocks(vec![ContentBlock::tool_call(ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        })]),
        finish_reason: Some("tool_use".to_string()),
        usage: ChatUsage::default(),
    }
}

struct UnusedClient;

#[async_trait]
impl LlmClient for UnusedClient {
    async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, TriageAiError> {
        Err(TriageAiError::InvalidResponse("not used".to_string()))
    }
}

#[test]
fn unit_register_triage_tools_exposes_all_nine_tools_with_strict_schemas() {
    let server = MockServer::start();
    let mut agent = Agent::new(Arc::new(UnusedClient), AgentConfig::default());
    register_triage_tools(&mut agent, &context_for(&server));

    assert_eq!(
        agent.registered_tool_names(),
        vec![
            "getGithubIssue",
            "getRepositoryLabels",
            "searchIssuesByLabels",
            "setSuggestedLabels",
            "setIssueStatus",
            "categorizeIssueType",
            "getIssueActivity",
            "searchExternalContent",
            "getDiscussionById",
        ]
    );
    for definition in agent.tool_definitions() {
        assert_eq!(
            definition.parameters["additionalProperties"],
            false,
            "{} must reject unknown arguments",
            definition.name
        );
    }
}
