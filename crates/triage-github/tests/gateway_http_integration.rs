use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use httpmock::prelude::*;
use serde_json::{json, Value};
use triage_github::{
    GatewayConfig, GatewayError, GithubGateway, IssueQuery, IssueStateFilter, RepoRef,
};

fn gateway_for(server: &MockServer, page_limit: usize) -> GithubGateway {
    let mut config = GatewayConfig::for_repo(RepoRef::parse("owner/repo").expect("repo"), "token");
    config.api_base = server.base_url();
    config.graphql_url = format!("{}/graphql", server.base_url());
    config.request_timeout_ms = 2_000;
    config.retry_max_attempts = 2;
    config.retry_base_delay_ms = 1;
    config.page_limit = page_limit;
    GithubGateway::new(config).expect("gateway")
}

fn issue_json(number: u64, pull_request: bool) -> Value {
    let mut issue = json!({
        "number": number,
        "title": format!("Issue {number}"),
        "body": "body",
        "state": "open",
        "state_reason": null,
        "created_at": "2026-01-01T00:00:00Z",
        "updated_at": "2026-01-02T00:00:00Z",
        "labels": [{"name": "bug", "color": "d73a4a"}],
        "user": {"login": "alice"},
        "assignees": [],
        "comments": 0
    });
    if pull_request {
        issue["pull_request"] = json!({"url": format!("https://example.test/pulls/{number}")});
    }
    issue
}

fn issue_page(start: u64, count: u64) -> Value {
    Value::Array(
        (start..start + count)
            .map(|number| issue_json(number, number % 10 == 0))
            .collect(),
    )
}

#[tokio::test]
async fn integration_list_issues_pages_until_short_page_and_drops_pull_requests() {
    let server = MockServer::start();
    let first = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/owner/repo/issues")
            .query_param("state", "open")
            .query_param("per_page", "100")
            .query_param("page", "1")
            .query_param("since", "2026-01-01T00:00:00Z")
            .header("authorization", "Bearer token");
        then.status(200).json_body(issue_page(1, 100));
    });
    let second = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/owner/repo/issues")
            .query_param("page", "2");
        then.status(200).json_body(issue_page(101, 5));
    });
    let third = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/owner/repo/issues")
            .query_param("page", "3");
        then.status(200).json_body(json!([]));
    });

    let gateway = gateway_for(&server, 10);
    let since = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("since");
    let issues = gateway
        .list_issues(&IssueQuery::open_since(since))
        .await
        .expect("list issues");

    first.assert_calls(1);
    second.assert_calls(1);
    third.assert_calls(0);
    // 105 items, of which #10..#100 (10 entries) are pull requests.
    assert_eq!(issues.len(), 95);
    assert!(issues.iter().all(|issue| issue.number % 10 != 0));
}

#[tokio::test]
async fn functional_list_issues_stops_at_page_limit() {
    let server = MockServer::start();
    let full_pages = server.mock(|when, then| {
        when.method(GET).path("/repos/owner/repo/issues");
        then.status(200).json_body(issue_page(1, 100));
    });

    let gateway = gateway_for(&server, 3);
    let issues = gateway
        .list_issues(&IssueQuery {
            state: IssueStateFilter::All,
            ..IssueQuery::default()
        })
        .await
        .expect("list issues");

    full_pages.assert_calls(3);
    assert_eq!(issues.len(), 270);
}

#[tokio::test]
async fn integration_get_issue_maps_404_to_not_found() {
    let server = MockServer::start();
    let missing = server.mock(|when, then| {
        when.method(GET).path("/repos/owner/repo/issues/999999");
        then.status(404).json_body(json!({"message": "Not Found"}));
    });

    let error = gateway_for(&server, 1)
        .get_issue(999_999)
        .await
        .expect_err("missing issue");

    missing.assert_calls(1);
    assert!(error.is_not_found(), "unexpected error: {error}");
}

#[tokio::test]
async fn integration_set_labels_replaces_full_label_set() {
    let server = MockServer::start();
    let put = server.mock(|when, then| {
        when.method(PUT)
            .path("/repos/owner/repo/issues/5/labels")
            .json_body(json!({"labels": ["bug", "ui"]}));
        then.status(200).json_body(json!([
            {"name": "bug", "color": "d73a4a"},
            {"name": "ui", "color": "00ff00"}
        ]));
    });

    gateway_for(&server, 1)
        .set_labels(5, &["bug".to_string(), "ui".to_string()])
        .await
        .expect("set labels");

    put.assert_calls(1);
}

#[tokio::test]
async fn regression_set_labels_surfaces_github_message_on_validation_failure() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(PUT).path("/repos/owner/repo/issues/5/labels");
        then.status(422)
            .json_body(json!({"message": "Validation Failed"}));
    });

    let error = gateway_for(&server, 1)
        .set_labels(5, &["nope".to_string()])
        .await
        .expect_err("validation failure");

    match error {
        GatewayError::GitHubApi { status, message, .. } => {
            assert_eq!(status, 422);
            assert_eq!(message, "Validation Failed");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn integration_request_retries_server_errors_once_then_succeeds() {
    let server = MockServer::start();
    let failing = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/owner/repo/issues/3")
            .header("x-triage-retry-attempt", "0");
        then.status(502).body("bad gateway");
    });
    let succeeding = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/owner/repo/issues/3")
            .header("x-triage-retry-attempt", "1");
        then.status(200).json_body(issue_json(3, false));
    });

    let issue = gateway_for(&server, 1).get_issue(3).await.expect("issue");

    failing.assert_calls(1);
    succeeding.assert_calls(1);
    assert_eq!(issue.number, 3);
}

#[tokio::test]
async fn regression_hung_request_fails_at_deadline_without_retrying() {
    let server = MockServer::start();
    let slow = server.mock(|when, then| {
        when.method(GET).path("/repos/owner/repo/issues/42");
        then.status(200)
            .delay(Duration::from_millis(1_500))
            .json_body(issue_json(42, false));
    });
    let mut config = GatewayConfig::for_repo(RepoRef::parse("owner/repo").expect("repo"), "token");
    config.api_base = server.base_url();
    config.request_timeout_ms = 300;
    config.retry_max_attempts = 3;
    config.retry_base_delay_ms = 50;
    let gateway = GithubGateway::new(config).expect("gateway");

    let started = Instant::now();
    let error = gateway.get_issue(42).await.expect_err("deadline");

    assert!(
        matches!(error, GatewayError::Timeout { timeout_ms: 300, .. }),
        "unexpected error: {error}"
    );
    assert!(started.elapsed() < Duration::from_millis(1_200));
    slow.assert_calls(1);
}

#[tokio::test]
async fn functional_list_labels_paginates_and_keeps_descriptions() {
    let server = MockServer::start();
    let labels: Vec<Value> = (0..100)
        .map(|index| json!({"name": format!("label-{index}"), "color": "ffffff", "description": null}))
        .collect();
    let first = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/owner/repo/labels")
            .query_param("page", "1");
        then.status(200).json_body(Value::Array(labels));
    });
    let second = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/owner/repo/labels")
            .query_param("page", "2");
        then.status(200).json_body(json!([
            {"name": "info needed", "color": "fbca04", "description": "Waiting on reporter"}
        ]));
    });

    let labels = gateway_for(&server, 10).list_labels().await.expect("labels");

    first.assert_calls(1);
    second.assert_calls(1);
    assert_eq!(labels.len(), 101);
    assert_eq!(
        labels[100].description.as_deref(),
        Some("Waiting on reporter")
    );
}

#[tokio::test]
async fn integration_list_issues_without_status_filters_project_items() {
    let server = MockServer::start();
    let graphql = server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .body_includes("IssuesWithProjectFields");
        then.status(200).json_body(json!({
            "data": {"repository": {"issues": {
                "pageInfo": {"hasNextPage": false, "endCursor": null},
                "nodes": [
                    {
                        "number": 1, "title": "untracked", "url": "u1", "body": "", "state": "OPEN",
                        "createdAt": "2026-01-01T00:00:00Z", "author": null,
                        "labels": {"nodes": []}, "assignees": {"nodes": []},
                        "comments": {"totalCount": 0},
                        "projectItems": {"nodes": []}
                    },
                    {
                        "number": 2, "title": "has status", "url": "u2", "body": "", "state": "OPEN",
                        "createdAt": "2026-01-01T00:00:00Z", "author": {"login": "a"},
                        "labels": {"nodes": []}, "assignees": {"nodes": []},
                        "comments": {"totalCount": 0},
                        "projectItems": {"nodes": [{"fieldValues": {"nodes": [
                            {"name": "Backlog", "field": {"name": "Status"}}
                        ]}}]}
                    },
                    {
                        "number": 3, "title": "missing status", "url": "u3", "body": "", "state": "OPEN",
                        "createdAt": "2026-01-01T00:00:00Z", "author": {"login": "b"},
                        "labels": {"nodes": [{"name": "bug", "color": "d73a4a"}]},
                        "assignees": {"nodes": []},
                        "comments": {"totalCount": 4},
                        "projectItems": {"nodes": [{"fieldValues": {"nodes": [
                            {"text": "missing status", "field": {"name": "Title"}}
                        ]}}]}
                    }
                ]
            }}}
        }));
    });

    let issues = gateway_for(&server, 5)
        .list_issues_without_status()
        .await
        .expect("issues without status");

    graphql.assert_calls(1);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].number, 3);
    assert_eq!(issues[0].comment_count, 4);
}

#[tokio::test]
async fn integration_list_discussions_returns_total_count() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .body_includes("Discussions");
        then.status(200).json_body(json!({
            "data": {"repository": {"discussions": {
                "totalCount": 42,
                "nodes": [{
                    "id": "D_kwDO1",
                    "title": "How do I start R?",
                    "body": "Python starts instead",
                    "url": "https://github.com/owner/repo/discussions/1",
                    "createdAt": "2026-01-01T00:00:00Z",
                    "closed": false,
                    "isAnswered": null,
                    "author": {"login": "carol", "avatarUrl": "https://a", "url": "https://u"},
                    "comments": {"totalCount": 1, "nodes": [{
                        "body": "Same here",
                        "createdAt": "2026-01-02T00:00:00Z",
                        "author": {"login": "dave", "avatarUrl": "https://a", "url": "https://u"}
                    }]}
                }]
            }}}
        }));
    });

    let page = gateway_for(&server, 1)
        .list_discussions(20)
        .await
        .expect("discussions");

    assert_eq!(page.total_count, 42);
    assert_eq!(page.discussions.len(), 1);
    assert!(!page.discussions[0].is_answered);
    assert_eq!(page.discussions[0].comments[0].body, "Same here");
}

#[tokio::test]
async fn integration_get_discussion_maps_null_node_to_not_found() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .body_includes("DiscussionById");
        then.status(200).json_body(json!({
            "data": {"node": null},
            "errors": [{"type": "NOT_FOUND", "message": "Could not resolve to a node with the global id of 'nope'"}]
        }));
    });

    let error = gateway_for(&server, 1)
        .get_discussion("nope")
        .await
        .expect_err("missing discussion");

    assert!(error.is_not_found(), "unexpected error: {error}");
}

#[tokio::test]
async fn regression_graphql_errors_surface_as_api_failures() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(200).json_body(json!({
            "data": null,
            "errors": [{"message": "Field 'bogus' doesn't exist"}]
        }));
    });

    let error = gateway_for(&server, 1)
        .list_discussions(5)
        .await
        .expect_err("graphql error");

    assert!(matches!(error, GatewayError::GraphQl { .. }));
    assert!(error.to_string().contains("bogus"));
}

#[tokio::test]
async fn integration_timeline_and_body_update_round_trip() {
    let server = MockServer::start();
    let timeline = server.mock(|when, then| {
        when.method(GET).path("/repos/owner/repo/issues/8/timeline");
        then.status(200).json_body(json!([
            {"event": "labeled", "created_at": "2026-01-02T00:00:00Z", "actor": {"login": "alice"}, "label": {"name": "bug"}},
            {"sha": "abc", "author": {"name": "Bob", "date": "2026-01-03T00:00:00Z"}}
        ]));
    });
    let patch = server.mock(|when, then| {
        when.method(PATCH)
            .path("/repos/owner/repo/issues/8")
            .json_body(json!({"body": "updated"}));
        then.status(200).json_body(issue_json(8, false));
    });

    let gateway = gateway_for(&server, 1);
    let events = gateway.list_timeline_events(8).await.expect("timeline");
    gateway.update_issue_body(8, "updated").await.expect("patch");

    timeline.assert_calls(1);
    patch.assert_calls(1);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].label.as_deref(), Some("bug"));
    assert_eq!(events[1].event, "commit");
}
