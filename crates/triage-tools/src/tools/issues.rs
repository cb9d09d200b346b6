use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use triage_agent::{AgentTool, ToolExecutionResult};
use triage_ai::ToolDefinition;
use triage_github::{Issue, IssueQuery, IssueSort, IssueStateFilter, SortDirection};

use super::{issue_number_property, run_tool, ToolContext};
use crate::error::ToolError;
use crate::request::{
    GET_DISCUSSION_BY_ID, GET_GITHUB_ISSUE, GET_REPOSITORY_LABELS, MAX_LABEL_SEARCH_LIMIT,
    SEARCH_ISSUES_BY_LABELS,
};

/// Chat-facing view of one issue.
pub(crate) fn issue_view(issue: &Issue) -> Value {
    json!({
        "number": issue.number,
        "title": issue.title,
        "body": issue.body,
        "state": issue.state.as_str(),
        "state_reason": issue.state_reason,
        "created_at": issue.created_at,
        "updated_at": issue.updated_at,
        "labels": issue.labels,
        "author": issue.author,
        "assignees": issue.assignees,
        "comments": issue.comments,
    })
}

fn search_hit_view(issue: &Issue) -> Value {
    json!({
        "number": issue.number,
        "title": issue.title,
        "body": issue.body,
        "state": issue.state.as_str(),
        "created_at": issue.created_at,
        "labels": issue.labels,
    })
}

pub(super) async fn get_github_issue(
    context: &ToolContext,
    issue_number: u64,
) -> Result<Value, ToolError> {
    let issue = context
        .gateway
        .get_issue(issue_number)
        .await
        .map_err(|error| {
            let not_found = error.is_not_found();
            let error = ToolError::from(error);
            if not_found {
                ToolError {
                    message: format!(
                        "Unable to fetch issue #{issue_number}. The issue might not exist."
                    ),
                    ..error
                }
            } else {
                error
            }
        })?;
    Ok(issue_view(&issue))
}

pub(super) async fn get_repository_labels(context: &ToolContext) -> Result<Value, ToolError> {
    let labels = context.gateway.list_labels().await?;
    if labels.is_empty() {
        return Err(ToolError::not_found(format!(
            "repository {} has no labels",
            context.gateway.repo()
        )));
    }
    Ok(json!(labels))
}

/// One query per label, merged by issue number.
///
/// GitHub's comma-joined `labels` filter matches issues carrying every label,
/// so a single combined query would give an intersection.
pub(super) async fn search_issues_by_labels(
    context: &ToolContext,
    labels: &[String],
    limit: usize,
) -> Result<Value, ToolError> {
    let mut merged: HashMap<u64, Issue> = HashMap::new();
    for label in labels {
        let query = IssueQuery {
            state: IssueStateFilter::All,
            labels: vec![label.clone()],
            since: None,
            page_limit: Some(1),
            sort: Some(IssueSort::Created),
            direction: Some(SortDirection::Desc),
        };
        for issue in context.gateway.list_issues(&query).await? {
            merged.entry(issue.number).or_insert(issue);
        }
    }

    let mut issues = merged.into_values().collect::<Vec<_>>();
    issues.sort_by(|left, right| {
        right
            .created_at
            .cmp(&left.created_at)
            .then_with(|| right.number.cmp(&left.number))
    });
    issues.truncate(limit.clamp(1, MAX_LABEL_SEARCH_LIMIT));

    let views = issues.iter().map(search_hit_view).collect::<Vec<_>>();
    Ok(json!({
        "total": views.len(),
        "issues": views,
    }))
}

pub(super) async fn get_discussion_by_id(
    context: &ToolContext,
    discussion_id: &str,
) -> Result<Value, ToolError> {
    let discussion = context
        .gateway
        .get_discussion(discussion_id)
        .await
        .map_err(ToolError::from)?;
    Ok(json!(discussion))
}

pub struct GetGithubIssueTool {
    context: ToolContext,
}

impl GetGithubIssueTool {
    pub fn new(context: ToolContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl AgentTool for GetGithubIssueTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: GET_GITHUB_ISSUE.to_string(),
            description: "Get a specific GitHub issue by its number".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "issueNumber": issue_number_property("The issue number to fetch")
                },
                "required": ["issueNumber"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        run_tool(&self.context, GET_GITHUB_ISSUE, &arguments).await
    }
}

pub struct GetRepositoryLabelsTool {
    context: ToolContext,
}

impl GetRepositoryLabelsTool {
    pub fn new(context: ToolContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl AgentTool for GetRepositoryLabelsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: GET_REPOSITORY_LABELS.to_string(),
            description: "Get all available labels in the repository".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        run_tool(&self.context, GET_REPOSITORY_LABELS, &arguments).await
    }
}

pub struct SearchIssuesByLabelsTool {
    context: ToolContext,
}

impl SearchIssuesByLabelsTool {
    pub fn new(context: ToolContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl AgentTool for SearchIssuesByLabelsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: SEARCH_ISSUES_BY_LABELS.to_string(),
            description: "Search for GitHub issues carrying any of the given labels. Returns most recent issues first.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "labels": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 1,
                        "description": "Label names to search for"
                    },
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": MAX_LABEL_SEARCH_LIMIT,
                        "description": "Number of issues to return (max 20)"
                    }
                },
                "required": ["labels", "limit"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        run_tool(&self.context, SEARCH_ISSUES_BY_LABELS, &arguments).await
    }
}

pub struct GetDiscussionByIdTool {
    context: ToolContext,
}

impl GetDiscussionByIdTool {
    pub fn new(context: ToolContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl AgentTool for GetDiscussionByIdTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: GET_DISCUSSION_BY_ID.to_string(),
            description: "Fetches a specific GitHub discussion by its ID".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "discussionId": {
                        "type": "string",
                        "minLength": 1,
                        "description": "The GitHub GraphQL node ID of the discussion"
                    }
                },
                "required": ["discussionId"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        run_tool(&self.context, GET_DISCUSSION_BY_ID, &arguments).await
    }
}
