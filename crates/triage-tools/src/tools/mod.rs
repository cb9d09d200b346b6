//! The triage tools offered to the model and their shared dispatch.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use triage_agent::{Agent, ToolExecutionResult};
use triage_github::GithubGateway;

use crate::error::{into_result, tool_failure};
use crate::request::TriageToolRequest;
use crate::search::BraveSearchClient;

mod activity;
mod categorize;
mod external;
mod issues;
mod labels;
mod status;

pub use activity::{summarize_activity, GetIssueActivityTool};
pub use categorize::{categorize_issue, CategorizeIssueTypeTool, Categorization};
pub use external::SearchExternalContentTool;
pub use issues::{
    GetDiscussionByIdTool, GetGithubIssueTool, GetRepositoryLabelsTool, SearchIssuesByLabelsTool,
};
pub use labels::SetSuggestedLabelsTool;
pub use status::SetIssueStatusTool;

/// Budget for the soft-failing tools before they fall back to degraded data.
pub const DEFAULT_ADVISORY_TIMEOUT_MS: u64 = 20_000;

#[derive(Clone)]
/// Collaborators shared by every triage tool.
pub struct ToolContext {
    pub gateway: Arc<GithubGateway>,
    pub search: Arc<BraveSearchClient>,
    /// Applies to `getIssueActivity` and `searchExternalContent`; keep it
    /// below the agent's tool timeout.
    pub advisory_timeout: Duration,
}

impl ToolContext {
    pub fn new(gateway: Arc<GithubGateway>, search: Arc<BraveSearchClient>) -> Self {
        Self {
            gateway,
            search,
            advisory_timeout: Duration::from_millis(DEFAULT_ADVISORY_TIMEOUT_MS),
        }
    }

    pub fn with_advisory_timeout(mut self, timeout: Duration) -> Self {
        self.advisory_timeout = timeout.max(Duration::from_millis(1));
        self
    }
}

/// Registers all nine triage tools on `agent`.
pub fn register_triage_tools(agent: &mut Agent, context: &ToolContext) {
    agent.register_tool(GetGithubIssueTool::new(context.clone()));
    agent.register_tool(GetRepositoryLabelsTool::new(context.clone()));
    agent.register_tool(SearchIssuesByLabelsTool::new(context.clone()));
    agent.register_tool(SetSuggestedLabelsTool);
    agent.register_tool(SetIssueStatusTool::new(context.clone()));
    agent.register_tool(CategorizeIssueTypeTool);
    agent.register_tool(GetIssueActivityTool::new(context.clone()));
    agent.register_tool(SearchExternalContentTool::new(context.clone()));
    agent.register_tool(GetDiscussionByIdTool::new(context.clone()));
}

pub async fn dispatch(context: &ToolContext, request: TriageToolRequest) -> ToolExecutionResult {
    let tool_name = request.tool_name();
    if request.mutates_github() {
        tracing::info!(tool = tool_name, "dispatching triage tool that writes to github");
    } else {
        tracing::debug!(tool = tool_name, "dispatching triage tool");
    }
    match request {
        TriageToolRequest::GetGithubIssue { issue_number } => {
            into_result(issues::get_github_issue(context, issue_number).await)
        }
        TriageToolRequest::GetRepositoryLabels => {
            into_result(issues::get_repository_labels(context).await)
        }
        TriageToolRequest::SearchIssuesByLabels { labels, limit } => {
            into_result(issues::search_issues_by_labels(context, &labels, limit).await)
        }
        TriageToolRequest::SetSuggestedLabels {
            issue_number,
            suggested_labels,
        } => into_result(Ok(labels::suggested_labels_payload(
            issue_number,
            &suggested_labels,
        ))),
        TriageToolRequest::SetIssueStatus {
            issue_number,
            current_status,
            suggested_status,
            reason,
        } => {
            status::set_issue_status(
                context,
                issue_number,
                current_status.as_deref(),
                suggested_status,
                &reason,
            )
            .await
        }
        TriageToolRequest::CategorizeIssueType { issue_content, .. } => {
            into_result(Ok(categorize::categorization_payload(&issue_content)))
        }
        TriageToolRequest::GetIssueActivity {
            issue_number,
            lookback_days,
        } => into_result(Ok(
            activity::issue_activity(context, issue_number, lookback_days).await,
        )),
        TriageToolRequest::SearchExternalContent(request) => {
            into_result(Ok(external::search_external_content(context, &request).await))
        }
        TriageToolRequest::GetDiscussionById { discussion_id } => {
            into_result(issues::get_discussion_by_id(context, &discussion_id).await)
        }
    }
}

/// Parses `arguments` for `tool_name` and runs the matching tool.
pub(crate) async fn run_tool(
    context: &ToolContext,
    tool_name: &str,
    arguments: &Value,
) -> ToolExecutionResult {
    match TriageToolRequest::parse(tool_name, arguments) {
        Ok(request) => dispatch(context, request).await,
        Err(error) => tool_failure(error),
    }
}

/// JSON schema fragment for an `issueNumber` argument.
pub(crate) fn issue_number_property(description: &str) -> Value {
    json!({
        "type": "integer",
        "minimum": 1,
        "description": description,
    })
}
