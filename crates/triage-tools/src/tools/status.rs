use async_trait::async_trait;
use serde_json::{json, Value};
use triage_agent::{AgentTool, ToolExecutionResult};
use triage_ai::ToolDefinition;

use super::{issue_number_property, ToolContext};
use crate::error::{tool_failure, tool_success, ToolError};
use crate::request::{TriageToolRequest, SET_ISSUE_STATUS};
use crate::status_workflow::{annotate_body, validate_transition, IssueStatus};

fn status_failure(error: ToolError, current_status: Option<&str>) -> ToolExecutionResult {
    let previous = current_status.unwrap_or_default();
    tool_failure(
        error
            .with_context("Failed to update status")
            .with_details(json!({
                "previousStatus": previous,
                "newStatus": previous,
            })),
    )
}

/// Fetches the issue, applies the `Done` guard, then appends the status annotation.
///
/// The guard runs before any write, so a rejected transition leaves the
/// issue untouched.
pub(super) async fn set_issue_status(
    context: &ToolContext,
    issue_number: u64,
    current_status: Option<&str>,
    suggested_status: IssueStatus,
    reason: &str,
) -> ToolExecutionResult {
    let issue = match context.gateway.get_issue(issue_number).await {
        Ok(issue) => issue,
        Err(error) => return status_failure(ToolError::from(error), current_status),
    };

    if let Err(error) = validate_transition(suggested_status, issue.state_reason.as_deref()) {
        tracing::debug!(
            issue_number,
            status = %suggested_status,
            state_reason = issue.state_reason.as_deref().unwrap_or(""),
            "status transition rejected"
        );
        return status_failure(error, current_status);
    }

    let body = annotate_body(issue.body.as_deref(), suggested_status, reason);
    if let Err(error) = context.gateway.update_issue_body(issue_number, &body).await {
        return status_failure(ToolError::from(error), current_status);
    }

    tool_success(json!({
        "success": true,
        "previousStatus": current_status.unwrap_or_default(),
        "newStatus": suggested_status.as_str(),
        "message": format!(
            "Successfully updated issue #{issue_number} status to \"{suggested_status}\". Reason: {reason}"
        ),
    }))
}

pub struct SetIssueStatusTool {
    context: ToolContext,
}

impl SetIssueStatusTool {
    pub fn new(context: ToolContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl AgentTool for SetIssueStatusTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: SET_ISSUE_STATUS.to_string(),
            description: "Updates the status field of a GitHub issue based on workflow rules. Done is only allowed for issues closed as completed.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "issueNumber": issue_number_property("The GitHub issue number to update"),
                    "currentStatus": {
                        "type": ["string", "null"],
                        "description": "The current status value if any"
                    },
                    "suggestedStatus": {
                        "type": "string",
                        "enum": IssueStatus::allowed_values(),
                        "description": "The proposed new status value"
                    },
                    "reason": {
                        "type": "string",
                        "minLength": 1,
                        "description": "Justification for the status change"
                    }
                },
                "required": ["issueNumber", "currentStatus", "suggestedStatus", "reason"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let current_status = arguments.get("currentStatus").and_then(Value::as_str);
        match TriageToolRequest::parse(SET_ISSUE_STATUS, &arguments) {
            Ok(TriageToolRequest::SetIssueStatus {
                issue_number,
                current_status,
                suggested_status,
                reason,
            }) => {
                set_issue_status(
                    &self.context,
                    issue_number,
                    current_status.as_deref(),
                    suggested_status,
                    &reason,
                )
                .await
            }
            Ok(other) => status_failure(
                ToolError::validation(format!("unexpected request for {}", other.tool_name())),
                current_status,
            ),
            Err(error) => status_failure(error, current_status),
        }
    }
}
