use async_trait::async_trait;
use serde_json::{json, Value};
use triage_agent::{AgentTool, ToolExecutionResult};
use triage_ai::ToolDefinition;

use super::issue_number_property;
use crate::error::{tool_failure, tool_success, ToolError, ToolErrorKind};
use crate::request::{TriageToolRequest, SET_SUGGESTED_LABELS};

/// Echo of the model's suggestion; nothing is written to GitHub.
pub(super) fn suggested_labels_payload(issue_number: u64, suggested_labels: &[String]) -> Value {
    json!({
        "issueNumber": issue_number,
        "suggestedLabels": suggested_labels,
        "message": format!(
            "Set {} suggested labels for issue #{issue_number}",
            suggested_labels.len()
        ),
    })
}

pub struct SetSuggestedLabelsTool;

#[async_trait]
impl AgentTool for SetSuggestedLabelsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: SET_SUGGESTED_LABELS.to_string(),
            description: "Set your suggested labels for a specific issue after analyzing it. Call this to provide your label suggestions.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "issueNumber": issue_number_property("The issue number you are suggesting labels for"),
                    "suggestedLabels": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Label names that you suggest for this issue"
                    }
                },
                "required": ["issueNumber", "suggestedLabels"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        match TriageToolRequest::parse(SET_SUGGESTED_LABELS, &arguments) {
            Ok(TriageToolRequest::SetSuggestedLabels {
                issue_number,
                suggested_labels,
            }) => tool_success(suggested_labels_payload(issue_number, &suggested_labels)),
            Ok(other) => tool_failure(ToolError::new(
                ToolErrorKind::InternalError,
                format!("unexpected request for {}", other.tool_name()),
            )),
            Err(error) => tool_failure(error),
        }
    }
}
