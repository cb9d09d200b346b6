//! System prompts handed to the model.

use triage_tools::{
    IssueStatus, CATEGORIZE_ISSUE_TYPE, GET_DISCUSSION_BY_ID, GET_GITHUB_ISSUE,
    GET_ISSUE_ACTIVITY, GET_REPOSITORY_LABELS, SEARCH_EXTERNAL_CONTENT, SEARCH_ISSUES_BY_LABELS,
    SET_ISSUE_STATUS, SET_SUGGESTED_LABELS,
};

pub const LABEL_SUGGESTION_PROMPT: &str = "You are a helpful assistant that suggests GitHub issue labels based on issue content. Be concise and accurate in your suggestions.";

pub const LABEL_SUGGESTION_TEMPERATURE: f32 = 0.7;

/// Builds the triage assistant prompt around the repository's label names.
pub fn triage_system_prompt(labels: &[String]) -> String {
    let label_list = serde_json::to_string_pretty(labels).unwrap_or_else(|_| "[]".to_string());
    let statuses = IssueStatus::ALL
        .iter()
        .filter(|status| **status != IssueStatus::Unset)
        .map(|status| format!("\"{status}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let progression = status_progression();

    format!(
        "You are an assistant that helps maintainers triage GitHub issues and discussions.

Tools:
- {GET_GITHUB_ISSUE}: fetch one issue by number
- {GET_REPOSITORY_LABELS}: list the labels defined in the repository
- {SEARCH_ISSUES_BY_LABELS}: find recent issues carrying any of the given labels (at most 20)
- {SET_SUGGESTED_LABELS}: record the labels you suggest for an issue
- {SET_ISSUE_STATUS}: move an issue to a new workflow status
- {CATEGORIZE_ISSUE_TYPE}: classify issue text by type and technical area
- {GET_ISSUE_ACTIVITY}: summarize recent activity and staleness of an issue
- {SEARCH_EXTERNAL_CONTENT}: search the web for context on errors or related discussions
- {GET_DISCUSSION_BY_ID}: fetch one discussion by its GraphQL node id

Ask the user before calling a tool that changes an issue. Only call {SET_SUGGESTED_LABELS} when the user asks for it.

Status workflow:
- New issues have no status. Complete, clear issues move to \"Triage\".
- Usual order: {progression}.
- \"Done\" is only allowed for issues closed as completed.
- Valid statuses: {statuses}.

Labels:
- Only suggest labels that exist in the repository.
- Base suggestions on the issue content and on similar past issues.

Answer with a content summary, your analysis, the reasoning behind any suggestion, and the next steps for the user.

Available repository labels:
{label_list}"
    )
}

/// Statuses from triage to done; statuses sharing a rung are alternatives.
fn status_progression() -> String {
    let mut rungs: Vec<Vec<String>> = Vec::new();
    let mut last_index = None;
    for status in IssueStatus::ALL {
        if status == IssueStatus::Unset {
            continue;
        }
        let quoted = format!("\"{status}\"");
        match rungs.last_mut() {
            Some(rung) if last_index == Some(status.progression_index()) => rung.push(quoted),
            _ => rungs.push(vec![quoted]),
        }
        last_index = Some(status.progression_index());
    }
    rungs
        .iter()
        .map(|rung| rung.join(" or "))
        .collect::<Vec<_>>()
        .join(" -> ")
}
