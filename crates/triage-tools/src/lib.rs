//! The nine tools the triage assistant may call, plus the status workflow rules.
//!
//! Every tool answers with a JSON envelope: `{"success": true, "data": ...}`
//! or `{"success": false, "error": {"code", "message", "details"}}`.

mod error;
mod request;
mod search;
pub mod status_workflow;
mod tools;

pub use error::{tool_failure, tool_success, ToolError, ToolErrorKind};
pub use request::{
    ExternalSearchRequest, TriageToolRequest, CATEGORIZE_ISSUE_TYPE, GET_DISCUSSION_BY_ID,
    GET_GITHUB_ISSUE, GET_ISSUE_ACTIVITY, GET_REPOSITORY_LABELS, SEARCH_EXTERNAL_CONTENT,
    SEARCH_ISSUES_BY_LABELS, SET_ISSUE_STATUS, SET_SUGGESTED_LABELS,
};
pub use search::{BraveSearchClient, BraveSearchConfig, DEFAULT_BRAVE_API_BASE};
pub use status_workflow::{validate_transition, IssueStatus};
pub use tools::{
    categorize_issue, dispatch, register_triage_tools, summarize_activity, Categorization,
    CategorizeIssueTypeTool, GetDiscussionByIdTool, GetGithubIssueTool, GetIssueActivityTool,
    GetRepositoryLabelsTool, SearchExternalContentTool, SearchIssuesByLabelsTool,
    SetIssueStatusTool, SetSuggestedLabelsTool, ToolContext,
};
