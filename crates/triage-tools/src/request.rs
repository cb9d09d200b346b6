//! Typed tool arguments, parsed by tool name.

use serde_json::Value;

use crate::error::ToolError;
use crate::status_workflow::IssueStatus;

pub const GET_GITHUB_ISSUE: &str = "getGithubIssue";
pub const GET_REPOSITORY_LABELS: &str = "getRepositoryLabels";
pub const SEARCH_ISSUES_BY_LABELS: &str = "searchIssuesByLabels";
pub const SET_SUGGESTED_LABELS: &str = "setSuggestedLabels";
pub const SET_ISSUE_STATUS: &str = "setIssueStatus";
pub const CATEGORIZE_ISSUE_TYPE: &str = "categorizeIssueType";
pub const GET_ISSUE_ACTIVITY: &str = "getIssueActivity";
pub const SEARCH_EXTERNAL_CONTENT: &str = "searchExternalContent";
pub const GET_DISCUSSION_BY_ID: &str = "getDiscussionById";

pub const MAX_LABEL_SEARCH_LIMIT: usize = 20;
pub const DEFAULT_LOOKBACK_DAYS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub enum TriageToolRequest {
    GetGithubIssue {
        issue_number: u64,
    },
    GetRepositoryLabels,
    SearchIssuesByLabels {
        labels: Vec<String>,
        limit: usize,
    },
    SetSuggestedLabels {
        issue_number: u64,
        suggested_labels: Vec<String>,
    },
    SetIssueStatus {
        issue_number: u64,
        current_status: Option<String>,
        suggested_status: IssueStatus,
        reason: String,
    },
    CategorizeIssueType {
        issue_number: u64,
        issue_content: String,
        current_labels: Vec<String>,
    },
    GetIssueActivity {
        issue_number: u64,
        lookback_days: u64,
    },
    SearchExternalContent(ExternalSearchRequest),
    GetDiscussionById {
        discussion_id: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalSearchRequest {
    pub query: String,
    pub country: String,
    pub search_lang: String,
    pub result_filter: Vec<String>,
    pub summary: bool,
}

impl TriageToolRequest {
    pub fn parse(tool_name: &str, arguments: &Value) -> Result<Self, ToolError> {
        let request = match tool_name {
            GET_GITHUB_ISSUE => Self::GetGithubIssue {
                issue_number: required_issue_number(arguments)?,
            },
            GET_REPOSITORY_LABELS => Self::GetRepositoryLabels,
            SEARCH_ISSUES_BY_LABELS => {
                let labels = required_string_list(arguments, "labels")?;
                if labels.is_empty() {
                    return Err(ToolError::validation(
                        "argument 'labels' must contain at least one label",
                    ));
                }
                let limit = required_u64(arguments, "limit")? as usize;
                if !(1..=MAX_LABEL_SEARCH_LIMIT).contains(&limit) {
                    return Err(ToolError::validation(format!(
                        "argument 'limit' must be between 1 and {MAX_LABEL_SEARCH_LIMIT}"
                    )));
                }
                Self::SearchIssuesByLabels { labels, limit }
            }
            SET_SUGGESTED_LABELS => Self::SetSuggestedLabels {
                issue_number: required_issue_number(arguments)?,
                suggested_labels: required_string_list(arguments, "suggestedLabels")?,
            },
            SET_ISSUE_STATUS => {
                let reason = required_string(arguments, "reason")?;
                if reason.trim().is_empty() {
                    return Err(ToolError::validation("argument 'reason' must not be empty"));
                }
                Self::SetIssueStatus {
                    issue_number: required_issue_number(arguments)?,
                    current_status: optional_string(arguments, "currentStatus")?,
                    suggested_status: IssueStatus::parse(&required_string(
                        arguments,
                        "suggestedStatus",
                    )?)?,
                    reason,
                }
            }
            CATEGORIZE_ISSUE_TYPE => Self::CategorizeIssueType {
                issue_number: required_issue_number(arguments)?,
                issue_content: required_string(arguments, "issueContent")?,
                current_labels: optional_string_list(arguments, "currentLabels")?,
            },
            GET_ISSUE_ACTIVITY => Self::GetIssueActivity {
                issue_number: required_issue_number(arguments)?,
                lookback_days: optional_u64(arguments, "lookbackPeriod")?
                    .unwrap_or(DEFAULT_LOOKBACK_DAYS),
            },
            SEARCH_EXTERNAL_CONTENT => Self::SearchExternalContent(ExternalSearchRequest {
                query: required_string(arguments, "query")?,
                country: optional_string(arguments, "country")?
                    .unwrap_or_else(|| "us".to_string()),
                search_lang: optional_string(arguments, "search_lang")?
                    .unwrap_or_else(|| "en".to_string()),
                result_filter: optional_string_list(arguments, "result_filter")?,
                summary: optional_bool(arguments, "summary")?.unwrap_or(true),
            }),
            GET_DISCUSSION_BY_ID => Self::GetDiscussionById {
                discussion_id: required_string(arguments, "discussionId")?,
            },
            other => {
                return Err(ToolError::validation(format!(
                    "Tool '{other}' is not registered"
                )))
            }
        };
        Ok(request)
    }

    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::GetGithubIssue { .. } => GET_GITHUB_ISSUE,
            Self::GetRepositoryLabels => GET_REPOSITORY_LABELS,
            Self::SearchIssuesByLabels { .. } => SEARCH_ISSUES_BY_LABELS,
            Self::SetSuggestedLabels { .. } => SET_SUGGESTED_LABELS,
            Self::SetIssueStatus { .. } => SET_ISSUE_STATUS,
            Self::CategorizeIssueType { .. } => CATEGORIZE_ISSUE_TYPE,
            Self::GetIssueActivity { .. } => GET_ISSUE_ACTIVITY,
            Self::SearchExternalContent(_) => SEARCH_EXTERNAL_CONTENT,
            Self::GetDiscussionById { .. } => GET_DISCUSSION_BY_ID,
        }
    }

    /// Whether executing the request writes to GitHub.
    pub fn mutates_github(&self) -> bool {
        matches!(self, Self::SetIssueStatus { .. })
    }
}

fn required_issue_number(arguments: &Value) -> Result<u64, ToolError> {
    let number = required_u64(arguments, "issueNumber")?;
    if number == 0 {
        return Err(ToolError::validation(
            "argument 'issueNumber' must be a positive integer",
        ));
    }
    Ok(number)
}

fn required_u64(arguments: &Value, key: &str) -> Result<u64, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| ToolError::validation(format!("missing required integer argument '{key}'")))
}

fn optional_u64(arguments: &Value, key: &str) -> Result<Option<u64>, ToolError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| {
            ToolError::validation(format!("optional argument '{key}' must be an integer"))
        }),
    }
}

fn required_string(arguments: &Value, key: &str) -> Result<String, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| ToolError::validation(format!("missing required string argument '{key}'")))
}

fn optional_string(arguments: &Value, key: &str) -> Result<Option<String>, ToolError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(ToolError::validation(format!(
            "optional argument '{key}' must be a string"
        ))),
    }
}

fn optional_bool(arguments: &Value, key: &str) -> Result<Option<bool>, ToolError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(value)) => Ok(Some(*value)),
        Some(_) => Err(ToolError::validation(format!(
            "optional argument '{key}' must be a boolean"
        ))),
    }
}

fn required_string_list(arguments: &Value, key: &str) -> Result<Vec<String>, ToolError> {
    let Some(values) = arguments.get(key).and_then(Value::as_array) else {
        return Err(ToolError::validation(format!(
            "missing required string array argument '{key}'"
        )));
    };
    values
        .iter()
        .map(|value| {
            value.as_str().map(ToOwned::to_owned).ok_or_else(|| {
                ToolError::validation(format!("argument '{key}' must only contain strings"))
            })
        })
        .collect()
}

fn optional_string_list(arguments: &Value, key: &str) -> Result<Vec<String>, ToolError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(_) => required_string_list(arguments, key),
    }
}
