//! Canonical records returned by the gateway, plus the raw shapes GitHub
//! sends over the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_LABEL_COLOR: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A label as attached to an issue.
pub struct IssueLabel {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A repository label definition.
pub struct Label {
    pub name: String,
    pub color: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: IssueState,
    pub state_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub labels: Vec<IssueLabel>,
    pub author: Option<String>,
    pub assignees: Vec<String>,
    pub comments: u64,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One entry of an issue timeline, flattened across event kinds.
pub struct TimelineEvent {
    pub event: String,
    pub occurred_at: Option<DateTime<Utc>>,
    pub actor: Option<String>,
    pub label: Option<String>,
    pub assignee: Option<String>,
    pub state_reason: Option<String>,
    pub commit_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionComment {
    pub author: Option<Actor>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discussion {
    pub id: String,
    pub title: String,
    pub body: String,
    pub url: String,
    pub author: Option<Actor>,
    pub created_at: DateTime<Utc>,
    pub closed: bool,
    pub is_answered: bool,
    pub comment_count: u64,
    pub comments: Vec<DiscussionComment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscussionPage {
    pub discussions: Vec<Discussion>,
    pub total_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// A project-board field value attached to an issue's project item.
pub struct ProjectFieldValue {
    pub field: Option<String>,
    pub text: Option<String>,
    pub name: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectItem {
    pub field_values: Vec<ProjectFieldValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Issue shape returned by the project-board join query.
pub struct ProjectIssue {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub state: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub author: Option<Actor>,
    pub labels: Vec<IssueLabel>,
    pub assignees: Vec<Actor>,
    pub comment_count: u64,
    pub project_items: Vec<ProjectItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawUser {
    pub(crate) login: String,
}

/// GitHub sometimes sends labels as bare names and sometimes as objects.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawLabel {
    Name(String),
    Object {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
}

impl RawLabel {
    pub(crate) fn into_issue_label(self) -> IssueLabel {
        match self {
            Self::Name(name) => IssueLabel {
                name,
                color: DEFAULT_LABEL_COLOR.to_string(),
            },
            Self::Object { name, color, .. } => IssueLabel {
                name: name.unwrap_or_default(),
                color: non_empty_color(color),
            },
        }
    }

    pub(crate) fn into_label(self) -> Label {
        match self {
            Self::Name(name) => Label {
                name,
                color: DEFAULT_LABEL_COLOR.to_string(),
                description: None,
            },
            Self::Object {
                name,
                color,
                description,
            } => Label {
                name: name.unwrap_or_default(),
                color: non_empty_color(color),
                description,
            },
        }
    }
}

fn non_empty_color(color: Option<String>) -> String {
    color
        .filter(|color| !color.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LABEL_COLOR.to_string())
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    state: IssueState,
    #[serde(default)]
    state_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    labels: Vec<RawLabel>,
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(default)]
    assignees: Vec<RawUser>,
    #[serde(default)]
    comments: u64,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    pull_request: Option<Value>,
}

impl RawIssue {
    pub(crate) fn is_pull_request(&self) -> bool {
        self.pull_request.as_ref().is_some_and(|marker| !marker.is_null())
    }

    pub(crate) fn normalize(self) -> Issue {
        let mut labels: Vec<IssueLabel> = Vec::with_capacity(self.labels.len());
        for label in self.labels.into_iter().map(RawLabel::into_issue_label) {
            if !label.name.is_empty() && !labels.iter().any(|seen| seen.name == label.name) {
                labels.push(label);
            }
        }
        Issue {
            number: self.number,
            title: self.title,
            body: self.body,
            state: self.state,
            state_reason: self.state_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
            labels,
            author: self.user.map(|user| user.login),
            assignees: self.assignees.into_iter().map(|user| user.login).collect(),
            comments: self.comments,
            html_url: self.html_url,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawNamed {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawCommitAuthor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawTimelineEvent {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    actor: Option<RawUser>,
    #[serde(default)]
    label: Option<RawNamed>,
    #[serde(default)]
    assignee: Option<RawUser>,
    #[serde(default)]
    state_reason: Option<String>,
    #[serde(default)]
    commit_id: Option<String>,
    #[serde(default)]
    author: Option<RawCommitAuthor>,
}

impl RawTimelineEvent {
    pub(crate) fn normalize(self) -> TimelineEvent {
        // Commit entries carry no `event`/`created_at`; their author block has both.
        let commit_author = self.author;
        TimelineEvent {
            event: self.event.unwrap_or_else(|| "commit".to_string()),
            occurred_at: self.created_at.or_else(|| {
                commit_author.as_ref().and_then(|author| author.date)
            }),
            actor: self.actor.map(|actor| actor.login).or_else(|| {
                commit_author.and_then(|author| author.name)
            }),
            label: self.label.and_then(|label| label.name),
            assignee: self.assignee.map(|assignee| assignee.login),
            state_reason: self.state_reason,
            commit_id: self.commit_id,
        }
    }
}
