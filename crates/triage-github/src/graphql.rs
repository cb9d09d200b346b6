use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::model::RawLabel;
use crate::{
    Actor, Discussion, DiscussionComment, DiscussionPage, GatewayError, GithubGateway,
    ProjectFieldValue, ProjectIssue, ProjectItem,
};

const STATUS_FIELD_NAME: &str = "Status";
const PROJECT_ISSUES_PAGE_SIZE: u32 = 50;

const DISCUSSION_FIELDS: &str = r#"
fragment DiscussionFields on Discussion {
  id
  title
  body
  url
  createdAt
  closed
  isAnswered
  author { login avatarUrl url }
  comments(first: 50) {
    totalCount
    nodes { body createdAt author { login avatarUrl url } }
  }
}
"#;

const ISSUES_WITH_PROJECT_FIELDS_QUERY: &str = r#"
query IssuesWithProjectFields($owner: String!, $name: String!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    issues(first: $first, after: $after, states: OPEN, orderBy: {field: CREATED_AT, direction: DESC}) {
      pageInfo { hasNextPage endCursor }
      nodes {
        number
        title
        url
        body
        state
        createdAt
        author { login avatarUrl url }
        labels(first: 20) { nodes { name color } }
        assignees(first: 10) { nodes { login avatarUrl url } }
        comments { totalCount }
        projectItems(first: 10) {
          nodes {
            fieldValues(first: 20) {
              nodes {
                ... on ProjectV2ItemFieldTextValue { text field { ... on ProjectV2FieldCommon { name } } }
                ... on ProjectV2ItemFieldDateValue { date field { ... on ProjectV2FieldCommon { name } } }
                ... on ProjectV2ItemFieldSingleSelectValue { name field { ... on ProjectV2FieldCommon { name } } }
              }
            }
          }
        }
      }
    }
  }
}
"#;

#[derive(Debug, Serialize)]
struct GraphQlPayload<'a> {
    query: String,
    variables: &'a Value,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Nodes<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<T>,
}

impl<T> Default for Nodes<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Counted {
    total_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDiscussionComment {
    #[serde(default)]
    author: Option<Actor>,
    #[serde(default)]
    body: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDiscussion {
    id: String,
    title: String,
    #[serde(default)]
    body: String,
    url: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    closed: bool,
    #[serde(default)]
    is_answered: Option<bool>,
    #[serde(default)]
    author: Option<Actor>,
    comments: RawDiscussionComments,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDiscussionComments {
    total_count: u64,
    #[serde(default)]
    nodes: Vec<RawDiscussionComment>,
}

impl RawDiscussion {
    fn normalize(self) -> Discussion {
        Discussion {
            id: self.id,
            title: self.title,
            body: self.body,
            url: self.url,
            author: self.author,
            created_at: self.created_at,
            closed: self.closed,
            // `isAnswered` is null for categories that do not accept answers.
            is_answered: self.is_answered.unwrap_or(false),
            comment_count: self.comments.total_count,
            comments: self
                .comments
                .nodes
                .into_iter()
                .map(|comment| DiscussionComment {
                    author: comment.author,
                    body: comment.body,
                    created_at: comment.created_at,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFieldValue {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    field: Option<RawFieldRef>,
}

#[derive(Debug, Deserialize)]
struct RawFieldRef {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProjectItem {
    #[serde(default)]
    field_values: Nodes<RawFieldValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProjectIssue {
    number: u64,
    title: String,
    url: String,
    #[serde(default)]
    body: String,
    state: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    author: Option<Actor>,
    #[serde(default)]
    labels: Nodes<RawLabel>,
    #[serde(default)]
    assignees: Nodes<Actor>,
    comments: Counted,
    #[serde(default)]
    project_items: Nodes<RawProjectItem>,
}

impl RawProjectIssue {
    fn normalize(self) -> ProjectIssue {
        ProjectIssue {
            number: self.number,
            title: self.title,
            url: self.url,
            state: self.state,
            body: self.body,
            created_at: self.created_at,
            author: self.author,
            labels: self
                .labels
                .nodes
                .into_iter()
                .map(RawLabel::into_issue_label)
                .collect(),
            assignees: self.assignees.nodes,
            comment_count: self.comments.total_count,
            project_items: self
                .project_items
                .nodes
                .into_iter()
                .map(|item| ProjectItem {
                    field_values: item
                        .field_values
                        .nodes
                        .into_iter()
                        .map(|value| ProjectFieldValue {
                            field: value.field.and_then(|field| field.name),
                            text: value.text,
                            name: value.name,
                            date: value.date,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// True when the issue is tracked on at least one project board and no
/// field value on any of its project items belongs to a `Status` field.
pub fn lacks_status_field(issue: &ProjectIssue) -> bool {
    !issue.project_items.is_empty()
        && issue.project_items.iter().all(|item| {
            item.field_values
                .iter()
                .all(|value| value.field.as_deref() != Some(STATUS_FIELD_NAME))
        })
}

impl GithubGateway {
    async fn graphql<T: DeserializeOwned>(
        &self,
        operation: &str,
        query: String,
        variables: Value,
    ) -> Result<T, GatewayError> {
        let payload = GraphQlPayload {
            query,
            variables: &variables,
        };
        let response: GraphQlResponse<T> = self
            .request_json(operation, || self.http.post(&self.graphql_url).json(&payload))
            .await?;

        if !response.errors.is_empty() {
            if response
                .errors
                .iter()
                .any(|error| error.kind.as_deref() == Some("NOT_FOUND"))
            {
                return Err(GatewayError::NotFound(operation.to_string()));
            }
            let message = response
                .errors
                .iter()
                .map(|error| error.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(GatewayError::GraphQl {
                operation: operation.to_string(),
                message,
            });
        }

        response.data.ok_or_else(|| GatewayError::Decode {
            operation: operation.to_string(),
            message: "graphql response carried no data".to_string(),
        })
    }

    /// Open issues that sit on a project board without any `Status` value.
    pub async fn list_issues_without_status(&self) -> Result<Vec<ProjectIssue>, GatewayError> {
        #[derive(Deserialize)]
        struct Data {
            repository: Option<Repository>,
        }
        #[derive(Deserialize)]
        struct Repository {
            issues: IssueConnection,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct IssueConnection {
            page_info: PageInfo,
            #[serde(default)]
            nodes: Vec<RawProjectIssue>,
        }

        let mut cursor: Option<String> = None;
        let mut qualifying = Vec::new();
        for _ in 0..self.page_limit {
            let data: Data = self
                .graphql(
                    "list issues with project fields",
                    ISSUES_WITH_PROJECT_FIELDS_QUERY.to_string(),
                    json!({
                        "owner": self.repo.owner,
                        "name": self.repo.name,
                        "first": PROJECT_ISSUES_PAGE_SIZE,
                        "after": cursor,
                    }),
                )
                .await?;
            let Some(repository) = data.repository else {
                return Err(GatewayError::NotFound(format!("repository {}", self.repo)));
            };
            qualifying.extend(
                repository
                    .issues
                    .nodes
                    .into_iter()
                    .map(RawProjectIssue::normalize)
                    .filter(lacks_status_field),
            );
            let page_info = repository.issues.page_info;
            match page_info.end_cursor {
                Some(next) if page_info.has_next_page => cursor = Some(next),
                _ => break,
            }
        }
        Ok(qualifying)
    }

    /// Newest discussions first, with the repository's total discussion count.
    pub async fn list_discussions(&self, limit: u32) -> Result<DiscussionPage, GatewayError> {
        #[derive(Deserialize)]
        struct Data {
            repository: Option<Repository>,
        }
        #[derive(Deserialize)]
        struct Repository {
            discussions: DiscussionConnection,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct DiscussionConnection {
            total_count: u64,
            #[serde(default)]
            nodes: Vec<RawDiscussion>,
        }

        let query = format!(
            r#"query Discussions($owner: String!, $name: String!, $first: Int!) {{
  repository(owner: $owner, name: $name) {{
    discussions(first: $first, orderBy: {{field: CREATED_AT, direction: DESC}}) {{
      totalCount
      nodes {{ ...DiscussionFields }}
    }}
  }}
}}
{DISCUSSION_FIELDS}"#
        );
        let data: Data = self
            .graphql(
                "list discussions",
                query,
                json!({
                    "owner": self.repo.owner,
                    "name": self.repo.name,
                    "first": limit.clamp(1, 100),
                }),
            )
            .await?;
        let connection = data
            .repository
            .ok_or_else(|| GatewayError::NotFound(format!("repository {}", self.repo)))?
            .discussions;
        Ok(DiscussionPage {
            discussions: connection
                .nodes
                .into_iter()
                .map(RawDiscussion::normalize)
                .collect(),
            total_count: connection.total_count,
        })
    }

    pub async fn get_discussion(&self, discussion_id: &str) -> Result<Discussion, GatewayError> {
        #[derive(Deserialize)]
        struct Data {
            node: Option<Value>,
        }

        let operation = format!("get discussion {discussion_id}");
        let query = format!(
            r#"query DiscussionById($id: ID!) {{
  node(id: $id) {{ ... on Discussion {{ ...DiscussionFields }} }}
}}
{DISCUSSION_FIELDS}"#
        );
        let data: Data = self
            .graphql(&operation, query, json!({ "id": discussion_id }))
            .await?;

        // A node of another type matches no fragment and comes back as `{}`.
        let node = data
            .node
            .filter(|node| node.get("id").is_some())
            .ok_or_else(|| GatewayError::NotFound(operation.clone()))?;
        let discussion: RawDiscussion =
            serde_json::from_value(node).map_err(|error| GatewayError::Decode {
                operation,
                message: error.to_string(),
            })?;
        Ok(discussion.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::{lacks_status_field, RawProjectIssue};
    use serde_json::json;

    fn project_issue(items: serde_json::Value) -> crate::ProjectIssue {
        let raw: RawProjectIssue = serde_json::from_value(json!({
            "number": 12,
            "title": "Tracked issue",
            "url": "https://github.com/o/r/issues/12",
            "body": "",
            "state": "OPEN",
            "createdAt": "2026-01-01T00:00:00Z",
            "author": {"login": "alice", "avatarUrl": "https://a", "url": "https://u"},
            "labels": {"nodes": [{"name": "bug", "color": "d73a4a"}]},
            "assignees": {"nodes": []},
            "comments": {"totalCount": 2},
            "projectItems": {"nodes": items}
        }))
        .expect("project issue");
        raw.normalize()
    }

    #[test]
    fn unit_issue_without_project_items_is_not_missing_status() {
        assert!(!lacks_status_field(&project_issue(json!([]))));
    }

    #[test]
    fn unit_issue_with_status_value_does_not_qualify() {
        let issue = project_issue(json!([{
            "fieldValues": {"nodes": [
                {"text": "Tracked", "field": {"name": "Title"}},
                {"name": "In Progress", "field": {"name": "Status"}}
            ]}
        }]));
        assert!(!lacks_status_field(&issue));
    }

    #[test]
    fn functional_issue_with_only_other_fields_qualifies() {
        let issue = project_issue(json!([{
            "fieldValues": {"nodes": [
                {"text": "Tracked", "field": {"name": "Title"}},
                {"date": "2026-02-01", "field": {"name": "Target"}},
                {}
            ]}
        }]));
        assert!(lacks_status_field(&issue));
        assert_eq!(issue.project_items[0].field_values.len(), 3);
        assert_eq!(issue.labels[0].name, "bug");
    }

    #[test]
    fn regression_status_on_any_project_item_excludes_issue() {
        let issue = project_issue(json!([
            {"fieldValues": {"nodes": [{"text": "x", "field": {"name": "Title"}}]}},
            {"fieldValues": {"nodes": [{"name": "Done", "field": {"name": "Status"}}]}}
        ]));
        assert!(!lacks_status_field(&issue));
    }
}
