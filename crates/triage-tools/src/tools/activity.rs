//! Issue activity analysis for `getIssueActivity`.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use triage_agent::{AgentTool, ToolExecutionResult};
use triage_ai::ToolDefinition;
use triage_github::{Issue, TimelineEvent};

use super::{issue_number_property, run_tool, ToolContext};
use crate::request::GET_ISSUE_ACTIVITY;

const INACTIVITY_THRESHOLD_DAYS: i64 = 7;
const UNKNOWN_ACTOR: &str = "unknown";

fn event_details(event: &TimelineEvent) -> String {
    let or_empty = |value: &Option<String>| value.clone().unwrap_or_default();
    match event.event.as_str() {
        "labeled" => format!("Added label: {}", or_empty(&event.label)),
        "unlabeled" => format!("Removed label: {}", or_empty(&event.label)),
        "assigned" => format!("Assigned to {}", or_empty(&event.assignee)),
        "unassigned" => format!("Unassigned from {}", or_empty(&event.assignee)),
        "commented" => "Added a comment".to_string(),
        "closed" => match event.state_reason.as_deref() {
            Some(reason) if !reason.is_empty() => format!("Closed as {reason}"),
            _ => "Closed".to_string(),
        },
        "reopened" => "Reopened".to_string(),
        "referenced" => format!(
            "Referenced in {}",
            event
                .commit_id
                .as_deref()
                .filter(|commit| !commit.is_empty())
                .unwrap_or("another item")
        ),
        "" => "Unknown activity".to_string(),
        other => other.to_string(),
    }
}

/// Builds the activity report for `issue` as seen at `now`.
///
/// Events without a timestamp, or older than the lookback window, are left
/// out of the timeline.
pub fn summarize_activity(
    issue: &Issue,
    events: &[TimelineEvent],
    lookback_days: u64,
    now: DateTime<Utc>,
) -> Value {
    let lookback_start = now - Duration::days(lookback_days.min(36_500) as i64);
    let recent = events
        .iter()
        .filter_map(|event| {
            let occurred_at = event.occurred_at?;
            (occurred_at >= lookback_start).then_some((occurred_at, event))
        })
        .collect::<Vec<_>>();

    let mut participants = BTreeSet::new();
    let timeline = recent
        .iter()
        .map(|(occurred_at, event)| {
            let actor = event.actor.as_deref().unwrap_or(UNKNOWN_ACTOR);
            participants.insert(actor.to_string());
            json!({
                "date": occurred_at,
                "type": event.event,
                "actor": actor,
                "details": event_details(event),
            })
        })
        .collect::<Vec<_>>();
    participants.insert(
        issue
            .author
            .clone()
            .unwrap_or_else(|| UNKNOWN_ACTOR.to_string()),
    );

    let days_since_last_update = (now - issue.updated_at).num_days();
    let info_needed = issue
        .labels
        .iter()
        .any(|label| label.name.to_lowercase().contains("info needed"));

    let attention_reason = if days_since_last_update > INACTIVITY_THRESHOLD_DAYS {
        format!("Issue has been inactive for {days_since_last_update} days")
    } else if info_needed {
        "Issue is waiting for more information".to_string()
    } else if timeline.is_empty() {
        "No recent activity in the specified timeframe".to_string()
    } else {
        String::new()
    };

    json!({
        "lastUpdateDate": issue.updated_at,
        "daysSinceLastUpdate": days_since_last_update,
        "participantCount": participants.len(),
        "activityTimeline": timeline,
        "needsAttention": !attention_reason.is_empty(),
        "attentionReason": attention_reason,
    })
}

fn degraded_activity(message: &str) -> Value {
    json!({
        "lastUpdateDate": Value::Null,
        "daysSinceLastUpdate": Value::Null,
        "participantCount": 0,
        "activityTimeline": [],
        "needsAttention": true,
        "attentionReason": format!("Error retrieving activity: {message}"),
    })
}

pub(super) async fn issue_activity(
    context: &ToolContext,
    issue_number: u64,
    lookback_days: u64,
) -> Value {
    let fetch = async {
        tokio::join!(
            context.gateway.get_issue(issue_number),
            context.gateway.list_timeline_events(issue_number),
        )
    };
    let Ok((issue, events)) = tokio::time::timeout(context.advisory_timeout, fetch).await else {
        let timeout_ms = context.advisory_timeout.as_millis();
        tracing::warn!(issue_number, timeout_ms, "issue activity timed out");
        return degraded_activity(&format!("timed out after {timeout_ms}ms"));
    };
    match (issue, events) {
        (Ok(issue), Ok(events)) => summarize_activity(&issue, &events, lookback_days, Utc::now()),
        (Err(error), _) | (_, Err(error)) => {
            tracing::warn!(issue_number, %error, "issue activity degraded");
            degraded_activity(&error.to_string())
        }
    }
}

pub struct GetIssueActivityTool {
    context: ToolContext,
}

impl GetIssueActivityTool {
    pub fn new(context: ToolContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl AgentTool for GetIssueActivityTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: GET_ISSUE_ACTIVITY.to_string(),
            description: "Retrieves and analyzes recent activity on a GitHub issue".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "issueNumber": issue_number_property("The GitHub issue to analyze"),
                    "lookbackPeriod": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Number of days to analyze, default 30"
                    }
                },
                "required": ["issueNumber"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        run_tool(&self.context, GET_ISSUE_ACTIVITY, &arguments).await
    }
}
