//! Keyword-frequency issue categorization.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use triage_agent::{AgentTool, ToolExecutionResult};
use triage_ai::ToolDefinition;

use super::issue_number_property;
use crate::error::{tool_failure, tool_success, ToolError, ToolErrorKind};
use crate::request::{TriageToolRequest, CATEGORIZE_ISSUE_TYPE};

const UNKNOWN_TYPE: &str = "unknown";

/// Table order doubles as the tie-break order.
const TYPE_INDICATORS: [(&str, &[&str]); 5] = [
    (
        "bug",
        &[
            "error",
            "bug",
            "crash",
            "fix",
            "issue",
            "broken",
            "failure",
            "unexpected behavior",
            "regression",
        ],
    ),
    (
        "feature",
        &[
            "feature",
            "enhancement",
            "request",
            "new",
            "add",
            "proposal",
            "improvement",
        ],
    ),
    (
        "documentation",
        &[
            "docs",
            "documentation",
            "typo",
            "readme",
            "wiki",
            "guide",
            "example",
        ],
    ),
    (
        "question",
        &[
            "question",
            "help",
            "support",
            "how to",
            "clarification",
            "explain",
        ],
    ),
    (
        "infrastructure",
        &[
            "build",
            "ci",
            "pipeline",
            "deploy",
            "infrastructure",
            "setup",
            "configuration",
        ],
    ),
];

const TECHNICAL_AREAS: [(&str, &[&str]); 6] = [
    ("python", &["python"]),
    ("typescript", &["typescript", "javascript"]),
    ("performance", &["performance"]),
    ("security", &["security"]),
    ("ui", &["ui", "interface"]),
    ("backend", &["api", "backend"]),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Categorization {
    pub primary_type: String,
    pub suggested_labels: Vec<String>,
    pub confidence: f64,
    pub reasoning: String,
}

/// Non-overlapping literal matches.
fn count_occurrences(haystack: &str, keyword: &str) -> usize {
    haystack.matches(keyword).count()
}

fn score_types(content_lower: &str) -> Vec<(&'static str, usize)> {
    TYPE_INDICATORS
        .iter()
        .map(|(issue_type, keywords)| {
            let score: usize = keywords
                .iter()
                .map(|keyword| count_occurrences(content_lower, keyword))
                .sum();
            (*issue_type, score)
        })
        .collect()
}

/// Scores `content` against the keyword table and detects technical areas.
pub fn categorize_issue(content: &str) -> Categorization {
    let content_lower = content.to_lowercase();
    let scores = score_types(&content_lower);

    let mut best: Option<(&str, usize)> = None;
    for (issue_type, score) in &scores {
        if best.map_or(true, |(_, best_score)| *score > best_score) {
            best = Some((*issue_type, *score));
        }
    }
    let max_score = scores.iter().map(|(_, score)| *score).max().unwrap_or(0);
    let primary_type = match best {
        Some((issue_type, score)) if score > 0 => issue_type,
        _ => UNKNOWN_TYPE,
    };

    let mut suggested_labels = Vec::new();
    if primary_type != UNKNOWN_TYPE {
        suggested_labels.push(primary_type.to_string());
    }
    let technical_areas = TECHNICAL_AREAS
        .iter()
        .filter(|(_, needles)| needles.iter().any(|needle| content_lower.contains(needle)))
        .map(|(area, _)| area.to_string())
        .filter(|area| area != primary_type)
        .collect::<Vec<_>>();
    suggested_labels.extend(technical_areas.iter().cloned());

    let confidence = match best {
        Some((_, score)) if max_score > 0 => score as f64 / max_score as f64,
        _ => 0.0,
    };

    let matched_keywords = TYPE_INDICATORS
        .iter()
        .find(|(issue_type, _)| *issue_type == primary_type)
        .map(|(_, keywords)| {
            keywords
                .iter()
                .filter(|keyword| content_lower.contains(*keyword))
                .copied()
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let reasoning = format!(
        "Categorized as {primary_type} based on {} keyword matches: {}. Technical areas detected: {}",
        matched_keywords.len(),
        matched_keywords.join(", "),
        technical_areas.join(", ")
    );

    Categorization {
        primary_type: primary_type.to_string(),
        suggested_labels,
        confidence,
        reasoning,
    }
}

pub(super) fn categorization_payload(content: &str) -> Value {
    json!(categorize_issue(content))
}

pub struct CategorizeIssueTypeTool;

#[async_trait]
impl AgentTool for CategorizeIssueTypeTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: CATEGORIZE_ISSUE_TYPE.to_string(),
            description: "Analyzes issue content to determine its type and appropriate categorization".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "issueNumber": issue_number_property("The GitHub issue to analyze"),
                    "issueContent": {
                        "type": "string",
                        "description": "The full content of the issue"
                    },
                    "currentLabels": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Any existing labels on the issue"
                    }
                },
                "required": ["issueNumber", "issueContent", "currentLabels"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        match TriageToolRequest::parse(CATEGORIZE_ISSUE_TYPE, &arguments) {
            Ok(TriageToolRequest::CategorizeIssueType { issue_content, .. }) => {
                tool_success(categorization_payload(&issue_content))
            }
            Ok(other) => tool_failure(ToolError::new(
                ToolErrorKind::InternalError,
                format!("unexpected request for {}", other.tool_name()),
            )),
            Err(error) => tool_failure(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{categorize_issue, count_occurrences, CategorizeIssueTypeTool};
    use serde_json::json;
    use triage_agent::AgentTool;

    #[test]
    fn unit_count_occurrences_is_non_overlapping() {
        assert_eq!(count_occurrences("aaaa", "aa"), 2);
        assert_eq!(count_occurrences("crash crash", "crash"), 2);
        assert_eq!(count_occurrences("c++ build (windows)", "(windows)"), 1);
    }

    #[test]
    fn functional_bug_report_is_categorized_with_technical_areas() {
        let result = categorize_issue(
            "Crash when running Python script: the kernel throws an error and the UI freezes",
        );
        assert_eq!(result.primary_type, "bug");
        assert_eq!(result.confidence, 1.0);
        assert_eq!(
            result.suggested_labels,
            vec!["bug".to_string(), "python".to_string(), "ui".to_string()]
        );
        assert!(result
            .reasoning
            .starts_with("Categorized as bug based on 2 keyword matches: error, crash."));
        assert!(result.reasoning.ends_with("Technical areas detected: python, ui"));
    }

    #[test]
    fn regression_ties_resolve_to_first_category_in_table_order() {
        let result = categorize_issue("docs bug");
        assert_eq!(result.primary_type, "bug");
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn regression_content_without_keywords_is_unknown_with_zero_confidence() {
        let result = categorize_issue("Lorem ipsum dolor sit amet");
        assert_eq!(result.primary_type, "unknown");
        assert_eq!(result.confidence, 0.0);
        assert!(result.suggested_labels.is_empty());
    }

    #[test]
    fn unit_confidence_is_zero_or_one() {
        for content in [
            "question about build setup",
            "feature request: add export",
            "",
            "security issue in api",
        ] {
            let confidence = categorize_issue(content).confidence;
            assert!(confidence == 0.0 || confidence == 1.0, "{content}: {confidence}");
        }
    }

    #[tokio::test]
    async fn functional_categorize_tool_wraps_result_in_success_envelope() {
        let result = CategorizeIssueTypeTool
            .execute(json!({
                "issueNumber": 7,
                "issueContent": "Please add a feature request template",
                "currentLabels": []
            }))
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content["success"], true);
        assert_eq!(result.content["data"]["primaryType"], "feature");
    }
}
