use async_trait::async_trait;
use serde_json::{json, Value};
use triage_agent::{AgentTool, ToolExecutionResult};
use triage_ai::ToolDefinition;

use super::{run_tool, ToolContext};
use crate::request::{ExternalSearchRequest, SEARCH_EXTERNAL_CONTENT};

/// Best-effort search; provider failures come back as empty results with an `error` field.
pub(super) async fn search_external_content(
    context: &ToolContext,
    request: &ExternalSearchRequest,
) -> Value {
    let message = match tokio::time::timeout(context.advisory_timeout, context.search.search(request))
        .await
    {
        Ok(Ok(results)) => return results,
        Ok(Err(error)) => error.message,
        Err(_) => format!(
            "Search timed out after {}ms",
            context.advisory_timeout.as_millis()
        ),
    };
    tracing::warn!(query = %request.query, error = %message, "external search degraded");
    json!({
        "error": message,
        "webResults": [],
        "summary": Value::Null,
        "entities": [],
    })
}

pub struct SearchExternalContentTool {
    context: ToolContext,
}

impl SearchExternalContentTool {
    pub fn new(context: ToolContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl AgentTool for SearchExternalContentTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: SEARCH_EXTERNAL_CONTENT.to_string(),
            description: "Search for additional context and information using Brave Search. Returns web search results and optional AI summaries.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "minLength": 1,
                        "description": "The search query to look up"
                    },
                    "country": {
                        "type": "string",
                        "description": "The search query country (2-letter code), default us"
                    },
                    "search_lang": {
                        "type": "string",
                        "description": "The search language preference, default en"
                    },
                    "result_filter": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Types of results to include (web, news, discussions)"
                    },
                    "summary": {
                        "type": "boolean",
                        "description": "Whether to include an AI summary of results, default true"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        run_tool(&self.context, SEARCH_EXTERNAL_CONTENT, &arguments).await
    }
}
