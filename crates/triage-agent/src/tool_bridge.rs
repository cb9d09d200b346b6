//! Argument validation and bounded execution for model-issued tool calls.

use std::{sync::Arc, time::Duration};

use jsonschema::validator_for;
use serde_json::{json, Value};
use triage_ai::{ToolCall, ToolDefinition};

use crate::{AgentTool, ToolExecutionResult};

/// Failure result in the same `{success, error}` envelope the triage tools use.
pub(crate) fn bridge_failure(code: &str, message: impl Into<String>) -> ToolExecutionResult {
    ToolExecutionResult::error(json!({
        "success": false,
        "error": {
            "code": code,
            "message": message.into(),
            "details": Value::Null,
        }
    }))
}

pub(crate) async fn execute_tool_call(
    call: ToolCall,
    registered: Option<(ToolDefinition, Arc<dyn AgentTool>)>,
    tool_timeout: Duration,
) -> ToolExecutionResult {
    let Some((definition, tool)) = registered else {
        return bridge_failure(
            "VALIDATION_ERROR",
            format!("Tool '{}' is not registered", call.name),
        );
    };

    if let Err(error) = validate_tool_arguments(&definition, &call.arguments) {
        return bridge_failure("VALIDATION_ERROR", error);
    }

    match tokio::time::timeout(tool_timeout, tool.execute(call.arguments)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                tool = %definition.name,
                timeout_ms = tool_timeout.as_millis() as u64,
                "tool execution timed out"
            );
            bridge_failure(
                "INTERNAL_ERROR",
                format!(
                    "tool '{}' timed out after {}ms",
                    definition.name,
                    tool_timeout.as_millis()
                ),
            )
        }
    }
}

pub(crate) fn validate_tool_arguments(
    definition: &ToolDefinition,
    arguments: &Value,
) -> Result<(), String> {
    let validator = validator_for(&definition.parameters)
        .map_err(|error| format!("invalid JSON schema for '{}': {error}", definition.name))?;

    let mut errors = validator.iter_errors(arguments);
    if let Some(first) = errors.next() {
        return Err(format!(
            "invalid arguments for '{}': {}",
            definition.name, first
        ));
    }

    Ok(())
}
