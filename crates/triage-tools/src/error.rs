use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use triage_agent::ToolExecutionResult;
use triage_github::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolErrorKind {
    ValidationError,
    GithubApiError,
    ExternalApiError,
    NotFound,
    Unauthorized,
    InternalError,
}

impl ToolErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::GithubApiError => "GITHUB_API_ERROR",
            Self::ExternalApiError => "EXTERNAL_API_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
/// A tool failure as reported back to the model.
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
    pub details: Option<Value>,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::ValidationError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::NotFound, message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.message = format!("{context}: {}", self.message);
        self
    }
}

impl From<GatewayError> for ToolError {
    fn from(error: GatewayError) -> Self {
        let kind = match &error {
            GatewayError::NotFound(_) => ToolErrorKind::NotFound,
            GatewayError::Unauthorized { .. } => ToolErrorKind::Unauthorized,
            GatewayError::GitHubApi { .. }
            | GatewayError::GraphQl { .. }
            | GatewayError::Transport { .. }
            | GatewayError::Timeout { .. }
            | GatewayError::Decode { .. } => ToolErrorKind::GithubApiError,
            GatewayError::InvalidConfig(_) => ToolErrorKind::InternalError,
        };
        let details = error.status().map(|status| json!({ "status": status }));
        Self {
            kind,
            message: error.to_string(),
            details,
        }
    }
}

/// Wraps a payload in the `{success: true, data}` envelope.
pub fn tool_success(data: Value) -> ToolExecutionResult {
    ToolExecutionResult::ok(json!({
        "success": true,
        "data": data,
    }))
}

/// Wraps an error in the `{success: false, error}` envelope, flagged as an error result.
pub fn tool_failure(error: ToolError) -> ToolExecutionResult {
    ToolExecutionResult::error(json!({
        "success": false,
        "error": {
            "code": error.kind.code(),
            "message": error.message,
            "details": error.details.unwrap_or(Value::Null),
        }
    }))
}

pub(crate) fn into_result(result: Result<Value, ToolError>) -> ToolExecutionResult {
    match result {
        Ok(data) => tool_success(data),
        Err(error) => tool_failure(error),
    }
}

#[cfg(test)]
mod tests {
    use super::{tool_failure, tool_success, ToolError, ToolErrorKind};
    use serde_json::json;
    use triage_github::GatewayError;

    #[test]
    fn unit_gateway_errors_map_to_tool_error_kinds() {
        let not_found = ToolError::from(GatewayError::NotFound("get issue #9".to_string()));
        assert_eq!(not_found.kind, ToolErrorKind::NotFound);
        assert_eq!(not_found.details, Some(json!({"status": 404})));

        let denied = ToolError::from(GatewayError::Unauthorized {
            operation: "list labels".to_string(),
            status: 403,
            message: "Bad credentials".to_string(),
        });
        assert_eq!(denied.kind, ToolErrorKind::Unauthorized);

        let upstream = ToolError::from(GatewayError::GitHubApi {
            operation: "set labels".to_string(),
            status: 422,
            message: "Validation Failed".to_string(),
        });
        assert_eq!(upstream.kind, ToolErrorKind::GithubApiError);
        assert!(upstream.message.contains("Validation Failed"));
    }

    #[test]
    fn functional_envelopes_carry_success_flag_and_error_code() {
        let ok = tool_success(json!({"total": 0}));
        assert!(!ok.is_error);
        assert_eq!(ok.content, json!({"success": true, "data": {"total": 0}}));

        let failed = tool_failure(ToolError::validation("reason must not be empty"));
        assert!(failed.is_error);
        assert_eq!(failed.content["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(failed.content["error"]["details"], json!(null));
    }

    #[test]
    fn unit_with_context_prefixes_message() {
        let error = ToolError::validation("bad").with_context("Failed to update status");
        assert_eq!(error.message, "Failed to update status: bad");
    }
}
