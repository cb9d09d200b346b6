//! Brave web search client used by `searchExternalContent`.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde_json::{json, Value};

use crate::error::{ToolError, ToolErrorKind};
use crate::request::ExternalSearchRequest;

pub const DEFAULT_BRAVE_API_BASE: &str = "https://api.search.brave.com";

#[derive(Debug, Clone)]
pub struct BraveSearchConfig {
    pub api_base: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
}

impl Default for BraveSearchConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_BRAVE_API_BASE.to_string(),
            api_key: String::new(),
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Clone)]
pub struct BraveSearchClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl BraveSearchClient {
    pub fn new(config: BraveSearchConfig) -> Result<Self, ToolError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .map_err(|error| {
                ToolError::new(
                    ToolErrorKind::InternalError,
                    format!("failed to create search client: {error}"),
                )
            })?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    /// Runs the web search, then the summarizer when a summary was requested
    /// and the provider returned a summarizer key.
    ///
    /// A failed summarizer call falls back to the bare web results.
    pub async fn search(&self, request: &ExternalSearchRequest) -> Result<Value, ToolError> {
        let mut params = vec![
            ("q", request.query.clone()),
            ("summary", if request.summary { "1" } else { "0" }.to_string()),
        ];
        if !request.country.is_empty() {
            params.push(("country", request.country.clone()));
        }
        if !request.search_lang.is_empty() {
            params.push(("search_lang", request.search_lang.clone()));
        }
        if !request.result_filter.is_empty() {
            params.push(("result_filter", request.result_filter.join(",")));
        }

        let search_data = self
            .get_json(&format!("{}/res/v1/web/search", self.api_base), &params)
            .await?;
        let web_results = search_data
            .pointer("/web/results")
            .cloned()
            .filter(Value::is_array)
            .unwrap_or_else(|| json!([]));

        let summarizer_key = search_data
            .pointer("/summarizer/key")
            .and_then(Value::as_str)
            .filter(|key| !key.is_empty());
        if let (true, Some(key)) = (request.summary, summarizer_key) {
            let summary_params = [("key", key.to_string()), ("entity_info", "1".to_string())];
            match self
                .get_json(
                    &format!("{}/res/v1/summarizer/search", self.api_base),
                    &summary_params,
                )
                .await
            {
                Ok(summary_data) => {
                    return Ok(json!({
                        "webResults": web_results,
                        "summary": summary_data.get("summary").cloned().unwrap_or(Value::Null),
                        "entities": summary_data
                            .get("entities")
                            .cloned()
                            .filter(Value::is_array)
                            .unwrap_or_else(|| json!([])),
                    }));
                }
                Err(error) => {
                    tracing::debug!(%error, "summarizer request failed; returning web results only");
                }
            }
        }

        Ok(json!({
            "webResults": web_results,
            "summary": Value::Null,
            "entities": [],
        }))
    }

    async fn get_json(&self, url: &str, params: &[(&str, String)]) -> Result<Value, ToolError> {
        let response = self
            .http
            .get(url)
            .header("X-Subscription-Token", &self.api_key)
            .query(params)
            .send()
            .await
            .map_err(|error| {
                ToolError::new(
                    ToolErrorKind::ExternalApiError,
                    format!("Brave Search API request failed: {error}"),
                )
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::new(
                ToolErrorKind::ExternalApiError,
                format!(
                    "Brave Search API error: {}",
                    status.canonical_reason().unwrap_or(status.as_str())
                ),
            )
            .with_details(json!({ "status": status.as_u16() })));
        }
        response.json::<Value>().await.map_err(|error| {
            ToolError::new(
                ToolErrorKind::ExternalApiError,
                format!("failed to decode Brave Search response: {error}"),
            )
        })
    }
}
