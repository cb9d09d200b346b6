use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::json;

use crate::model::{RawIssue, RawLabel, RawTimelineEvent};
use crate::transport::{
    fits_before, github_error_message, is_retryable_github_status, is_retryable_transport_error,
    parse_retry_after, remaining_until, retry_delay,
};
use crate::{GatewayConfig, GatewayError, Issue, Label, RepoRef, TimelineEvent};

pub(crate) const PER_PAGE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IssueStateFilter {
    #[default]
    Open,
    Closed,
    All,
}

impl IssueStateFilter {
    fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSort {
    Created,
    Updated,
    Comments,
}

impl IssueSort {
    fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Comments => "comments",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Filters for [`GithubGateway::list_issues`].
pub struct IssueQuery {
    pub state: IssueStateFilter,
    /// GitHub treats a comma-joined label list as an intersection.
    pub labels: Vec<String>,
    pub since: Option<DateTime<Utc>>,
    /// Falls back to [`GatewayConfig::page_limit`] when unset.
    pub page_limit: Option<usize>,
    pub sort: Option<IssueSort>,
    pub direction: Option<SortDirection>,
}

impl IssueQuery {
    pub fn open_since(since: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
/// Single seam between the service and the GitHub API.
pub struct GithubGateway {
    pub(crate) http: reqwest::Client,
    api_base: String,
    pub(crate) graphql_url: String,
    pub(crate) repo: RepoRef,
    request_timeout: Duration,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
    pub(crate) page_limit: usize,
}

impl GithubGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("issue-triage-gateway"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );
        let token = config.token.trim();
        if !token.is_empty() {
            let auth_header = format!("Bearer {token}");
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_header).map_err(|_| {
                    GatewayError::InvalidConfig("invalid github authorization header".to_string())
                })?,
            );
        }

        let request_timeout = Duration::from_millis(config.request_timeout_ms.max(1));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()
            .map_err(|error| {
                GatewayError::InvalidConfig(format!("failed to create github api client: {error}"))
            })?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            graphql_url: config.graphql_url,
            repo: config.repo,
            request_timeout,
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms.max(1),
            page_limit: config.page_limit.max(1),
        })
    }

    pub fn repo(&self) -> &RepoRef {
        &self.repo
    }

    fn repo_url(&self, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base, self.repo.owner, self.repo.name, suffix
        )
    }

    /// Pages through repository issues, dropping pull requests.
    pub async fn list_issues(&self, query: &IssueQuery) -> Result<Vec<Issue>, GatewayError> {
        let page_limit = query.page_limit.unwrap_or(self.page_limit).max(1);
        let labels = query.labels.join(",");
        let since = query
            .since
            .map(|since| since.to_rfc3339_opts(SecondsFormat::Secs, true));
        let url = self.repo_url("issues");

        let mut issues = Vec::new();
        for page in 1..=page_limit {
            let page_value = page.to_string();
            let chunk: Vec<RawIssue> = self
                .request_json("list issues", || {
                    let mut request = self.http.get(&url).query(&[
                        ("state", query.state.as_str()),
                        ("per_page", "100"),
                        ("page", page_value.as_str()),
                    ]);
                    if !labels.is_empty() {
                        request = request.query(&[("labels", labels.as_str())]);
                    }
                    if let Some(since) = since.as_deref() {
                        request = request.query(&[("since", since)]);
                    }
                    if let Some(sort) = query.sort {
                        request = request.query(&[("sort", sort.as_str())]);
                    }
                    if let Some(direction) = query.direction {
                        request = request.query(&[("direction", direction.as_str())]);
                    }
                    request
                })
                .await?;
            let chunk_len = chunk.len();
            issues.extend(
                chunk
                    .into_iter()
                    .filter(|issue| !issue.is_pull_request())
                    .map(RawIssue::normalize),
            );
            if chunk_len < PER_PAGE {
                break;
            }
            if page == page_limit {
                tracing::debug!(page_limit, "issue listing stopped at page limit");
            }
        }
        Ok(issues)
    }

    pub async fn get_issue(&self, issue_number: u64) -> Result<Issue, GatewayError> {
        let url = self.repo_url(&format!("issues/{issue_number}"));
        let issue: RawIssue = self
            .request_json(&format!("get issue #{issue_number}"), || self.http.get(&url))
            .await?;
        Ok(issue.normalize())
    }

    pub async fn list_labels(&self) -> Result<Vec<Label>, GatewayError> {
        let url = self.repo_url("labels");
        let mut labels = Vec::new();
        for page in 1..=self.page_limit {
            let page_value = page.to_string();
            let chunk: Vec<RawLabel> = self
                .request_json("list labels", || {
                    self.http
                        .get(&url)
                        .query(&[("per_page", "100"), ("page", page_value.as_str())])
                })
                .await?;
            let chunk_len = chunk.len();
            labels.extend(chunk.into_iter().map(RawLabel::into_label));
            if chunk_len < PER_PAGE {
                break;
            }
        }
        Ok(labels)
    }

    /// Replaces the issue's full label set.
    pub async fn set_labels(
        &self,
        issue_number: u64,
        labels: &[String],
    ) -> Result<(), GatewayError> {
        let url = self.repo_url(&format!("issues/{issue_number}/labels"));
        let body = json!({ "labels": labels });
        let _: IgnoredAny = self
            .request_json(&format!("set labels on issue #{issue_number}"), || {
                self.http.put(&url).json(&body)
            })
            .await?;
        Ok(())
    }

    pub async fn update_issue_body(
        &self,
        issue_number: u64,
        body: &str,
    ) -> Result<Issue, GatewayError> {
        let url = self.repo_url(&format!("issues/{issue_number}"));
        let payload = json!({ "body": body });
        let issue: RawIssue = self
            .request_json(&format!("update issue #{issue_number}"), || {
                self.http.patch(&url).json(&payload)
            })
            .await?;
        Ok(issue.normalize())
    }

    pub async fn list_timeline_events(
        &self,
        issue_number: u64,
    ) -> Result<Vec<TimelineEvent>, GatewayError> {
        let url = self.repo_url(&format!("issues/{issue_number}/timeline"));
        let operation = format!("list timeline for issue #{issue_number}");
        let mut events = Vec::new();
        for page in 1..=self.page_limit {
            let page_value = page.to_string();
            let chunk: Vec<RawTimelineEvent> = self
                .request_json(&operation, || {
                    self.http
                        .get(&url)
                        .query(&[("per_page", "100"), ("page", page_value.as_str())])
                })
                .await?;
            let chunk_len = chunk.len();
            events.extend(chunk.into_iter().map(RawTimelineEvent::normalize));
            if chunk_len < PER_PAGE {
                break;
            }
        }
        Ok(events)
    }

    fn deadline_exceeded(&self, operation: &str) -> GatewayError {
        GatewayError::Timeout {
            operation: operation.to_string(),
            timeout_ms: u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Sends a request with retries, all attempts sharing one deadline of
    /// `request_timeout_ms`.
    pub(crate) async fn request_json<T, F>(
        &self,
        operation: &str,
        mut request_builder: F,
    ) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let deadline = Instant::now() + self.request_timeout;
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let Some(remaining) = remaining_until(deadline) else {
                return Err(self.deadline_exceeded(operation));
            };
            let response = request_builder()
                .timeout(remaining)
                .header("x-triage-retry-attempt", attempt.saturating_sub(1).to_string())
                .send()
                .await;
            let response = match response {
                Ok(response) => response,
                Err(error) if error.is_timeout() => {
                    tracing::debug!(operation, attempt, "github request hit its deadline");
                    return Err(self.deadline_exceeded(operation));
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        let delay = retry_delay(self.retry_base_delay_ms, attempt, None);
                        if fits_before(deadline, delay) {
                            tracing::debug!(operation, attempt, %error, "retrying github request");
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                    }
                    return Err(GatewayError::Transport {
                        operation: operation.to_string(),
                        source: error,
                    });
                }
            };

            let status = response.status();
            if status.is_success() {
                let raw = match response.text().await {
                    Ok(raw) => raw,
                    Err(error) if error.is_timeout() => {
                        return Err(self.deadline_exceeded(operation))
                    }
                    Err(error) => {
                        return Err(GatewayError::Transport {
                            operation: operation.to_string(),
                            source: error,
                        })
                    }
                };
                let raw = if raw.trim().is_empty() { "null".to_string() } else { raw };
                return serde_json::from_str::<T>(&raw).map_err(|error| GatewayError::Decode {
                    operation: operation.to_string(),
                    message: error.to_string(),
                });
            }

            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            let delay = retry_delay(self.retry_base_delay_ms, attempt, retry_after);
            if attempt < self.retry_max_attempts
                && is_retryable_github_status(status.as_u16())
                && fits_before(deadline, delay)
            {
                tracing::debug!(
                    operation,
                    attempt,
                    status = status.as_u16(),
                    "retrying github request"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let message = github_error_message(&body);
            return Err(match status.as_u16() {
                404 => GatewayError::NotFound(operation.to_string()),
                401 | 403 => GatewayError::Unauthorized {
                    operation: operation.to_string(),
                    status: status.as_u16(),
                    message,
                },
                code => GatewayError::GitHubApi {
                    operation: operation.to_string(),
                    status: code,
                    message,
                },
            });
        }
    }
}
