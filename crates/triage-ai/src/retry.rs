//! Backoff policy for the Anthropic messages endpoint.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;

use crate::AnthropicConfig;

const BASE_BACKOFF_MS: u64 = 200;
const MAX_BACKOFF_SHIFT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    max_retries: usize,
    /// `0` leaves the total sleep time unbounded.
    budget_ms: u64,
    jitter: bool,
}

impl RetryPolicy {
    pub(crate) fn from_config(config: &AnthropicConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            budget_ms: config.retry_budget_ms,
            jitter: config.retry_jitter,
        }
    }

    pub(crate) fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Sleep before the attempt after `attempt`, or `None` once retries or budget run out.
    ///
    /// A `Retry-After` hint raises the delay but never shortens the backoff.
    pub(crate) fn delay_for(
        &self,
        attempt: usize,
        elapsed: Duration,
        retry_after_ms: Option<u64>,
    ) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let backoff_ms = self.backoff_ms(attempt);
        let delay_ms = retry_after_ms.map_or(backoff_ms, |hint| backoff_ms.max(hint));
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let within_budget =
            self.budget_ms == 0 || elapsed_ms.saturating_add(delay_ms) <= self.budget_ms;
        within_budget.then(|| Duration::from_millis(delay_ms))
    }

    fn backoff_ms(&self, attempt: usize) -> u64 {
        let base = BASE_BACKOFF_MS << attempt.min(MAX_BACKOFF_SHIFT);
        if !self.jitter {
            return base;
        }
        // Lands in [base / 2, base].
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|since| u64::from(since.subsec_nanos()))
            .unwrap_or_default();
        base / 2 + nanos % (base / 2 + 1)
    }
}

/// 529 (overloaded) falls under the 5xx arm.
pub(crate) fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 409 | 429) || status >= 500
}

/// Timeouts are terminal; the client timeout already bounds each attempt.
pub(crate) fn is_transient_transport_error(error: &reqwest::Error) -> bool {
    !error.is_timeout() && (error.is_connect() || error.is_request())
}

/// Reads `Retry-After` as delta-seconds or an HTTP date.
pub(crate) fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    let raw = headers.get("retry-after")?.to_str().ok()?.trim();
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(seconds.saturating_mul(1_000));
    }
    let retry_at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let delay_ms = retry_at.signed_duration_since(Utc::now()).num_milliseconds();
    Some(u64::try_from(delay_ms).unwrap_or(0))
}
