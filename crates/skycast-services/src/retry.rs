//! Exponential backoff for chat-completions requests.
//!
//! Only transient failures are retried: timeouts, connection errors, 5xx,
//! 408 and 429. Anything else, 401/403 included, goes straight back to the
//! caller.

use std::future::Future;
use std::time::Duration;

use reqwest::{Response, StatusCode};
use skycast_core::LlmConfig;

/// Backoff policy for LLM requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts after the first request
    pub max_retries: u32,
    /// Wait before the first retry; doubles for each later one
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&LlmConfig::default())
    }
}

impl From<&LlmConfig> for RetryConfig {
    fn from(config: &LlmConfig) -> Self {
        Self::new(
            config.max_retries,
            config.initial_retry_delay_ms,
            config.max_retry_delay_ms,
        )
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    pub fn disabled() -> Self {
        Self::new(0, 0, 0)
    }

    /// Wait before retry number `retry` (zero-based), capped at `max_delay`.
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Why a failed attempt is worth repeating, if it is.
pub fn transient_error(error: &reqwest::Error) -> Option<&'static str> {
    if error.is_timeout() {
        Some("request timed out")
    } else if error.is_connect() {
        Some("connection failed")
    } else {
        error.status().and_then(transient_status)
    }
}

pub fn transient_status(status: StatusCode) -> Option<&'static str> {
    match status {
        StatusCode::TOO_MANY_REQUESTS => Some("rate limited"),
        StatusCode::REQUEST_TIMEOUT => Some("server timed out waiting for the request"),
        s if s.is_server_error() => Some("server error"),
        _ => None,
    }
}

/// Send a request, repeating it on transient failures.
///
/// Yields the first response that is not transient, the last response once
/// the retries are used up, or the last transport error.
pub async fn with_retry<F, Fut>(config: &RetryConfig, send: F) -> Result<Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Response, reqwest::Error>>,
{
    let attempts = config.max_retries.saturating_add(1);
    let mut retry = 0;

    loop {
        let result = send().await;
        let reason = match &result {
            Ok(response) => transient_status(response.status()),
            Err(e) => transient_error(e),
        };

        let Some(reason) = reason.filter(|_| retry < config.max_retries) else {
            if retry > 0 {
                match &result {
                    Ok(response) => tracing::info!(
                        "LLM request finished with {} after {} retries",
                        response.status(),
                        retry
                    ),
                    Err(e) => tracing::error!("LLM request failed after {} attempts: {}", attempts, e),
                }
            }
            return result;
        };

        let delay = config.delay_for_attempt(retry);
        retry += 1;
        tracing::warn!(
            "LLM request attempt {} of {} failed ({}), retrying in {:?}",
            retry,
            attempts,
            reason,
            delay
        );
        tokio::time::sleep(delay).await;
    }
}
