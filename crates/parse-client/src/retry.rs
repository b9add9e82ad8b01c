//! Opt-in retry for [`HttpExecutor`](crate::HttpExecutor).
//!
//! The command layer never retries. When a [`RetryConfig`] is set on the
//! client config, the executor repeats requests that failed in transit or that
//! the server answered with a transient failure.

use rand::Rng;
use std::time::Duration;

use crate::error::{codes, ServerErrorPayload};
use crate::response::HttpResponse;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per attempt, plus jitter.
    pub initial_delay: Duration,
    /// Upper bound for the computed backoff.
    pub max_delay: Duration,
    /// Upper bound for a server-supplied `Retry-After`.
    pub max_retry_after: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            max_retry_after: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Exponential backoff with up to 100% jitter, capped at `max_delay`.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * 2f64.powi(attempt as i32);
        let jitter = rand::rng().random::<f64>() * base;
        Duration::from_secs_f64(base + jitter).min(self.max_delay)
    }
}

/// Tracks attempts for one request.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    attempt: u32,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Retries made so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record a retry and return how long to wait first, or `None` once the
    /// attempts are used up. A `Retry-After` from the server wins over the
    /// computed backoff.
    pub fn next_delay(&mut self, retry_after: Option<Duration>) -> Option<Duration> {
        if self.attempt >= self.config.max_attempts {
            return None;
        }
        let delay = match retry_after {
            Some(wait) => wait.min(self.config.max_retry_after),
            None => self.config.backoff(self.attempt),
        };
        self.attempt += 1;
        Some(delay)
    }
}

/// Whether a response describes a transient failure.
///
/// Rate limiting and gateway errors qualify by status. Parse Server also
/// reports transient failures in the body: code 1 (internal error) and code
/// 100 (connection failed) are retried whatever the status.
pub fn is_retryable_response(response: &HttpResponse) -> bool {
    if response.is_success() {
        return false;
    }
    if matches!(response.status, 429 | 500 | 502 | 503 | 504) {
        return true;
    }
    match response.decode::<ServerErrorPayload>() {
        Ok(payload) => matches!(
            payload.code,
            codes::INTERNAL_SERVER_ERROR | codes::CONNECTION_FAILED
        ),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn error_response(status: u16, body: serde_json::Value) -> HttpResponse {
        HttpResponse::new(status, Vec::new(), body.to_string())
    }

    #[test]
    fn test_backoff_doubles_and_is_capped() {
        let config = RetryConfig::default()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5));

        let first = config.backoff(0);
        assert!(first >= Duration::from_secs(1) && first <= Duration::from_secs(2));
        let second = config.backoff(1);
        assert!(second >= Duration::from_secs(2) && second <= Duration::from_secs(4));
        assert_eq!(config.backoff(6), Duration::from_secs(5));
    }

    #[test]
    fn test_policy_exhausts() {
        let mut policy = RetryPolicy::new(RetryConfig::default().with_max_attempts(2));

        assert!(policy.next_delay(None).is_some());
        assert!(policy.next_delay(None).is_some());
        assert_eq!(policy.attempt(), 2);
        assert!(policy.next_delay(None).is_none());
    }

    #[test]
    fn test_zero_attempts_never_retries() {
        let mut policy = RetryPolicy::new(RetryConfig::default().with_max_attempts(0));
        assert!(policy.next_delay(None).is_none());
    }

    #[test]
    fn test_retry_after_is_capped() {
        let mut policy = RetryPolicy::new(RetryConfig::default());

        assert_eq!(
            policy.next_delay(Some(Duration::from_secs(30))),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            policy.next_delay(Some(Duration::from_secs(120))),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_transient_parse_codes_are_retryable() {
        let internal = error_response(400, json!({"code": 1, "error": "Internal server error."}));
        let offline = error_response(400, json!({"code": 100, "message": "connection failed"}));
        assert!(is_retryable_response(&internal));
        assert!(is_retryable_response(&offline));
    }

    #[test]
    fn test_client_errors_are_final() {
        let not_found = error_response(404, json!({"code": 101, "error": "Object not found."}));
        let taken = error_response(400, json!({"code": 202, "error": "Account already exists."}));
        assert!(!is_retryable_response(&not_found));
        assert!(!is_retryable_response(&taken));
        assert!(!is_retryable_response(&HttpResponse::new(400, Vec::new(), "not json")));
        assert!(!is_retryable_response(&HttpResponse::json(&json!({"code": 1}))));
    }

    #[test]
    fn test_gateway_statuses_are_retryable() {
        for status in [429, 500, 502, 503, 504] {
            assert!(is_retryable_response(&HttpResponse::new(status, Vec::new(), "")));
        }
    }
}
