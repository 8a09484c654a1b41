//! Shared outbound HTTP plumbing: one client builder and a retrying `send`.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode};

pub const USER_AGENT: &str = concat!("crypto-sentiment-bot/", env!("CARGO_PKG_VERSION"));

/// Build a client with a hard per-request timeout.
pub fn client_with_timeout(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(4).min(timeout))
        .timeout(timeout)
        .build()
        .context("building reqwest client")
}

/// Bounded retry with exponential backoff (`backoff * 2^(attempt-1)`).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u8,
    pub backoff: Duration,
    /// Treat 429 as retryable. Webhooks turn this off and handle `retry_after` themselves.
    pub retry_rate_limited: bool,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u8, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
            retry_rate_limited: true,
        }
    }

    pub const fn without_rate_limit_retry(mut self) -> Self {
        self.retry_rate_limited = false;
        self
    }

    fn delay(&self, attempt: u8) -> Duration {
        self.backoff * (1u32 << u32::from(attempt.saturating_sub(1)).min(16))
    }

    fn should_retry(&self, status: StatusCode) -> bool {
        status.is_server_error() || (self.retry_rate_limited && status == StatusCode::TOO_MANY_REQUESTS)
    }
}

/// Send the request built by `make`, retrying on 5xx / 429 / transport errors.
///
/// Returns the last response received even if its status is an error, so callers
/// can inspect the body (e.g. Discord's `retry_after`). Transport errors after the
/// final attempt are returned as `Err`.
pub async fn send_with_retry<F>(policy: RetryPolicy, mut make: F) -> Result<Response>
where
    F: FnMut() -> RequestBuilder,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt: u8 = 0;
    loop {
        attempt += 1;
        match make().send().await {
            Ok(rsp) => {
                if attempt < attempts && policy.should_retry(rsp.status()) {
                    tracing::debug!(status = %rsp.status(), attempt, "retrying http request");
                    tokio::time::sleep(policy.delay(attempt)).await;
                    continue;
                }
                return Ok(rsp);
            }
            Err(e) => {
                if attempt < attempts && (e.is_connect() || e.is_timeout() || e.is_request()) {
                    tracing::debug!(error = %e, attempt, "retrying http request after transport error");
                    tokio::time::sleep(policy.delay(attempt)).await;
                    continue;
                }
                return Err(anyhow!(e)).context(format!("http request failed after {attempt} attempt(s)"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let p = RetryPolicy::new(3, Duration::from_millis(300));
        assert_eq!(p.delay(1), Duration::from_millis(300));
        assert_eq!(p.delay(2), Duration::from_millis(600));
        assert_eq!(p.delay(3), Duration::from_millis(1200));
    }

    #[test]
    fn rate_limit_retry_can_be_disabled() {
        let p = RetryPolicy::new(3, Duration::from_secs(1));
        assert!(p.should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(p.should_retry(StatusCode::BAD_GATEWAY));
        assert!(!p.should_retry(StatusCode::BAD_REQUEST));

        let p = p.without_rate_limit_retry();
        assert!(!p.should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(p.should_retry(StatusCode::SERVICE_UNAVAILABLE));
    }
}
