//! Retrying HTTP sends shared by the catalog, embedding and answer clients.
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - Other non-success statuses → fail immediately
//! - A caller-supplied classifier can mark any failed response permanent
//! - Network errors → retry
//! - Backoff: `base_delay × 2^(attempt-1)`, exponent capped at 5

use anyhow::{anyhow, bail, Result};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt - 1).min(5))
    }
}

/// Send the request built by `make` until it succeeds or retries run out.
///
/// `make` is called once per attempt since a sent `RequestBuilder` is
/// consumed. `what` names the remote service in error messages.
pub async fn send_with_retry<F>(
    policy: RetryPolicy,
    what: &str,
    mut make: F,
) -> Result<reqwest::Response>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    send_with_retry_classified(policy, what, make, |_, _| None).await
}

/// Like [`send_with_retry`], but `permanent` sees the status and body of
/// every failed response first. Returning an error stops the retries and
/// fails with that error.
pub async fn send_with_retry_classified<F, P>(
    policy: RetryPolicy,
    what: &str,
    mut make: F,
    permanent: P,
) -> Result<reqwest::Response>
where
    F: FnMut() -> reqwest::RequestBuilder,
    P: Fn(reqwest::StatusCode, &str) -> Option<anyhow::Error>,
{
    let mut last_err = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            tokio::time::sleep(policy.delay(attempt)).await;
            tracing::debug!(attempt, service = what, "retrying request");
        }

        match make().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                let body_text = response.text().await.unwrap_or_default();
                if let Some(e) = permanent(status, &body_text) {
                    return Err(e);
                }
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow!("{} error {}: {}", what, status, body_text));
                    continue;
                }
                bail!("{} error {}: {}", what, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} request failed: {}", what, e));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} request failed after retries", what)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10);
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(4), Duration::from_secs(8));
        assert_eq!(policy.delay(9), Duration::from_secs(32));
    }
}
