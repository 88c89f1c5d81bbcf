//! Retry with exponential back-off and jitter for platform fetches.
//!
//! [`retry_with_backoff`] wraps any fallible async operation and retries on
//! transient errors (network failures, 5xx, rate limits). An expired
//! credential is returned immediately so the caller can hand the platform
//! back to the session manager instead of hammering a login wall.

use std::future::Future;
use std::time::Duration;

use crate::error::CrawlError;

/// Returns `true` for errors that are worth retrying after a back-off delay.
///
/// **Retriable:**
/// - Network-level failures: timeout, connection reset.
/// - HTTP 5xx responses.
/// - HTTP 429 rate limits.
///
/// **Not retriable (hard stop):**
/// - [`CrawlError::AuthExpired`] — retrying re-spends the bounded budget on
///   a credential the platform has already rejected.
/// - [`CrawlError::Malformed`] — the same bytes will fail the same way.
#[must_use]
pub fn is_retriable(err: &CrawlError) -> bool {
    match err {
        CrawlError::Transport(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        CrawlError::RateLimited { .. } => true,
        CrawlError::AuthExpired { .. } | CrawlError::Malformed { .. } => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on transient errors.
///
/// Back-off schedule with `backoff_base_ms = 1_000`:
///
/// | Attempt | Sleep before next attempt        |
/// |---------|----------------------------------|
/// | 1       | 1 000 ms × 2⁰ ± 25 % jitter     |
/// | 2       | 1 000 ms × 2¹ ± 25 % jitter     |
/// | 3       | 1 000 ms × 2² ± 25 % jitter     |
///
/// Delay is capped at 60 s. Non-retriable errors are returned immediately.
///
/// # Errors
///
/// Returns the last error once the retry budget is spent, or the first
/// non-retriable error unchanged.
pub async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, CrawlError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CrawlError>>,
{
    const MAX_DELAY_MS: u64 = 60_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient fetch error, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crystal_core::Platform;

    fn malformed_err() -> CrawlError {
        let src = serde_json::from_str::<()>("invalid").unwrap_err();
        CrawlError::Malformed {
            context: "test".to_owned(),
            source: src,
        }
    }

    fn auth_expired_err() -> CrawlError {
        CrawlError::AuthExpired {
            platform: Platform::Weibo,
            status: 403,
        }
    }

    fn rate_limited_err() -> CrawlError {
        CrawlError::RateLimited {
            platform: Platform::Xueqiu,
            retry_after_secs: 60,
        }
    }

    #[test]
    fn auth_expired_is_not_retriable() {
        assert!(!is_retriable(&auth_expired_err()));
    }

    #[test]
    fn malformed_is_not_retriable() {
        assert!(!is_retriable(&malformed_err()));
    }

    #[test]
    fn rate_limited_is_retriable() {
        assert!(is_retriable(&rate_limited_err()));
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, CrawlError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn does_not_retry_auth_expired() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(auth_expired_err())
            }
        })
        .await;
        assert_eq!(
            calls.load(Ordering::SeqCst),
            1,
            "AuthExpired must not be retried"
        );
        assert!(matches!(result, Err(CrawlError::AuthExpired { .. })));
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err::<u32, _>(rate_limited_err())
                } else {
                    Ok(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99, "should succeed after retries");
        assert_eq!(
            calls.load(Ordering::SeqCst),
            3,
            "should have been called 3 times (2 failures + 1 success)"
        );
    }

    #[tokio::test]
    async fn exhausted_budget_returns_last_error() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(2, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(rate_limited_err())
            }
        })
        .await;
        assert_eq!(
            calls.load(Ordering::SeqCst),
            3,
            "budget of 2 retries allows 3 invocations total"
        );
        assert!(matches!(result, Err(CrawlError::RateLimited { .. })));
    }
}
