//! Retry policy for transient HTTP failures, shared by [`crate::download`].
//!
//! Uses the same `backoff` crate and idiom as
//! [`crate::coordinate::guard::Guard::startup`]: exponential backoff, a
//! bounded total retry duration, and a `notify` hook that logs each retry.

use std::time::Duration;

use backoff::future::retry_notify;
use backoff::ExponentialBackoffBuilder;

const RETRYABLE_STATUS: &[u16] = &[408, 429, 423, 500, 502, 503, 504];

fn is_retryable(err: &reqwest::Error) -> bool {
    if err.is_timeout() || err.is_connect() {
        return true;
    }
    err.status().is_some_and(|status| RETRYABLE_STATUS.contains(&status.as_u16()))
}

/// Retry `attempt` with exponential backoff (`2^attempt` seconds by default,
/// capped by a 600s total elapsed time) while it returns a transient
/// [`reqwest::Error`].
pub async fn retry_http<T, F, Fut>(mut attempt: F) -> Result<T, reqwest::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, reqwest::Error>>,
{
    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_secs(1))
        .with_multiplier(2.0)
        .with_max_elapsed_time(Some(Duration::from_secs(600)))
        .build();

    retry_notify(
        backoff,
        || async {
            attempt().await.map_err(|err| {
                if is_retryable(&err) {
                    backoff::Error::transient(err)
                } else {
                    backoff::Error::permanent(err)
                }
            })
        },
        |err, delay: Duration| {
            log::warn!("HTTP request failed ({err}), retrying in {delay:?}");
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::RETRYABLE_STATUS;

    #[test]
    fn retryable_status_list_includes_service_unavailable() {
        assert!(RETRYABLE_STATUS.contains(&503));
        assert!(RETRYABLE_STATUS.contains(&429));
        assert!(!RETRYABLE_STATUS.contains(&404));
    }

    #[tokio::test]
    async fn succeeds_without_retrying_on_first_success() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, reqwest::Error> = super::retry_http(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
