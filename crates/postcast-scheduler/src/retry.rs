//! Bounded retry with linear backoff for per-destination sends.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use postcast_core::error::SendError;

/// Linear backoff: after failed attempt `i` (1-based), wait `i * unit`.
pub fn linear_backoff(unit: Duration) -> impl Fn(u32) -> Duration {
    move |attempt| unit * attempt
}

/// Run `op` up to `max_attempts` times.
///
/// Retryable errors wait `backoff(attempt)` and try again; terminal errors
/// abort immediately. The error from the final attempt is returned as-is.
pub async fn with_retry<T, F, Fut>(
    max_attempts: u32,
    backoff: impl Fn(u32) -> Duration,
    mut op: F,
) -> Result<T, SendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SendError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let wait = backoff(attempt);
                warn!(
                    "⏳ attempt {attempt}/{max_attempts} failed ({err}), retrying in {}s",
                    wait.as_secs()
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn flaky(fail_times: u32) -> (Arc<AtomicU32>, impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<u32, SendError>> + Send>>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let op = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Box::pin(async move {
                if n <= fail_times {
                    Err(SendError::Retryable(format!("attempt {n} timed out")))
                } else {
                    Ok(n)
                }
            }) as std::pin::Pin<Box<dyn Future<Output = _> + Send>>
        };
        (calls, op)
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_first_try_without_sleeping() {
        let start = Instant::now();
        let (calls, op) = flaky(0);
        let out = with_retry(5, linear_backoff(Duration::from_secs(3)), op).await;
        assert_eq!(out.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failures_back_off_linearly() {
        let start = Instant::now();
        let (calls, op) = flaky(2);
        let out = with_retry(5, linear_backoff(Duration::from_secs(3)), op).await;
        assert_eq!(out.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // waits: 3s after attempt 1, 6s after attempt 2
        assert_eq!(start.elapsed(), Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_attempts_then_fails() {
        let start = Instant::now();
        let (calls, op) = flaky(u32::MAX);
        let out = with_retry(5, linear_backoff(Duration::from_secs(3)), op).await;
        assert!(matches!(out, Err(SendError::Retryable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        // 3 + 6 + 9 + 12; no sleep after the final attempt
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_aborts_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let out: Result<(), _> = with_retry(5, linear_backoff(Duration::from_secs(3)), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(SendError::Terminal("chat not found".into())) }
        })
        .await;
        assert!(matches!(out, Err(SendError::Terminal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_max_attempts_still_runs_once() {
        let (calls, op) = flaky(0);
        let out = with_retry(0, linear_backoff(Duration::from_secs(1)), op).await;
        assert_eq!(out.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
