use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::draft_client::PersistenceError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    /// Exponential backoff before `attempt` (1-based retries): base, 2·base, 4·base, ...
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent. Every attempt is bounded by `attempt_timeout`.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, PersistenceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PersistenceError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error: Option<PersistenceError> = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            let delay = policy.delay_before(attempt);
            warn!(
                "{what} attempt {} failed, retrying after {}ms...",
                attempt,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        let error = match tokio::time::timeout(policy.attempt_timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if e.is_retryable() => e,
            Ok(Err(e)) => return Err(e),
            Err(_) => PersistenceError::Timeout(policy.attempt_timeout),
        };
        warn!("{what} failed: {error}");
        last_error = Some(error);
    }

    Err(PersistenceError::Exhausted {
        attempts,
        last: last_error.map(|e| e.to_string()).unwrap_or_default(),
    })
}

/// One attempt, bounded by `limit`.
pub async fn bounded<T, Fut>(limit: Duration, call: Fut) -> Result<T, PersistenceError>
where
    Fut: Future<Output = Result<T, PersistenceError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| PersistenceError::Timeout(limit))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(10),
        }
    }

    fn unavailable() -> PersistenceError {
        PersistenceError::Api {
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let p = policy();
        assert_eq!(p.delay_before(1), Duration::from_millis(500));
        assert_eq!(p.delay_before(2), Duration::from_millis(1000));
        assert_eq!(p.delay_before(3), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let start = Instant::now();
        let result = with_retry(&policy(), "save", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(unavailable())
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_budget() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&policy(), "save", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(unavailable())
        })
        .await;
        assert!(matches!(
            result,
            Err(PersistenceError::Exhausted { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&policy(), "save", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PersistenceError::Api {
                status: 400,
                message: "bad patch".to_string(),
            })
        })
        .await;
        assert!(matches!(result, Err(PersistenceError::Api { status: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out_and_retries() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(&policy(), "save", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok("saved")
        })
        .await;
        assert_eq!(result.unwrap(), "saved");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_call_times_out() {
        let result: Result<(), _> = bounded(Duration::from_secs(2), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(PersistenceError::Timeout(d)) if d == Duration::from_secs(2)));
    }
}
