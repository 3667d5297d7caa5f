use crate::core::errors::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Additional attempts after the first failure.
pub const MAX_RETRIES: u32 = 3;
/// Fixed delay before each retry.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Fixed-delay retry policy for store operations.
///
/// Transient failures are retried up to `max_retries` additional attempts,
/// each preceded by `delay`; the last transient error is surfaced unchanged
/// once the budget is spent. Terminal failures propagate on first
/// occurrence. The delay is fixed; there is no backoff and no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            delay: RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Run `op`, retrying transient failures until the budget is spent.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        operation,
                        attempt,
                        max_retries = self.max_retries,
                        error = %err,
                        "transient store failure, retrying"
                    );
                    sleep(self.delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::RegistryError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn flaky(failures: u32, calls: &AtomicU32) -> impl Future<Output = Result<u32>> + '_ {
        let attempt = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt < failures {
                Err(RegistryError::transient("insert"))
            } else {
                Ok(attempt)
            }
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt_has_no_delay() {
        let policy = RetryPolicy::new(3, Duration::from_millis(50));
        let calls = AtomicU32::new(0);

        let start = Instant::now();
        let value = policy.run("insert", || flaky(0, &calls)).await.unwrap();

        assert_eq!(value, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(25));
        let calls = AtomicU32::new(0);

        // Fails twice, succeeds on the third attempt: two delays elapse.
        let start = Instant::now();
        let value = policy.run("insert", || flaky(2, &calls)).await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(elapsed >= Duration::from_millis(50), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(250), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn test_retry_exhaustion_surfaces_transient() {
        let policy = RetryPolicy::new(3, Duration::from_millis(5));
        let calls = AtomicU32::new(0);

        let err = policy.run("insert", || flaky(u32::MAX, &calls)).await.unwrap_err();

        // Initial attempt plus the full retry budget.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_terminal_error_is_not_retried() {
        let policy = RetryPolicy::new(3, Duration::from_millis(5));
        let calls = AtomicU32::new(0);

        let err = policy
            .run("insert", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(RegistryError::conflict(42)) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, RegistryError::Conflict { number: 42 }));
    }
}
