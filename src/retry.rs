//! Retry and timeout policy wrapped around a single segment attempt.

use crate::error::TransferError;
use std::future::Future;
use std::time::Duration;
use tokio_retry2::strategy::{jitter, FixedInterval};
use tokio_retry2::{Retry, RetryError};
use tracing::warn;

/// How a segment attempt is retried.
///
/// The default runs the attempt once with no deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure (default: 0).
    pub max_retries: usize,
    /// Base delay between attempts, jittered (default: 2s).
    pub retry_delay: Duration,
    /// Deadline for one attempt (default: none).
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_delay: Duration::from_secs(2),
            attempt_timeout: None,
        }
    }
}

impl RetryPolicy {
    /// Runs `op`, retrying transient failures according to the policy.
    ///
    /// Errors for which [`TransferError::is_retryable`] is false end the loop
    /// immediately.
    ///
    /// # Arguments
    ///
    /// * `label` - Name used in log lines (usually the temp file name)
    /// * `op` - Produces one attempt each time it is called
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, TransferError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransferError>>,
    {
        let strategy = FixedInterval::new(self.retry_delay)
            .map(jitter)
            .take(self.max_retries);
        let attempt_timeout = self.attempt_timeout;
        let retrying = self.max_retries > 0;

        Retry::spawn(strategy, move || {
            let attempt = op();
            async move {
                let result = match attempt_timeout {
                    Some(limit) => match tokio::time::timeout(limit, attempt).await {
                        Ok(result) => result,
                        Err(_) => Err(TransferError::Timeout(limit)),
                    },
                    None => attempt.await,
                };
                match result {
                    Ok(value) => Ok(value),
                    Err(e) if e.is_retryable() => {
                        if retrying {
                            warn!("Attempt for {} failed, will retry: {}", label, e);
                        }
                        RetryError::to_transient(e)
                    }
                    Err(e) => RetryError::to_permanent(e),
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quick(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            retry_delay: Duration::from_millis(1),
            attempt_timeout: None,
        }
    }

    #[tokio::test]
    async fn test_default_policy_runs_once() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: Result<(), _> = RetryPolicy::default()
            .run("seg", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TransferError::Timeout(Duration::from_secs(1)))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result = quick(3)
            .run("seg", move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(TransferError::HttpStatus {
                        status: 503,
                        url: "u".to_string(),
                    })
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: Result<(), _> = quick(5)
            .run("seg", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TransferError::NotFound("u".to_string()))
            })
            .await;

        assert!(matches!(result, Err(TransferError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout() {
        let policy = RetryPolicy {
            max_retries: 1,
            retry_delay: Duration::from_millis(1),
            attempt_timeout: Some(Duration::from_millis(10)),
        };
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: Result<(), _> = policy
            .run("seg", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(TransferError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
