use std::future::Future;
use std::time::Duration;

use crate::error::{IndexError, Result};

/// Retry budget for the embedding and upsert steps of a file pipeline.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each later attempt.
    pub base_delay: Duration,
    /// Per-attempt time budget.
    pub timeout: Duration,
}

impl RetryPolicy {
    pub(crate) fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

/// Run `f` up to `policy.max_attempts` times, each bounded by `policy.timeout`.
///
/// # Errors
///
/// Returns `IndexError::RetriesExhausted` carrying the last failure.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    op: &'static str,
    file: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        let outcome = match tokio::time::timeout(policy.timeout, f()).await {
            Ok(result) => result,
            Err(_) => Err(IndexError::Timeout {
                op,
                secs: policy.timeout.as_secs(),
            }),
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(e) => {
                last_error = e.to_string();
                if attempt < attempts {
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        op,
                        file,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "attempt failed, retrying in {}ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    Err(IndexError::RetriesExhausted {
        op,
        attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
        }
    }

    #[test]
    fn backoff_doubles_from_base() {
        let p = policy();
        assert_eq!(p.delay_for(1), Duration::from_secs(1));
        assert_eq!(p.delay_for(2), Duration::from_secs(2));
        assert_eq!(p.delay_for(3), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(policy(), "embed", "A.java", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(IndexError::Other("flaky".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(policy(), "upsert", "A.java", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(IndexError::Other("down".into())) }
        })
        .await;
        match result {
            Err(IndexError::RetriesExhausted {
                op,
                attempts,
                last_error,
            }) => {
                assert_eq!(op, "upsert");
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "down");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempt_times_out() {
        let p = RetryPolicy {
            max_attempts: 1,
            ..policy()
        };
        let result: Result<()> = with_retry(p, "embed", "A.java", || async {
            tokio::time::sleep(Duration::from_secs(120)).await;
            Ok(())
        })
        .await;
        let Err(IndexError::RetriesExhausted { last_error, .. }) = result else {
            panic!("expected exhaustion");
        };
        assert!(last_error.contains("timed out after 60s"));
    }
}
