//! Backoff for provider responses that ask the caller to slow down.

use std::future::Future;
use std::time::Duration;

use crate::error::LlmError;

/// Attempt budget for throttled (429/503) provider responses. Transport
/// errors are not retried here; the indexing pipeline owns that policy.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ThrottlePolicy {
    pub max_attempts: u32,
    /// Wait after the first throttled attempt; doubles for each later one.
    pub base_delay: Duration,
    /// Cap for both computed and server-requested waits.
    pub max_delay: Duration,
}

impl ThrottlePolicy {
    pub(crate) const PROVIDER_DEFAULT: Self = Self {
        max_attempts: 3,
        base_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(30),
    };

    fn delay_for(&self, attempt: u32, requested: Option<Duration>) -> Duration {
        requested
            .unwrap_or_else(|| {
                self.base_delay
                    .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
            })
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Throttle {
    Proceed,
    /// Back off, for the server-requested duration when one was sent.
    Wait(Option<Duration>),
}

/// `Retry-After` as delta-seconds. HTTP-date values fall back to backoff.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

pub(crate) fn classify_response(response: &reqwest::Response) -> Throttle {
    let status = response.status();
    if status != reqwest::StatusCode::TOO_MANY_REQUESTS
        && status != reqwest::StatusCode::SERVICE_UNAVAILABLE
    {
        return Throttle::Proceed;
    }
    let requested = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    Throttle::Wait(requested)
}

/// Call `send` until `classify` lets the response through or the attempts run
/// out. The first response that is not throttled is returned as is, error
/// statuses included.
///
/// # Errors
///
/// Returns `LlmError::RateLimited` when every attempt was throttled, or the
/// transport error of the first attempt that failed to send.
pub(crate) async fn with_throttle_retry<R, E, F, Fut, C>(
    provider: &'static str,
    policy: ThrottlePolicy,
    mut send: F,
    classify: C,
) -> Result<R, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: Into<LlmError>,
    C: Fn(&R) -> Throttle,
{
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let response = send().await.map_err(Into::into)?;
        let Throttle::Wait(requested) = classify(&response) else {
            return Ok(response);
        };
        if attempt == attempts {
            break;
        }
        let delay = policy.delay_for(attempt, requested);
        tracing::warn!(
            provider,
            attempt,
            max_attempts = attempts,
            "provider throttled, retrying in {}ms",
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
    }
    Err(LlmError::RateLimited)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use proptest::prelude::*;

    use super::*;

    const POLICY: ThrottlePolicy = ThrottlePolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_millis(250),
    };

    fn classify_status(status: &u16) -> Throttle {
        match status {
            429 => Throttle::Wait(None),
            503 => Throttle::Wait(Some(Duration::from_secs(60))),
            _ => Throttle::Proceed,
        }
    }

    fn statuses(codes: &[u16]) -> Mutex<VecDeque<u16>> {
        Mutex::new(codes.iter().copied().collect())
    }

    #[test]
    fn retry_after_seconds_only() {
        assert_eq!(parse_retry_after(" 7 "), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(POLICY.delay_for(1, None), Duration::from_millis(100));
        assert_eq!(POLICY.delay_for(2, None), Duration::from_millis(200));
        assert_eq!(POLICY.delay_for(3, None), Duration::from_millis(250));
        assert_eq!(
            POLICY.delay_for(1, Some(Duration::from_secs(60))),
            Duration::from_millis(250)
        );
        assert_eq!(
            POLICY.delay_for(1, Some(Duration::from_millis(5))),
            Duration::from_millis(5)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_throttling() {
        let queue = &statuses(&[429, 503, 200]);
        let start = tokio::time::Instant::now();

        let status = with_throttle_retry(
            "test",
            POLICY,
            move || async move { Ok::<_, LlmError>(queue.lock().unwrap().pop_front().unwrap()) },
            classify_status,
        )
        .await
        .unwrap();

        assert_eq!(status, 200);
        assert!(queue.lock().unwrap().is_empty());
        // 100ms backoff, then the 60s request capped at 250ms
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(350) && waited < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_are_rate_limited() {
        let queue = &statuses(&[429, 429, 429, 200]);
        let result = with_throttle_retry(
            "test",
            POLICY,
            move || async move { Ok::<_, LlmError>(queue.lock().unwrap().pop_front().unwrap()) },
            classify_status,
        )
        .await;

        assert!(matches!(result, Err(LlmError::RateLimited)), "got {result:?}");
        assert_eq!(queue.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn error_statuses_pass_through() {
        let queue = &statuses(&[500, 200]);
        let status = with_throttle_retry(
            "test",
            POLICY,
            move || async move { Ok::<_, LlmError>(queue.lock().unwrap().pop_front().unwrap()) },
            classify_status,
        )
        .await
        .unwrap();
        assert_eq!(status, 500);
    }

    #[tokio::test]
    async fn transport_errors_are_not_retried() {
        let calls = &Mutex::new(0u32);
        let result = with_throttle_retry(
            "test",
            POLICY,
            move || async move {
                *calls.lock().unwrap() += 1;
                Err::<u16, _>(LlmError::Other("connection refused".into()))
            },
            classify_status,
        )
        .await;

        assert!(matches!(result, Err(LlmError::Other(_))));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    proptest! {
        #[test]
        fn computed_backoff_never_exceeds_cap(attempt in 1u32..64) {
            let delay = POLICY.delay_for(attempt, None);
            prop_assert!(delay <= POLICY.max_delay);
            prop_assert!(delay >= POLICY.base_delay);
        }
    }
}
