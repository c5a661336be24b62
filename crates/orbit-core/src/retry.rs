use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

/// Errors produced by the retry executor itself, distinct from whatever
/// error type the wrapped operation returns.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("max retries exceeded after {attempts} attempt(s): {source}")]
    MaxRetriesExceeded { attempts: u32, source: E },
}

/// Classification of a failure, independent of its concrete error type.
/// Produced by a caller-supplied classifier closure so the retry executor
/// stays decoupled from any particular client's error enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    NonRetryable,
}

/// Optional hint carried alongside a retryable classification: when the
/// failure was a rate limit, the caller can report when the limit resets so
/// the backoff delay can be overridden.
#[derive(Debug, Clone, Copy)]
pub struct RetryHint {
    pub class: ErrorClass,
    pub rate_limit_reset_in: Option<Duration>,
}

impl RetryHint {
    pub fn retryable() -> Self {
        Self { class: ErrorClass::Retryable, rate_limit_reset_in: None }
    }

    pub fn non_retryable() -> Self {
        Self { class: ErrorClass::NonRetryable, rate_limit_reset_in: None }
    }

    pub fn rate_limited(reset_in: Duration) -> Self {
        Self { class: ErrorClass::Retryable, rate_limit_reset_in: Some(reset_in) }
    }
}

/// Pure classification by message substring, independent of error type.
/// Kept separate from any client crate so it is unit-testable in isolation.
pub fn classify_message(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();
    const RETRYABLE_PHRASES: &[&str] = &[
        "rate limit",
        "too many requests",
        "timeout",
        "timed out",
        "connection refused",
        "no such host",
        "502",
        "503",
        "504",
        "internal server error",
        "bad gateway",
        "service unavailable",
        "gateway timeout",
    ];
    if RETRYABLE_PHRASES.iter().any(|p| lower.contains(p)) {
        ErrorClass::Retryable
    } else {
        ErrorClass::NonRetryable
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = 2u32.saturating_pow(attempt.saturating_sub(1));
    let nominal = base.saturating_mul(exp);
    let jitter = rand::thread_rng().gen_range(0.8..=1.2);
    let millis = (nominal.as_secs_f64() * jitter * 1000.0).round() as u64;
    Duration::from_millis(millis).min(Duration::from_secs(60))
}

/// Run `op`, retrying on retryable failures up to `max_attempts` times.
///
/// `max_attempts == 0` is coerced to 1 (a single attempt, no retries).
/// `classify` inspects a failed attempt's error and returns a `RetryHint`;
/// when the hint carries a rate-limit reset, the computed delay is
/// `reset_in + 1s` rather than the standard backoff.
pub async fn execute<T, E, Fut, Op, Classify>(
    max_attempts: u32,
    base_delay: Duration,
    mut op: Op,
    classify: Classify,
) -> Result<T, RetryError<E>>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Classify: Fn(&E) -> RetryHint,
{
    let attempts = max_attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let hint = classify(&err);
                if hint.class == ErrorClass::NonRetryable || attempt == attempts {
                    last_err = Some(err);
                    break;
                }
                let delay = match hint.rate_limit_reset_in {
                    Some(reset_in) => reset_in + Duration::from_secs(1),
                    None => backoff_delay(base_delay, attempt),
                };
                // Cancellation is handled by the caller racing this future
                // against a cancellation token via `tokio::select!`.
                tokio::time::sleep(delay).await;
                last_err = Some(err);
                continue;
            }
        }
    }

    match last_err {
        Some(err) => Err(RetryError::MaxRetriesExceeded { attempts, source: err }),
        None => unreachable!("loop always returns Ok or breaks with an error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn classifies_known_retryable_phrases() {
        assert_eq!(classify_message("API rate limit exceeded"), ErrorClass::Retryable);
        assert_eq!(classify_message("Too Many Requests"), ErrorClass::Retryable);
        assert_eq!(classify_message("connection refused"), ErrorClass::Retryable);
        assert_eq!(classify_message("no such host"), ErrorClass::Retryable);
        assert_eq!(classify_message("request timed out"), ErrorClass::Retryable);
        assert_eq!(classify_message("502 Bad Gateway"), ErrorClass::Retryable);
    }

    #[test]
    fn classifies_permanent_errors_as_non_retryable() {
        assert_eq!(classify_message("404 not found"), ErrorClass::NonRetryable);
        assert_eq!(classify_message("forbidden"), ErrorClass::NonRetryable);
    }

    #[test]
    fn backoff_caps_at_60s_by_attempt_7() {
        let d = backoff_delay(Duration::from_secs(1), 7);
        assert!(d <= Duration::from_secs(60));
        assert!(d >= Duration::from_secs(48));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_max_attempts_is_coerced_to_one() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError<&str>> = execute(
            0,
            Duration::from_millis(1),
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom") }
            },
            |_| RetryHint::non_retryable(),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = execute(
            3,
            Duration::from_millis(1),
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err("rate limit exceeded")
                    } else {
                        Ok(42)
                    }
                }
            },
            |e: &&str| classify_message(e).into(),
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_surfaces_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError<&str>> = execute(
            5,
            Duration::from_millis(1),
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("forbidden") }
            },
            |e: &&str| classify_message(e).into(),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    impl From<ErrorClass> for RetryHint {
        fn from(class: ErrorClass) -> Self {
            RetryHint { class, rate_limit_reset_in: None }
        }
    }
}
