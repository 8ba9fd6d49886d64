//! Bounded retry with exponential backoff and full jitter.
//!
//! The delay before attempt `n` (counting from zero) is
//! `base · 2ⁿ + uniform(0, base · 2ⁿ)`, clamped to the policy's maximum.
//! Only errors the transport classifies as retryable are retried;
//! everything else, deadline expiry included, surfaces immediately. A
//! concurrent shutdown aborts the backoff wait and surfaces the last
//! error.

use crate::ExporterBuildError;
use otel::{otel_debug, otel_warn};
use std::future::Future;
use std::hash::{DefaultHasher, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};
use tokio::sync::Notify;

/// Classification of an export error for retry purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Not worth repeating (bad request, permission denied, deadline
    /// expiry).
    NonRetryable,
    /// The receiver asked for backpressure (resource exhausted) or is
    /// temporarily unreachable (unavailable, connection reset).
    Retryable,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retry attempts after the initial one. Total attempts are
    /// `1 + max_retries`.
    pub max_retries: usize,
    /// Base delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on any single backoff delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 1600,
        }
    }
}

impl RetryPolicy {
    pub(crate) fn validate(&self) -> Result<(), ExporterBuildError> {
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ExporterBuildError::InvalidRetryPolicy(format!(
                "base delay {}ms exceeds max delay {}ms",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Signals a shutdown into in-flight retry loops.
#[derive(Debug, Default)]
pub(crate) struct CancelToken {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

/// Uniform pseudo-random jitter in `0..=max_jitter`, derived from the
/// clock so the exporter crate carries no RNG dependency.
fn generate_jitter(max_jitter: u64) -> u64 {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();

    let mut hasher = DefaultHasher::default();
    hasher.write_u32(nanos);
    hasher.finish() % (max_jitter + 1)
}

/// Run `operation` with bounded retries per `policy`.
///
/// `classify` decides which errors are worth repeating. Cancellation via
/// `cancel` aborts immediately, surfacing the operation's last error.
pub(crate) async fn retry_with_backoff<F, Fut, T, E, C>(
    policy: RetryPolicy,
    cancel: &CancelToken,
    classify: C,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
    C: Fn(&E) -> RetryErrorType,
{
    let mut attempt: usize = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if cancel.is_cancelled() {
                    otel_debug!(
                        name: "OtlpRetry.AbortedByShutdown",
                        operation = operation_name
                    );
                    return Err(err);
                }
                if classify(&err) == RetryErrorType::NonRetryable {
                    otel_warn!(
                        name: "OtlpRetry.NonRetryable",
                        operation = operation_name,
                        error = format!("{err:?}")
                    );
                    return Err(err);
                }
                if attempt >= policy.max_retries {
                    otel_warn!(
                        name: "OtlpRetry.Exhausted",
                        operation = operation_name,
                        attempts = attempt + 1,
                        error = format!("{err:?}")
                    );
                    return Err(err);
                }

                // full-jitter doubled-base backoff, clamped
                let exp_delay = policy
                    .base_delay_ms
                    .saturating_mul(1u64 << attempt.min(32));
                let delay_ms =
                    (exp_delay.saturating_add(generate_jitter(exp_delay))).min(policy.max_delay_ms);
                otel_debug!(
                    name: "OtlpRetry.Retrying",
                    operation = operation_name,
                    delay_in_millisecs = delay_ms,
                    error = format!("{err:?}")
                );

                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                    _ = cancel.cancelled() => {
                        otel_debug!(
                            name: "OtlpRetry.AbortedByShutdown",
                            operation = operation_name
                        );
                        return Err(err);
                    }
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn jitter_is_bounded() {
        for _ in 0..100 {
            assert!(generate_jitter(100) <= 100);
        }
        assert_eq!(generate_jitter(0), 0);
    }

    #[test]
    fn policy_rejects_inverted_bounds() {
        let policy = RetryPolicy {
            max_retries: 1,
            base_delay_ms: 2000,
            max_delay_ms: 100,
        };
        assert!(policy.validate().is_err());
        assert!(RetryPolicy::default().validate().is_ok());
    }

    #[tokio::test]
    async fn success_needs_no_retry() {
        let cancel = CancelToken::default();
        let attempts = AtomicUsize::new(0);
        let result = retry_with_backoff(
            RetryPolicy::default(),
            &cancel,
            |_: &&str| RetryErrorType::Retryable,
            "test",
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, &str>("ok") }
            },
        )
        .await;
        assert_eq!(result, Ok("ok"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_retryable_aborts_immediately() {
        let cancel = CancelToken::default();
        let attempts = AtomicUsize::new(0);
        let result = retry_with_backoff(
            RetryPolicy::default(),
            &cancel,
            |_: &&str| RetryErrorType::NonRetryable,
            "test",
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("bad request") }
            },
        )
        .await;
        assert_eq!(result, Err("bad request"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retryable_errors_are_retried_then_surfaced() {
        let cancel = CancelToken::default();
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay_ms: 5,
            max_delay_ms: 50,
        };
        let attempts = AtomicUsize::new(0);
        let result = retry_with_backoff(
            policy,
            &cancel,
            |_: &&str| RetryErrorType::Retryable,
            "test",
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("unavailable") }
            },
        )
        .await;
        assert_eq!(result, Err("unavailable"));
        // initial attempt + 2 retries
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn backoff_delays_follow_the_doubled_base_with_jitter() {
        let cancel = CancelToken::default();
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay_ms: 50,
            max_delay_ms: 10_000,
        };
        let attempts = AtomicUsize::new(0);
        let timestamps = Arc::new(std::sync::Mutex::new(Vec::<Instant>::new()));

        let stamps = timestamps.clone();
        let result = retry_with_backoff(
            policy,
            &cancel,
            |_: &&str| RetryErrorType::Retryable,
            "test",
            move || {
                stamps.lock().unwrap().push(Instant::now());
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("unavailable")
                    } else {
                        Ok("ok")
                    }
                }
            },
        )
        .await;
        assert_eq!(result, Ok("ok"));

        let stamps = timestamps.lock().unwrap();
        let first_gap = stamps[1] - stamps[0];
        let second_gap = stamps[2] - stamps[1];
        // attempt 0 backoff: 50 + U(0,50); attempt 1: 100 + U(0,100); allow
        // a little scheduler slop above the upper bound
        assert!(first_gap >= Duration::from_millis(50), "{first_gap:?}");
        assert!(first_gap <= Duration::from_millis(150), "{first_gap:?}");
        assert!(second_gap >= Duration::from_millis(100), "{second_gap:?}");
        assert!(second_gap <= Duration::from_millis(250), "{second_gap:?}");
    }

    #[tokio::test]
    async fn shutdown_aborts_backoff() {
        let cancel = Arc::new(CancelToken::default());
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay_ms: 10_000,
            max_delay_ms: 60_000,
        };

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let result = retry_with_backoff(
            policy,
            &cancel,
            |_: &&str| RetryErrorType::Retryable,
            "test",
            || async { Err::<(), _>("unavailable") },
        )
        .await;
        assert_eq!(result, Err("unavailable"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
