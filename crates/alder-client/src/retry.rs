//! Retry executor: runs a remote operation under a backoff policy.
//!
//! The operation is a zero-argument async closure producing a fresh
//! attempt each call. A pluggable classifier inspects each failure and
//! decides whether to retry, abort, or defer to the default policy (the
//! service's own error taxonomy via [`RpcError::is_retriable`]).
//!
//! The executor assumes nothing about side effects of failed attempts:
//! only idempotent operations (lookups, id allocation) should be retried
//! blindly, which is the caller's responsibility.

use std::future::Future;
use std::time::Duration;

use alder_types::RpcError;
use tracing::debug;
use tracing::warn;

/// Classifier verdict for a single failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryVerdict {
    /// Retry the operation (subject to remaining attempts).
    Retry,
    /// Stop immediately and surface the failure.
    Abort,
    /// Defer to the default policy.
    Unhandled,
}

/// Backoff policy for retried operations.
///
/// Backoff is deterministic: exponential growth by `backoff_multiplier`,
/// capped at `max_backoff`, slept inline on the caller's task between
/// attempts. `max_attempts` bounds the loop; wall-clock deadlines belong
/// to the RPC implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryParams {
    pub initial_backoff: Duration,
    pub backoff_multiplier: u32,
    pub max_backoff: Duration,
    pub max_attempts: u32,
}

impl RetryParams {
    pub fn new(initial_backoff: Duration, backoff_multiplier: u32, max_backoff: Duration, max_attempts: u32) -> Self {
        assert!(backoff_multiplier >= 1, "RETRY: multiplier must be at least 1");
        assert!(max_attempts >= 1, "RETRY: at least one attempt is required");
        assert!(max_backoff >= initial_backoff, "RETRY: max_backoff must not undercut initial_backoff");
        Self {
            initial_backoff,
            backoff_multiplier,
            max_backoff,
            max_attempts,
        }
    }

    /// A policy that performs exactly one attempt.
    pub fn no_retries() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            backoff_multiplier: 1,
            max_backoff: Duration::ZERO,
            max_attempts: 1,
        }
    }
}

impl Default for RetryParams {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            backoff_multiplier: 2,
            max_backoff: Duration::from_secs(10),
            max_attempts: 5,
        }
    }
}

/// Next backoff delay: multiply and cap.
pub(crate) fn next_backoff(current: Duration, multiplier: u32, max: Duration) -> Duration {
    current.saturating_mul(multiplier).min(max)
}

/// Run `operation` under `params`, classifying each failure.
///
/// An `Abort` verdict (or a non-retriable error under the default policy)
/// surfaces as [`ClientError::Service`] after the attempt that produced
/// it. A retriable failure that survives every allowed attempt surfaces
/// as [`ClientError::RetriesExhausted`] wrapping the last error.
///
/// [`ClientError::Service`]: crate::error::ClientError::Service
/// [`ClientError::RetriesExhausted`]: crate::error::ClientError::RetriesExhausted
pub async fn run_with_retries<T, F, Fut, C>(params: &RetryParams, classifier: C, mut operation: F) -> Result<T, crate::error::ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RpcError>>,
    C: Fn(&RpcError) -> RetryVerdict,
{
    let mut backoff = params.initial_backoff;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let verdict = match classifier(&error) {
                    RetryVerdict::Unhandled => {
                        if error.is_retriable() {
                            RetryVerdict::Retry
                        } else {
                            RetryVerdict::Abort
                        }
                    }
                    verdict => verdict,
                };
                match verdict {
                    RetryVerdict::Abort | RetryVerdict::Unhandled => {
                        debug!(attempt, error = %error, "remote call aborted");
                        return Err(crate::error::ClientError::Service { source: error });
                    }
                    RetryVerdict::Retry => {
                        if attempt >= params.max_attempts {
                            warn!(attempt, error = %error, "remote call failed, retries exhausted");
                            return Err(crate::error::ClientError::RetriesExhausted {
                                attempts: attempt,
                                source: error,
                            });
                        }
                        debug!(attempt, backoff_ms = backoff.as_millis() as u64, error = %error, "retrying remote call");
                        tokio::time::sleep(backoff).await;
                        backoff = next_backoff(backoff, params.backoff_multiplier, params.max_backoff);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    use alder_types::ErrorCode;

    use super::*;
    use crate::error::ClientError;

    fn fast_params(max_attempts: u32) -> RetryParams {
        RetryParams::new(Duration::from_millis(1), 2, Duration::from_millis(4), max_attempts)
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let mut backoff = Duration::from_millis(100);
        backoff = next_backoff(backoff, 2, Duration::from_millis(350));
        assert_eq!(backoff, Duration::from_millis(200));
        backoff = next_backoff(backoff, 2, Duration::from_millis(350));
        assert_eq!(backoff, Duration::from_millis(350));
        backoff = next_backoff(backoff, 2, Duration::from_millis(350));
        assert_eq!(backoff, Duration::from_millis(350));
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let value = run_with_retries(&fast_params(5), |_| RetryVerdict::Unhandled, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, RpcError>(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failures_then_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let value = run_with_retries(&fast_params(5), |_| RetryVerdict::Unhandled, move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(RpcError::unavailable("node down"))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn abort_verdict_stops_after_one_attempt() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result: Result<(), _> = run_with_retries(&fast_params(5), |_| RetryVerdict::Abort, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RpcError::unavailable("node down"))
            }
        })
        .await;
        assert!(matches!(result, Err(ClientError::Service { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_retriable_error_aborts_under_default_policy() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result: Result<(), _> = run_with_retries(&fast_params(5), |_| RetryVerdict::Unhandled, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RpcError::new(ErrorCode::PermissionDenied, "nope"))
            }
        })
        .await;
        assert!(matches!(result, Err(ClientError::Service { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_wraps_last_error() {
        let result: Result<(), _> = run_with_retries(&fast_params(3), |_| RetryVerdict::Unhandled, || async {
            Err(RpcError::unavailable("still down"))
        })
        .await;
        match result {
            Err(ClientError::RetriesExhausted { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert_eq!(source.code, ErrorCode::Unavailable);
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn classifier_overrides_default_policy() {
        // PermissionDenied is terminal by default; a Retry verdict keeps going.
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let value = run_with_retries(&fast_params(5), |_| RetryVerdict::Retry, move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 2 {
                    Err(RpcError::new(ErrorCode::PermissionDenied, "flaky proxy"))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn no_retries_policy_is_single_attempt() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result: Result<(), _> = run_with_retries(&RetryParams::no_retries(), |_| RetryVerdict::Unhandled, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RpcError::unavailable("down"))
            }
        })
        .await;
        assert!(matches!(result, Err(ClientError::RetriesExhausted { attempts: 1, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
