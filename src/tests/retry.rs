//! Retry executor tests.

use crate::error::AegisError;
use crate::llm::retry::{RetryExecutor, RetryPolicy};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        backoff_multiplier: 2.0,
        total_timeout: Duration::from_secs(5),
        request_timeout: Duration::from_secs(1),
    }
}

#[tokio::test]
async fn succeeds_first_try_without_retrying() {
    let executor = RetryExecutor::new(fast_policy(3));
    let calls = AtomicU32::new(0);

    let result = executor
        .execute(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AegisError>(42)
        })
        .await
        .expect("succeeds");

    assert_eq!(result, 42);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retries_transient_errors_until_success() {
    let executor = RetryExecutor::new(fast_policy(5));
    let calls = AtomicU32::new(0);

    let result = executor
        .execute(|| async {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt < 3 {
                Err(AegisError::upstream("503 from provider", true, None))
            } else {
                Ok("recovered")
            }
        })
        .await
        .expect("eventually succeeds");

    assert_eq!(result, "recovered");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn non_retryable_errors_fail_fast() {
    let executor = RetryExecutor::new(fast_policy(5));
    let calls = AtomicU32::new(0);

    let err = executor
        .execute(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(AegisError::upstream("400 bad request", false, None))
        })
        .await
        .unwrap_err();

    assert!(!err.is_retryable());
    assert_eq!(calls.load(Ordering::SeqCst), 1, "4xx-class failures must not retry");
}

#[tokio::test]
async fn exhausted_attempts_surface_the_last_error() {
    let executor = RetryExecutor::new(fast_policy(2));
    let calls = AtomicU32::new(0);

    let err = executor
        .execute(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(AegisError::upstream("still down", true, None))
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(err.to_string().contains("still down"));
}

#[test]
fn backoff_delay_grows_and_caps() {
    let executor = RetryExecutor::new(fast_policy(5));
    let d1 = executor.calculate_delay(1);
    let d3 = executor.calculate_delay(3);
    assert!(d3 >= d1);
    // Cap plus 10% jitter headroom.
    assert!(executor.calculate_delay(10) <= Duration::from_millis(5));
}
