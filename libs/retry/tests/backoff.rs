use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use sms_retry::{CancelReason, Cancellation, RetryError, RetryPolicy, execute};
use tokio::time::Instant;

fn counter() -> (Arc<AtomicU32>, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    (Arc::clone(&calls), calls)
}

#[tokio::test(start_paused = true)]
async fn two_transient_failures_then_success() {
    let policy: RetryPolicy<String> = RetryPolicy::new(3, Duration::from_millis(100));
    let (calls, seen) = counter();
    let started = Instant::now();

    let outcome = execute(&Cancellation::never(), &policy, move |attempt| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt < 3 {
                Err("service unavailable".to_string())
            } else {
                Ok(attempt)
            }
        }
    })
    .await;

    assert_eq!(outcome.attempts, 3);
    assert_eq!(
        outcome.delays,
        vec![Duration::from_millis(200), Duration::from_millis(400)]
    );
    assert_eq!(outcome.total_delay(), Duration::from_millis(600));
    assert_eq!(started.elapsed(), Duration::from_millis(600));
    assert_eq!(outcome.result.unwrap(), 3);
    assert_eq!(seen.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn retriable_failures_stop_after_max_attempts() {
    let policy: RetryPolicy<String> = RetryPolicy::new(4, Duration::from_millis(10));
    let (calls, seen) = counter();

    let outcome = execute(&Cancellation::never(), &policy, move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>("connection reset by peer".to_string()) }
    })
    .await;

    assert_eq!(outcome.attempts, 4);
    assert_eq!(seen.load(Ordering::SeqCst), 4);
    assert_eq!(outcome.delays.len(), 3);
    match outcome.result {
        Err(RetryError::Exhausted(last)) => assert_eq!(last, "connection reset by peer"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn non_retriable_failure_short_circuits() {
    let policy: RetryPolicy<String> = RetryPolicy::new(3, Duration::from_millis(10));
    let (calls, seen) = counter();

    let outcome = execute(&Cancellation::never(), &policy, move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>("recipient blocked".to_string()) }
    })
    .await;

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert!(outcome.delays.is_empty());
    assert!(matches!(outcome.result, Err(RetryError::Permanent(_))));
}

#[tokio::test(start_paused = true)]
async fn cancel_during_backoff_prevents_next_attempt() {
    let policy: RetryPolicy<String> = RetryPolicy::new(5, Duration::from_secs(1));
    let (cancellation, handle) = Cancellation::new();
    let (calls, seen) = counter();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.cancel();
    });

    let started = Instant::now();
    let outcome = execute(&cancellation, &policy, move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>("timeout".to_string()) }
    })
    .await;

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.attempts, 1);
    assert!(outcome.delays.is_empty());
    assert_eq!(started.elapsed(), Duration::from_millis(500));
    assert!(matches!(
        outcome.result,
        Err(RetryError::Cancelled(CancelReason::Cancelled))
    ));
}

#[tokio::test(start_paused = true)]
async fn deadline_interrupts_backoff() {
    let policy: RetryPolicy<String> = RetryPolicy::new(10, Duration::from_millis(100));
    let cancellation = Cancellation::never().with_timeout(Duration::from_millis(700));
    let (calls, seen) = counter();

    let outcome = execute(&cancellation, &policy, move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>("temporary failure".to_string()) }
    })
    .await;

    // 200ms + 400ms fit before the deadline, the 800ms wait does not.
    assert_eq!(seen.load(Ordering::SeqCst), 3);
    assert_eq!(
        outcome.delays,
        vec![Duration::from_millis(200), Duration::from_millis(400)]
    );
    assert!(matches!(
        outcome.result,
        Err(RetryError::Cancelled(CancelReason::DeadlineExceeded))
    ));
}

#[tokio::test(start_paused = true)]
#[tracing_test::traced_test]
async fn retries_are_logged() {
    let policy: RetryPolicy<String> = RetryPolicy::new(2, Duration::from_millis(5));
    let outcome = execute(&Cancellation::never(), &policy, |attempt| async move {
        if attempt == 1 {
            Err("too many requests".to_string())
        } else {
            Ok(())
        }
    })
    .await;

    assert!(outcome.result.is_ok());
    assert!(logs_contain("attempt failed; retrying"));
}

async fn fails_after_deadline(
    policy: RetryPolicy<String>,
) -> (u32, Vec<Duration>, Result<(), RetryError<String>>) {
    let cancellation = Cancellation::never().with_timeout(Duration::from_millis(100));
    let (calls, seen) = counter();

    let outcome = execute(&cancellation, &policy, move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Err::<(), _>("temporary failure".to_string())
        }
    })
    .await;

    assert_eq!(seen.load(Ordering::SeqCst), outcome.attempts);
    (outcome.attempts, outcome.delays, outcome.result)
}

#[tokio::test(start_paused = true)]
async fn deadline_during_final_attempt_is_not_exhaustion() {
    let (attempts, delays, result) =
        fails_after_deadline(RetryPolicy::new(1, Duration::from_millis(10))).await;

    assert_eq!(attempts, 1);
    assert!(delays.is_empty());
    assert!(matches!(
        result,
        Err(RetryError::Cancelled(CancelReason::DeadlineExceeded))
    ));
}

#[tokio::test(start_paused = true)]
async fn deadline_during_earlier_attempt_stops_retrying() {
    let (attempts, delays, result) =
        fails_after_deadline(RetryPolicy::new(3, Duration::from_millis(10))).await;

    assert_eq!(attempts, 1);
    assert!(delays.is_empty());
    assert!(matches!(
        result,
        Err(RetryError::Cancelled(CancelReason::DeadlineExceeded))
    ));
}

#[tokio::test(start_paused = true)]
async fn cancel_while_attempt_runs_outranks_permanent_failure() {
    let policy: RetryPolicy<String> = RetryPolicy::new(3, Duration::from_millis(10));
    let (cancellation, handle) = Cancellation::new();

    let outcome = execute(&cancellation, &policy, move |_| {
        let handle = handle.clone();
        async move {
            handle.cancel();
            Err::<(), _>("recipient blocked".to_string())
        }
    })
    .await;

    assert_eq!(outcome.attempts, 1);
    assert!(matches!(
        outcome.result,
        Err(RetryError::Cancelled(CancelReason::Cancelled))
    ));
}
