//! Property-based tests for retry policies and the retry loop

use proptest::prelude::*;
use recourse::{RetryExecutor, RetryPolicy};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn policy(base_ms: u64, max_ms: u64, multiplier: f64, max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(Duration::from_millis(base_ms))
        .with_max_delay(Duration::from_millis(max_ms))
        .with_multiplier(multiplier)
        .with_max_attempts(max_attempts)
        .with_jitter(false)
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn prop_delay_matches_closed_form(
        base_ms in 1u64..5_000,
        extra_ms in 0u64..60_000,
        multiplier in prop::sample::select(vec![1.5f64, 2.0, 3.0, 4.0]),
        attempt in 1u32..20,
    ) {
        let max_ms = base_ms + extra_ms;
        let policy = policy(base_ms, max_ms, multiplier, 20);

        let expected_ms = (base_ms as f64 * multiplier.powi(attempt as i32 - 1)).min(max_ms as f64);
        let actual = policy.delay_for_attempt(attempt);

        // Exact up to nanosecond rounding
        let diff = (actual.as_nanos() as f64 - expected_ms * 1e6).abs();
        prop_assert!(diff <= 1.0, "attempt {}: {:?} vs {}ms", attempt, actual, expected_ms);
        prop_assert_eq!(policy.next_delay(attempt), actual);
    }

    #[test]
    fn prop_delay_never_exceeds_cap_and_never_shrinks(
        base_ms in 1u64..1_000,
        extra_ms in 0u64..30_000,
        attempt in 1u32..64,
    ) {
        let policy = policy(base_ms, base_ms + extra_ms, 2.0, 64);

        let current = policy.delay_for_attempt(attempt);
        let next = policy.delay_for_attempt(attempt + 1);
        prop_assert!(current <= policy.max_delay());
        prop_assert!(next >= current);
    }

    #[test]
    fn prop_jitter_stays_within_half_to_full(
        base_ms in 1u64..5_000,
        extra_ms in 0u64..60_000,
        attempt in 1u32..10,
    ) {
        let policy = policy(base_ms, base_ms + extra_ms, 2.0, 10).with_jitter(true);
        let unjittered = policy.delay_for_attempt(attempt);

        let delay = policy.next_delay(attempt);
        prop_assert!(delay <= unjittered);
        prop_assert!(delay >= unjittered / 2);
    }

    #[test]
    fn prop_always_failing_operation_runs_exactly_max_attempts(max_attempts in 1u32..12) {
        let executor = RetryExecutor::new(policy(10, 1_000, 2.0, max_attempts)).unwrap();
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result: Result<(), u32> = paused_runtime().block_on(executor.execute(
            move || async move { Err(calls.fetch_add(1, Ordering::SeqCst) + 1) },
            |_, _| true,
        ));

        prop_assert_eq!(calls.load(Ordering::SeqCst), max_attempts);
        prop_assert_eq!(result, Err(max_attempts));
    }

    #[test]
    fn prop_veto_after_k_stops_at_k(max_attempts in 2u32..12, veto in 1u32..12) {
        prop_assume!(veto < max_attempts);
        let executor = RetryExecutor::new(policy(10, 1_000, 2.0, max_attempts)).unwrap();
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result: Result<(), u32> = paused_runtime().block_on(executor.execute(
            move || async move { Err(calls.fetch_add(1, Ordering::SeqCst) + 1) },
            move |_, attempt| attempt < veto,
        ));

        prop_assert_eq!(calls.load(Ordering::SeqCst), veto);
        prop_assert_eq!(result, Err(veto));
    }
}

#[test]
fn test_validated_policies_round_trip_through_json() {
    let policy = policy(250, 8_000, 1.5, 6);
    let json = serde_json::to_string(&policy).unwrap();
    let restored: RetryPolicy = serde_json::from_str(&json).unwrap();

    assert_eq!(restored, policy);
    assert!(restored.validate().is_ok());
}
