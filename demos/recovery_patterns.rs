//! Recovery Patterns Example
//!
//! Demonstrates the recovery orchestrator end to end:
//! - Retrying a flaky database call with strategy-suggested delays
//! - Giving up immediately on authentication failures
//! - Falling back to a degraded value
//! - Custom strategies and fallbacks
//! - Failing fast while offline
//! - Cancelling a retry sequence

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use recourse::prelude::*;
use recourse::{ConnectivityFlag, RetryError};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn fast_executor() -> RetryExecutor {
    RetryExecutor::new(
        RetryPolicy::new(Duration::from_millis(50))
            .with_max_attempts(4)
            .with_max_delay(Duration::from_millis(400))
            .with_jitter(true),
    )
    .expect("valid policy")
}

// ==================== Retrying transient failures ====================

/// Example 1: a database call that fails twice before succeeding.
async fn example_flaky_database(orchestrator: &RecoveryOrchestrator) {
    println!("\n=== Example 1: Flaky Database ===");

    let attempts = Arc::new(AtomicU32::new(0));
    let result = orchestrator
        .retry_with_recovery(
            {
                let attempts = attempts.clone();
                move || {
                    let attempts = attempts.clone();
                    async move {
                        let n = attempts.fetch_add(1, Ordering::SeqCst);
                        println!("  Attempt {}", n + 1);
                        if n < 2 {
                            Err("database connection refused")
                        } else {
                            Ok(vec!["alice", "bob"])
                        }
                    }
                }
            },
            None,
        )
        .await;

    println!("  Result: {:?}", result);
}

// ==================== Failing fast ====================

/// Example 2: expired sessions are never retried.
async fn example_auth_fails_fast(orchestrator: &RecoveryOrchestrator) {
    println!("\n=== Example 2: Auth Fails Fast ===");

    let attempts = Arc::new(AtomicU32::new(0));
    let result: Result<(), &str> = orchestrator
        .retry_with_recovery(
            {
                let attempts = attempts.clone();
                move || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err("jwt token expired") }
                }
            },
            None,
        )
        .await;

    println!(
        "  Result: {:?} after {} attempt(s)",
        result,
        attempts.load(Ordering::SeqCst)
    );
}

// ==================== Degradation ====================

/// Example 3: ask the orchestrator directly for a fallback value.
async fn example_degradation(orchestrator: &RecoveryOrchestrator) {
    println!("\n=== Example 3: Graceful Degradation ===");

    orchestrator.add_fallback_strategy(ErrorCategory::Validation, || {
        Ok(json!({ "valid": false, "errors": ["form could not be checked"] }))
    });

    let error = ClassifiedError::new(ErrorCategory::Validation, "schema service down");
    let verdict = orchestrator.attempt_recovery(&error, None).await;
    println!("  Verdict: {:?}", verdict);

    let cached = RecoveryContext::with_cached_data(json!([{ "id": 1, "title": "cached" }]));
    let error = ClassifiedError::new(ErrorCategory::Database, "relation does not exist");
    let verdict = orchestrator.attempt_recovery(&error, Some(&cached)).await;
    println!("  Cached verdict: {:?}", verdict.fallback_data());
}

// ==================== Custom strategies ====================

#[derive(Debug)]
struct RateLimitStrategy;

impl RecoveryStrategy for RateLimitStrategy {
    fn name(&self) -> &str {
        "rate-limit"
    }

    fn can_recover(&self, error: &ClassifiedError) -> bool {
        error.category() == ErrorCategory::Unknown && error.message().contains("429")
    }

    fn recover<'a>(
        &'a self,
        _error: &'a ClassifiedError,
        _context: Option<&'a RecoveryContext>,
    ) -> BoxFuture<'a, RecoveryResult> {
        let verdict = RecoveryResult::retry_after(Duration::from_millis(100), "rate limited");
        future::ready(verdict).boxed()
    }
}

/// Example 4: an appended strategy for errors the built-ins ignore.
async fn example_custom_strategy(orchestrator: &RecoveryOrchestrator) {
    println!("\n=== Example 4: Custom Strategy ===");

    orchestrator.add_strategy(RateLimitStrategy);
    println!("  Strategies: {:?}", orchestrator.strategy_names());

    let attempts = Arc::new(AtomicU32::new(0));
    let result = orchestrator
        .retry_with_recovery(
            {
                let attempts = attempts.clone();
                move || {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err("HTTP 429 from upstream")
                        } else {
                            Ok("accepted")
                        }
                    }
                }
            },
            None,
        )
        .await;

    println!("  Result: {:?}", result);
}

// ==================== Connectivity ====================

/// Example 5: transport errors are not retried while the host is offline.
async fn example_offline(flag: &ConnectivityFlag, orchestrator: &RecoveryOrchestrator) {
    println!("\n=== Example 5: Offline ===");

    flag.set_online(false);
    let attempts = Arc::new(AtomicU32::new(0));
    let result: Result<(), &str> = orchestrator
        .retry_with_recovery(
            {
                let attempts = attempts.clone();
                move || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err("network request timeout") }
                }
            },
            None,
        )
        .await;
    flag.set_online(true);

    println!(
        "  Result: {:?} after {} attempt(s)",
        result,
        attempts.load(Ordering::SeqCst)
    );
}

// ==================== Cancellation ====================

/// Example 6: stop retrying when the caller loses interest.
async fn example_cancellation(orchestrator: &RecoveryOrchestrator) {
    println!("\n=== Example 6: Cancellation ===");

    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            token.cancel();
        })
    };

    let result: Result<(), RetryError<&str>> = orchestrator
        .retry_with_recovery_cancellable(
            || async { Err("503 service unavailable") },
            None,
            &token,
        )
        .await;

    let _ = canceller.await;
    println!("  Result: {:?}", result);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("Recovery Patterns Examples");
    println!("==========================");

    let flag = ConnectivityFlag::new(true);
    let orchestrator = RecoveryOrchestrator::with_connectivity(Arc::new(flag.clone()))
        .with_executor(fast_executor());

    example_flaky_database(&orchestrator).await;
    example_auth_fails_fast(&orchestrator).await;
    example_degradation(&orchestrator).await;
    example_custom_strategy(&orchestrator).await;
    example_offline(&flag, &orchestrator).await;
    example_cancellation(&orchestrator).await;

    println!("\n=== All examples completed ===");
}
