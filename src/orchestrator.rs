//! Strategy selection and the composed retry-with-recovery loop.
//!
//! [`RecoveryOrchestrator`] owns an ordered list of [`RecoveryStrategy`]
//! implementations. On each failure the error is classified, the first
//! strategy that can handle it is asked for a verdict, and that verdict
//! decides whether the [`RetryExecutor`] tries again.
//!
//! # Examples
//!
//! ```
//! use recourse::{RecoveryOrchestrator, RetryExecutor, RetryPolicy};
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let orchestrator = RecoveryOrchestrator::new().with_executor(
//!     RetryExecutor::new(
//!         RetryPolicy::new(Duration::from_millis(1))
//!             .with_max_delay(Duration::from_millis(10))
//!             .with_jitter(false),
//!     )
//!     .unwrap(),
//! );
//!
//! // Auth failures are never retried
//! let calls = AtomicU32::new(0);
//! let calls = &calls;
//! let result: Result<(), &str> = orchestrator
//!     .retry_with_recovery(
//!         move || async move {
//!             calls.fetch_add(1, Ordering::SeqCst);
//!             Err("token expired")
//!         },
//!         None,
//!     )
//!     .await;
//!
//! assert_eq!(result, Err("token expired"));
//! assert_eq!(calls.load(Ordering::SeqCst), 1);
//! # });
//! ```

use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::classify::{ClassifiedError, ErrorCategory, ErrorClassifier, HeuristicClassifier};
use crate::recovery::{
    AlwaysOnline, AuthRecoveryStrategy, BoxError, Connectivity, DatabaseRecoveryStrategy,
    FallbackRegistry, GracefulDegradationStrategy, NetworkRecoveryStrategy, RecoveryContext,
    RecoveryResult, RecoveryStrategy,
};
use crate::retry::{PolicyError, RetryDecision, RetryError, RetryExecutor, RetryPolicy};

/// Message returned when no registered strategy handles an error.
pub const NO_APPLICABLE_STRATEGY: &str = "no applicable strategy";

/// Deserializable orchestrator settings.
///
/// ```
/// use recourse::RecoveryConfig;
///
/// let config: RecoveryConfig = serde_json::from_str(
///     r#"{"retry": {"max_attempts": 5, "jitter": false}, "delay_override": false}"#,
/// )
/// .unwrap();
///
/// assert_eq!(config.retry.max_attempts(), 5);
/// assert!(!config.delay_override);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Backoff shape for `retry_with_recovery`.
    pub retry: RetryPolicy,
    /// Whether a strategy's suggested delay replaces the policy delay.
    pub delay_override: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        RecoveryConfig {
            retry: RetryPolicy::default(),
            delay_override: true,
        }
    }
}

/// Picks a recovery strategy for each failure and drives retries from its
/// verdict.
///
/// Construct one at startup and share it (it is `Send + Sync`). Strategies
/// and fallbacks may be added later; each recovery attempt works on a
/// snapshot of the strategy list, so additions only affect later attempts.
pub struct RecoveryOrchestrator {
    strategies: RwLock<Vec<Arc<dyn RecoveryStrategy>>>,
    fallbacks: Arc<FallbackRegistry>,
    classifier: Arc<dyn ErrorClassifier>,
    executor: RetryExecutor,
    delay_override: bool,
}

impl Default for RecoveryOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryOrchestrator {
    /// An orchestrator with the four built-in strategies, the default retry
    /// policy, an always-online connectivity signal and the heuristic
    /// classifier.
    pub fn new() -> Self {
        Self::with_connectivity(Arc::new(AlwaysOnline))
    }

    /// Like [`new`](Self::new), with the network strategy reading `connectivity`.
    pub fn with_connectivity(connectivity: Arc<dyn Connectivity>) -> Self {
        let fallbacks = Arc::new(FallbackRegistry::with_defaults());
        let strategies: Vec<Arc<dyn RecoveryStrategy>> = vec![
            Arc::new(NetworkRecoveryStrategy::new(connectivity)),
            Arc::new(DatabaseRecoveryStrategy),
            Arc::new(AuthRecoveryStrategy),
            Arc::new(GracefulDegradationStrategy::new(fallbacks.clone())),
        ];

        RecoveryOrchestrator {
            strategies: RwLock::new(strategies),
            fallbacks,
            classifier: Arc::new(HeuristicClassifier),
            executor: RetryExecutor::default(),
            delay_override: true,
        }
    }

    /// Build from configuration, rejecting an invalid retry policy.
    pub fn from_config(
        config: RecoveryConfig,
        connectivity: Arc<dyn Connectivity>,
    ) -> Result<Self, PolicyError> {
        let executor = RetryExecutor::new(config.retry)?;
        Ok(Self::with_connectivity(connectivity)
            .with_executor(executor)
            .with_delay_override(config.delay_override))
    }

    /// Use `executor` for `retry_with_recovery`.
    pub fn with_executor(mut self, executor: RetryExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Use `classifier` to turn operation errors into [`ClassifiedError`]s.
    pub fn with_classifier<C>(mut self, classifier: C) -> Self
    where
        C: ErrorClassifier + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Choose whether strategies' suggested delays replace the policy delay.
    ///
    /// On by default. When off, every retry waits for the policy-computed
    /// delay and strategies only decide *whether* to retry.
    pub fn with_delay_override(mut self, enabled: bool) -> Self {
        self.delay_override = enabled;
        self
    }

    /// The executor driving `retry_with_recovery`.
    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    /// Append a strategy. It is consulted after every strategy already
    /// registered.
    pub fn add_strategy<S>(&self, strategy: S)
    where
        S: RecoveryStrategy + 'static,
    {
        tracing::debug!(strategy = strategy.name(), "registering recovery strategy");
        self.strategies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(strategy));
    }

    /// Register or replace the graceful-degradation fallback for `category`.
    pub fn add_fallback_strategy<F>(&self, category: ErrorCategory, producer: F)
    where
        F: Fn() -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.fallbacks.register(category, producer);
    }

    /// Names of the registered strategies, in consultation order.
    pub fn strategy_names(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    fn snapshot(&self) -> Vec<Arc<dyn RecoveryStrategy>> {
        self.strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ask the first applicable strategy for a verdict on `error`.
    ///
    /// Never panics: a strategy that panics in `can_recover` or `recover` is
    /// reported as an unsuccessful result that does not retry.
    pub async fn attempt_recovery(
        &self,
        error: &ClassifiedError,
        context: Option<&RecoveryContext>,
    ) -> RecoveryResult {
        let mut selected = None;
        for strategy in self.snapshot() {
            match panic::catch_unwind(AssertUnwindSafe(|| strategy.can_recover(error))) {
                Ok(true) => {
                    selected = Some(strategy);
                    break;
                }
                Ok(false) => {}
                Err(_) => {
                    tracing::error!(strategy = strategy.name(), "can_recover panicked");
                    return RecoveryResult::failed(format!(
                        "recovery strategy '{}' failed",
                        strategy.name()
                    ));
                }
            }
        }

        let Some(strategy) = selected else {
            tracing::debug!(
                category = %error.category(),
                fault = ?error.fault(),
                "no recovery strategy applies"
            );
            return RecoveryResult::failed(NO_APPLICABLE_STRATEGY);
        };

        // `recover` may panic while building its future or while it is polled
        let recovery = panic::catch_unwind(AssertUnwindSafe(|| strategy.recover(error, context)));
        let result = match recovery {
            Ok(recovery) => AssertUnwindSafe(recovery).catch_unwind().await,
            Err(panic) => Err(panic),
        };

        match result {
            Ok(result) => {
                tracing::debug!(
                    strategy = strategy.name(),
                    category = %error.category(),
                    fault = ?error.fault(),
                    success = result.success(),
                    should_retry = result.should_retry(),
                    message = result.message().unwrap_or_default(),
                    "recovery attempted"
                );
                result
            }
            Err(_) => {
                tracing::error!(strategy = strategy.name(), "recover panicked");
                RecoveryResult::failed(format!("recovery strategy '{}' failed", strategy.name()))
            }
        }
    }

    /// Run `operation`, consulting the strategies after each failure to
    /// decide whether to retry.
    ///
    /// Returns the operation's value, or the error from the last attempt once
    /// attempts run out or the selected strategy vetoes retrying.
    pub async fn retry_with_recovery<T, E, F, Fut>(
        &self,
        operation: F,
        context: Option<&RecoveryContext>,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.executor
            // Classify before building the decision future so it never
            // borrows the error.
            .execute_with(operation, |error: &E, attempt| {
                self.decide(self.classify(error), attempt, context)
            })
            .await
    }

    /// Like [`retry_with_recovery`](Self::retry_with_recovery), but stops
    /// waiting as soon as `token` is cancelled.
    pub async fn retry_with_recovery_cancellable<T, E, F, Fut>(
        &self,
        operation: F,
        context: Option<&RecoveryContext>,
        token: &CancellationToken,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.executor
            .execute_cancellable(
                operation,
                |error: &E, attempt| self.decide(self.classify(error), attempt, context),
                token,
            )
            .await
    }

    fn classify<E: fmt::Display>(&self, error: &E) -> ClassifiedError {
        self.classifier.classify(error)
    }

    async fn decide(
        &self,
        classified: ClassifiedError,
        attempt: u32,
        context: Option<&RecoveryContext>,
    ) -> RetryDecision {
        let result = self.attempt_recovery(&classified, context).await;
        let decision = match (result.should_retry(), result.retry_delay_override()) {
            (false, _) => RetryDecision::Abort,
            (true, Some(delay)) if self.delay_override => RetryDecision::ContinueAfter(delay),
            (true, _) => RetryDecision::Continue,
        };
        tracing::debug!(
            attempt,
            category = %classified.category(),
            decision = ?decision,
            "recovery decision"
        );
        decision
    }
}

impl fmt::Debug for RecoveryOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryOrchestrator")
            .field("strategies", &self.strategy_names())
            .field("fallbacks", &self.fallbacks)
            .field("executor", &self.executor)
            .field("delay_override", &self.delay_override)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::FaultCode;
    use futures::future::BoxFuture;
    use serde_json::json;
    use tracing_test::traced_test;

    /// Panics inside the returned future, when it is polled.
    #[derive(Debug)]
    struct Panicking;

    /// Panics before it returns a future.
    #[derive(Debug)]
    struct PanicsEagerly;

    fn explode() -> RecoveryResult {
        panic!("strategy bug")
    }

    impl RecoveryStrategy for PanicsEagerly {
        fn name(&self) -> &str {
            "panics-eagerly"
        }

        fn can_recover(&self, error: &ClassifiedError) -> bool {
            error.category() == ErrorCategory::Unknown
        }

        fn recover<'a>(
            &'a self,
            _error: &'a ClassifiedError,
            _context: Option<&'a RecoveryContext>,
        ) -> BoxFuture<'a, RecoveryResult> {
            futures::future::ready(explode()).boxed()
        }
    }

    impl RecoveryStrategy for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn can_recover(&self, error: &ClassifiedError) -> bool {
            error.category() == ErrorCategory::Unknown
        }

        fn recover<'a>(
            &'a self,
            _error: &'a ClassifiedError,
            _context: Option<&'a RecoveryContext>,
        ) -> BoxFuture<'a, RecoveryResult> {
            async move { explode() }.boxed()
        }
    }

    #[test]
    fn test_default_registration_order() {
        let orchestrator = RecoveryOrchestrator::new();
        assert_eq!(
            orchestrator.strategy_names(),
            vec!["network", "database", "auth", "graceful-degradation"]
        );
    }

    #[test]
    fn test_add_strategy_appends() {
        let orchestrator = RecoveryOrchestrator::new();
        orchestrator.add_strategy(Panicking);
        assert_eq!(orchestrator.strategy_names().last().unwrap(), "panicking");
    }

    #[tokio::test]
    async fn test_database_strategy_precedes_degradation() {
        let orchestrator = RecoveryOrchestrator::new();
        let error = ClassifiedError::new(ErrorCategory::Database, "deadlock detected");

        let result = orchestrator.attempt_recovery(&error, None).await;

        // The degradation fallback would have succeeded with []
        assert!(!result.success());
        assert_eq!(result.message(), Some("A database error occurred."));
    }

    #[tokio::test]
    async fn test_no_applicable_strategy() {
        let orchestrator = RecoveryOrchestrator::new();
        let error = ClassifiedError::new(ErrorCategory::Unknown, "mystery");

        let result = orchestrator.attempt_recovery(&error, None).await;

        assert!(!result.success());
        assert!(!result.should_retry());
        assert_eq!(result.message(), Some(NO_APPLICABLE_STRATEGY));
    }

    #[tokio::test]
    async fn test_validation_uses_fallback() {
        let orchestrator = RecoveryOrchestrator::new();
        let error = ClassifiedError::new(ErrorCategory::Validation, "invalid email");

        let result = orchestrator.attempt_recovery(&error, None).await;
        assert!(result.success());

        orchestrator.add_fallback_strategy(ErrorCategory::Validation, || {
            Ok(json!({"valid": true}))
        });
        let result = orchestrator.attempt_recovery(&error, None).await;
        assert_eq!(result.fallback_data(), Some(&json!({"valid": true})));
    }

    #[tokio::test]
    async fn test_panicking_strategy_is_contained() {
        let orchestrator = RecoveryOrchestrator::new();
        orchestrator.add_strategy(Panicking);
        let error = ClassifiedError::new(ErrorCategory::Unknown, "mystery");

        let result = orchestrator.attempt_recovery(&error, None).await;

        assert!(!result.success());
        assert!(!result.should_retry());
        assert!(result.message().unwrap().contains("panicking"));
    }

    #[tokio::test]
    async fn test_panic_before_future_is_returned_is_contained() {
        let orchestrator = RecoveryOrchestrator::new();
        orchestrator.add_strategy(PanicsEagerly);
        let error = ClassifiedError::new(ErrorCategory::Unknown, "mystery");

        let result = AssertUnwindSafe(orchestrator.attempt_recovery(&error, None))
            .catch_unwind()
            .await
            .expect("attempt_recovery must not unwind");

        assert!(!result.success());
        assert!(!result.should_retry());
        assert!(result.message().unwrap().contains("panics-eagerly"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eager_panic_during_retry_returns_original_error() {
        let orchestrator = RecoveryOrchestrator::new();
        orchestrator.add_strategy(PanicsEagerly);
        let mut calls = 0;

        let result: Result<(), &str> = orchestrator
            .retry_with_recovery(
                || {
                    calls += 1;
                    futures::future::ready(Err("something odd happened"))
                },
                None,
            )
            .await;

        assert_eq!(result, Err("something odd happened"));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_unknown_classifier_routes_transport_faults_to_network() {
        let orchestrator =
            RecoveryOrchestrator::new().with_classifier(crate::UnknownCategoryClassifier);

        let classified = orchestrator.classify(&"socket timeout");
        let decision = orchestrator.decide(classified, 1, None).await;
        assert_eq!(
            decision,
            RetryDecision::ContinueAfter(std::time::Duration::from_secs(2))
        );

        let classified = orchestrator.classify(&"token expired");
        assert_eq!(classified.category(), ErrorCategory::Unknown);
        let decision = orchestrator.decide(classified, 1, None).await;
        assert_eq!(decision, RetryDecision::Abort);
    }

    #[tokio::test]
    async fn test_decide_without_override() {
        let orchestrator = RecoveryOrchestrator::new().with_delay_override(false);
        let classified = orchestrator.classify(&"database connection refused");
        let decision = orchestrator.decide(classified, 1, None).await;
        assert_eq!(decision, RetryDecision::Continue);
    }

    #[tokio::test]
    async fn test_from_config_rejects_invalid_policy() {
        let config = RecoveryConfig {
            retry: RetryPolicy::default().with_max_attempts(0),
            delay_override: true,
        };
        let result = RecoveryOrchestrator::from_config(config, Arc::new(AlwaysOnline));
        assert_eq!(result.unwrap_err(), PolicyError::ZeroAttempts);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_recovery_is_logged() {
        let orchestrator = RecoveryOrchestrator::new();
        let error = ClassifiedError::new(ErrorCategory::Network, "socket hang up")
            .with_fault(FaultCode::ConnectionReset);

        let result = orchestrator.attempt_recovery(&error, None).await;

        assert!(result.should_retry());
        assert!(logs_contain("recovery attempted"));
        assert!(logs_contain("network"));
    }
}
