//! # Recourse
//!
//! Error classification, retry with exponential backoff, and pluggable
//! recovery strategies for async Rust.
//!
//! ## Pieces
//!
//! - [`RetryPolicy`] / [`RetryExecutor`]: how many times to try and how long
//!   to wait between tries
//! - [`ClassifiedError`]: a failure normalized into a category and a
//!   structured fault code
//! - [`RecoveryStrategy`]: decides whether a failure is worth retrying, or
//!   can be replaced by a fallback value
//! - [`RecoveryOrchestrator`]: picks the first applicable strategy and lets
//!   its verdict drive the retry loop
//!
//! ## Quick Example
//!
//! ```rust
//! use recourse::{RecoveryOrchestrator, RetryExecutor, RetryPolicy};
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let orchestrator = RecoveryOrchestrator::new()
//!     .with_executor(
//!         RetryExecutor::new(
//!             RetryPolicy::new(Duration::from_millis(1))
//!                 .with_max_delay(Duration::from_millis(5))
//!                 .with_jitter(false),
//!         )
//!         .unwrap(),
//!     )
//!     // keep the doctest fast; strategies suggest multi-second delays
//!     .with_delay_override(false);
//!
//! let calls = AtomicU32::new(0);
//! let calls = &calls;
//! let rows = orchestrator
//!     .retry_with_recovery(
//!         move || async move {
//!             if calls.fetch_add(1, Ordering::SeqCst) == 0 {
//!                 Err("database connection refused")
//!             } else {
//!                 Ok(vec![1, 2, 3])
//!             }
//!         },
//!         None,
//!     )
//!     .await;
//!
//! assert_eq!(rows, Ok(vec![1, 2, 3]));
//! assert_eq!(calls.load(Ordering::SeqCst), 2);
//! # });
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod classify;
pub mod orchestrator;
pub mod recovery;
pub mod retry;

// Re-exports
pub use classify::{
    ClassifiedError, ErrorCategory, ErrorClassifier, FaultCode, HeuristicClassifier, Severity,
    UnknownCategoryClassifier,
};
pub use orchestrator::{RecoveryConfig, RecoveryOrchestrator, NO_APPLICABLE_STRATEGY};
pub use recovery::{
    AlwaysOnline, AuthRecoveryStrategy, BoxError, Connectivity, ConnectivityFlag,
    DatabaseRecoveryStrategy, FallbackProducer, FallbackRegistry, GracefulDegradationStrategy,
    NetworkRecoveryStrategy, RecoveryContext, RecoveryResult, RecoveryStrategy,
};
pub use retry::{PolicyError, RetryDecision, RetryError, RetryExecutor, RetryPolicy};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::classify::{ClassifiedError, ErrorCategory, ErrorClassifier, FaultCode};
    pub use crate::orchestrator::{RecoveryConfig, RecoveryOrchestrator};
    pub use crate::recovery::{RecoveryContext, RecoveryResult, RecoveryStrategy};
    pub use crate::retry::{RetryDecision, RetryExecutor, RetryPolicy};
}
