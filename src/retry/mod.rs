//! Retry with exponential backoff.
//!
//! The pieces follow a "data describes, executor runs" split:
//!
//! - **[`RetryPolicy`]** is just data: attempt limit, base/max delay,
//!   multiplier, jitter. It is easy to test and can be loaded from config.
//! - **[`RetryExecutor`]** runs an operation factory under a policy, asking a
//!   caller-supplied predicate after each failure whether to go on.
//!
//! # Quick Start
//!
//! ```rust
//! use recourse::{RetryDecision, RetryExecutor, RetryPolicy};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let executor = RetryExecutor::new(
//!     RetryPolicy::new(Duration::from_millis(10))
//!         .with_max_attempts(3)
//!         .with_jitter(false),
//! )
//! .unwrap();
//!
//! // Only retry errors that look transient
//! let result: Result<(), &str> = executor
//!     .execute(
//!         || async { Err("invalid input") },
//!         |err: &&str, _attempt| {
//!             if err.contains("timeout") {
//!                 RetryDecision::Continue
//!             } else {
//!                 RetryDecision::Abort
//!             }
//!         },
//!     )
//!     .await;
//!
//! assert_eq!(result, Err("invalid input"));
//! # });
//! ```
//!
//! # Error Types
//!
//! - [`PolicyError`]: a policy that breaks its invariants
//! - [`RetryError`]: returned by the cancellable entry points

mod error;
mod executor;
mod policy;

pub use error::{PolicyError, RetryError};
pub use executor::{RetryDecision, RetryExecutor};
pub use policy::RetryPolicy;
