//! Recovery strategies.
//!
//! A [`RecoveryStrategy`] looks at a [`ClassifiedError`] and decides whether
//! it can do something about it: hand back a substitute value, ask the caller
//! to retry (optionally after a specific delay), or give up with a message.
//!
//! Four strategies ship with the crate and are registered, in this order, by
//! [`RecoveryOrchestrator::new`](crate::RecoveryOrchestrator::new):
//!
//! - [`NetworkRecoveryStrategy`]: retries transient transport faults, gives up
//!   while offline
//! - [`DatabaseRecoveryStrategy`]: retries connection and timeout faults, serves
//!   cached data otherwise
//! - [`AuthRecoveryStrategy`]: never retries
//! - [`GracefulDegradationStrategy`]: returns a per-category fallback value
//!
//! # Writing a strategy
//!
//! ```rust
//! use futures::future::{BoxFuture, FutureExt};
//! use recourse::prelude::*;
//!
//! #[derive(Debug)]
//! struct EchoValidation;
//!
//! impl RecoveryStrategy for EchoValidation {
//!     fn name(&self) -> &str {
//!         "echo-validation"
//!     }
//!
//!     fn can_recover(&self, error: &ClassifiedError) -> bool {
//!         error.category() == ErrorCategory::Validation
//!     }
//!
//!     fn recover<'a>(
//!         &'a self,
//!         error: &'a ClassifiedError,
//!         _context: Option<&'a RecoveryContext>,
//!     ) -> BoxFuture<'a, RecoveryResult> {
//!         async move { RecoveryResult::recovered(error.message().into()) }.boxed()
//!     }
//! }
//! ```

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classify::ClassifiedError;

mod auth;
mod connectivity;
mod database;
mod degradation;
mod network;

pub use auth::AuthRecoveryStrategy;
pub use connectivity::{AlwaysOnline, Connectivity, ConnectivityFlag};
pub use database::DatabaseRecoveryStrategy;
pub use degradation::{FallbackProducer, FallbackRegistry, GracefulDegradationStrategy};
pub use network::NetworkRecoveryStrategy;

/// Boxed error type returned by fallback producers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The verdict of one recovery attempt.
///
/// Fallback data is only ever present on a successful result; the
/// constructors keep it that way.
///
/// # Examples
///
/// ```rust
/// use recourse::RecoveryResult;
/// use std::time::Duration;
///
/// let verdict = RecoveryResult::retry_after(Duration::from_secs(2), "transient timeout");
/// assert!(!verdict.success());
/// assert!(verdict.should_retry());
/// assert_eq!(verdict.retry_delay_override(), Some(Duration::from_secs(2)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryResult {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fallback_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default)]
    should_retry: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retry_delay_override: Option<Duration>,
}

impl RecoveryResult {
    /// A usable substitute value was produced.
    pub fn recovered(fallback_data: Value) -> Self {
        RecoveryResult {
            success: true,
            fallback_data: Some(fallback_data),
            message: None,
            should_retry: false,
            retry_delay_override: None,
        }
    }

    /// Recovery failed and retrying will not help.
    pub fn failed(message: impl Into<String>) -> Self {
        RecoveryResult {
            success: false,
            fallback_data: None,
            message: Some(message.into()),
            should_retry: false,
            retry_delay_override: None,
        }
    }

    /// Recovery failed but the operation is worth retrying with the
    /// policy-computed delay.
    pub fn retry(message: impl Into<String>) -> Self {
        RecoveryResult {
            should_retry: true,
            ..Self::failed(message)
        }
    }

    /// Recovery failed but the operation is worth retrying after `delay`.
    pub fn retry_after(delay: Duration, message: impl Into<String>) -> Self {
        RecoveryResult {
            retry_delay_override: Some(delay),
            ..Self::retry(message)
        }
    }

    /// Attach a human-readable explanation.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// True if a usable fallback value was produced.
    pub fn success(&self) -> bool {
        self.success
    }

    /// The substitute value, present only on success.
    pub fn fallback_data(&self) -> Option<&Value> {
        self.fallback_data.as_ref()
    }

    /// Take the substitute value out of the result.
    pub fn into_fallback_data(self) -> Option<Value> {
        self.fallback_data
    }

    /// Human-readable explanation, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Whether the caller should try the operation again.
    pub fn should_retry(&self) -> bool {
        self.should_retry
    }

    /// Delay to use instead of the policy's before the next attempt.
    pub fn retry_delay_override(&self) -> Option<Duration> {
        self.retry_delay_override
    }
}

/// Context passed along with an error to [`RecoveryStrategy::recover`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryContext {
    /// Last known good data, served by the database strategy when the store
    /// is unusable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_data: Option<Value>,
}

impl RecoveryContext {
    /// A context carrying cached data.
    pub fn with_cached_data(cached_data: Value) -> Self {
        RecoveryContext {
            cached_data: Some(cached_data),
        }
    }
}

/// Decides whether and how to recover from a classified error.
///
/// `can_recover` must be cheap and free of side effects. `recover` may
/// suspend, and reports its own internal failures as an unsuccessful
/// [`RecoveryResult`] instead of panicking.
pub trait RecoveryStrategy: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Whether this strategy handles `error`.
    fn can_recover(&self, error: &ClassifiedError) -> bool;

    /// Attempt recovery.
    fn recover<'a>(
        &'a self,
        error: &'a ClassifiedError,
        context: Option<&'a RecoveryContext>,
    ) -> BoxFuture<'a, RecoveryResult>;
}
