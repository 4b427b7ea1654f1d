//! Error types for retry operations.

use std::time::Duration;

/// A [`RetryPolicy`](super::RetryPolicy) that breaks one of its invariants.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// `max_attempts` was zero; at least one attempt is required.
    ZeroAttempts,
    /// The multiplier was not a finite number greater than 1.
    InvalidMultiplier(f64),
    /// The base delay was larger than the delay cap.
    BaseExceedsMax {
        /// Configured base delay.
        base_delay: Duration,
        /// Configured delay cap.
        max_delay: Duration,
    },
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroAttempts => write!(f, "retry policy must allow at least one attempt"),
            Self::InvalidMultiplier(m) => {
                write!(f, "backoff multiplier must be greater than 1, got {}", m)
            }
            Self::BaseExceedsMax {
                base_delay,
                max_delay,
            } => write!(
                f,
                "base delay {:?} exceeds max delay {:?}",
                base_delay, max_delay
            ),
        }
    }
}

impl std::error::Error for PolicyError {}

/// Error returned by the cancellable retry entry points.
///
/// The plain entry points re-raise the last operation error directly; only
/// callers that pass a cancellation token need to tell the two cases apart.
///
/// # Examples
///
/// ```rust
/// use recourse::{RetryError, RetryExecutor, RetryPolicy};
/// use tokio_util::sync::CancellationToken;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let executor = RetryExecutor::new(
///     RetryPolicy::new(Duration::from_millis(1)).with_jitter(false),
/// ).unwrap();
/// let token = CancellationToken::new();
/// token.cancel();
///
/// let result = executor
///     .execute_cancellable(
///         || async { Err::<(), _>("down") },
///         |_: &&str, _| async { true },
///         &token,
///     )
///     .await;
///
/// match result {
///     Err(RetryError::Cancelled { last_error, attempts }) => {
///         assert_eq!(last_error, "down");
///         assert_eq!(attempts, 1);
///     }
///     other => panic!("Expected cancellation, got {:?}", other),
/// }
/// # });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Attempts ran out or the continuation predicate vetoed another try.
    Failed(E),
    /// The cancellation token fired while waiting to retry.
    Cancelled {
        /// The error from the last attempt that ran.
        last_error: E,
        /// Number of attempts made before cancellation.
        attempts: u32,
    },
}

impl<E> RetryError<E> {
    /// Returns true if the retry sequence was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Get a reference to the last operation error.
    pub fn last_error(&self) -> &E {
        match self {
            Self::Failed(e) => e,
            Self::Cancelled { last_error, .. } => last_error,
        }
    }

    /// Extract the last operation error, discarding the cancellation flag.
    pub fn into_last_error(self) -> E {
        match self {
            Self::Failed(e) => e,
            Self::Cancelled { last_error, .. } => last_error,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "{}", e),
            Self::Cancelled {
                last_error,
                attempts,
            } => write!(
                f,
                "retry cancelled after {} attempts: {}",
                attempts, last_error
            ),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.last_error())
    }
}
