//! The retry loop.

use std::future::Future;
use std::time::Duration;

use futures::future::{self, Either};
use tokio_util::sync::CancellationToken;

use super::error::{PolicyError, RetryError};
use super::policy::RetryPolicy;

/// What to do after a failed attempt.
///
/// `bool` converts into a decision, so plain predicates work wherever a
/// decision is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Stop and re-raise the error that was just observed.
    Abort,
    /// Try again after the policy-computed delay.
    Continue,
    /// Try again after the given delay instead of the policy's.
    ContinueAfter(Duration),
}

impl RetryDecision {
    /// Returns true unless this is [`RetryDecision::Abort`].
    pub fn should_retry(&self) -> bool {
        !matches!(self, Self::Abort)
    }
}

impl From<bool> for RetryDecision {
    fn from(retry: bool) -> Self {
        if retry {
            Self::Continue
        } else {
            Self::Abort
        }
    }
}

/// Runs an asynchronous operation under a [`RetryPolicy`].
///
/// Each attempt calls the operation factory again, so every try gets a fresh
/// future (new connection, new request, ...). The executor holds no mutable
/// state; one instance can drive any number of concurrent retry sequences.
///
/// # Examples
///
/// ```rust
/// use recourse::{RetryExecutor, RetryPolicy};
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let executor = RetryExecutor::new(
///     RetryPolicy::new(Duration::from_millis(1))
///         .with_max_attempts(5)
///         .with_jitter(false),
/// )
/// .unwrap();
///
/// let calls = AtomicU32::new(0);
/// let calls = &calls;
/// let result = executor
///     .execute(
///         move || async move {
///             if calls.fetch_add(1, Ordering::SeqCst) < 2 {
///                 Err("transient failure")
///             } else {
///                 Ok("success")
///             }
///         },
///         |_, _| true,
///     )
///     .await;
///
/// assert_eq!(result, Ok("success"));
/// assert_eq!(calls.load(Ordering::SeqCst), 3);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self {
            policy: RetryPolicy::default(),
        }
    }
}

impl RetryExecutor {
    /// Create an executor, rejecting policies that break their invariants.
    pub fn new(policy: RetryPolicy) -> Result<Self, PolicyError> {
        policy.validate()?;
        Ok(Self { policy })
    }

    /// The policy this executor runs under.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, attempts run out, or
    /// `should_continue` vetoes another try.
    ///
    /// `should_continue(error, attempt)` is called after every failed attempt
    /// except the last one. The error from the last attempt is the one
    /// returned; earlier errors are dropped.
    pub async fn execute<T, E, F, Fut, P, D>(
        &self,
        operation: F,
        mut should_continue: P,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(&E, u32) -> D,
        D: Into<RetryDecision>,
    {
        self.execute_with(operation, move |error: &E, attempt| {
            future::ready(should_continue(error, attempt))
        })
        .await
    }

    /// Like [`execute`](Self::execute), but the decision is asynchronous.
    ///
    /// The returned future must not borrow the error; classify or copy what
    /// you need before building it.
    pub async fn execute_with<T, E, F, Fut, P, DFut, D>(
        &self,
        operation: F,
        decide: P,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(&E, u32) -> DFut,
        DFut: Future<Output = D>,
        D: Into<RetryDecision>,
    {
        self.run(operation, decide, None)
            .await
            .map_err(RetryError::into_last_error)
    }

    /// Like [`execute_with`](Self::execute_with), but stops waiting as soon as
    /// `token` is cancelled.
    ///
    /// The first attempt always runs. Cancellation is observed after each
    /// failure and interrupts the inter-attempt sleep; an attempt already in
    /// flight is left to finish. A deadline is a token cancelled by a timer.
    pub async fn execute_cancellable<T, E, F, Fut, P, DFut, D>(
        &self,
        operation: F,
        decide: P,
        token: &CancellationToken,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(&E, u32) -> DFut,
        DFut: Future<Output = D>,
        D: Into<RetryDecision>,
    {
        self.run(operation, decide, Some(token)).await
    }

    async fn run<T, E, F, Fut, P, DFut, D>(
        &self,
        mut operation: F,
        mut decide: P,
        token: Option<&CancellationToken>,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(&E, u32) -> DFut,
        DFut: Future<Output = D>,
        D: Into<RetryDecision>,
    {
        let max_attempts = self.policy.max_attempts().max(1);
        let mut attempt = 1u32;

        loop {
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if attempt >= max_attempts {
                tracing::warn!(attempt, "retry attempts exhausted");
                return Err(RetryError::Failed(error));
            }

            let decision: RetryDecision = decide(&error, attempt).await.into();
            let delay = match decision {
                RetryDecision::Abort => {
                    tracing::debug!(attempt, "retry vetoed by continuation predicate");
                    return Err(RetryError::Failed(error));
                }
                RetryDecision::Continue => self.policy.next_delay(attempt),
                RetryDecision::ContinueAfter(delay) => delay,
            };

            tracing::debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "attempt failed, retrying"
            );

            if let Some(token) = token {
                if !sleep_unless_cancelled(delay, token).await {
                    tracing::debug!(attempt, "retry cancelled");
                    return Err(RetryError::Cancelled {
                        last_error: error,
                        attempts: attempt,
                    });
                }
            } else {
                tokio::time::sleep(delay).await;
            }

            attempt += 1;
        }
    }
}

/// Sleep for `delay`. Returns false if `token` fired first.
async fn sleep_unless_cancelled(delay: Duration, token: &CancellationToken) -> bool {
    if token.is_cancelled() {
        return false;
    }
    let sleep = std::pin::pin!(tokio::time::sleep(delay));
    let cancelled = std::pin::pin!(token.cancelled());
    match future::select(sleep, cancelled).await {
        Either::Left(_) => true,
        Either::Right(_) => false,
    }
}
