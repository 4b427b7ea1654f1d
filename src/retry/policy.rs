//! Retry policy types and configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::PolicyError;

/// A retry policy describing how many times to try and how long to wait.
///
/// Policies are pure data - they describe retry behavior but don't execute it.
/// This makes them easy to test, clone, and load from configuration.
///
/// The delay after failed attempt `n` (1-indexed) is
/// `min(base_delay * multiplier^(n-1), max_delay)`, optionally scaled by a
/// random factor in `[0.5, 1.0]` when jitter is enabled.
///
/// # Examples
///
/// ```rust
/// use recourse::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(Duration::from_millis(100))
///     .with_max_attempts(5)
///     .with_max_delay(Duration::from_millis(500))
///     .with_jitter(false);
///
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
/// assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(500)); // capped
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given base delay and default bounds.
    ///
    /// Defaults: 3 attempts, 10s delay cap, multiplier 2.0, jitter on.
    pub fn new(base_delay: Duration) -> Self {
        Self {
            base_delay,
            ..Self::default()
        }
    }

    /// Set the total number of attempts, including the first one.
    ///
    /// ```rust
    /// use recourse::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(Duration::from_millis(100)).with_max_attempts(4);
    /// assert_eq!(policy.max_attempts(), 4);
    /// ```
    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the maximum delay cap.
    ///
    /// Delays never exceed this value, regardless of how many attempts failed.
    pub fn with_max_delay(mut self, d: Duration) -> Self {
        self.max_delay = d;
        self
    }

    /// Set the exponential growth factor. Must be greater than 1.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enable or disable jitter.
    ///
    /// With jitter on, every delay is scaled by a uniform random factor in
    /// `[0.5, 1.0]` so that many callers failing together don't retry together.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Total attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the second attempt.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Upper clamp on any computed delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Exponential growth factor.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Whether delays are jittered.
    pub fn jitter(&self) -> bool {
        self.jitter
    }

    /// Calculate the unjittered delay after failed attempt `attempt` (1-indexed).
    ///
    /// Attempt `0` is treated as attempt `1`.
    ///
    /// ```rust
    /// use recourse::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(Duration::from_secs(1))
    ///     .with_max_delay(Duration::from_secs(10));
    ///
    /// assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
    /// assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
    /// assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(10));
    /// ```
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let max_nanos = self.max_delay.as_nanos() as f64;
        let nanos = self.base_delay.as_nanos() as f64 * self.multiplier.powi(exponent);

        // NaN/inf from a huge exponent fall through to the cap
        if nanos.is_finite() && nanos < max_nanos {
            duration_from_nanos(nanos, self.max_delay)
        } else {
            self.max_delay
        }
    }

    /// Calculate the delay after failed attempt `attempt`, with jitter applied
    /// when the policy asks for it.
    ///
    /// This is what the executor actually sleeps for.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if self.jitter {
            apply_jitter(delay)
        } else {
            delay
        }
    }

    /// Validate the policy's invariants.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        if !self.multiplier.is_finite() || self.multiplier <= 1.0 {
            return Err(PolicyError::InvalidMultiplier(self.multiplier));
        }
        if self.base_delay > self.max_delay {
            return Err(PolicyError::BaseExceedsMax {
                base_delay: self.base_delay,
                max_delay: self.max_delay,
            });
        }
        Ok(())
    }
}

/// Scale a delay by a uniform random factor in `[0.5, 1.0]`.
fn apply_jitter(delay: Duration) -> Duration {
    use rand::Rng;

    let factor = rand::rng().random_range(0.5..=1.0);
    duration_from_nanos(delay.as_nanos() as f64 * factor, delay)
}

/// Convert a non-negative nanosecond count to a `Duration`, never exceeding
/// `cap`. Counts beyond `u64` nanoseconds go through `f64` seconds.
fn duration_from_nanos(nanos: f64, cap: Duration) -> Duration {
    let rounded = nanos.round();
    let delay = if rounded < u64::MAX as f64 {
        Duration::from_nanos(rounded as u64)
    } else {
        Duration::try_from_secs_f64(rounded / 1e9).unwrap_or(cap)
    };
    delay.min(cap)
}
