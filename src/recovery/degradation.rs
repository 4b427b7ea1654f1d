use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::{self, BoxFuture, FutureExt};
use serde_json::{json, Value};

use super::{BoxError, RecoveryContext, RecoveryResult, RecoveryStrategy};
use crate::classify::{ClassifiedError, ErrorCategory};

/// Produces a substitute value for a category of failures.
pub type FallbackProducer = Arc<dyn Fn() -> Result<Value, BoxError> + Send + Sync>;

/// Fallback producers keyed by error category.
///
/// Registration replaces any earlier producer for the same category.
///
/// ```
/// use recourse::{ErrorCategory, FallbackRegistry};
/// use serde_json::json;
///
/// let registry = FallbackRegistry::with_defaults();
/// assert!(registry.contains(ErrorCategory::Database));
/// assert!(!registry.contains(ErrorCategory::Auth));
///
/// registry.register(ErrorCategory::Auth, || Ok(json!({"guest": true})));
/// assert!(registry.contains(ErrorCategory::Auth));
/// ```
pub struct FallbackRegistry {
    producers: RwLock<HashMap<ErrorCategory, FallbackProducer>>,
}

impl FallbackRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        FallbackRegistry {
            producers: RwLock::new(HashMap::new()),
        }
    }

    /// A registry seeded with static fallbacks for network, database and
    /// validation failures.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(ErrorCategory::Network, || {
            Ok(json!({ "data": null, "offline": true }))
        });
        registry.register(ErrorCategory::Database, || Ok(json!([])));
        registry.register(ErrorCategory::Validation, || {
            Ok(json!({ "valid": false, "errors": [] }))
        });
        registry
    }

    /// Register `producer` for `category`, replacing any previous one.
    pub fn register<F>(&self, category: ErrorCategory, producer: F)
    where
        F: Fn() -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.producers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(category, Arc::new(producer));
    }

    /// Whether a producer is registered for `category`.
    pub fn contains(&self, category: ErrorCategory) -> bool {
        self.producers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&category)
    }

    /// The producer registered for `category`, if any.
    pub fn get(&self, category: ErrorCategory) -> Option<FallbackProducer> {
        self.producers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&category)
            .cloned()
    }
}

impl Default for FallbackRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for FallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let producers = self.producers.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("FallbackRegistry")
            .field("categories", &producers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Replaces a failure with a reduced-functionality value.
///
/// Applies whenever a fallback producer is registered for the error's
/// category. A producer that errors or panics yields an unsuccessful result.
#[derive(Debug, Clone, Default)]
pub struct GracefulDegradationStrategy {
    registry: Arc<FallbackRegistry>,
}

impl GracefulDegradationStrategy {
    /// Create the strategy over a shared registry.
    pub fn new(registry: Arc<FallbackRegistry>) -> Self {
        GracefulDegradationStrategy { registry }
    }

    /// The registry this strategy reads from.
    pub fn registry(&self) -> &Arc<FallbackRegistry> {
        &self.registry
    }

    fn verdict(&self, error: &ClassifiedError) -> RecoveryResult {
        let category = error.category();
        let Some(producer) = self.registry.get(category) else {
            return RecoveryResult::failed(format!("no fallback registered for {}", category));
        };

        match panic::catch_unwind(AssertUnwindSafe(|| producer())) {
            Ok(Ok(value)) => RecoveryResult::recovered(value)
                .with_message(format!("Running in degraded mode after a {} error.", category)),
            Ok(Err(err)) => {
                tracing::warn!(%category, error = %err, "fallback producer failed");
                RecoveryResult::failed(format!("fallback for {} failed: {}", category, err))
            }
            Err(_) => {
                tracing::error!(%category, "fallback producer panicked");
                RecoveryResult::failed(format!("fallback for {} panicked", category))
            }
        }
    }
}

impl RecoveryStrategy for GracefulDegradationStrategy {
    fn name(&self) -> &str {
        "graceful-degradation"
    }

    fn can_recover(&self, error: &ClassifiedError) -> bool {
        self.registry.contains(error.category())
    }

    fn recover<'a>(
        &'a self,
        error: &'a ClassifiedError,
        _context: Option<&'a RecoveryContext>,
    ) -> BoxFuture<'a, RecoveryResult> {
        future::ready(self.verdict(error)).boxed()
    }
}
