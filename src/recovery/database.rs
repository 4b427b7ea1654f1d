use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};

use super::{RecoveryContext, RecoveryResult, RecoveryStrategy};
use crate::classify::{ClassifiedError, ErrorCategory, FaultCode};

pub(crate) const CONNECTION_RETRY_DELAY: Duration = Duration::from_secs(3);
pub(crate) const TIMEOUT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Handles errors classified as database failures.
///
/// In priority order: connection problems retry after 3s (even when the
/// primary fault is a timeout), timeouts retry after 5s, anything else serves
/// `context.cached_data` when the caller supplied it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseRecoveryStrategy;

impl DatabaseRecoveryStrategy {
    fn verdict(error: &ClassifiedError, context: Option<&RecoveryContext>) -> RecoveryResult {
        if error.involves_connection() {
            return RecoveryResult::retry_after(
                CONNECTION_RETRY_DELAY,
                "Database connection failed, retrying.",
            );
        }
        if error.fault() == FaultCode::Timeout {
            return RecoveryResult::retry_after(
                TIMEOUT_RETRY_DELAY,
                "Database query timed out, retrying.",
            );
        }

        match context.and_then(|c| c.cached_data.clone()) {
            Some(cached) => {
                RecoveryResult::recovered(cached).with_message("Serving cached data.")
            }
            None => RecoveryResult::failed("A database error occurred."),
        }
    }
}

impl RecoveryStrategy for DatabaseRecoveryStrategy {
    fn name(&self) -> &str {
        "database"
    }

    fn can_recover(&self, error: &ClassifiedError) -> bool {
        error.category() == ErrorCategory::Database
    }

    fn recover<'a>(
        &'a self,
        error: &'a ClassifiedError,
        context: Option<&'a RecoveryContext>,
    ) -> BoxFuture<'a, RecoveryResult> {
        future::ready(Self::verdict(error, context)).boxed()
    }
}
