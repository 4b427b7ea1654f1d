use futures::future::{self, BoxFuture, FutureExt};

use super::{RecoveryContext, RecoveryResult, RecoveryStrategy};
use crate::classify::{ClassifiedError, ErrorCategory, FaultCode};

/// Handles errors classified as authentication failures.
///
/// Authentication failures are not transient, so this strategy never asks for
/// a retry. It only picks the message the caller should surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthRecoveryStrategy;

impl RecoveryStrategy for AuthRecoveryStrategy {
    fn name(&self) -> &str {
        "auth"
    }

    fn can_recover(&self, error: &ClassifiedError) -> bool {
        error.category() == ErrorCategory::Auth
    }

    fn recover<'a>(
        &'a self,
        error: &'a ClassifiedError,
        _context: Option<&'a RecoveryContext>,
    ) -> BoxFuture<'a, RecoveryResult> {
        let message = match error.fault() {
            FaultCode::SessionExpired => "Your session has expired. Please sign in again.",
            FaultCode::PermissionDenied => "You do not have permission to do that.",
            _ => "Authentication failed.",
        };
        future::ready(RecoveryResult::failed(message)).boxed()
    }
}
