use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};

use super::connectivity::{AlwaysOnline, Connectivity};
use super::{RecoveryContext, RecoveryResult, RecoveryStrategy};
use crate::classify::{ClassifiedError, ErrorCategory};

/// Delay suggested before retrying a transient network fault.
pub(crate) const NETWORK_RETRY_DELAY: Duration = Duration::from_secs(2);

pub(crate) const OFFLINE_MESSAGE: &str = "Check your internet connection.";

/// Handles transport failures.
///
/// Applies to errors classified as network, and to unclassified errors whose
/// fault code is a transport fault. A more specific category wins, so a
/// refused database connection belongs to the database strategy.
///
/// While the host is offline it never asks for a retry; otherwise transient
/// faults are retried after two seconds.
#[derive(Debug, Clone)]
pub struct NetworkRecoveryStrategy {
    connectivity: Arc<dyn Connectivity>,
}

impl Default for NetworkRecoveryStrategy {
    fn default() -> Self {
        Self::new(Arc::new(AlwaysOnline))
    }
}

impl NetworkRecoveryStrategy {
    /// Create the strategy, reading connectivity from `connectivity`.
    pub fn new(connectivity: Arc<dyn Connectivity>) -> Self {
        NetworkRecoveryStrategy { connectivity }
    }

    fn verdict(&self, error: &ClassifiedError) -> RecoveryResult {
        if !self.connectivity.is_online() {
            return RecoveryResult::failed(OFFLINE_MESSAGE);
        }

        if error.fault().is_transient() {
            RecoveryResult::retry_after(
                NETWORK_RETRY_DELAY,
                "Temporary network problem, retrying.",
            )
        } else {
            RecoveryResult::failed("Network request failed.")
        }
    }
}

impl RecoveryStrategy for NetworkRecoveryStrategy {
    fn name(&self) -> &str {
        "network"
    }

    fn can_recover(&self, error: &ClassifiedError) -> bool {
        match error.category() {
            ErrorCategory::Network => true,
            ErrorCategory::Unknown => error.fault().is_network(),
            _ => false,
        }
    }

    fn recover<'a>(
        &'a self,
        error: &'a ClassifiedError,
        _context: Option<&'a RecoveryContext>,
    ) -> BoxFuture<'a, RecoveryResult> {
        future::ready(self.verdict(error)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::FaultCode;
    use crate::recovery::ConnectivityFlag;

    fn network_error(fault: FaultCode) -> ClassifiedError {
        ClassifiedError::new(ErrorCategory::Network, "request failed").with_fault(fault)
    }

    #[test]
    fn test_can_recover_by_category_or_fault() {
        let strategy = NetworkRecoveryStrategy::default();

        assert!(strategy.can_recover(&network_error(FaultCode::Unspecified)));
        assert!(strategy.can_recover(
            &ClassifiedError::new(ErrorCategory::Unknown, "x").with_fault(FaultCode::FetchFailed)
        ));
        assert!(!strategy.can_recover(&ClassifiedError::new(ErrorCategory::Unknown, "x")));
        assert!(!strategy.can_recover(&ClassifiedError::new(ErrorCategory::Auth, "x")));
        assert!(!strategy.can_recover(
            &ClassifiedError::new(ErrorCategory::Database, "x")
                .with_fault(FaultCode::ConnectionRefused)
        ));
    }

    #[tokio::test]
    async fn test_transient_fault_retries_after_two_seconds() {
        let strategy = NetworkRecoveryStrategy::default();

        for fault in [
            FaultCode::Timeout,
            FaultCode::ConnectionReset,
            FaultCode::TemporaryFailure,
            FaultCode::ServiceUnavailable,
        ] {
            let result = strategy.recover(&network_error(fault), None).await;
            assert!(!result.success());
            assert!(result.should_retry(), "{:?}", fault);
            assert_eq!(result.retry_delay_override(), Some(Duration::from_secs(2)));
        }
    }

    #[tokio::test]
    async fn test_permanent_fault_does_not_retry() {
        let strategy = NetworkRecoveryStrategy::default();

        for fault in [FaultCode::ConnectionRefused, FaultCode::FetchFailed] {
            let result = strategy.recover(&network_error(fault), None).await;
            assert!(!result.should_retry(), "{:?}", fault);
            assert!(result.retry_delay_override().is_none());
        }
    }

    #[tokio::test]
    async fn test_offline_never_retries() {
        let flag = ConnectivityFlag::new(false);
        let strategy = NetworkRecoveryStrategy::new(Arc::new(flag.clone()));

        let result = strategy.recover(&network_error(FaultCode::Timeout), None).await;
        assert!(!result.success());
        assert!(!result.should_retry());
        assert_eq!(result.message(), Some(OFFLINE_MESSAGE));

        flag.set_online(true);
        let result = strategy.recover(&network_error(FaultCode::Timeout), None).await;
        assert!(result.should_retry());
    }
}
