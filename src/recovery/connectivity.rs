//! The "is the network reachable" signal read by the network strategy.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Synchronous connectivity signal.
///
/// Implementations must be cheap; the network strategy reads this on every
/// recovery attempt.
pub trait Connectivity: Send + Sync + fmt::Debug {
    /// Whether the host currently believes it is online.
    fn is_online(&self) -> bool;
}

/// Reports online unconditionally. The default when the host has no signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// A shared flag the host flips when it observes connectivity changes.
///
/// Clones share the same flag.
///
/// ```
/// use recourse::{Connectivity, ConnectivityFlag};
///
/// let flag = ConnectivityFlag::new(true);
/// let handle = flag.clone();
/// handle.set_online(false);
/// assert!(!flag.is_online());
/// ```
#[derive(Debug, Clone)]
pub struct ConnectivityFlag {
    online: Arc<AtomicBool>,
}

impl ConnectivityFlag {
    /// Create a flag with the given initial state.
    pub fn new(online: bool) -> Self {
        ConnectivityFlag {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    /// Record a connectivity change.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }
}

impl Default for ConnectivityFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ConnectivityFlag {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }
}
