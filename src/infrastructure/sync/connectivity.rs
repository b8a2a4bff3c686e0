use crate::application::ports::connectivity::ConnectivityMonitor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Reachability flag fed by the platform layer (OS network callbacks, a reachability check, tests).
#[derive(Debug, Clone)]
pub struct SharedConnectivity {
    reachable: Arc<AtomicBool>,
}

impl SharedConnectivity {
    pub fn new(initially_reachable: bool) -> Self {
        Self {
            reachable: Arc::new(AtomicBool::new(initially_reachable)),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        let previous = self.reachable.swap(reachable, Ordering::SeqCst);
        if previous != reachable {
            tracing::info!(target: "sync::connectivity", reachable, "connectivity changed");
        }
    }
}

impl Default for SharedConnectivity {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ConnectivityMonitor for SharedConnectivity {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}
