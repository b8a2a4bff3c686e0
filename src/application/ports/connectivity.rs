/// Current reachability of the remote service.
///
/// Must be cheap, synchronous and free of side effects; callers query it right
/// before doing network work.
pub trait ConnectivityMonitor: Send + Sync {
    fn is_reachable(&self) -> bool;
}
