// src/load_balancer/algorithm.rs
use crate::proxy::Backend;
use std::sync::Arc;

/// Picks the backend for the next connection. Implementations keep their
/// own cursor/state and must skip unhealthy entries.
pub trait LoadBalancer: Send + Sync {
    fn select_backend(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>>;

    fn name(&self) -> &'static str;
}
