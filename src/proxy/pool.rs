// src/proxy/pool.rs
use super::backend::{Backend, BackendStatus};
use crate::config::BackendConfig;
use crate::load_balancer::{LoadBalancer, RoundRobinBalancer};
use std::sync::Arc;

/// Fixed, ordered set of backends plus the selection strategy. The list is
/// immutable after construction; only the per-backend health flags change.
pub struct BackendRegistry {
    backends: Vec<Arc<Backend>>,
    balancer: Box<dyn LoadBalancer>,
}

impl BackendRegistry {
    pub fn new(configs: &[BackendConfig]) -> Self {
        Self::with_balancer(configs, Box::new(RoundRobinBalancer::new()))
    }

    fn with_balancer(configs: &[BackendConfig], balancer: Box<dyn LoadBalancer>) -> Self {
        let backends = configs
            .iter()
            .map(|config| Arc::new(Backend::from(config)))
            .collect();

        Self { backends, balancer }
    }

    /// Next healthy backend in round-robin order, or `None` when every
    /// backend is currently marked down.
    pub fn select_backend(&self) -> Option<Arc<Backend>> {
        self.balancer.select_backend(&self.backends)
    }

    /// Returns the previous flag so callers can detect transitions.
    pub fn set_healthy(&self, backend: &Backend, healthy: bool) -> bool {
        backend.swap_health(healthy)
    }

    /// Apply a result from health pass `pass`. Returns the previous flag, or
    /// `None` when a later pass already wrote this backend.
    pub fn record_probe(&self, backend: &Backend, pass: u64, healthy: bool) -> Option<bool> {
        backend.record_probe(pass, healthy)
    }

    pub fn list_backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn healthy_count(&self) -> usize {
        self.backends.iter().filter(|b| b.is_healthy()).count()
    }

    pub fn statuses(&self) -> Vec<BackendStatus> {
        self.backends.iter().map(|b| b.status()).collect()
    }

    pub fn strategy(&self) -> &'static str {
        self.balancer.name()
    }
}
