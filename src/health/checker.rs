// src/health/checker.rs
use crate::config::HealthCheckConfig;
use crate::health::{HealthProbe, TcpConnectProbe};
use crate::proxy::{Backend, BackendRegistry};
use crate::task::ScheduledTask;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

pub struct HealthProber {
    config: HealthCheckConfig,
    registry: Arc<BackendRegistry>,
    probe: Arc<dyn HealthProbe>,
    task: Mutex<Option<ScheduledTask>>,
    // Passes may overlap when the timeout exceeds the interval; results
    // carry their pass number so an older one never overwrites a newer one.
    passes: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub backend_id: String,
    pub healthy: bool,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

impl HealthProber {
    pub fn new(config: HealthCheckConfig, registry: Arc<BackendRegistry>) -> Self {
        Self::with_probe(config, registry, Arc::new(TcpConnectProbe))
    }

    pub fn with_probe(
        config: HealthCheckConfig,
        registry: Arc<BackendRegistry>,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        Self {
            config,
            registry,
            probe,
            task: Mutex::new(None),
            passes: AtomicU64::new(0),
        }
    }

    /// Probe every backend now, then again every `interval`. No-op when
    /// already running.
    pub fn start(self: &Arc<Self>) {
        let mut task = match self.task.lock() {
            Ok(task) => task,
            Err(poisoned) => poisoned.into_inner(),
        };
        if task.is_some() {
            return;
        }

        let prober = Arc::downgrade(self);
        *task = Some(ScheduledTask::spawn(
            "health_check",
            self.config.interval(),
            move || {
                let prober = prober.upgrade();
                async move {
                    if let Some(prober) = prober {
                        prober.check_all_backends().await;
                    }
                }
            },
        ));

        info!(
            interval_ms = self.config.interval_ms,
            timeout_ms = self.config.timeout_ms,
            probe = self.probe.name(),
            backends = self.registry.len(),
            "Health checker started"
        );
    }

    /// Cancel the schedule. No-op when already stopped.
    pub fn stop(&self) {
        let task = match self.task.lock() {
            Ok(mut task) => task.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            task.stop();
            info!(task = task.name(), "Health checker stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        match self.task.lock() {
            Ok(task) => task.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    /// One pass: every backend is probed on its own task with its own
    /// timeout, so a hung backend only delays its own result.
    pub async fn check_all_backends(self: Arc<Self>) -> Vec<HealthCheckResult> {
        let pass = self.next_pass();
        let mut tasks = Vec::new();

        for backend in self.registry.list_backends() {
            let checker = self.clone();
            let backend = backend.clone();
            tasks.push(tokio::spawn(async move {
                checker.probe_in_pass(pass, &backend).await
            }));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for joined in futures::future::join_all(tasks).await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!("Health check task join error: {}", e),
            }
        }

        let healthy_count = results.iter().filter(|r| r.healthy).count();
        debug!(
            "Health check complete: {} healthy, {} unhealthy",
            healthy_count,
            results.len() - healthy_count
        );

        results
    }

    /// Probe a single backend as a pass of its own.
    pub async fn check_backend(&self, backend: &Backend) -> HealthCheckResult {
        self.probe_in_pass(self.next_pass(), backend).await
    }

    fn next_pass(&self) -> u64 {
        self.passes.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn probe_in_pass(&self, pass: u64, backend: &Backend) -> HealthCheckResult {
        let start = Instant::now();

        // Whichever of success, error or timeout comes first settles this
        // pass; on timeout the pending connect is dropped.
        let outcome = timeout(self.config.timeout(), self.probe.probe(backend)).await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        let (healthy, error) = match outcome {
            Ok(Ok(())) => (true, None),
            Ok(Err(e)) => (false, Some(e.to_string())),
            Err(_) => (
                false,
                Some(format!("no response within {}ms", self.config.timeout_ms)),
            ),
        };

        let Some(was_healthy) = self.registry.record_probe(backend, pass, healthy) else {
            debug!(backend = %backend, pass, healthy, "Discarding result from an older pass");
            return HealthCheckResult {
                backend_id: backend.id(),
                healthy,
                response_time_ms,
                error,
            };
        };

        if healthy && !was_healthy {
            info!(backend = %backend, response_time_ms, "Backend is back UP");
        } else if !healthy && was_healthy {
            warn!(
                backend = %backend,
                error = error.as_deref().unwrap_or("unknown"),
                "Backend is DOWN"
            );
        }

        HealthCheckResult {
            backend_id: backend.id(),
            healthy,
            response_time_ms,
            error,
        }
    }
}

impl Drop for HealthProber {
    fn drop(&mut self) {
        self.stop();
    }
}
