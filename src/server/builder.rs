// ────────────────────────────────
// src/server/builder.rs
// ────────────────────────────────
use crate::config::Config;
use crate::health::{HealthProbe, HealthProber, TcpConnectProbe};
use crate::proxy::BackendRegistry;
use crate::server::handler::ConnectionHandler;
use crate::server::shutdown::DRAIN_POLL_INTERVAL;
use crate::server::{ConnectionTracker, ProxyServer};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Builder so `main.rs` (and tests) can override the listen address and
/// the probe used by the health checker.
pub struct ServerBuilder {
    config: Config,
    listen_addr: Option<SocketAddr>,
    probe: Option<Arc<dyn HealthProbe>>,
    drain_poll_interval: Duration,
}

impl ServerBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            listen_addr: None,
            probe: None,
            drain_poll_interval: DRAIN_POLL_INTERVAL,
        }
    }

    /// Defaults to `0.0.0.0:<proxy_port>`.
    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = Some(addr);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_drain_poll_interval(mut self, poll: Duration) -> Self {
        self.drain_poll_interval = poll;
        self
    }

    /// Start health checking, then bind the listener.
    pub async fn start(self) -> Result<ProxyServer> {
        let config = self.config;
        let registry = Arc::new(BackendRegistry::new(&config.backends));
        if registry.is_empty() {
            anyhow::bail!("No backends configured");
        }
        let probe = self.probe.unwrap_or_else(|| Arc::new(TcpConnectProbe));

        let prober = Arc::new(HealthProber::with_probe(
            config.health_check.clone(),
            registry.clone(),
            probe,
        ));
        prober.start();

        let addr = self
            .listen_addr
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], config.proxy_port)));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind proxy listener on {addr}"))?;
        let local_addr = listener
            .local_addr()
            .context("Failed to read listener address")?;

        let connections = Arc::new(ConnectionTracker::new());
        let handler = Arc::new(ConnectionHandler::new(
            registry.clone(),
            connections.clone(),
            config.health_check.timeout(),
        ));

        let monitored: Vec<String> = registry.list_backends().iter().map(|b| b.id()).collect();
        tracing::info!("TCP load balancer listening on {}", local_addr);
        tracing::info!(
            strategy = registry.strategy(),
            "Monitoring backends: {}",
            monitored.join(", ")
        );

        Ok(ProxyServer {
            config,
            listener,
            local_addr,
            registry,
            prober,
            connections,
            handler,
            drain_poll_interval: self.drain_poll_interval,
        })
    }
}
