// src/server/proxy.rs
use crate::config::Config;
use crate::health::HealthProber;
use crate::proxy::BackendRegistry;
use crate::server::handler::ConnectionHandler;
use crate::server::listener::accept_loop;
use crate::server::shutdown::{drain_connections, ShutdownOutcome};
use crate::server::ConnectionTracker;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

/// A started load balancer: health checking is running and the listener is
/// bound. Built by [`ServerBuilder`](crate::server::ServerBuilder).
pub struct ProxyServer {
    pub(super) config: Config,
    pub(super) listener: TcpListener,
    pub(super) local_addr: SocketAddr,
    pub(super) registry: Arc<BackendRegistry>,
    pub(super) prober: Arc<HealthProber>,
    pub(super) connections: Arc<ConnectionTracker>,
    pub(super) handler: Arc<ConnectionHandler>,
    pub(super) drain_poll_interval: Duration,
}

impl ProxyServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> Arc<BackendRegistry> {
        self.registry.clone()
    }

    pub fn connections(&self) -> Arc<ConnectionTracker> {
        self.connections.clone()
    }

    pub fn prober(&self) -> Arc<HealthProber> {
        self.prober.clone()
    }

    /// Accept clients until `shutdown` resolves, then stop accepting and
    /// drain the live connections within the configured shutdown timeout.
    pub async fn serve<F>(self, shutdown: F) -> ShutdownOutcome
    where
        F: Future<Output = ()>,
    {
        let ProxyServer {
            config,
            listener,
            local_addr,
            registry,
            prober,
            connections,
            handler,
            drain_poll_interval,
        } = self;

        tokio::select! {
            _ = accept_loop(listener, handler) => {}
            _ = shutdown => {}
        }
        // The listener was owned by the accept loop and is closed now.
        info!(
            %local_addr,
            active = connections.len(),
            "Server closed. New connections not accepted"
        );

        prober.stop();
        for status in registry.statuses() {
            info!(
                backend = %status.id,
                healthy = status.healthy,
                last_checked = ?status.last_checked,
                "Backend status at shutdown"
            );
        }

        drain_connections(&connections, config.shutdown.timeout(), drain_poll_interval).await
    }
}
