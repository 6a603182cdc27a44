// src/server/handler.rs
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::proxy::{BackendRegistry, ConnectionBridge, ConnectionId, ProxyError, Termination};
use crate::server::ConnectionTracker;

/// Written to a client when every backend is marked down.
pub const SERVICE_UNAVAILABLE: &[u8] = b"Service Unavailable (All backends down)\n";

/// How long a rejected client gets to finish sending before we drop it.
const REJECT_LINGER: Duration = Duration::from_secs(1);

/// Routing for a single accepted client.
pub struct ConnectionHandler {
    registry: Arc<BackendRegistry>,
    connections: Arc<ConnectionTracker>,
    connect_timeout: Duration,
}

impl ConnectionHandler {
    pub fn new(
        registry: Arc<BackendRegistry>,
        connections: Arc<ConnectionTracker>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            connections,
            connect_timeout,
        }
    }

    pub async fn handle(&self, client: TcpStream, peer: SocketAddr) {
        let Some(backend) = self.registry.select_backend() else {
            error!(error = %ProxyError::NoHealthyBackends, "Rejecting client");
            reject(client).await;
            return;
        };

        if let Err(e) = client.set_nodelay(true) {
            debug!(error = %e, "set_nodelay failed");
        }

        info!(backend = %backend, "Client connected: routing to backend");

        // Tracked before any bytes move so shutdown can see it.
        let handle = self.connections.register(peer, backend.id());
        info!(
            connection_id = %handle.id(),
            active = self.connections.len(),
            "Connection added"
        );

        let connections = self.connections.clone();
        let opened_at = handle.opened_at();
        let on_close = Box::new(move |id: ConnectionId| {
            connections.remove(id);
            let duration_ms = (Utc::now() - opened_at).num_milliseconds();
            info!(
                connection_id = %id,
                duration_ms,
                active = connections.len(),
                "Connection removed"
            );
        });

        let mut bridge = ConnectionBridge::new(handle, client, on_close);

        if let Err(e) = bridge.connect_backend(&backend, self.connect_timeout).await {
            match e {
                ProxyError::Aborted => debug!("Connection destroyed before backend connected"),
                e => warn!(backend = %backend, error = %e, "Backend connection failed"),
            }
            bridge.close();
            return;
        }

        let report = bridge.run().await;
        match report.termination {
            Termination::Completed | Termination::Aborted => debug!(
                connection_id = %report.id,
                termination = ?report.termination,
                bytes_to_backend = report.bytes_to_backend,
                bytes_to_client = report.bytes_to_client,
                "Connection closed"
            ),
            Termination::Failed(side) => debug!(
                connection_id = %report.id,
                failed_side = %side,
                bytes_to_backend = report.bytes_to_backend,
                bytes_to_client = report.bytes_to_client,
                "Connection closed after error"
            ),
        }
    }
}

async fn reject(mut client: TcpStream) {
    if let Err(e) = client.write_all(SERVICE_UNAVAILABLE).await {
        debug!(error = %e, "Failed to write service-unavailable notice");
        return;
    }
    if let Err(e) = client.shutdown().await {
        debug!(error = %e, "Failed to close rejected client");
        return;
    }
    // Discard anything the client already sent so the close is a FIN and
    // not a reset that could swallow the notice.
    match timeout(REJECT_LINGER, tokio::io::copy(&mut client, &mut tokio::io::sink())).await {
        Ok(Ok(discarded)) => debug!(discarded, "Rejected client closed"),
        Ok(Err(e)) => debug!(error = %e, "Rejected client errored before closing"),
        Err(_) => debug!("Rejected client still open after linger, dropping"),
    }
}
