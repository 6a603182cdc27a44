// ────────────────────────────────
// src/server/listener.rs
// Accept loop: hands every client to the connection handler.
// ────────────────────────────────
use crate::server::handler::ConnectionHandler;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, Instrument};

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Runs until the future is dropped; dropping it closes the listener.
pub async fn accept_loop(listener: TcpListener, handler: Arc<ConnectionHandler>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let handler = handler.clone();
                tokio::spawn(
                    async move { handler.handle(stream, peer).await }
                        .instrument(tracing::info_span!("connection", %peer)),
                );
            }
            Err(e) => {
                // Usually fd exhaustion; back off instead of spinning.
                error!(error = %e, "Accept error");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
}
