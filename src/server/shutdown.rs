// src/server/shutdown.rs
use crate::server::ConnectionTracker;
use std::time::Duration;
use tokio::signal;
use tokio::time::{interval, sleep_until, Instant};
use tracing::{error, info, warn};

/// How often the drain loop reports progress.
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every connection closed on its own.
    Drained,
    /// The deadline passed and the rest were destroyed.
    Forced { remaining: usize },
}

impl ShutdownOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, ShutdownOutcome::Drained)
    }
}

/// Wait for the live set to empty, polling every `poll`. At `timeout` every
/// remaining connection is destroyed.
pub async fn drain_connections(
    connections: &ConnectionTracker,
    timeout: Duration,
    poll: Duration,
) -> ShutdownOutcome {
    let deadline = Instant::now() + timeout;
    let mut ticker = interval(poll);

    loop {
        tokio::select! {
            biased;

            _ = sleep_until(deadline) => {
                let remaining = connections.destroy_all();
                warn!(
                    remaining,
                    "Timeout reached: all {} connections will be forcefully closed",
                    remaining
                );
                return ShutdownOutcome::Forced { remaining };
            }
            _ = ticker.tick() => {
                let active = connections.len();
                if active == 0 {
                    info!("All connections gracefully closed");
                    return ShutdownOutcome::Drained;
                }
                info!(active, "Waiting for {} connections to close", active);
            }
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> std::net::SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_empty_set_drains_immediately() {
        let connections = ConnectionTracker::new();
        let start = Instant::now();

        let outcome =
            drain_connections(&connections, Duration::from_secs(5), DRAIN_POLL_INTERVAL).await;

        assert_eq!(outcome, ShutdownOutcome::Drained);
        assert!(outcome.is_clean());
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_drains_when_last_connection_leaves() {
        let connections = std::sync::Arc::new(ConnectionTracker::new());
        let handle = connections.register(peer(), "b");

        let remover = connections.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            remover.remove(handle.id());
        });

        let start = Instant::now();
        let outcome =
            drain_connections(&connections, Duration::from_secs(5), Duration::from_millis(50))
                .await;
        assert_eq!(outcome, ShutdownOutcome::Drained);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_deadline_forces_remaining() {
        let connections = ConnectionTracker::new();
        let handle = connections.register(peer(), "b");

        let start = Instant::now();
        let outcome =
            drain_connections(&connections, Duration::from_millis(300), Duration::from_millis(50))
                .await;
        let elapsed = start.elapsed();

        assert_eq!(outcome, ShutdownOutcome::Forced { remaining: 1 });
        assert!(!outcome.is_clean());
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(600));
        assert_eq!(handle.state().phase(), crate::proxy::Phase::Closing);
    }
}
