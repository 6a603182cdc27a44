// src/health/probe.rs
use crate::proxy::Backend;
use async_trait::async_trait;
use std::io;
use tokio::net::TcpStream;

/// A single reachability check. The prober bounds every call with its own
/// timeout and drops the future when it expires.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, backend: &Backend) -> io::Result<()>;

    fn name(&self) -> &'static str;
}

/// Healthy means the TCP handshake completes. No payload is sent and the
/// socket is closed right away.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnectProbe;

#[async_trait]
impl HealthProbe for TcpConnectProbe {
    async fn probe(&self, backend: &Backend) -> io::Result<()> {
        let stream = TcpStream::connect((backend.host(), backend.port())).await?;
        drop(stream);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tcp_connect"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_listening_port_probes_ok() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let backend = Backend::new("127.0.0.1", port, false);

        assert!(TcpConnectProbe.probe(&backend).await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_port_is_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let backend = Backend::new("127.0.0.1", port, true);

        let err = TcpConnectProbe.probe(&backend).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[tokio::test]
    async fn test_unresolvable_host_errors() {
        let backend = Backend::new("no-such-host.invalid", 80, true);
        assert!(TcpConnectProbe.probe(&backend).await.is_err());
    }
}
