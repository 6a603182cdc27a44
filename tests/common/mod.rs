//! Shared helpers for the integration tests: echo backends on ephemeral
//! ports, a fast config, and a server running on its own task.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tcp_load_balancer::config::{BackendConfig, Config, HealthCheckConfig, ShutdownConfig};
use tcp_load_balancer::health::HealthProbe;
use tcp_load_balancer::proxy::{Backend, BackendRegistry};
use tcp_load_balancer::server::{ConnectionTracker, ServerBuilder, ShutdownOutcome};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub struct TcpEchoBackend {
    pub addr: SocketAddr,
    pub connections: Arc<AtomicU64>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TcpEchoBackend {
    /// Echoes bytes unchanged.
    pub async fn spawn() -> io::Result<Self> {
        Self::spawn_with_tag(false).await
    }

    /// Prefixes every reply with `[Backend <port>] `.
    pub async fn spawn_tagged() -> io::Result<Self> {
        Self::spawn_with_tag(true).await
    }

    async fn spawn_with_tag(tagged: bool) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let connections = Arc::new(AtomicU64::new(0));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let counter = connections.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let Ok((mut stream, _)) = accepted else { continue };
                        counter.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(async move {
                            let mut buf = vec![0u8; 16 * 1024];
                            loop {
                                let n = match stream.read(&mut buf).await {
                                    Ok(0) | Err(_) => return,
                                    Ok(n) => n,
                                };
                                let mut reply = Vec::with_capacity(n + 24);
                                if tagged {
                                    reply.extend_from_slice(format!("[Backend {}] ", addr.port()).as_bytes());
                                }
                                reply.extend_from_slice(&buf[..n]);
                                if stream.write_all(&reply).await.is_err() {
                                    return;
                                }
                            }
                        });
                    }
                    _ = &mut shutdown_rx => return,
                }
            }
        });

        Ok(Self {
            addr,
            connections,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn config(&self) -> BackendConfig {
        BackendConfig::new("127.0.0.1", self.addr.port())
    }

    pub fn accepted(&self) -> u64 {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for TcpEchoBackend {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// A port with nothing listening on it.
pub async fn dead_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Short timings so tests finish quickly. Skips validation on purpose.
pub fn test_config(backends: Vec<BackendConfig>) -> Config {
    Config {
        proxy_port: 0,
        backends,
        health_check: HealthCheckConfig {
            interval_ms: 200,
            timeout_ms: 200,
        },
        shutdown: ShutdownConfig { timeout_ms: 1500 },
    }
}

/// Probe with a fixed answer, for tests that must not depend on real
/// reachability.
pub struct FixedProbe(pub bool);

#[async_trait]
impl HealthProbe for FixedProbe {
    async fn probe(&self, _backend: &Backend) -> io::Result<()> {
        if self.0 {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "fixed down"))
        }
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

pub struct ServerHandle {
    pub addr: SocketAddr,
    pub registry: Arc<BackendRegistry>,
    pub connections: Arc<ConnectionTracker>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<ShutdownOutcome>>,
}

impl ServerHandle {
    pub async fn spawn(config: Config) -> anyhow::Result<Self> {
        Self::spawn_with(ServerBuilder::new(config)).await
    }

    pub async fn spawn_with_probe(
        config: Config,
        probe: Arc<dyn HealthProbe>,
    ) -> anyhow::Result<Self> {
        Self::spawn_with(ServerBuilder::new(config).with_probe(probe)).await
    }

    async fn spawn_with(builder: ServerBuilder) -> anyhow::Result<Self> {
        let server = builder
            .with_listen_addr("127.0.0.1:0".parse()?)
            .with_drain_poll_interval(Duration::from_millis(50))
            .start()
            .await?;

        let addr = server.local_addr();
        let registry = server.registry();
        let connections = server.connections();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.serve(async move {
            let _ = shutdown_rx.await;
        }));

        Ok(Self {
            addr,
            registry,
            connections,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Trigger shutdown and wait for the drain to finish.
    pub async fn shutdown(mut self) -> ShutdownOutcome {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.task
            .take()
            .expect("server task already joined")
            .await
            .expect("server task panicked")
    }

    pub fn trigger_shutdown(&mut self) -> JoinHandle<ShutdownOutcome> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.task.take().expect("server task already joined")
    }
}

/// Send `payload`, return whatever comes back in one read.
pub async fn roundtrip(addr: SocketAddr, payload: &[u8]) -> io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(payload).await?;
    let mut buf = vec![0u8; 1024];
    let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no reply"))??;
    buf.truncate(n);
    Ok(buf)
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
