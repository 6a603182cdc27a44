//! demos/echo_backend.rs
//! Run: cargo run --example echo_backend -- <port>
//!
//! Plain TCP echo server tagging every reply with its port, so you can see
//! which backend the load balancer picked.

use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::sleep;

#[derive(Clone)]
struct BackendState {
    port: u16,
    connections: Arc<AtomicU64>,
    base_delay: u64,
    jitter_ms: u64,
}

impl BackendState {
    fn delay(&self) -> Duration {
        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(self.base_delay + jitter)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let port: u16 = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "9090".into())
        .parse()?;

    let base_delay = std::env::var("BASE_DELAY_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let jitter_ms = std::env::var("JITTER_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let state = BackendState {
        port,
        connections: Arc::new(AtomicU64::new(0)),
        base_delay,
        jitter_ms,
    };

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    println!(
        "Backend server listening on port {} [delay={}ms±{}]",
        port, base_delay, jitter_ms
    );

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let state = state.clone();
        let n = state.connections.fetch_add(1, Ordering::SeqCst) + 1;
        println!("[Backend {}] Client connected ({} total) from {}", port, n, peer);

        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                let n = match socket.read(&mut buf).await {
                    Ok(0) => {
                        println!("[Backend {}] Client disconnected (graceful)", state.port);
                        return;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        println!("[Backend {}] Error: {}", state.port, e);
                        return;
                    }
                };

                let received = String::from_utf8_lossy(&buf[..n]);
                println!("[Backend {}] Received: {}", state.port, received.trim());

                let delay = state.delay();
                if !delay.is_zero() {
                    sleep(delay).await;
                }

                let mut reply = format!("[Backend {}] ", state.port).into_bytes();
                reply.extend_from_slice(&buf[..n]);
                if socket.write_all(&reply).await.is_err() {
                    return;
                }
            }
        });
    }
}
