// src/proxy/bridge.rs
// Bidirectional byte relay between one client and one backend.
use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, trace, warn};

use super::backend::Backend;
use super::connection::{ConnectionHandle, ConnectionId, ConnectionState, Direction, Side};
use super::error::ProxyError;

const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Upper bound on flushing the other side once one side has ended.
const HALF_CLOSE_LINGER: Duration = Duration::from_secs(5);

/// Invoked once, after both sockets have been destroyed.
pub type OnClose = Box<dyn FnOnce(ConnectionId) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// One side ended and the other was closed after it.
    Completed,
    /// A transport error on one leg.
    Failed(Side),
    /// Destroyed from outside (shutdown timeout) or never connected.
    Aborted,
}

#[derive(Debug, Clone)]
pub struct BridgeReport {
    pub id: ConnectionId,
    pub termination: Termination,
    pub bytes_to_backend: u64,
    pub bytes_to_client: u64,
}

#[derive(Debug)]
struct RelayError {
    side: Side,
    source: io::Error,
}

impl RelayError {
    fn new(side: Side, source: io::Error) -> Self {
        Self { side, source }
    }
}

pub struct ConnectionBridge {
    handle: ConnectionHandle,
    client: Option<TcpStream>,
    backend: Option<TcpStream>,
    on_close: Option<OnClose>,
}

impl ConnectionBridge {
    /// Creates the bridge around an accepted client. The backend leg is
    /// attached with [`connect_backend`](Self::connect_backend) or
    /// [`with_backend`](Self::with_backend).
    pub fn new(handle: ConnectionHandle, client: TcpStream, on_close: OnClose) -> Self {
        Self {
            handle,
            client: Some(client),
            backend: None,
            on_close: Some(on_close),
        }
    }

    pub fn with_backend(mut self, backend: TcpStream) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn state(&self) -> std::sync::Arc<ConnectionState> {
        self.handle.state()
    }

    /// Opens the outbound leg. Gives up on timeout or when the connection is
    /// destroyed while the connect is still pending.
    pub async fn connect_backend(
        &mut self,
        backend: &Backend,
        connect_timeout: Duration,
    ) -> Result<(), ProxyError> {
        let abort = self.handle.abort_signal();
        let connect = timeout(
            connect_timeout,
            TcpStream::connect((backend.host(), backend.port())),
        );

        let stream = tokio::select! {
            result = connect => match result {
                Ok(Ok(stream)) => stream,
                Ok(Err(source)) => {
                    return Err(ProxyError::BackendConnect { backend: backend.id(), source });
                }
                Err(_) => {
                    return Err(ProxyError::BackendTimeout {
                        backend: backend.id(),
                        timeout: connect_timeout,
                    });
                }
            },
            _ = abort.notified() => return Err(ProxyError::Aborted),
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(connection_id = %self.handle.id(), error = %e, "set_nodelay failed");
        }
        debug!(
            connection_id = %self.handle.id(),
            backend = %backend,
            "Proxy established connection to backend"
        );

        self.backend = Some(stream);
        Ok(())
    }

    /// Relay until either side ends, either leg fails, or the connection is
    /// destroyed. Cleanup always runs before returning.
    ///
    /// End-of-stream from one side is forwarded to the other as a write
    /// shutdown, and the side that ended is then closed too: the opposite
    /// direction finishes the chunk it is writing, shuts down its writer and
    /// stops. A peer that never drains gets at most `HALF_CLOSE_LINGER`.
    pub async fn run(mut self) -> BridgeReport {
        let (client, backend) = match (self.client.take(), self.backend.take()) {
            (Some(client), Some(backend)) => (client, backend),
            _ => return self.finish(Termination::Aborted),
        };

        let id = self.handle.id();
        let state = self.handle.state();
        let abort = self.handle.abort_signal();

        let termination = {
            let (client_read, client_write) = client.into_split();
            let (backend_read, backend_write) = backend.into_split();
            let (closing_tx, closing_rx) = watch::channel(false);

            let upstream = relay(
                client_read,
                backend_write,
                &state,
                Direction::ClientToBackend,
                closing_rx.clone(),
            );
            let downstream = relay(
                backend_read,
                client_write,
                &state,
                Direction::BackendToClient,
                closing_rx,
            );
            tokio::pin!(upstream);
            tokio::pin!(downstream);

            let mut upstream_done = false;
            let mut downstream_done = false;
            let mut linger_deadline: Option<Instant> = None;

            loop {
                tokio::select! {
                    result = &mut upstream, if !upstream_done => match result {
                        Ok(()) => {
                            upstream_done = true;
                            debug!(connection_id = %id, "Client side ended");
                        }
                        Err(e) => break fail(id, self.handle.backend(), e),
                    },
                    result = &mut downstream, if !downstream_done => match result {
                        Ok(()) => {
                            downstream_done = true;
                            debug!(connection_id = %id, "Backend side ended");
                        }
                        Err(e) => break fail(id, self.handle.backend(), e),
                    },
                    _ = sleep_until(linger_deadline.unwrap_or_else(Instant::now)), if linger_deadline.is_some() => {
                        debug!(connection_id = %id, "Peer did not drain after end-of-stream");
                        break Termination::Completed;
                    }
                    _ = abort.notified() => {
                        debug!(connection_id = %id, "Connection destroyed");
                        break Termination::Aborted;
                    }
                }

                if upstream_done && downstream_done {
                    break Termination::Completed;
                }
                if linger_deadline.is_none() {
                    state.mark_closing();
                    closing_tx.send_replace(true);
                    linger_deadline = Some(Instant::now() + HALF_CLOSE_LINGER);
                }
            }
            // Both halves of each socket drop here.
        };

        self.finish(termination)
    }

    /// Single teardown entry point; later calls are no-ops.
    pub fn close(&mut self) {
        let state = self.handle.state();
        if !state.try_begin_cleanup() {
            return;
        }

        drop(self.client.take());
        drop(self.backend.take());

        if let Some(on_close) = self.on_close.take() {
            on_close(self.handle.id());
        }
    }

    fn finish(mut self, termination: Termination) -> BridgeReport {
        let state = self.handle.state();
        state.mark_closing();
        self.close();

        BridgeReport {
            id: self.handle.id(),
            termination,
            bytes_to_backend: state.bytes(Direction::ClientToBackend),
            bytes_to_client: state.bytes(Direction::BackendToClient),
        }
    }
}

impl Drop for ConnectionBridge {
    fn drop(&mut self) {
        self.close();
    }
}

fn fail(id: ConnectionId, backend: &str, err: RelayError) -> Termination {
    match err.side {
        Side::Client => warn!(connection_id = %id, error = %err.source, "Client error"),
        Side::Backend => {
            warn!(connection_id = %id, backend = %backend, error = %err.source, "Backend error")
        }
    }
    Termination::Failed(err.side)
}

/// Copy one direction. Reads from `reader` stop while `writer` cannot take
/// the previous chunk. Ends on EOF or once `closing` flips; either way the
/// writer is shut down.
async fn relay(
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    state: &ConnectionState,
    direction: Direction,
    mut closing: watch::Receiver<bool>,
) -> Result<(), RelayError> {
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];

    loop {
        let n = tokio::select! {
            biased;

            changed = closing.changed() => {
                if changed.is_err() || *closing.borrow() {
                    break;
                }
                continue;
            }
            read = reader.read(&mut buf) => {
                read.map_err(|e| RelayError::new(direction.source(), e))?
            }
        };
        if n == 0 {
            break;
        }

        forward(&mut writer, &buf[..n], state, direction)
            .await
            .map_err(|e| RelayError::new(direction.sink(), e))?;
        state.add_bytes(direction, n);
    }

    // The peer may already be gone; the other direction reports that.
    if let Err(e) = writer.shutdown().await {
        trace!(?direction, error = %e, "shutdown after end-of-stream failed");
    }
    Ok(())
}

async fn forward(
    writer: &mut OwnedWriteHalf,
    chunk: &[u8],
    state: &ConnectionState,
    direction: Direction,
) -> io::Result<()> {
    let mut remaining = chunk;

    match writer.try_write(remaining) {
        Ok(n) => remaining = &remaining[n..],
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
        Err(e) => return Err(e),
    }

    if remaining.is_empty() {
        return Ok(());
    }

    state.set_paused(direction, true);
    trace!(?direction, pending = remaining.len(), "Peer saturated, pausing reads");

    let result = writer.write_all(remaining).await;

    state.set_paused(direction, false);
    trace!(?direction, "Peer drained, resuming reads");
    result
}
