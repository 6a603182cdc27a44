// src/proxy/connection.rs
use chrono::{DateTime, Utc};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One end of a bridged connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Backend,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Client => f.write_str("client"),
            Side::Backend => f.write_str("backend"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToBackend,
    BackendToClient,
}

impl Direction {
    pub fn source(self) -> Side {
        match self {
            Direction::ClientToBackend => Side::Client,
            Direction::BackendToClient => Side::Backend,
        }
    }

    pub fn sink(self) -> Side {
        match self {
            Direction::ClientToBackend => Side::Backend,
            Direction::BackendToClient => Side::Client,
        }
    }

    fn index(self) -> usize {
        match self {
            Direction::ClientToBackend => 0,
            Direction::BackendToClient => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Active = 0,
    Closing = 1,
    Closed = 2,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Phase::Active,
            1 => Phase::Closing,
            _ => Phase::Closed,
        }
    }
}

/// Shared per-connection state: lifecycle phase, one pause flag per
/// direction, byte counters and the one-shot cleanup guard.
#[derive(Debug)]
pub struct ConnectionState {
    phase: AtomicU8,
    paused: [AtomicBool; 2],
    bytes: [AtomicU64; 2],
    cleaned: AtomicBool,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(Phase::Active as u8),
            paused: [AtomicBool::new(false), AtomicBool::new(false)],
            bytes: [AtomicU64::new(0), AtomicU64::new(0)],
            cleaned: AtomicBool::new(false),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Active -> Closing. Leaves Closed untouched.
    pub fn mark_closing(&self) {
        let _ = self.phase.compare_exchange(
            Phase::Active as u8,
            Phase::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn is_paused(&self, direction: Direction) -> bool {
        self.paused[direction.index()].load(Ordering::Acquire)
    }

    pub(crate) fn set_paused(&self, direction: Direction, paused: bool) {
        self.paused[direction.index()].store(paused, Ordering::Release);
    }

    pub(crate) fn add_bytes(&self, direction: Direction, n: usize) {
        self.bytes[direction.index()].fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn bytes(&self, direction: Direction) -> u64 {
        self.bytes[direction.index()].load(Ordering::Relaxed)
    }

    /// Claims the cleanup. Only the first caller gets `true`.
    pub(crate) fn try_begin_cleanup(&self) -> bool {
        if self.cleaned.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.phase.store(Phase::Closed as u8, Ordering::Release);
        true
    }

    pub fn is_cleaned(&self) -> bool {
        self.cleaned.load(Ordering::Acquire)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// The server's view of a live connection: enough to report on it and to
/// force it closed.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: SocketAddr,
    backend: String,
    opened_at: DateTime<Utc>,
    state: Arc<ConnectionState>,
    abort: Arc<Notify>,
}

impl ConnectionHandle {
    pub fn new(peer: SocketAddr, backend: impl Into<String>) -> Self {
        Self {
            id: ConnectionId::new(),
            peer,
            backend: backend.into(),
            opened_at: Utc::now(),
            state: Arc::new(ConnectionState::new()),
            abort: Arc::new(Notify::new()),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn state(&self) -> Arc<ConnectionState> {
        self.state.clone()
    }

    /// Force the bridge to tear down both sockets. The permit is stored, so
    /// this also works before the bridge starts waiting.
    pub fn destroy(&self) {
        self.state.mark_closing();
        self.abort.notify_one();
    }

    pub(crate) fn abort_signal(&self) -> Arc<Notify> {
        self.abort.clone()
    }
}
