// src/server/tracker.rs
use crate::proxy::{ConnectionHandle, ConnectionId};
use dashmap::DashMap;
use std::net::SocketAddr;

/// The live-connection set. Only the server inserts, and only the cleanup
/// callback it hands to each bridge removes.
#[derive(Default)]
pub struct ConnectionTracker {
    live: DashMap<ConnectionId, ConnectionHandle>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, peer: SocketAddr, backend: impl Into<String>) -> ConnectionHandle {
        let handle = ConnectionHandle::new(peer, backend);
        self.live.insert(handle.id(), handle.clone());
        handle
    }

    /// Returns the removed handle, `None` if it was already gone.
    pub fn remove(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.live.remove(&id).map(|(_, handle)| handle)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.live.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Force every live connection closed. Each bridge removes itself once
    /// its teardown runs. Returns how many were signalled.
    pub fn destroy_all(&self) -> usize {
        let handles = self.snapshot();
        for handle in &handles {
            handle.destroy();
        }
        handles.len()
    }
}
