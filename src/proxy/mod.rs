// src/proxy/mod.rs
mod backend;
mod bridge;
mod connection;
mod error;
mod pool;

pub use backend::{Backend, BackendStatus};
pub use bridge::{BridgeReport, ConnectionBridge, OnClose, Termination};
pub use connection::{ConnectionHandle, ConnectionId, ConnectionState, Direction, Phase, Side};
pub use error::ProxyError;
pub use pool::BackendRegistry;
