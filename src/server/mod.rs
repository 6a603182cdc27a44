// src/server/mod.rs
pub mod builder;
pub mod handler;
pub mod listener;
pub mod proxy;
pub mod shutdown;
pub mod tracker;

pub use builder::ServerBuilder;
pub use handler::{ConnectionHandler, SERVICE_UNAVAILABLE};
pub use proxy::ProxyServer;
pub use shutdown::{drain_connections, shutdown_signal, ShutdownOutcome, DRAIN_POLL_INTERVAL};
pub use tracker::ConnectionTracker;
