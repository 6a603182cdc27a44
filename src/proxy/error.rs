// src/proxy/error.rs
use std::io;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("No healthy backends available")]
    NoHealthyBackends,

    #[error("Failed to connect to backend {backend}: {source}")]
    BackendConnect {
        backend: String,
        #[source]
        source: io::Error,
    },

    #[error("Timed out connecting to backend {backend} after {timeout:?}")]
    BackendTimeout { backend: String, timeout: Duration },

    #[error("Connection aborted during shutdown")]
    Aborted,
}
