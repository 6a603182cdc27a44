// src/health/mod.rs
mod checker;
mod probe;

pub use checker::{HealthCheckResult, HealthProber};
pub use probe::{HealthProbe, TcpConnectProbe};
