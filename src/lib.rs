// src/lib.rs
pub mod config;
pub mod health;
pub mod load_balancer;
pub mod proxy;
pub mod server;
pub mod task;

pub use config::{load_config, Config, ConfigError};
pub use server::{ProxyServer, ServerBuilder, ShutdownOutcome};
