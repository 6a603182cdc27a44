// src/config/models.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_PROXY_PORT: u16 = 8080;
pub const DEFAULT_HEALTH_CHECK_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_HEALTH_CHECK_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 30_000;

pub const MIN_HEALTH_CHECK_INTERVAL_MS: u64 = 1_000;
pub const MIN_HEALTH_CHECK_TIMEOUT_MS: u64 = 500;
pub const MIN_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub proxy_port: u16,
    pub backends: Vec<BackendConfig>,
    pub health_check: HealthCheckConfig,
    pub shutdown: ShutdownConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proxy_port: DEFAULT_PROXY_PORT,
            backends: default_backends(),
            health_check: HealthCheckConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

fn default_backends() -> Vec<BackendConfig> {
    [9090, 9091, 9092]
        .into_iter()
        .map(|port| BackendConfig::new("127.0.0.1", port))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    /// Initial health belief, corrected by the first probe pass.
    #[serde(default = "default_healthy")]
    pub healthy: bool,
}

fn default_healthy() -> bool {
    true
}

impl BackendConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            healthy: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_HEALTH_CHECK_INTERVAL_MS,
            timeout_ms: DEFAULT_HEALTH_CHECK_TIMEOUT_MS,
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    pub timeout_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl ShutdownConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// A single violated constraint, reported by field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub field: String,
    pub message: String,
}

impl ConfigIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("configuration validation failed ({} issue(s)): {}", .0.len(), join_issues(.0))]
    Invalid(Vec<ConfigIssue>),
}

fn join_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Config {
    /// Check every constraint and report all violations at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues = Vec::new();

        if self.proxy_port == 0 {
            issues.push(ConfigIssue::new(
                "proxy_port",
                "Proxy port must be between 1 and 65535",
            ));
        }

        if self.backends.is_empty() {
            issues.push(ConfigIssue::new(
                "backends",
                "At least one backend is required",
            ));
        }

        for (i, backend) in self.backends.iter().enumerate() {
            if backend.host.trim().is_empty() {
                issues.push(ConfigIssue::new(
                    format!("backends.{i}.host"),
                    "Host cannot be empty",
                ));
            }
            if backend.port == 0 {
                issues.push(ConfigIssue::new(
                    format!("backends.{i}.port"),
                    "Port must be between 1 and 65535",
                ));
            }
        }

        if self.health_check.interval_ms < MIN_HEALTH_CHECK_INTERVAL_MS {
            issues.push(ConfigIssue::new(
                "health_check.interval_ms",
                format!("Health check interval must be at least {MIN_HEALTH_CHECK_INTERVAL_MS}ms"),
            ));
        }

        if self.health_check.timeout_ms < MIN_HEALTH_CHECK_TIMEOUT_MS {
            issues.push(ConfigIssue::new(
                "health_check.timeout_ms",
                format!("Health check timeout must be at least {MIN_HEALTH_CHECK_TIMEOUT_MS}ms"),
            ));
        }

        if self.shutdown.timeout_ms < MIN_SHUTDOWN_TIMEOUT_MS {
            issues.push(ConfigIssue::new(
                "shutdown.timeout_ms",
                format!("Shutdown timeout must be at least {MIN_SHUTDOWN_TIMEOUT_MS}ms"),
            ));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(issues))
        }
    }
}
