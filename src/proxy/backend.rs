// src/proxy/backend.rs
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::config::BackendConfig;

/// An upstream TCP endpoint. The health flag lives on the entry itself, so
/// duplicate `host:port` entries are tracked independently.
#[derive(Debug)]
pub struct Backend {
    host: String,
    port: u16,

    // Runtime state
    healthy: AtomicBool,
    last_probe: Mutex<ProbeRecord>,
}

#[derive(Debug, Default)]
struct ProbeRecord {
    pass: u64,
    checked_at: Option<DateTime<Utc>>,
}

impl Backend {
    pub fn new(host: impl Into<String>, port: u16, healthy: bool) -> Self {
        Self {
            host: host.into(),
            port,
            healthy: AtomicBool::new(healthy),
            last_probe: Mutex::new(ProbeRecord::default()),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Store the new flag and return the previous one.
    pub(crate) fn swap_health(&self, healthy: bool) -> bool {
        let mut record = self.lock_probe();
        record.checked_at = Some(Utc::now());
        self.healthy.swap(healthy, Ordering::AcqRel)
    }

    /// Like [`swap_health`](Self::swap_health), but only for results at least
    /// as recent as the last applied pass. `None` means the result was stale
    /// and nothing changed.
    pub(crate) fn record_probe(&self, pass: u64, healthy: bool) -> Option<bool> {
        let mut record = self.lock_probe();
        if pass < record.pass {
            return None;
        }
        record.pass = pass;
        record.checked_at = Some(Utc::now());
        Some(self.healthy.swap(healthy, Ordering::AcqRel))
    }

    /// Time of the last health write, if any probe has completed.
    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.lock_probe().checked_at
    }

    fn lock_probe(&self) -> std::sync::MutexGuard<'_, ProbeRecord> {
        match self.last_probe.lock() {
            Ok(record) => record,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn status(&self) -> BackendStatus {
        BackendStatus {
            id: self.id(),
            healthy: self.is_healthy(),
            last_checked: self.last_checked(),
        }
    }
}

impl From<&BackendConfig> for Backend {
    fn from(config: &BackendConfig) -> Self {
        Backend::new(config.host.clone(), config.port, config.healthy)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStatus {
    pub id: String,
    pub healthy: bool,
    pub last_checked: Option<DateTime<Utc>>,
}
