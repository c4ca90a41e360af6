use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Mutex,
};

#[derive(Debug)]
pub struct MonitorStats {
    pub transport_connected: AtomicBool,
    pub readings_processed: AtomicU64,
    pub parse_errors: AtomicU64,
    pub alerts_logged: AtomicU64,
    pub alerts_suppressed: AtomicU64,
    pub persistence_failures: AtomicU64,
    pub last_error: Mutex<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub transport_connected: bool,
    pub readings_processed: u64,
    pub parse_errors: u64,
    pub alerts_logged: u64,
    pub alerts_suppressed: u64,
    pub persistence_failures: u64,
    pub last_error: Option<String>,
}

impl Default for MonitorStats {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorStats {
    pub fn new() -> Self {
        Self {
            transport_connected: AtomicBool::new(false),
            readings_processed: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            alerts_logged: AtomicU64::new(0),
            alerts_suppressed: AtomicU64::new(0),
            persistence_failures: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub fn set_transport_connected(&self, connected: bool) {
        self.transport_connected.store(connected, Ordering::Relaxed);
    }

    pub fn record_parse_error(&self, err: impl Into<String>) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
        self.record_error(err);
    }

    pub fn record_persistence_failure(&self, err: impl Into<String>) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
        self.record_error(err);
    }

    pub fn record_error(&self, err: impl Into<String>) {
        if let Ok(mut guard) = self.last_error.lock() {
            *guard = Some(err.into());
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            transport_connected: self.transport_connected.load(Ordering::Relaxed),
            readings_processed: self.readings_processed.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            alerts_logged: self.alerts_logged.load(Ordering::Relaxed),
            alerts_suppressed: self.alerts_suppressed.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            last_error: self.last_error.lock().ok().and_then(|e| e.clone()),
        }
    }
}
