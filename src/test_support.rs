use crate::error::PersistenceError;
use crate::monitor::{ColdStoreMonitor, ThresholdPolicy};
use crate::persistence::PersistenceGateway;
use crate::reading::Reading;
use crate::stats::MonitorStats;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory stand-in for the readings database. Units outside `known_units` fail the way a
/// foreign-key violation does.
#[derive(Default)]
pub struct MemoryGateway {
    rows: Mutex<Vec<Reading>>,
    known_units: HashSet<i32>,
    offline: AtomicBool,
}

impl MemoryGateway {
    pub fn with_units(units: &[i32]) -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            known_units: units.iter().copied().collect(),
            offline: AtomicBool::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    pub fn rows(&self) -> Vec<Reading> {
        self.rows.lock().expect("rows lock").clone()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn insert(&self, reading: &Reading) -> Result<(), PersistenceError> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(PersistenceError::Unavailable("connection refused".to_string()));
        }
        if !self.known_units.contains(&reading.unit_id()) {
            return Err(PersistenceError::IntegrityViolation {
                unit_id: reading.unit_id(),
            });
        }
        self.rows.lock().expect("rows lock").push(reading.clone());
        Ok(())
    }

    async fn query_recent(&self, limit: u32) -> Result<Vec<Reading>, PersistenceError> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(PersistenceError::Unavailable("connection refused".to_string()));
        }
        let rows = self.rows.lock().expect("rows lock");
        Ok(rows.iter().rev().take(limit as usize).cloned().collect())
    }
}

pub fn test_monitor() -> ColdStoreMonitor {
    ColdStoreMonitor::new(
        ThresholdPolicy::default(),
        Duration::from_secs(60),
        50,
        Arc::new(MonitorStats::new()),
    )
}
