mod cache;
mod ledger;
mod policy;
mod processor;
mod state;


pub use ledger::AlertEvent;
pub use policy::{ThresholdPolicy, UnitThreshold};

use crate::reading::Reading;
use crate::stats::MonitorStats;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const DEFAULT_ALERT_COOLDOWN_SECS: u64 = 60;
pub const DEFAULT_ALERT_HISTORY_LIMIT: usize = 50;

/// Result of running one reading through the processor.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Cache updated; no rule for the unit or temperature within bounds.
    Recorded,
    /// Breach logged to the alert ledger.
    Alerted(AlertEvent),
    /// Breach inside the unit's cool-down window; nothing logged.
    Suppressed,
}

/// A decoded payload together with what processing it did.
#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    pub reading: Reading,
    pub outcome: ProcessOutcome,
}

/// Consistent view of the live cache and alert log, taken under one lock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveSnapshot {
    pub latest_data: BTreeMap<i32, Reading>,
    pub alerts: Vec<AlertEvent>,
}

/// Shared handle over the live cache and alert ledger. Cloning is cheap; all clones see the
/// same state.
#[derive(Clone)]
pub struct ColdStoreMonitor {
    state: Arc<Mutex<state::MonitorState>>,
    policy: Arc<ThresholdPolicy>,
    cooldown: Duration,
    stats: Arc<MonitorStats>,
}

impl ColdStoreMonitor {
    pub fn new(
        policy: ThresholdPolicy,
        cooldown: Duration,
        alert_capacity: usize,
        stats: Arc<MonitorStats>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(state::MonitorState::new(alert_capacity))),
            policy: Arc::new(policy),
            cooldown,
            stats,
        }
    }

    pub fn stats(&self) -> Arc<MonitorStats> {
        self.stats.clone()
    }

    pub async fn snapshot(&self) -> LiveSnapshot {
        let state = self.state.lock().await;
        LiveSnapshot {
            latest_data: state.live.entries().clone(),
            alerts: state.ledger.events().cloned().collect(),
        }
    }

    pub async fn latest(&self, unit_id: i32) -> Option<Reading> {
        self.state.lock().await.live.get(unit_id).cloned()
    }
}
