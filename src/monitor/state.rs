use super::cache::LiveStateCache;
use super::ledger::AlertLedger;

/// Everything the processor mutates, guarded as one critical section.
#[derive(Debug)]
pub(in crate::monitor) struct MonitorState {
    pub(in crate::monitor) live: LiveStateCache,
    pub(in crate::monitor) ledger: AlertLedger,
}

impl MonitorState {
    pub(in crate::monitor) fn new(alert_capacity: usize) -> Self {
        Self {
            live: LiveStateCache::default(),
            ledger: AlertLedger::new(alert_capacity),
        }
    }
}
