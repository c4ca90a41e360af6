use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    /// Local wall-clock time, `HH:MM:SS`.
    pub time: String,
    pub message: String,
    pub unit: i32,
}

/// Newest-first alert log capped at `capacity`, plus the monotonic time of each unit's last
/// logged alert.
#[derive(Debug, Clone)]
pub(in crate::monitor) struct AlertLedger {
    events: VecDeque<AlertEvent>,
    last_alert: HashMap<i32, Instant>,
    capacity: usize,
}

impl AlertLedger {
    pub(in crate::monitor) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity + 1),
            last_alert: HashMap::new(),
            capacity,
        }
    }

    pub(in crate::monitor) fn last_alert_time(&self, unit_id: i32) -> Option<Instant> {
        self.last_alert.get(&unit_id).copied()
    }

    /// True while `now` is within `cooldown` of the unit's last alert (boundary inclusive).
    pub(in crate::monitor) fn in_cooldown(
        &self,
        unit_id: i32,
        now: Instant,
        cooldown: Duration,
    ) -> bool {
        self.last_alert_time(unit_id)
            .map(|last| now.saturating_duration_since(last) <= cooldown)
            .unwrap_or(false)
    }

    pub(in crate::monitor) fn record(&mut self, event: AlertEvent, at: Instant) {
        self.last_alert.insert(event.unit, at);
        self.events.push_front(event);
        while self.events.len() > self.capacity {
            self.events.pop_back();
        }
    }

    pub(in crate::monitor) fn events(&self) -> impl Iterator<Item = &AlertEvent> {
        self.events.iter()
    }

    #[cfg(test)]
    pub(in crate::monitor) fn len(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(unit: i32, n: usize) -> AlertEvent {
        AlertEvent {
            time: "00:00:00".to_string(),
            message: format!("alert {n}"),
            unit,
        }
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let now = Instant::now();
        let mut ledger = AlertLedger::new(50);
        for n in 0..51 {
            ledger.record(event(1, n), now);
        }
        assert_eq!(ledger.len(), 50);
        let messages: Vec<_> = ledger.events().map(|e| e.message.clone()).collect();
        assert_eq!(messages.first().map(String::as_str), Some("alert 50"));
        assert_eq!(messages.last().map(String::as_str), Some("alert 1"));
        assert!(!messages.iter().any(|m| m == "alert 0"));
    }

    #[test]
    fn cooldown_is_inclusive_at_boundary() {
        let t0 = Instant::now();
        let mut ledger = AlertLedger::new(50);
        let cooldown = Duration::from_secs(60);
        assert!(!ledger.in_cooldown(1, t0, cooldown));
        ledger.record(event(1, 0), t0);
        assert!(ledger.in_cooldown(1, t0 + Duration::from_secs(60), cooldown));
        assert!(!ledger.in_cooldown(1, t0 + Duration::from_millis(60_001), cooldown));
        assert!(!ledger.in_cooldown(2, t0, cooldown));
    }
}
