use super::ledger::AlertEvent;
use super::{ColdStoreMonitor, ProcessOutcome, Processed};
use crate::error::ParseError;
use crate::reading::{parse_reading, Reading};
use chrono::{DateTime, Local};
use std::sync::atomic::Ordering;
use std::time::Instant;

impl ColdStoreMonitor {
    pub async fn process_event(&self, reading: Reading) -> ProcessOutcome {
        self.process_event_at(reading, Instant::now(), Local::now())
            .await
    }

    /// Decodes `payload` and processes it. Nothing is mutated when decoding fails.
    pub async fn process_payload(&self, payload: &mut [u8]) -> Result<Processed, ParseError> {
        let reading = match parse_reading(payload) {
            Ok(reading) => reading,
            Err(err) => {
                self.stats.record_parse_error(err.to_string());
                return Err(err);
            }
        };
        let outcome = self.process_event(reading.clone()).await;
        Ok(Processed { reading, outcome })
    }

    /// Cool-down is measured on the monotonic `now`; `wall` only supplies the alert's
    /// `HH:MM:SS` text.
    pub async fn process_event_at(
        &self,
        reading: Reading,
        now: Instant,
        wall: DateTime<Local>,
    ) -> ProcessOutcome {
        let unit_id = reading.unit_id();
        let temperature = reading.temperature();

        let outcome = {
            let mut state = self.state.lock().await;
            state.live.set(reading);

            match self
                .policy
                .get(unit_id)
                .and_then(|rule| rule.breach_message(temperature))
            {
                None => ProcessOutcome::Recorded,
                Some(_) if state.ledger.in_cooldown(unit_id, now, self.cooldown) => {
                    ProcessOutcome::Suppressed
                }
                Some(message) => {
                    let event = AlertEvent {
                        time: wall.format("%H:%M:%S").to_string(),
                        message,
                        unit: unit_id,
                    };
                    state.ledger.record(event.clone(), now);
                    ProcessOutcome::Alerted(event)
                }
            }
        };

        self.stats.readings_processed.fetch_add(1, Ordering::Relaxed);
        match &outcome {
            ProcessOutcome::Alerted(event) => {
                self.stats.alerts_logged.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    unit = unit_id,
                    temperature,
                    message = %event.message,
                    "alert logged"
                );
            }
            ProcessOutcome::Suppressed => {
                self.stats.alerts_suppressed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(unit = unit_id, temperature, "alert suppressed by cool-down");
            }
            ProcessOutcome::Recorded => {
                tracing::trace!(unit = unit_id, temperature, "reading recorded");
            }
        }
        outcome
    }
}
