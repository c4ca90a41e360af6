use crate::reading::Reading;
use std::collections::BTreeMap;

/// Most recently processed reading per unit.
#[derive(Debug, Default, Clone)]
pub(in crate::monitor) struct LiveStateCache {
    latest: BTreeMap<i32, Reading>,
}

impl LiveStateCache {
    pub(in crate::monitor) fn set(&mut self, reading: Reading) {
        self.latest.insert(reading.unit_id(), reading);
    }

    pub(in crate::monitor) fn get(&self, unit_id: i32) -> Option<&Reading> {
        self.latest.get(&unit_id)
    }

    pub(in crate::monitor) fn entries(&self) -> &BTreeMap<i32, Reading> {
        &self.latest
    }
}
