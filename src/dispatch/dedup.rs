//! Optional suppression of replayed alerts

use std::time::Duration;

use moka::sync::Cache;

use crate::alerts::Violation;
use crate::vitals::Reading;

/// Remembers recently recorded alert keys.
///
/// The key is patient id + violation kinds + the reading timestamp bucketed
/// by the window, so a replayed batch maps to the same key no matter when it
/// arrives.
pub struct AlertDeduplicator {
    seen: Cache<String, ()>,
    window_secs: i64,
}

impl AlertDeduplicator {
    pub fn new(window: Duration) -> Self {
        let window = window.max(Duration::from_secs(1));
        Self {
            seen: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(window * 2)
                .build(),
            window_secs: window.as_secs() as i64,
        }
    }

    pub fn key(&self, reading: &Reading, violations: &[Violation]) -> String {
        let mut kinds: Vec<String> = violations
            .iter()
            .map(|v| format!("{:?}", v.kind))
            .collect();
        kinds.sort();
        kinds.dedup();

        let bucket = reading.timestamp.timestamp().div_euclid(self.window_secs);
        format!("{}|{}|{}", reading.patient_id, kinds.join(","), bucket)
    }

    /// Returns true the first time a key is seen within the window
    pub fn first_seen(&self, reading: &Reading, violations: &[Violation]) -> bool {
        let key = self.key(reading, violations);
        self.seen.entry(key).or_insert(()).is_fresh()
    }
}
