use std::time::Duration;

use crate::alerts::Thresholds;

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Readings processed concurrently within one batch
    pub workers: usize,
    /// Clinical limits
    pub thresholds: Thresholds,
    /// Suppress repeated alerts for the same patient, violation kinds and
    /// reading-time bucket. `None` records every alert.
    pub dedup_window: Option<Duration>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1),
            thresholds: Thresholds::default(),
            dedup_window: None,
        }
    }
}

impl DispatcherConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = if window.is_zero() { None } else { Some(window) };
        self
    }
}
