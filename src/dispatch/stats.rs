//! Pipeline counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters over the lifetime of the process
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub batches: AtomicU64,
    pub records_received: AtomicU64,
    pub records_ignored: AtomicU64,
    pub records_failed: AtomicU64,
    pub alerts_raised: AtomicU64,
    pub alerts_recorded: AtomicU64,
    pub alerts_suppressed: AtomicU64,
    pub ledger_failures: AtomicU64,
    pub alerts_sent: AtomicU64,
    pub updates_sent: AtomicU64,
    pub connections_pruned: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub batches: u64,
    pub records_received: u64,
    pub records_ignored: u64,
    pub records_failed: u64,
    pub alerts_raised: u64,
    pub alerts_recorded: u64,
    pub alerts_suppressed: u64,
    pub ledger_failures: u64,
    pub alerts_sent: u64,
    pub updates_sent: u64,
    pub connections_pruned: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        if n > 0 {
            counter.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            batches: load(&self.batches),
            records_received: load(&self.records_received),
            records_ignored: load(&self.records_ignored),
            records_failed: load(&self.records_failed),
            alerts_raised: load(&self.alerts_raised),
            alerts_recorded: load(&self.alerts_recorded),
            alerts_suppressed: load(&self.alerts_suppressed),
            ledger_failures: load(&self.ledger_failures),
            alerts_sent: load(&self.alerts_sent),
            updates_sent: load(&self.updates_sent),
            connections_pruned: load(&self.connections_pruned),
        }
    }
}
