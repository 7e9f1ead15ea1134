//! Append-only alert ledger

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::persistence::{PersistenceBackend, PersistenceError};
use crate::alerts::Alert;

/// Ledger key holding one JSON alert per line
pub const ALERTS_KEY: &str = "alerts.jsonl";

/// Durable, append-only store of alert records.
///
/// There is no deduplication: recording the same alert content twice yields
/// two entries.
pub trait AlertLedger: Send + Sync {
    /// Persist an alert, returning its id once the write is durable
    fn record(&self, alert: &Alert) -> Result<String, PersistenceError>;
}

/// Ledger that appends JSON lines through a persistence backend
pub struct JsonlLedger {
    backend: Arc<dyn PersistenceBackend>,
}

impl JsonlLedger {
    pub fn new(backend: Arc<dyn PersistenceBackend>) -> Self {
        Self { backend }
    }

    /// Read back every recorded alert, skipping lines that fail to parse
    pub fn load_all(&self) -> Result<Vec<Alert>, PersistenceError> {
        let Some(data) = self.backend.read(ALERTS_KEY)? else {
            return Ok(Vec::new());
        };

        let mut alerts = Vec::new();
        for (idx, line) in data.split(|b| *b == b'\n').enumerate() {
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<Alert>(line) {
                Ok(alert) => alerts.push(alert),
                Err(e) => tracing::warn!(line = idx + 1, error = %e, "Skipping corrupt ledger line"),
            }
        }
        Ok(alerts)
    }
}

impl AlertLedger for JsonlLedger {
    fn record(&self, alert: &Alert) -> Result<String, PersistenceError> {
        let mut line = serde_json::to_vec(alert)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        line.push(b'\n');

        self.backend.append(ALERTS_KEY, &line)?;
        Ok(alert.alert_id.clone())
    }
}

/// In-process ledger for single-node runs without a data directory
#[derive(Default)]
pub struct MemoryLedger {
    alerts: RwLock<Vec<Alert>>,
    failing: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().clone()
    }

    pub fn len(&self) -> usize {
        self.alerts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.read().is_empty()
    }
}

impl AlertLedger for MemoryLedger {
    fn record(&self, alert: &Alert) -> Result<String, PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("ledger set to fail".to_string()));
        }
        self.alerts.write().push(alert.clone());
        Ok(alert.alert_id.clone())
    }
}
