//! Transport double for broadcaster and dispatcher tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::transport::{DeliveryError, DeliveryTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behaviour {
    Deliver,
    Gone,
    Transient,
    /// Never answers within any reasonable timeout
    Hang,
}

/// Records every delivered payload; per-connection behaviour defaults to
/// `Deliver`.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    behaviours: Mutex<HashMap<String, Behaviour>>,
    deliveries: Mutex<Vec<(String, String)>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every delivery takes this long before answering
    pub(crate) fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Most deliveries observed in progress at the same time
    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn set(&self, connection_id: &str, behaviour: Behaviour) {
        self.behaviours
            .lock()
            .insert(connection_id.to_string(), behaviour);
    }

    /// Successful deliveries as (connection_id, payload)
    pub(crate) fn deliveries(&self) -> Vec<(String, String)> {
        self.deliveries.lock().clone()
    }

    /// Decoded payloads delivered to one connection
    pub(crate) fn received_by(&self, connection_id: &str) -> Vec<serde_json::Value> {
        self.deliveries
            .lock()
            .iter()
            .filter(|(id, _)| id == connection_id)
            .filter_map(|(_, payload)| serde_json::from_str(payload).ok())
            .collect()
    }

    /// Actions delivered to one connection, in delivery order
    pub(crate) fn actions_for(&self, connection_id: &str) -> Vec<String> {
        self.received_by(connection_id)
            .iter()
            .filter_map(|v| v["action"].as_str().map(String::from))
            .collect()
    }
}

#[async_trait]
impl DeliveryTransport for RecordingTransport {
    async fn deliver(&self, connection_id: &str, payload: &str) -> Result<(), DeliveryError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let result = self.answer(connection_id, payload).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl RecordingTransport {
    async fn answer(&self, connection_id: &str, payload: &str) -> Result<(), DeliveryError> {
        let behaviour = self
            .behaviours
            .lock()
            .get(connection_id)
            .copied()
            .unwrap_or(Behaviour::Deliver);

        match behaviour {
            Behaviour::Deliver => {
                self.deliveries
                    .lock()
                    .push((connection_id.to_string(), payload.to_string()));
                Ok(())
            }
            Behaviour::Gone => Err(DeliveryError::Gone),
            Behaviour::Transient => Err(DeliveryError::Transient("peer busy".to_string())),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}
