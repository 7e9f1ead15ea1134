//! Fan-out of one event to every registered connection

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use super::event::BroadcastEvent;
use super::transport::{DeliveryError, DeliveryTransport};
use crate::storage::{ConnectionRegistry, RegistryEntry};

/// Broadcaster configuration
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Maximum deliveries in flight for one broadcast
    pub max_concurrency: usize,
    /// Upper bound for a single delivery attempt
    pub delivery_timeout: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 32,
            delivery_timeout: Duration::from_secs(2),
        }
    }
}

/// Result of one broadcast sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Connections in the snapshot
    pub attempted: usize,
    /// Connections that acknowledged delivery
    pub delivered: usize,
    /// Failures that left the connection registered (including timeouts)
    pub transient: usize,
    /// Connections that reported themselves gone
    pub gone: usize,
    /// Gone connections actually removed from the registry
    pub pruned: usize,
}

impl BroadcastReport {
    pub fn delivered_count(&self) -> usize {
        self.delivered
    }

    /// Whether anybody received the event
    pub fn reached_anyone(&self) -> bool {
        self.delivered > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Delivered,
    Transient,
    Gone,
}

/// Delivers events to whoever is connected right now.
///
/// Delivery is best effort: no retry, no queueing for absent subscribers.
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    transport: Arc<dyn DeliveryTransport>,
    config: BroadcastConfig,
}

impl Broadcaster {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        transport: Arc<dyn DeliveryTransport>,
        config: BroadcastConfig,
    ) -> Self {
        Self {
            registry,
            transport,
            config,
        }
    }

    /// Deliver an event to every connection in a registry snapshot, then
    /// prune the connections that reported themselves gone.
    pub async fn broadcast(&self, event: &BroadcastEvent) -> Result<BroadcastReport, BroadcastError> {
        let payload = event.encode()?;
        let members = self.registry.snapshot();

        if members.is_empty() {
            tracing::debug!(action = event.action(), "No subscribers connected");
            return Ok(BroadcastReport::default());
        }

        let mut report = BroadcastReport {
            attempted: members.len(),
            ..Default::default()
        };

        let payload = payload.as_str();
        let outcomes: Vec<(RegistryEntry, Outcome)> = stream::iter(members)
            .map(|entry| async move {
                let outcome = self.deliver_one(&entry.connection_id, payload).await;
                (entry, outcome)
            })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let mut gone = Vec::new();
        for (entry, outcome) in outcomes {
            match outcome {
                Outcome::Delivered => report.delivered += 1,
                Outcome::Transient => report.transient += 1,
                Outcome::Gone => {
                    report.gone += 1;
                    gone.push(entry);
                }
            }
        }

        for entry in gone {
            match self
                .registry
                .prune_async(&entry.connection_id, entry.generation)
                .await
            {
                Ok(true) => report.pruned += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    connection_id = %entry.connection_id,
                    error = %e,
                    "Failed to prune gone connection"
                ),
            }
        }

        tracing::debug!(
            action = event.action(),
            attempted = report.attempted,
            delivered = report.delivered,
            transient = report.transient,
            pruned = report.pruned,
            "Broadcast complete"
        );

        Ok(report)
    }

    async fn deliver_one(&self, connection_id: &str, payload: &str) -> Outcome {
        let attempt = self.transport.deliver(connection_id, payload);

        match tokio::time::timeout(self.config.delivery_timeout, attempt).await {
            Ok(Ok(())) => Outcome::Delivered,
            Ok(Err(DeliveryError::Gone)) => {
                tracing::info!(connection_id, "Connection gone, scheduling removal");
                Outcome::Gone
            }
            Ok(Err(DeliveryError::Transient(reason))) => {
                tracing::warn!(connection_id, reason = %reason, "Delivery failed");
                Outcome::Transient
            }
            Err(_) => {
                tracing::warn!(
                    connection_id,
                    timeout_ms = self.config.delivery_timeout.as_millis() as u64,
                    "Delivery timed out"
                );
                Outcome::Transient
            }
        }
    }
}

/// Broadcast errors
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}
