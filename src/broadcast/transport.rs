//! Point-to-point delivery to a single subscriber

use async_trait::async_trait;

/// Outcome classes for a failed delivery
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The peer has terminated for good; the connection should be pruned
    #[error("Connection gone")]
    Gone,

    /// Any other failure; logged and otherwise ignored
    #[error("Transient delivery failure: {0}")]
    Transient(String),
}

/// Delivers one serialized event to one connection.
///
/// Implementations must not retry; the broadcaster bounds each call with a
/// timeout and treats an elapsed timeout as transient.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn deliver(&self, connection_id: &str, payload: &str) -> Result<(), DeliveryError>;
}
