//! Change-feed sources for the dispatcher
//!
//! Supports multiple sources:
//! - HTTP `POST /events` (default)
//! - Kafka consumer (optional, enable with `kafka` feature)

use crate::vitals::{ChangeBatch, ChangeRecord};

#[cfg(feature = "kafka")]
pub mod kafka;

#[cfg(feature = "kafka")]
pub use kafka::{ConsumerHandle, KafkaConfig, KafkaConsumer};

/// Decode one feed message.
///
/// Accepts a batch object (`{"records": [...]}` or `{"Records": [...]}`) or a
/// single change record.
pub fn decode_message(payload: &[u8]) -> Result<Vec<ChangeRecord>, ProcessError> {
    let value: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| ProcessError::Parse(e.to_string()))?;

    let obj = value
        .as_object()
        .ok_or_else(|| ProcessError::Parse("expected JSON object".to_string()))?;

    if obj.contains_key("records") || obj.contains_key("Records") {
        let batch: ChangeBatch =
            serde_json::from_value(value).map_err(|e| ProcessError::Parse(e.to_string()))?;
        return Ok(batch.records);
    }

    let record: ChangeRecord =
        serde_json::from_value(value).map_err(|e| ProcessError::Parse(e.to_string()))?;
    Ok(vec![record])
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Parse error: {0}")]
    Parse(String),
}
