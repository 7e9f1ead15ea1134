//! Change-feed records carrying newly arrived readings
//!
//! Two shapes are accepted:
//!
//! ```json
//! {"event_type": "INSERT", "reading": {"patient_id": "PT00001", "heart_rate": 82}}
//! ```
//!
//! and stream-style records whose image uses typed attribute values:
//!
//! ```json
//! {"eventName": "INSERT", "dynamodb": {"NewImage": {"patient_id": {"S": "PT00001"}, "heart_rate": {"N": "82"}}}}
//! ```

use serde::{Deserialize, Serialize};

use super::reading::Reading;

/// Kind of change that produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Insert,
    Modify,
    Remove,
    #[serde(other)]
    Unknown,
}

/// One change record from the upstream feed.
///
/// The payload stays undecoded until the dispatcher processes it, so one
/// malformed reading cannot reject the whole batch. Decoding a record never
/// fails: a missing or unrecognised event type reads as `Unknown` and a
/// record without a usable payload carries `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value")]
pub struct ChangeRecord {
    pub event_type: EventType,
    pub reading: serde_json::Value,
}

impl ChangeRecord {
    pub fn new(event_type: EventType, reading: serde_json::Value) -> Self {
        Self { event_type, reading }
    }

    /// Wrap a reading as an `INSERT` record
    pub fn insert(reading: &Reading) -> Result<Self, serde_json::Error> {
        Ok(Self::new(EventType::Insert, serde_json::to_value(reading)?))
    }

    pub fn is_insert(&self) -> bool {
        self.event_type == EventType::Insert
    }
}

impl EventType {
    /// Parse an event name, case-insensitively
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "INSERT" => EventType::Insert,
            "MODIFY" => EventType::Modify,
            "REMOVE" => EventType::Remove,
            _ => EventType::Unknown,
        }
    }
}

/// A batch of change records as delivered by the feed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeBatch {
    #[serde(alias = "Records", default)]
    pub records: Vec<ChangeRecord>,
}

impl From<serde_json::Value> for ChangeRecord {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        let Value::Object(mut obj) = value else {
            return Self::new(EventType::Unknown, Value::Null);
        };

        let event_type = ["event_type", "eventName"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_str))
            .map(EventType::parse)
            .unwrap_or(EventType::Unknown);

        let reading = match obj.remove("reading") {
            Some(reading) if !reading.is_null() => reading,
            _ => obj
                .get("dynamodb")
                .and_then(|d| d.get("NewImage"))
                .and_then(Value::as_object)
                .map(decode_image)
                .unwrap_or(Value::Null),
        };

        Self { event_type, reading }
    }
}

/// Convert a typed attribute image into plain JSON
pub fn decode_image(image: &serde_json::Map<String, serde_json::Value>) -> serde_json::Value {
    serde_json::Value::Object(
        image
            .iter()
            .map(|(key, value)| (key.clone(), decode_attribute(value)))
            .collect(),
    )
}

fn decode_attribute(value: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    let Some(obj) = value.as_object() else {
        return value.clone();
    };
    if obj.len() != 1 {
        return value.clone();
    }

    match obj.iter().next() {
        Some((tag, inner)) => match (tag.as_str(), inner) {
            ("S", Value::String(s)) => Value::String(s.clone()),
            ("N", Value::String(n)) => n
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(n.clone())),
            ("BOOL", Value::Bool(b)) => Value::Bool(*b),
            ("NULL", _) => Value::Null,
            ("M", Value::Object(map)) => decode_image(map),
            ("L", Value::Array(items)) => Value::Array(items.iter().map(decode_attribute).collect()),
            _ => value.clone(),
        },
        None => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_record() {
        let record: ChangeRecord = serde_json::from_value(serde_json::json!({
            "event_type": "INSERT",
            "reading": {"patient_id": "PT00001", "heart_rate": 82}
        }))
        .unwrap();

        assert!(record.is_insert());
        assert_eq!(record.reading["heart_rate"], 82);
    }

    #[test]
    fn test_stream_record_image_decoded() {
        let record: ChangeRecord = serde_json::from_value(serde_json::json!({
            "eventName": "INSERT",
            "dynamodb": {
                "NewImage": {
                    "patient_id": {"S": "PT00001"},
                    "patient_name": {"S": "Mario Rossi"},
                    "heart_rate": {"N": "125.5"},
                    "spo2": {"N": "97"},
                    "flagged": {"BOOL": true},
                    "notes": {"NULL": true}
                }
            }
        }))
        .unwrap();

        let reading = Reading::from_value(record.reading.clone()).unwrap();
        assert_eq!(reading.patient_id, "PT00001");
        assert_eq!(reading.heart_rate, Some(125.5));
        assert_eq!(reading.spo2, Some(97.0));
        assert_eq!(record.reading["flagged"], true);
        assert!(record.reading["notes"].is_null());
    }

    #[test]
    fn test_unknown_event_type() {
        let record: ChangeRecord = serde_json::from_value(serde_json::json!({
            "event_type": "TRUNCATE",
            "reading": {}
        }))
        .unwrap();
        assert_eq!(record.event_type, EventType::Unknown);
        assert!(!record.is_insert());
    }

    #[test]
    fn test_batch_accepts_records_alias() {
        let batch: ChangeBatch = serde_json::from_value(serde_json::json!({
            "Records": [
                {"eventName": "MODIFY", "reading": {"patient_id": "PT00001"}},
                {"eventName": "REMOVE"}
            ]
        }))
        .unwrap();

        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[0].event_type, EventType::Modify);
        assert!(batch.records[1].reading.is_null());
    }

    #[test]
    fn test_malformed_record_does_not_reject_batch() {
        let batch: ChangeBatch = serde_json::from_value(serde_json::json!({
            "records": [
                {"event_type": "INSERT", "reading": {"patient_id": "PT1", "heart_rate": 130}},
                {"reading": {"patient_id": "PT2", "heart_rate": 40}},
                {"event_type": 7, "dynamodb": "not an object"},
                "garbage",
                {"event_type": "insert", "reading": {"patient_id": "PT3", "spo2": 85}}
            ]
        }))
        .unwrap();

        let kinds: Vec<EventType> = batch.records.iter().map(|r| r.event_type).collect();
        assert_eq!(
            kinds,
            vec![
                EventType::Insert,
                EventType::Unknown,
                EventType::Unknown,
                EventType::Unknown,
                EventType::Insert
            ]
        );
        assert!(batch.records[2].reading.is_null());
        assert_eq!(batch.records[4].reading["patient_id"], "PT3");
    }
}
