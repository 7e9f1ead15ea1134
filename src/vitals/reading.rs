//! Vital-sign readings and patient status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Default display name when the source does not carry one
pub const UNKNOWN_PATIENT_NAME: &str = "Unknown";

/// Aggregated patient status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum PatientStatus {
    #[default]
    Stable,
    Critical,
}

impl PatientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatientStatus::Stable => "Stable",
            PatientStatus::Critical => "Critical",
        }
    }
}

impl std::fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Anything other than "critical" (any case) reads as Stable, including
// statuses this service does not model such as "Warning".
impl<'de> Deserialize<'de> for PatientStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(serde_json::Value::String(s)) if s.trim().eq_ignore_ascii_case("critical") => {
                PatientStatus::Critical
            }
            _ => PatientStatus::Stable,
        })
    }
}

/// Metrics that carry a clinical threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    HeartRate,
    BpSystolic,
    Spo2,
    Temperature,
}

/// One timestamped snapshot of a patient's vital signs.
///
/// Every metric is optional: `None` means the value was not measured this
/// cycle and must not be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub patient_id: String,
    #[serde(default = "Utc::now", with = "timestamp_serde")]
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_patient_name", alias = "name")]
    pub patient_name: String,
    #[serde(default, deserialize_with = "metric_value")]
    pub heart_rate: Option<f64>,
    #[serde(default, deserialize_with = "metric_value")]
    pub bp_systolic: Option<f64>,
    #[serde(default, deserialize_with = "metric_value")]
    pub bp_diastolic: Option<f64>,
    #[serde(default, deserialize_with = "metric_value")]
    pub spo2: Option<f64>,
    #[serde(default, deserialize_with = "metric_value")]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub prior_status: PatientStatus,
}

fn default_patient_name() -> String {
    UNKNOWN_PATIENT_NAME.to_string()
}

impl Reading {
    /// Create a reading with no metrics measured
    pub fn new(patient_id: impl Into<String>, patient_name: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            timestamp: Utc::now(),
            patient_name: patient_name.into(),
            heart_rate: None,
            bp_systolic: None,
            bp_diastolic: None,
            spo2: None,
            temperature: None,
            prior_status: PatientStatus::Stable,
        }
    }

    /// Decode and validate a reading from a change-record payload.
    ///
    /// Feeds may carry the prior status as `status`; `prior_status` wins
    /// when both are present.
    pub fn from_value(mut value: serde_json::Value) -> Result<Self, ReadingError> {
        if let Some(obj) = value.as_object_mut() {
            if let Some(status) = obj.remove("status") {
                obj.entry("prior_status").or_insert(status);
            }
        }
        let reading: Reading = serde_json::from_value(value)?;
        reading.validate()?;
        Ok(reading)
    }

    /// Check the fields the pipeline cannot work without
    pub fn validate(&self) -> Result<(), ReadingError> {
        if self.patient_id.trim().is_empty() {
            return Err(ReadingError::MissingPatientId);
        }
        Ok(())
    }

    /// Value of a thresholded metric, if measured
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::HeartRate => self.heart_rate,
            Metric::BpSystolic => self.bp_systolic,
            Metric::Spo2 => self.spo2,
            Metric::Temperature => self.temperature,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_heart_rate(mut self, value: f64) -> Self {
        self.heart_rate = Some(value);
        self
    }

    pub fn with_blood_pressure(mut self, systolic: f64, diastolic: f64) -> Self {
        self.bp_systolic = Some(systolic);
        self.bp_diastolic = Some(diastolic);
        self
    }

    pub fn with_spo2(mut self, value: f64) -> Self {
        self.spo2 = Some(value);
        self
    }

    pub fn with_temperature(mut self, value: f64) -> Self {
        self.temperature = Some(value);
        self
    }

    pub fn with_prior_status(mut self, status: PatientStatus) -> Self {
        self.prior_status = status;
        self
    }
}

/// Reading decode errors
#[derive(Debug, thiserror::Error)]
pub enum ReadingError {
    #[error("Invalid reading payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Reading has no patient_id")]
    MissingPatientId,
}

/// Accepts numbers, numeric strings and null. Non-finite values count as
/// not measured.
fn metric_value<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let parsed = match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => None,
        Some(serde_json::Value::String(s)) => Some(
            s.trim()
                .parse::<f64>()
                .map_err(|_| D::Error::custom(format!("invalid metric value {:?}", s)))?,
        ),
        Some(other) => {
            return Err(D::Error::custom(format!(
                "expected a number, got {}",
                other
            )))
        }
    };
    Ok(parsed.filter(|v| v.is_finite()))
}

/// Timestamp serialization helper.
///
/// Reads RFC 3339, naive ISO 8601 date-times (taken as UTC) and epoch
/// milliseconds; always writes RFC 3339.
pub(crate) mod timestamp_serde {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&timestamp.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => parse(&s).map_err(D::Error::custom),
            serde_json::Value::Number(n) => n
                .as_i64()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .ok_or_else(|| D::Error::custom(format!("invalid epoch millis {}", n))),
            other => Err(D::Error::custom(format!("invalid timestamp {}", other))),
        }
    }

    pub fn parse(s: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
            return Ok(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| format!("invalid timestamp {:?}: {}", s, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_decode_full_reading() {
        let reading = Reading::from_value(serde_json::json!({
            "patient_id": "PT00001",
            "timestamp": "2024-03-01T10:15:30.123456",
            "patient_name": "Mario Rossi",
            "heart_rate": 125,
            "bp_systolic": 140,
            "bp_diastolic": 85,
            "spo2": 97,
            "temperature": 37.0,
            "prior_status": "Stable"
        }))
        .unwrap();

        assert_eq!(reading.patient_id, "PT00001");
        assert_eq!(reading.heart_rate, Some(125.0));
        assert_eq!(reading.temperature, Some(37.0));
        assert_eq!(reading.prior_status, PatientStatus::Stable);
        assert_eq!(
            reading.timestamp.timestamp_millis(),
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 30).unwrap().timestamp_millis() + 123
        );
    }

    #[test]
    fn test_missing_metrics_are_none() {
        let reading = Reading::from_value(serde_json::json!({
            "patient_id": "PT00002",
            "heart_rate": null,
            "spo2": ""
        }))
        .unwrap();

        assert!(reading.heart_rate.is_none());
        assert!(reading.spo2.is_none());
        assert!(reading.temperature.is_none());
        assert_eq!(reading.patient_name, UNKNOWN_PATIENT_NAME);
    }

    #[test]
    fn test_numeric_strings_accepted() {
        let reading = Reading::from_value(serde_json::json!({
            "patient_id": "PT00003",
            "temperature": "38.9"
        }))
        .unwrap();
        assert_eq!(reading.temperature, Some(38.9));
    }

    #[test]
    fn test_unknown_status_defaults_to_stable() {
        let reading = Reading::from_value(serde_json::json!({
            "patient_id": "PT00004",
            "status": "Warning"
        }))
        .unwrap();
        assert_eq!(reading.prior_status, PatientStatus::Stable);

        let reading = Reading::from_value(serde_json::json!({
            "patient_id": "PT00004",
            "prior_status": "CRITICAL"
        }))
        .unwrap();
        assert_eq!(reading.prior_status, PatientStatus::Critical);
    }

    #[test]
    fn test_prior_status_wins_over_status() {
        let reading = Reading::from_value(serde_json::json!({
            "patient_id": "PT00004",
            "status": "Stable",
            "prior_status": "Critical"
        }))
        .unwrap();
        assert_eq!(reading.prior_status, PatientStatus::Critical);

        let reading = Reading::from_value(serde_json::json!({
            "patient_id": "PT00004",
            "status": "critical"
        }))
        .unwrap();
        assert_eq!(reading.prior_status, PatientStatus::Critical);
    }

    #[test]
    fn test_missing_patient_id_rejected() {
        let err = Reading::from_value(serde_json::json!({"patient_id": "  "})).unwrap_err();
        assert!(matches!(err, ReadingError::MissingPatientId));

        let err = Reading::from_value(serde_json::json!({"heart_rate": 80})).unwrap_err();
        assert!(matches!(err, ReadingError::Decode(_)));
    }

    #[test]
    fn test_non_numeric_metric_rejected() {
        let err = Reading::from_value(serde_json::json!({
            "patient_id": "PT00005",
            "heart_rate": {"value": 80}
        }))
        .unwrap_err();
        assert!(matches!(err, ReadingError::Decode(_)));
    }

    #[test]
    fn test_epoch_millis_timestamp() {
        let reading = Reading::from_value(serde_json::json!({
            "patient_id": "PT00006",
            "timestamp": 1_700_000_000_000i64
        }))
        .unwrap();
        assert_eq!(reading.timestamp.timestamp_millis(), 1_700_000_000_000);
    }
}
