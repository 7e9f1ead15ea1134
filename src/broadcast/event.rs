//! Events pushed to subscribers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alerts::{Alert, Severity};
use crate::vitals::reading::timestamp_serde;
use crate::vitals::{PatientStatus, Reading};

/// Event delivered to every connected subscriber.
///
/// Serializes as `{"action": "newAlert" | "vitalUpdate", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
pub enum BroadcastEvent {
    NewAlert(AlertPayload),
    VitalUpdate(VitalUpdatePayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub alert_id: String,
    pub patient_id: String,
    pub name: String,
    pub violations: Vec<String>,
    pub severity: Severity,
    #[serde(with = "timestamp_serde")]
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalUpdatePayload {
    pub patient_id: String,
    pub name: String,
    pub heart_rate: Option<f64>,
    pub bp_systolic: Option<f64>,
    pub bp_diastolic: Option<f64>,
    pub spo2: Option<f64>,
    pub temperature: Option<f64>,
    pub status: PatientStatus,
    #[serde(with = "timestamp_serde")]
    pub timestamp: DateTime<Utc>,
}

impl BroadcastEvent {
    pub fn new_alert(alert: &Alert) -> Self {
        BroadcastEvent::NewAlert(AlertPayload {
            alert_id: alert.alert_id.clone(),
            patient_id: alert.patient_id.clone(),
            name: alert.patient_name.clone(),
            violations: alert.violations.clone(),
            severity: alert.severity,
            timestamp: alert.timestamp,
            message: alert.message.clone(),
        })
    }

    /// Full metric snapshot of a reading with its aggregated status
    pub fn vital_update(reading: &Reading, status: PatientStatus) -> Self {
        BroadcastEvent::VitalUpdate(VitalUpdatePayload {
            patient_id: reading.patient_id.clone(),
            name: reading.patient_name.clone(),
            heart_rate: reading.heart_rate,
            bp_systolic: reading.bp_systolic,
            bp_diastolic: reading.bp_diastolic,
            spo2: reading.spo2,
            temperature: reading.temperature,
            status,
            timestamp: reading.timestamp,
        })
    }

    pub fn action(&self) -> &'static str {
        match self {
            BroadcastEvent::NewAlert(_) => "newAlert",
            BroadcastEvent::VitalUpdate(_) => "vitalUpdate",
        }
    }

    pub fn patient_id(&self) -> &str {
        match self {
            BroadcastEvent::NewAlert(p) => &p.patient_id,
            BroadcastEvent::VitalUpdate(p) => &p.patient_id,
        }
    }

    /// Wire form sent to subscribers
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
