//! Alert configuration and record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::evaluator::Violation;
use crate::vitals::reading::timestamp_serde;
use crate::vitals::Reading;

/// Clinical limits used by the threshold evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Tachycardia above this heart rate (bpm)
    pub heart_rate_high: f64,
    /// Bradycardia below this heart rate (bpm)
    pub heart_rate_low: f64,
    /// Hypertensive crisis above this systolic pressure (mmHg)
    pub bp_systolic_high: f64,
    /// Hypoxia below this saturation (%)
    pub spo2_low: f64,
    /// High fever above this temperature (°C)
    pub temperature_high: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            heart_rate_high: 110.0,
            heart_rate_low: 45.0,
            bp_systolic_high: 160.0,
            spo2_low: 90.0,
            temperature_high: 38.5,
        }
    }
}

/// Alert severity. Every alert raised by the evaluator is critical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[default]
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
        }
    }
}

/// Alert lifecycle status. Only `New` is produced here; acknowledgement and
/// resolution happen elsewhere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    #[default]
    New,
    Ack,
    Resolved,
}

/// Alert record as written to the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub patient_id: String,
    pub patient_name: String,
    #[serde(with = "timestamp_serde")]
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    pub status: AlertStatus,
    /// Individual violation descriptions, in evaluation order
    #[serde(skip)]
    pub violations: Vec<String>,
}

impl Alert {
    /// Build a new alert for a reading that produced violations.
    ///
    /// The identity is assigned here, immediately before the ledger write.
    pub fn from_violations(reading: &Reading, violations: &[Violation]) -> Self {
        let descriptions: Vec<String> = violations.iter().map(Violation::description).collect();

        Self {
            alert_id: uuid::Uuid::new_v4().to_string(),
            patient_id: reading.patient_id.clone(),
            patient_name: reading.patient_name.clone(),
            timestamp: Utc::now(),
            severity: Severity::Critical,
            message: descriptions.join(", "),
            status: AlertStatus::New,
            violations: descriptions,
        }
    }
}

/// Notification target for the external sink
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotifyTarget {
    /// Log to tracing
    Log,
    /// HTTP webhook (pager or mail relay)
    Webhook {
        url: String,
        #[serde(default)]
        headers: std::collections::HashMap<String, String>,
    },
}

impl NotifyTarget {
    /// Whether the target reaches someone outside this process
    pub fn is_external(&self) -> bool {
        !matches!(self, NotifyTarget::Log)
    }
}
