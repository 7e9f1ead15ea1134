//! External notification sink for critical alerts

use std::collections::HashMap;
use std::time::Duration;

use super::config::{Alert, NotifyTarget};

/// HTTP request timeout for a single webhook attempt
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Notifier for paging channels outside the real-time fan-out.
///
/// Each target is tried once; there is no retry or backoff.
pub struct Notifier {
    client: reqwest::Client,
    targets: Vec<NotifyTarget>,
}

impl Notifier {
    /// Create a notifier with no targets
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            targets: Vec::new(),
        }
    }

    /// Add notification target
    pub fn with_target(mut self, target: NotifyTarget) -> Self {
        self.targets.push(target);
        self
    }

    /// Whether any target is configured
    pub fn is_configured(&self) -> bool {
        !self.targets.is_empty()
    }

    /// Send notification to all targets.
    ///
    /// Succeeds only if every target accepted the notification. Returns how
    /// many external sinks took it; the log target is not one of them.
    pub async fn notify(&self, alert: &Alert) -> Result<usize, NotifierError> {
        if self.targets.is_empty() {
            return Err(NotifierError::NoTargets);
        }

        let mut errors = Vec::new();
        let mut external = 0;

        for target in &self.targets {
            match self.notify_target(alert, target).await {
                Ok(()) if target.is_external() => external += 1,
                Ok(()) => {}
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            Ok(external)
        } else {
            Err(NotifierError::Multiple(errors))
        }
    }

    /// Send notification to a single target
    async fn notify_target(&self, alert: &Alert, target: &NotifyTarget) -> Result<(), NotifierError> {
        match target {
            NotifyTarget::Log => {
                tracing::warn!(
                    alert_id = %alert.alert_id,
                    patient_id = %alert.patient_id,
                    patient_name = %alert.patient_name,
                    "Critical alert: {}",
                    alert.message
                );
                Ok(())
            }
            NotifyTarget::Webhook { url, headers } => self.send_webhook(alert, url, headers).await,
        }
    }

    /// Send webhook notification
    async fn send_webhook(
        &self,
        alert: &Alert,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<(), NotifierError> {
        let payload = serde_json::json!({
            "subject": subject(alert),
            "message": body(alert),
            "alert_id": alert.alert_id,
            "patient_id": alert.patient_id,
            "patient_name": alert.patient_name,
            "violations": alert.violations,
            "severity": alert.severity,
            "timestamp": alert.timestamp.to_rfc3339(),
        });

        let mut request = self.client.post(url).json(&payload);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| {
            NotifierError::Webhook(format!("Failed to send webhook: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(NotifierError::Webhook(format!(
                "Webhook returned status {}",
                response.status()
            )));
        }

        tracing::debug!(
            alert_id = %alert.alert_id,
            url = %url,
            "Webhook notification sent"
        );

        Ok(())
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

fn subject(alert: &Alert) -> String {
    format!("CRITICAL: {} ({})", alert.patient_name, alert.patient_id)
}

fn body(alert: &Alert) -> String {
    let problems: Vec<String> = alert.violations.iter().map(|v| format!("- {}", v)).collect();
    format!(
        "Patient: {}\nID: {}\nTime: {}\n\nDetected:\n{}",
        alert.patient_name,
        alert.patient_id,
        alert.timestamp.to_rfc3339(),
        problems.join("\n")
    )
}

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("No notification targets configured")]
    NoTargets,

    #[error("Multiple notification failures: {0:?}")]
    Multiple(Vec<NotifierError>),
}
