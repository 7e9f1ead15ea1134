//! Per-reading pipeline: evaluate, aggregate, record, fan out

use std::fmt;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use super::config::DispatcherConfig;
use super::dedup::AlertDeduplicator;
use super::stats::PipelineStats;
use crate::alerts::{aggregate, evaluate_with, Alert, Notifier, Violation};
use crate::broadcast::{BroadcastError, BroadcastEvent, Broadcaster};
use crate::storage::{AlertLedger, PersistenceError};
use crate::vitals::{ChangeRecord, PatientStatus, Reading, ReadingError};

/// Where a reading is in its pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Evaluated,
    Persisted,
    Broadcasted,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Received => "received",
            Stage::Evaluated => "evaluated",
            Stage::Persisted => "persisted",
            Stage::Broadcasted => "broadcasted",
            Stage::Done => "done",
        };
        f.write_str(s)
    }
}

/// Batch result returned to the change feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Readings whose alert reached a subscriber or an external notification sink
    pub alerts_sent: usize,
    /// Readings whose vital update reached at least one subscriber
    pub updates_sent: usize,
}

/// What happened to one reading
#[derive(Debug, Clone)]
pub struct ReadingOutcome {
    pub patient_id: String,
    pub violations: Vec<Violation>,
    pub status: PatientStatus,
    pub alert_id: Option<String>,
    pub persisted: bool,
    pub suppressed: bool,
    pub alert_sent: bool,
    pub update_sent: bool,
    pub stage: Stage,
}

impl ReadingOutcome {
    fn new(reading: &Reading) -> Self {
        Self {
            patient_id: reading.patient_id.clone(),
            violations: Vec::new(),
            status: reading.prior_status,
            alert_id: None,
            persisted: false,
            suppressed: false,
            alert_sent: false,
            update_sent: false,
            stage: Stage::Received,
        }
    }
}

/// Failure of a single record; never aborts the rest of the batch
#[derive(Debug, thiserror::Error)]
pub enum RecordProcessingError {
    #[error("invalid reading: {0}")]
    InvalidReading(#[from] ReadingError),

    #[error("broadcast failed after stage {stage}: {source}")]
    Broadcast {
        stage: Stage,
        #[source]
        source: BroadcastError,
    },
}

/// Runs the alert pipeline over change-feed batches
pub struct Dispatcher {
    config: DispatcherConfig,
    ledger: Arc<dyn AlertLedger>,
    broadcaster: Arc<Broadcaster>,
    notifier: Option<Arc<Notifier>>,
    dedup: Option<AlertDeduplicator>,
    stats: Arc<PipelineStats>,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        ledger: Arc<dyn AlertLedger>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        let dedup = config.dedup_window.map(AlertDeduplicator::new);
        Self {
            config,
            ledger,
            broadcaster,
            notifier: None,
            dedup,
            stats: Arc::new(PipelineStats::new()),
        }
    }

    /// Attach an external notification sink; skipped when it has no targets
    pub fn with_notifier(mut self, notifier: Arc<Notifier>) -> Self {
        if notifier.is_configured() {
            self.notifier = Some(notifier);
        }
        self
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    /// Process one change-feed batch.
    ///
    /// Only INSERT records are evaluated. Records run concurrently up to the
    /// configured worker count; a failing record is logged and counted but
    /// never stops the others.
    pub async fn process_batch(&self, records: Vec<ChangeRecord>) -> DispatchSummary {
        let total = records.len();
        PipelineStats::incr(&self.stats.batches);
        PipelineStats::add(&self.stats.records_received, total as u64);

        let mut inserts = Vec::with_capacity(total);
        for (index, record) in records.into_iter().enumerate() {
            if record.is_insert() {
                inserts.push((index, record));
            } else {
                PipelineStats::incr(&self.stats.records_ignored);
                tracing::debug!(record = index, event_type = ?record.event_type, "Ignoring non-insert record");
            }
        }

        let results: Vec<(usize, Result<ReadingOutcome, RecordProcessingError>)> =
            stream::iter(inserts)
                .map(|(index, record)| async move { (index, self.process_record(record).await) })
                .buffer_unordered(self.config.workers.max(1))
                .collect()
                .await;

        let mut summary = DispatchSummary::default();
        for (index, result) in results {
            match result {
                Ok(outcome) => {
                    if outcome.alert_sent {
                        summary.alerts_sent += 1;
                    }
                    if outcome.update_sent {
                        summary.updates_sent += 1;
                    }
                }
                Err(e) => {
                    PipelineStats::incr(&self.stats.records_failed);
                    tracing::error!(record = index, error = %e, "Failed to process record");
                }
            }
        }

        PipelineStats::add(&self.stats.alerts_sent, summary.alerts_sent as u64);
        PipelineStats::add(&self.stats.updates_sent, summary.updates_sent as u64);

        tracing::info!(
            records = total,
            alerts_sent = summary.alerts_sent,
            updates_sent = summary.updates_sent,
            "Batch processed"
        );

        summary
    }

    /// Decode and process a single INSERT record
    pub async fn process_record(
        &self,
        record: ChangeRecord,
    ) -> Result<ReadingOutcome, RecordProcessingError> {
        let reading = Reading::from_value(record.reading)?;
        self.process_reading(&reading).await
    }

    /// Run one reading through the pipeline.
    ///
    /// A ledger failure is logged and the reading still fans out. The vital
    /// update is sent for every reading, after the alert when there is one.
    pub async fn process_reading(
        &self,
        reading: &Reading,
    ) -> Result<ReadingOutcome, RecordProcessingError> {
        reading.validate()?;
        let mut outcome = ReadingOutcome::new(reading);

        let violations = evaluate_with(reading, &self.config.thresholds);
        let status = aggregate(&violations, reading.prior_status);
        outcome.stage = Stage::Evaluated;
        outcome.status = status;
        tracing::trace!(
            patient_id = %reading.patient_id,
            stage = %outcome.stage,
            violations = violations.len(),
            status = %status
        );

        if !violations.is_empty() {
            PipelineStats::incr(&self.stats.alerts_raised);
            if self.is_replay(reading, &violations) {
                PipelineStats::incr(&self.stats.alerts_suppressed);
                outcome.suppressed = true;
                tracing::debug!(patient_id = %reading.patient_id, "Suppressed repeated alert");
            } else {
                self.raise_alert(reading, &violations, &mut outcome).await?;
            }
        }
        outcome.violations = violations;

        let update = BroadcastEvent::vital_update(reading, status);
        let report = self
            .broadcaster
            .broadcast(&update)
            .await
            .map_err(|source| RecordProcessingError::Broadcast {
                stage: outcome.stage,
                source,
            })?;
        PipelineStats::add(&self.stats.connections_pruned, report.pruned as u64);
        outcome.update_sent = report.reached_anyone();
        outcome.stage = Stage::Done;

        tracing::debug!(
            patient_id = %reading.patient_id,
            status = %status,
            alert = outcome.alert_id.as_deref().unwrap_or("-"),
            alert_sent = outcome.alert_sent,
            update_sent = outcome.update_sent,
            "Reading processed"
        );

        Ok(outcome)
    }

    async fn raise_alert(
        &self,
        reading: &Reading,
        violations: &[Violation],
        outcome: &mut ReadingOutcome,
    ) -> Result<(), RecordProcessingError> {
        let alert = Alert::from_violations(reading, violations);
        outcome.alert_id = Some(alert.alert_id.clone());

        match self.record_alert(&alert).await {
            Ok(_) => {
                PipelineStats::incr(&self.stats.alerts_recorded);
                outcome.persisted = true;
                outcome.stage = Stage::Persisted;
            }
            Err(e) => {
                PipelineStats::incr(&self.stats.ledger_failures);
                tracing::error!(
                    alert_id = %alert.alert_id,
                    patient_id = %alert.patient_id,
                    error = %e,
                    "Failed to record alert"
                );
            }
        }

        let report = self
            .broadcaster
            .broadcast(&BroadcastEvent::new_alert(&alert))
            .await
            .map_err(|source| RecordProcessingError::Broadcast {
                stage: outcome.stage,
                source,
            })?;
        PipelineStats::add(&self.stats.connections_pruned, report.pruned as u64);
        outcome.stage = Stage::Broadcasted;

        let notified = self.notify(&alert).await;
        outcome.alert_sent = report.reached_anyone() || notified;

        tracing::info!(
            alert_id = %alert.alert_id,
            patient_id = %alert.patient_id,
            subscribers = report.delivered,
            notified,
            "Alert dispatched"
        );
        if !outcome.alert_sent {
            tracing::warn!(alert_id = %alert.alert_id, "Alert recorded but no channel delivered it");
        }

        Ok(())
    }

    async fn record_alert(&self, alert: &Alert) -> Result<String, PersistenceError> {
        let ledger = Arc::clone(&self.ledger);
        let alert = alert.clone();
        tokio::task::spawn_blocking(move || ledger.record(&alert))
            .await
            .map_err(|e| PersistenceError::Task(e.to_string()))?
    }

    async fn notify(&self, alert: &Alert) -> bool {
        let Some(notifier) = &self.notifier else {
            return false;
        };
        match notifier.notify(alert).await {
            Ok(external) => external > 0,
            Err(e) => {
                tracing::error!(alert_id = %alert.alert_id, error = %e, "Failed to notify");
                false
            }
        }
    }

    fn is_replay(&self, reading: &Reading, violations: &[Violation]) -> bool {
        match &self.dedup {
            Some(dedup) => !dedup.first_seen(reading, violations),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::NotifyTarget;
    use crate::broadcast::testing::{Behaviour, RecordingTransport};
    use crate::broadcast::BroadcastConfig;
    use crate::storage::{ConnectionRegistry, MemoryLedger};
    use crate::vitals::EventType;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        dispatcher: Dispatcher,
        ledger: Arc<MemoryLedger>,
        registry: Arc<ConnectionRegistry>,
        transport: Arc<RecordingTransport>,
    }

    fn fixture(config: DispatcherConfig, subscribers: &[&str]) -> Fixture {
        let ledger = Arc::new(MemoryLedger::new());
        let registry = Arc::new(ConnectionRegistry::in_memory());
        for id in subscribers {
            registry.add(id).unwrap();
        }
        let transport = Arc::new(RecordingTransport::new());
        let broadcaster = Arc::new(Broadcaster::new(
            Arc::clone(&registry),
            transport.clone(),
            BroadcastConfig {
                max_concurrency: 8,
                delivery_timeout: Duration::from_millis(100),
            },
        ));
        let dispatcher = Dispatcher::new(config, ledger.clone(), broadcaster);

        Fixture {
            dispatcher,
            ledger,
            registry,
            transport,
        }
    }

    fn config() -> DispatcherConfig {
        DispatcherConfig::default().with_workers(4)
    }

    fn insert(value: serde_json::Value) -> ChangeRecord {
        ChangeRecord::new(EventType::Insert, value)
    }

    #[tokio::test]
    async fn test_tachycardia_alert_fans_out() {
        let fx = fixture(config(), &["dash"]);
        let batch = vec![insert(json!({
            "patient_id": "PT00001",
            "patient_name": "Mario Rossi",
            "heart_rate": 125,
            "spo2": 97,
            "status": "stable"
        }))];

        let summary = fx.dispatcher.process_batch(batch).await;
        assert_eq!(summary, DispatchSummary { alerts_sent: 1, updates_sent: 1 });

        let alerts = fx.ledger.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].patient_id, "PT00001");
        assert_eq!(alerts[0].message, "Tachicardia: 125 bpm");

        assert_eq!(fx.transport.actions_for("dash"), vec!["newAlert", "vitalUpdate"]);
        let received = fx.transport.received_by("dash");
        assert_eq!(received[0]["data"]["alert_id"], alerts[0].alert_id.as_str());
        assert_eq!(received[0]["data"]["violations"], json!(["Tachicardia: 125 bpm"]));
        assert_eq!(received[1]["data"]["status"], "Critical");
        assert_eq!(received[1]["data"]["heart_rate"], 125.0);
    }

    #[tokio::test]
    async fn test_normal_reading_keeps_status_and_updates_only() {
        let fx = fixture(config(), &["dash"]);
        let batch = vec![insert(json!({
            "patient_id": "PT00002",
            "heart_rate": 72,
            "spo2": 98,
            "temperature": 36.6,
            "status": "critical"
        }))];

        let summary = fx.dispatcher.process_batch(batch).await;
        assert_eq!(summary, DispatchSummary { alerts_sent: 0, updates_sent: 1 });
        assert!(fx.ledger.is_empty());

        let received = fx.transport.received_by("dash");
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["action"], "vitalUpdate");
        assert_eq!(received[0]["data"]["status"], "Critical");
        assert_eq!(received[0]["data"]["name"], "Unknown");
    }

    #[tokio::test]
    async fn test_gone_subscriber_is_pruned() {
        let fx = fixture(config(), &["alive", "stale"]);
        fx.transport.set("stale", Behaviour::Gone);

        let batch = vec![insert(json!({"patient_id": "PT00003", "spo2": 85}))];
        let summary = fx.dispatcher.process_batch(batch).await;

        assert_eq!(summary, DispatchSummary { alerts_sent: 1, updates_sent: 1 });
        assert!(fx.registry.contains("alive"));
        assert!(!fx.registry.contains("stale"));
        assert_eq!(fx.transport.actions_for("alive"), vec!["newAlert", "vitalUpdate"]);
        assert!(fx.dispatcher.stats().snapshot().connections_pruned >= 1);
    }

    #[tokio::test]
    async fn test_bad_record_does_not_stop_batch() {
        let fx = fixture(config(), &["dash"]);
        let batch = vec![
            insert(json!({"patient_id": "PT00001", "heart_rate": 125})),
            insert(json!({"heart_rate": 130})),
            insert(json!({"patient_id": "PT00003", "temperature": 39.2})),
        ];

        let summary = fx.dispatcher.process_batch(batch).await;
        assert_eq!(summary, DispatchSummary { alerts_sent: 2, updates_sent: 2 });
        assert_eq!(fx.ledger.len(), 2);

        let stats = fx.dispatcher.stats().snapshot();
        assert_eq!(stats.records_failed, 1);
        assert_eq!(stats.records_received, 3);
    }

    #[tokio::test]
    async fn test_non_numeric_metric_fails_only_that_record() {
        let fx = fixture(config(), &["dash"]);
        let batch = vec![
            insert(json!({"patient_id": "PT00001", "heart_rate": 80})),
            insert(json!({"patient_id": "PT00002", "heart_rate": {"bpm": 80}})),
        ];

        let summary = fx.dispatcher.process_batch(batch).await;
        assert_eq!(summary.updates_sent, 1);
        assert_eq!(fx.dispatcher.stats().snapshot().records_failed, 1);
    }

    #[tokio::test]
    async fn test_ledger_failure_still_broadcasts() {
        let fx = fixture(config(), &["dash"]);
        fx.ledger.set_failing(true);

        let batch = vec![insert(json!({"patient_id": "PT00004", "bp_systolic": 175}))];
        let summary = fx.dispatcher.process_batch(batch).await;

        assert_eq!(summary, DispatchSummary { alerts_sent: 1, updates_sent: 1 });
        assert!(fx.ledger.is_empty());
        assert_eq!(fx.transport.actions_for("dash"), vec!["newAlert", "vitalUpdate"]);
        assert_eq!(fx.dispatcher.stats().snapshot().ledger_failures, 1);
    }

    #[tokio::test]
    async fn test_non_insert_records_are_ignored() {
        let fx = fixture(config(), &["dash"]);
        let batch = vec![
            ChangeRecord::new(EventType::Modify, json!({"patient_id": "PT1", "heart_rate": 150})),
            ChangeRecord::new(EventType::Remove, json!({"patient_id": "PT1"})),
        ];

        let summary = fx.dispatcher.process_batch(batch).await;
        assert_eq!(summary, DispatchSummary::default());
        assert!(fx.ledger.is_empty());
        assert!(fx.transport.deliveries().is_empty());
        assert_eq!(fx.dispatcher.stats().snapshot().records_ignored, 2);
    }

    #[tokio::test]
    async fn test_no_subscribers_still_records() {
        let fx = fixture(config(), &[]);
        let batch = vec![insert(json!({"patient_id": "PT00005", "heart_rate": 40}))];

        let summary = fx.dispatcher.process_batch(batch).await;
        assert_eq!(summary, DispatchSummary::default());
        assert_eq!(fx.ledger.len(), 1);
        assert_eq!(fx.ledger.alerts()[0].message, "Bradicardia: 40 bpm");
    }

    #[tokio::test]
    async fn test_log_notifier_is_not_a_delivery() {
        let mut fx = fixture(config(), &[]);
        let notifier = Arc::new(Notifier::new().with_target(NotifyTarget::Log));
        fx.dispatcher = fx.dispatcher.with_notifier(notifier);

        let batch = vec![insert(json!({"patient_id": "PT00006", "temperature": 39.5}))];
        let summary = fx.dispatcher.process_batch(batch).await;

        assert_eq!(summary, DispatchSummary::default());
        assert_eq!(fx.ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_webhook_notifier_counts_as_alert_delivery() {
        let app = axum::Router::new().route("/hook", axum::routing::post(|| async { "ok" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut fx = fixture(config(), &[]);
        let notifier = Arc::new(Notifier::new().with_target(NotifyTarget::Webhook {
            url: format!("http://{}/hook", addr),
            headers: Default::default(),
        }));
        fx.dispatcher = fx.dispatcher.with_notifier(notifier);

        let batch = vec![insert(json!({"patient_id": "PT00006", "temperature": 39.5}))];
        let summary = fx.dispatcher.process_batch(batch).await;

        assert_eq!(summary, DispatchSummary { alerts_sent: 1, updates_sent: 0 });
    }

    #[tokio::test]
    async fn test_record_without_event_type_is_ignored() {
        let fx = fixture(config(), &["dash"]);
        let batch: crate::vitals::ChangeBatch = serde_json::from_value(json!({
            "records": [
                {"event_type": "INSERT", "reading": {"patient_id": "PT00001", "heart_rate": 130}},
                {"reading": {"patient_id": "PT00002", "heart_rate": 40}},
                {"event_type": "INSERT", "reading": {"patient_id": "PT00003", "spo2": 85}}
            ]
        }))
        .unwrap();

        let summary = fx.dispatcher.process_batch(batch.records).await;
        assert_eq!(summary, DispatchSummary { alerts_sent: 2, updates_sent: 2 });

        let patients: Vec<String> = fx.ledger.alerts().into_iter().map(|a| a.patient_id).collect();
        assert!(patients.contains(&"PT00001".to_string()));
        assert!(patients.contains(&"PT00003".to_string()));
        assert_eq!(fx.dispatcher.stats().snapshot().records_ignored, 1);
    }

    #[tokio::test]
    async fn test_replayed_batch_is_deduplicated() {
        let fx = fixture(config().with_dedup_window(Duration::from_secs(60)), &["dash"]);
        let record = json!({
            "patient_id": "PT00007",
            "heart_rate": 125,
            "timestamp": "2026-01-10T08:00:00Z"
        });

        fx.dispatcher.process_batch(vec![insert(record.clone())]).await;
        let summary = fx.dispatcher.process_batch(vec![insert(record)]).await;

        assert_eq!(summary, DispatchSummary { alerts_sent: 0, updates_sent: 1 });
        assert_eq!(fx.ledger.len(), 1);
        assert_eq!(fx.dispatcher.stats().snapshot().alerts_suppressed, 1);
    }

    #[tokio::test]
    async fn test_every_reading_in_large_batch_is_processed() {
        let fx = fixture(config(), &["dash"]);
        let batch: Vec<ChangeRecord> = (0..20)
            .map(|i| insert(json!({"patient_id": format!("PT{:05}", i), "heart_rate": 130})))
            .collect();

        let summary = fx.dispatcher.process_batch(batch).await;
        assert_eq!(summary, DispatchSummary { alerts_sent: 20, updates_sent: 20 });
        assert_eq!(fx.ledger.len(), 20);
        assert_eq!(fx.transport.deliveries().len(), 40);
    }

    #[tokio::test]
    async fn test_process_reading_outcome() {
        let fx = fixture(config(), &["dash"]);
        let reading = Reading::new("PT00008", "Anna Bianchi")
            .with_heart_rate(130.0)
            .with_temperature(39.0);

        let outcome = fx.dispatcher.process_reading(&reading).await.unwrap();
        assert_eq!(outcome.status, PatientStatus::Critical);
        assert_eq!(outcome.violations.len(), 2);
        assert!(outcome.persisted);
        assert!(outcome.alert_sent);
        assert!(outcome.update_sent);
        assert_eq!(outcome.stage, Stage::Done);
        assert_eq!(
            fx.ledger.alerts()[0].message,
            "Tachicardia: 130 bpm, Febbre alta: 39°C"
        );
    }
}
