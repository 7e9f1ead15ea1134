//! Kafka change-feed consumer
//!
//! Consumes change batches from Kafka topics and hands them to the
//! dispatcher. Offsets are committed only after a batch has been dispatched,
//! so a restart replays anything in flight (at-least-once).
//!
//! ## Message Format
//!
//! A batch:
//! ```json
//! {"records": [{"event_type": "INSERT", "reading": {"patient_id": "PT00001", "heart_rate": 125}}]}
//! ```
//!
//! Or a single change record:
//! ```json
//! {"event_type": "INSERT", "reading": {"patient_id": "PT00001", "heart_rate": 125}}
//! ```
//!
//! ## Configuration
//!
//! Environment variables:
//! - `KAFKA_BROKERS`: Comma-separated list of brokers (default: localhost:9092)
//! - `KAFKA_TOPICS`: Comma-separated list of topics to consume
//! - `KAFKA_GROUP_ID`: Consumer group ID (default: vitalwatch)
//! - `KAFKA_AUTO_OFFSET_RESET`: Where to start if no offset (earliest/latest, default: earliest)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use tokio::sync::mpsc;

use super::decode_message;
use crate::dispatch::Dispatcher;

/// Kafka consumer configuration
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Kafka broker addresses
    pub brokers: String,
    /// Topics to consume from
    pub topics: Vec<String>,
    /// Consumer group ID
    pub group_id: String,
    /// Auto offset reset (earliest or latest)
    pub auto_offset_reset: String,
    /// Session timeout in ms
    pub session_timeout_ms: u32,
    /// Max poll interval in ms
    pub max_poll_interval_ms: u32,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            topics: vec![],
            group_id: "vitalwatch".to_string(),
            auto_offset_reset: "earliest".to_string(),
            session_timeout_ms: 30000,
            max_poll_interval_ms: 300000,
        }
    }
}

impl KafkaConfig {
    /// Create config from environment variables; `None` without topics
    pub fn from_env() -> Option<Self> {
        let topics = std::env::var("KAFKA_TOPICS").ok()?;
        let topics: Vec<String> = topics
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if topics.is_empty() {
            return None;
        }

        let defaults = Self::default();
        Some(Self {
            brokers: std::env::var("KAFKA_BROKERS").unwrap_or(defaults.brokers),
            topics,
            group_id: std::env::var("KAFKA_GROUP_ID").unwrap_or(defaults.group_id),
            auto_offset_reset: std::env::var("KAFKA_AUTO_OFFSET_RESET")
                .unwrap_or(defaults.auto_offset_reset),
            ..defaults
        })
    }
}

/// Statistics from Kafka consumer
#[derive(Debug, Default, Clone)]
pub struct KafkaStats {
    pub messages_received: u64,
    pub messages_processed: u64,
    pub records_dispatched: u64,
    pub errors: u64,
    pub last_offset: HashMap<String, i64>,
}

/// Feeds Kafka change batches into the dispatcher
pub struct KafkaConsumer {
    config: KafkaConfig,
    dispatcher: Arc<Dispatcher>,
    consumer: StreamConsumer,
    stats: Arc<parking_lot::RwLock<KafkaStats>>,
}

/// Running consumer task
pub struct ConsumerHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: tokio::task::JoinHandle<()>,
}

impl ConsumerHandle {
    /// Ask the consumer to stop after the message in flight and wait for it
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.join.await {
            tracing::warn!(error = %e, "Kafka consumer task ended abnormally");
        }
    }
}

impl KafkaConsumer {
    /// Create a new Kafka consumer
    pub fn new(config: KafkaConfig, dispatcher: Arc<Dispatcher>) -> Result<Self, KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("max.poll.interval.ms", config.max_poll_interval_ms.to_string())
            .set("fetch.min.bytes", "1")
            .set("fetch.max.wait.ms", "100")
            .create()?;

        Ok(Self {
            config,
            dispatcher,
            consumer,
            stats: Arc::new(parking_lot::RwLock::new(KafkaStats::default())),
        })
    }

    /// Subscribe to configured topics
    pub fn subscribe(&self) -> Result<(), KafkaError> {
        let topics: Vec<&str> = self.config.topics.iter().map(|s| s.as_str()).collect();
        self.consumer.subscribe(&topics)?;
        tracing::info!("Subscribed to Kafka topics: {:?}", self.config.topics);
        Ok(())
    }

    /// Get current statistics
    pub fn stats(&self) -> KafkaStats {
        self.stats.read().clone()
    }

    /// Start consuming in background
    pub fn start(self) -> ConsumerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let consumer = self.consumer;
        let dispatcher = self.dispatcher;
        let stats = self.stats;

        let join = tokio::spawn(async move {
            tracing::info!("Kafka consumer started");

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Kafka consumer shutting down");
                        break;
                    }
                    result = consumer.recv() => {
                        let message = match result {
                            Ok(message) => message,
                            Err(e) => {
                                tracing::error!(error = %e, "Kafka receive error");
                                tokio::time::sleep(Duration::from_millis(100)).await;
                                continue;
                            }
                        };

                        let topic = message.topic().to_string();
                        let partition = message.partition();
                        let offset = message.offset();
                        stats.write().messages_received += 1;

                        let Some(payload) = message.payload() else {
                            continue;
                        };

                        match decode_message(payload) {
                            Ok(records) => {
                                let count = records.len();
                                let summary = dispatcher.process_batch(records).await;
                                tracing::debug!(
                                    topic = %topic,
                                    offset = offset,
                                    alerts_sent = summary.alerts_sent,
                                    updates_sent = summary.updates_sent,
                                    "Dispatched Kafka batch"
                                );

                                let mut s = stats.write();
                                s.messages_processed += 1;
                                s.records_dispatched += count as u64;
                                s.last_offset.insert(format!("{}:{}", topic, partition), offset);
                            }
                            Err(e) => {
                                // Undecodable messages are skipped, not retried forever.
                                tracing::error!(
                                    topic = %topic,
                                    partition = partition,
                                    offset = offset,
                                    error = %e,
                                    "Failed to decode message"
                                );
                                stats.write().errors += 1;
                            }
                        }

                        if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                            tracing::error!(
                                topic = %topic,
                                partition = partition,
                                offset = offset,
                                error = %e,
                                "Failed to commit offset"
                            );
                        }
                    }
                }
            }
        });

        ConsumerHandle { shutdown_tx, join }
    }
}
