//! VitalWatch: real-time vital-sign alerting
//!
//! Evaluates patient readings from a change feed against clinical
//! thresholds, records an alert for every reading that breaches a limit,
//! and pushes alerts and vital updates to every connected dashboard.
//!
//! # Features
//!
//! - **Threshold Evaluation**: Tachycardia, bradycardia, hypertensive crisis, hypoxia, high fever
//! - **Sticky Status**: A patient stays critical until cleared outside the pipeline
//! - **Alert Ledger**: Append-only JSON Lines file or in-memory store
//! - **Connection Registry**: Durable set of live subscriber ids with stale-entry pruning
//! - **Fan-out**: Bounded-concurrency delivery with per-connection timeouts
//! - **Transports**: Local WebSocket hub or an external gateway callback API
//! - **Change Feeds**: HTTP batches, stream-image records, optional Kafka consumer
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vitalwatch::broadcast::{BroadcastConfig, Broadcaster, WebSocketHub};
//! use vitalwatch::dispatch::{Dispatcher, DispatcherConfig};
//! use vitalwatch::storage::{ConnectionRegistry, MemoryLedger};
//! use vitalwatch::vitals::{ChangeRecord, Reading};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(ConnectionRegistry::in_memory());
//! let hub = Arc::new(WebSocketHub::default());
//! let broadcaster = Arc::new(Broadcaster::new(registry, hub, BroadcastConfig::default()));
//! let dispatcher = Dispatcher::new(
//!     DispatcherConfig::default(),
//!     Arc::new(MemoryLedger::new()),
//!     broadcaster,
//! );
//!
//! let reading = Reading::new("PT00001", "Mario Rossi").with_heart_rate(125.0);
//! let summary = dispatcher
//!     .process_batch(vec![ChangeRecord::insert(&reading)?])
//!     .await;
//! println!("alerts sent: {}", summary.alerts_sent);
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod broadcast;
pub mod dispatch;
pub mod ingest;
pub mod storage;
pub mod vitals;

// Re-export commonly used types
pub use alerts::{evaluate, Alert, Thresholds, Violation};
pub use dispatch::{DispatchSummary, Dispatcher, DispatcherConfig};
pub use vitals::{ChangeRecord, PatientStatus, Reading};
