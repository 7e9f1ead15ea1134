//! Alert pipeline orchestration
//!
//! The [`Dispatcher`] takes change-feed batches, evaluates each inserted
//! reading, records alerts in the ledger and fans events out through the
//! broadcaster.

pub mod config;
pub mod dedup;
pub mod dispatcher;
pub mod stats;

pub use config::DispatcherConfig;
pub use dedup::AlertDeduplicator;
pub use dispatcher::{DispatchSummary, Dispatcher, ReadingOutcome, RecordProcessingError, Stage};
pub use stats::{PipelineStats, StatsSnapshot};
