//! Clinical threshold alerting
//!
//! Pure evaluation of readings against clinical limits, the sticky status
//! rule, the alert record written to the ledger, and the external
//! notification sink.

pub mod config;
pub mod evaluator;
pub mod notifier;
pub mod status;

pub use config::{Alert, AlertStatus, NotifyTarget, Severity, Thresholds};
pub use evaluator::{evaluate, evaluate_with, Violation, ViolationKind};
pub use notifier::{Notifier, NotifierError};
pub use status::aggregate;
