//! Patient readings and the change feed that delivers them

pub mod change;
pub mod reading;

pub use change::{ChangeBatch, ChangeRecord, EventType};
pub use reading::{Metric, PatientStatus, Reading, ReadingError};
