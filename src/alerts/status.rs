//! Patient status aggregation

use super::evaluator::Violation;
use crate::vitals::PatientStatus;

/// Compute the next patient status.
///
/// Any violation forces `Critical`. Without violations the prior status is
/// kept, so a critical patient is never demoted here.
pub fn aggregate(violations: &[Violation], prior_status: PatientStatus) -> PatientStatus {
    if !violations.is_empty() {
        return PatientStatus::Critical;
    }
    prior_status
}
