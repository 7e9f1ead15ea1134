//! Threshold evaluation over a single reading

use serde::{Deserialize, Serialize};

use super::config::Thresholds;
use crate::vitals::{Metric, Reading};

/// Which limit a violation breached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Tachycardia,
    Bradycardia,
    HypertensiveCrisis,
    Hypoxia,
    HighFever,
}

/// A single threshold breach derived from one reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub metric: Metric,
    pub kind: ViolationKind,
    pub value: f64,
}

impl Violation {
    fn new(metric: Metric, kind: ViolationKind, value: f64) -> Self {
        Self { metric, kind, value }
    }

    /// Human-readable description with value and unit
    pub fn description(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ViolationKind::Tachycardia => write!(f, "Tachicardia: {} bpm", self.value),
            ViolationKind::Bradycardia => write!(f, "Bradicardia: {} bpm", self.value),
            ViolationKind::HypertensiveCrisis => write!(f, "Ipertensione: {} mmHg", self.value),
            ViolationKind::Hypoxia => write!(f, "Ipossia: {}%", self.value),
            ViolationKind::HighFever => write!(f, "Febbre alta: {}°C", self.value),
        }
    }
}

/// Evaluate a reading against the default clinical limits
pub fn evaluate(reading: &Reading) -> Vec<Violation> {
    evaluate_with(reading, &Thresholds::default())
}

/// Evaluate a reading against explicit limits.
///
/// Rules are independent except heart rate, where tachycardia and
/// bradycardia are exclusive. Unmeasured metrics are skipped, and a zero
/// reads as unmeasured (a sensor dropout, not a vital sign). There is no
/// hysteresis: a value oscillating around a limit fires on every reading.
pub fn evaluate_with(reading: &Reading, thresholds: &Thresholds) -> Vec<Violation> {
    let mut violations = Vec::new();

    if let Some(hr) = measured(reading.heart_rate) {
        if hr > thresholds.heart_rate_high {
            violations.push(Violation::new(Metric::HeartRate, ViolationKind::Tachycardia, hr));
        } else if hr < thresholds.heart_rate_low {
            violations.push(Violation::new(Metric::HeartRate, ViolationKind::Bradycardia, hr));
        }
    }

    if let Some(sys) = measured(reading.bp_systolic) {
        if sys > thresholds.bp_systolic_high {
            violations.push(Violation::new(
                Metric::BpSystolic,
                ViolationKind::HypertensiveCrisis,
                sys,
            ));
        }
    }

    if let Some(spo2) = measured(reading.spo2) {
        if spo2 < thresholds.spo2_low {
            violations.push(Violation::new(Metric::Spo2, ViolationKind::Hypoxia, spo2));
        }
    }

    if let Some(temp) = measured(reading.temperature) {
        if temp > thresholds.temperature_high {
            violations.push(Violation::new(Metric::Temperature, ViolationKind::HighFever, temp));
        }
    }

    violations
}

fn measured(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normal() -> Reading {
        Reading::new("PT00001", "Mario Rossi")
            .with_heart_rate(72.0)
            .with_blood_pressure(120.0, 80.0)
            .with_spo2(98.0)
            .with_temperature(36.8)
    }

    #[test]
    fn test_normal_reading_has_no_violations() {
        assert!(evaluate(&normal()).is_empty());
    }

    #[test]
    fn test_tachycardia() {
        let reading = Reading::new("PT00001", "Mario Rossi")
            .with_heart_rate(125.0)
            .with_blood_pressure(140.0, 90.0)
            .with_spo2(97.0)
            .with_temperature(37.0);

        let descriptions: Vec<String> = evaluate(&reading).iter().map(|v| v.description()).collect();
        assert_eq!(descriptions, vec!["Tachicardia: 125 bpm"]);
    }

    #[test]
    fn test_bradycardia() {
        let violations = evaluate(&normal().with_heart_rate(40.0));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::Bradycardia);
        assert_eq!(violations[0].description(), "Bradicardia: 40 bpm");
    }

    #[test]
    fn test_heart_rate_at_most_one_violation() {
        for hr in [20.0, 44.9, 45.0, 80.0, 110.0, 110.1, 250.0] {
            let violations = evaluate(&Reading::new("PT", "X").with_heart_rate(hr));
            let hr_count = violations
                .iter()
                .filter(|v| v.metric == Metric::HeartRate)
                .count();
            assert!(hr_count <= 1, "hr={} produced {} violations", hr, hr_count);
        }
    }

    #[test]
    fn test_boundaries_are_exclusive() {
        let reading = Reading::new("PT", "X")
            .with_heart_rate(110.0)
            .with_blood_pressure(160.0, 100.0)
            .with_spo2(90.0)
            .with_temperature(38.5);
        assert!(evaluate(&reading).is_empty());

        let reading = Reading::new("PT", "X").with_heart_rate(45.0);
        assert!(evaluate(&reading).is_empty());
    }

    #[test]
    fn test_all_rules_fire_in_order() {
        let reading = Reading::new("PT", "X")
            .with_heart_rate(130.0)
            .with_blood_pressure(175.0, 110.0)
            .with_spo2(85.0)
            .with_temperature(39.1);

        let descriptions: Vec<String> = evaluate(&reading).iter().map(|v| v.description()).collect();
        assert_eq!(
            descriptions,
            vec![
                "Tachicardia: 130 bpm",
                "Ipertensione: 175 mmHg",
                "Ipossia: 85%",
                "Febbre alta: 39.1°C",
            ]
        );
    }

    #[test]
    fn test_absent_metrics_never_violate() {
        let empty = Reading::new("PT", "X");
        assert!(evaluate(&empty).is_empty());

        // Only present metrics can show up in the result
        let reading = Reading::new("PT", "X").with_spo2(80.0);
        let violations = evaluate(&reading);
        assert!(violations.iter().all(|v| reading.metric(v.metric).is_some()));
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_zero_values_are_not_measured() {
        let reading = Reading::new("PT", "X")
            .with_heart_rate(0.0)
            .with_blood_pressure(0.0, 0.0)
            .with_spo2(0.0)
            .with_temperature(0.0);
        assert!(evaluate(&reading).is_empty());

        // A dropout on one metric does not hide the others
        let reading = Reading::new("PT", "X").with_spo2(0.0).with_heart_rate(130.0);
        let descriptions: Vec<String> = evaluate(&reading).iter().map(|v| v.description()).collect();
        assert_eq!(descriptions, vec!["Tachicardia: 130 bpm"]);
    }

    #[test]
    fn test_oscillation_fires_every_time() {
        let values = [111.0, 109.0, 111.0, 109.0, 111.0];
        let fired = values
            .iter()
            .filter(|hr| !evaluate(&Reading::new("PT", "X").with_heart_rate(**hr)).is_empty())
            .count();
        assert_eq!(fired, 3);
    }

    #[test]
    fn test_custom_thresholds() {
        let thresholds = Thresholds {
            spo2_low: 95.0,
            ..Thresholds::default()
        };
        let reading = Reading::new("PT", "X").with_spo2(93.0);
        assert!(evaluate(&reading).is_empty());
        assert_eq!(evaluate_with(&reading, &thresholds).len(), 1);
    }
}
