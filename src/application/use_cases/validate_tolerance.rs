//! Validate Tolerance use case module
//!
//! Final compliance check: every worker's deviation must sit inside the
//! active tolerance envelope. The report notes when the emergency phase had
//! to be activated to get there.

use serde::{Deserialize, Serialize};

use crate::application::services::{ScheduleBuilder, WorkerBalance};
use crate::domain::value_objects::TolerancePhase;

/// Outcome of the final target-compliance check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToleranceReport {
    /// Envelope percent the check ran against
    pub tolerance_percent: f64,
    /// True when every worker is inside the envelope
    pub all_within: bool,
    /// True when Phase2 (emergency tolerance) was active
    pub escalated: bool,
    pub balances: Vec<WorkerBalance>,
    pub notes: Vec<String>,
}

/// Use case producing the final tolerance report
pub struct ValidateTolerance;

impl ValidateTolerance {
    /// Creates a new ValidateTolerance use case
    ///
    /// # Returns
    ///
    /// A new ValidateTolerance instance
    pub fn new() -> Self {
        Self
    }

    /// Executes the final compliance check against the active envelope
    ///
    /// # Arguments
    ///
    /// * `builder` - The schedule builder holding the finished roster
    ///
    /// # Returns
    ///
    /// A ToleranceReport with per-worker balances, out-of-envelope notes,
    /// and the escalation flag
    pub fn execute(&self, builder: &ScheduleBuilder) -> ToleranceReport {
        let envelope = builder.tolerance_envelope();
        let escalated = builder.phase() == TolerancePhase::Phase2;
        let balances = builder
            .validator()
            .all_balances(builder.workers(), builder.schedule());

        let mut notes = Vec::new();
        for balance in &balances {
            if balance.deviation_percent.abs() > envelope {
                notes.push(format!(
                    "{} deviates {:.1}% (target {}, got {})",
                    balance.worker_id, balance.deviation_percent, balance.target, balance.count
                ));
            }
        }
        if escalated {
            notes.push(format!(
                "emergency tolerance phase active; envelope widened to ±{:.0}%",
                envelope
            ));
        }

        ToleranceReport {
            tolerance_percent: envelope,
            all_within: balances
                .iter()
                .all(|b| b.deviation_percent.abs() <= envelope),
            escalated,
            balances,
            notes,
        }
    }
}

impl Default for ValidateTolerance {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{RosterProblem, Worker};
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    #[test]
    fn test_all_within_on_balanced_schedule() {
        let workers = vec![
            Worker::new("A", 5).with_gap(1),
            Worker::new("B", 5).with_gap(1),
        ];
        let problem = RosterProblem::new(workers, date(1), date(10), 1);
        let mut builder = ScheduleBuilder::new(&problem);
        builder.fill_empty_shifts(&["A".to_string(), "B".to_string()], 8);

        let report = ValidateTolerance::new().execute(&builder);
        assert!(report.all_within);
        assert!(!report.escalated);
        assert!(report.notes.is_empty());
    }

    #[test]
    fn test_escalation_is_noted() {
        let workers = vec![Worker::new("A", 5).with_gap(1)];
        let problem = RosterProblem::new(workers, date(1), date(10), 1);
        let mut builder = ScheduleBuilder::new(&problem);
        builder.enable_relaxed();
        builder.escalate_tolerance_phase();

        let report = ValidateTolerance::new().execute(&builder);
        assert!(report.escalated);
        assert_eq!(report.tolerance_percent, 12.0);
        assert!(!report.notes.is_empty());
    }
}
