//! Balance Validator service module
//!
//! This service computes per-worker deviation from target, classifies it into
//! tolerance bands, and answers whether moving one shift between two workers
//! would improve the global balance. The optimizer and the builder's
//! rebalancing transforms consult it before every transfer.

use serde::{Deserialize, Serialize};

use crate::domain::entities::{Schedule, Worker};
use crate::domain::value_objects::{deviation_percent, DeviationClass, SolverPolicy, TolerancePhase};

/// Snapshot of one worker's balance state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerBalance {
    pub worker_id: String,
    pub count: u32,
    pub target: u32,
    pub deviation_percent: f64,
    pub classification: DeviationClass,
}

/// Service for deviation computation and transfer validation
#[derive(Debug, Clone)]
pub struct BalanceValidator {
    policy: SolverPolicy,
}

impl BalanceValidator {
    /// Creates a new BalanceValidator with the given policy thresholds
    ///
    /// # Arguments
    ///
    /// * `policy` - Tolerance and classification knobs
    ///
    /// # Returns
    ///
    /// A new BalanceValidator instance
    pub fn new(policy: SolverPolicy) -> Self {
        Self { policy }
    }

    /// Computes the balance snapshot for one worker
    ///
    /// # Arguments
    ///
    /// * `worker` - The worker to measure
    /// * `schedule` - Current schedule state
    ///
    /// # Returns
    ///
    /// A WorkerBalance with count, deviation percent, and classification
    pub fn worker_balance(&self, worker: &Worker, schedule: &Schedule) -> WorkerBalance {
        let count = schedule.count(&worker.id);
        let deviation = deviation_percent(count, worker.target_shifts);
        WorkerBalance {
            worker_id: worker.id.clone(),
            count,
            target: worker.target_shifts,
            deviation_percent: deviation,
            classification: DeviationClass::classify(
                deviation.abs(),
                self.policy.tolerance_percent,
                self.policy.emergency_classification_boundary(),
                self.policy.critical_tolerance,
            ),
        }
    }

    /// Computes balance snapshots for every worker
    ///
    /// # Arguments
    ///
    /// * `workers` - Full worker roster
    /// * `schedule` - Current schedule state
    ///
    /// # Returns
    ///
    /// One WorkerBalance per worker, in roster order
    pub fn all_balances(&self, workers: &[Worker], schedule: &Schedule) -> Vec<WorkerBalance> {
        workers
            .iter()
            .map(|w| self.worker_balance(w, schedule))
            .collect()
    }

    /// Sum of absolute deviations across all workers
    ///
    /// # Arguments
    ///
    /// * `workers` - Full worker roster
    /// * `schedule` - Current schedule state
    ///
    /// # Returns
    ///
    /// The global L1 deviation in percent points
    pub fn l1_deviation(&self, workers: &[Worker], schedule: &Schedule) -> f64 {
        workers
            .iter()
            .map(|w| deviation_percent(schedule.count(&w.id), w.target_shifts).abs())
            .sum()
    }

    /// Oracle for moving one shift from `from` to `to`
    ///
    /// The transfer must not worsen the less-deviated side: the destination
    /// may only end more deviated than the source currently is if receiving
    /// the shift still improved it. On top of that the destination stays
    /// under the hard cap, each side lands inside the active tolerance
    /// envelope (or strictly improves its own deviation), and the pair's
    /// combined absolute deviation does not grow.
    ///
    /// # Arguments
    ///
    /// * `from` - Worker giving up a shift
    /// * `to` - Worker receiving the shift
    /// * `schedule` - Current schedule state
    /// * `phase` - Active tolerance phase, selecting the envelope
    ///
    /// # Returns
    ///
    /// Ok when the transfer is sound, or the reason it is not
    pub fn transfer_validity(
        &self,
        from: &Worker,
        to: &Worker,
        schedule: &Schedule,
        phase: TolerancePhase,
    ) -> Result<(), String> {
        let from_count = schedule.count(&from.id);
        let to_count = schedule.count(&to.id);
        if from_count == 0 {
            return Err(format!("{} has no shift to give up", from.id));
        }
        if to_count + 1 > to.hard_cap() {
            return Err(format!("{} would exceed the hard cap", to.id));
        }

        let envelope = phase.envelope_percent(
            self.policy.tolerance_percent,
            self.policy.emergency_tolerance,
        );
        let from_before = deviation_percent(from_count, from.target_shifts);
        let to_before = deviation_percent(to_count, to.target_shifts);
        let from_after = deviation_percent(from_count - 1, from.target_shifts);
        let to_after = deviation_percent(to_count + 1, to.target_shifts);

        if to_after.abs() > from_before.abs() && to_after.abs() >= to_before.abs() {
            return Err(format!(
                "transfer would worsen {} past the source's {:.1}%",
                to.id,
                from_before.abs()
            ));
        }
        if to_after.abs() > envelope && to_after.abs() >= to_before.abs() {
            return Err(format!("{} would leave the tolerance envelope", to.id));
        }
        if from_after.abs() > envelope && from_after.abs() >= from_before.abs() {
            return Err(format!("{} would leave the tolerance envelope", from.id));
        }
        if from_after.abs() + to_after.abs() > from_before.abs() + to_before.abs() {
            return Err("transfer would increase the global deviation".to_string());
        }
        Ok(())
    }

    /// Expected drop in combined absolute deviation from a one-shift transfer
    ///
    /// # Arguments
    ///
    /// * `from` - Worker giving up a shift
    /// * `to` - Worker receiving the shift
    /// * `schedule` - Current schedule state
    ///
    /// # Returns
    ///
    /// Positive when the transfer would reduce the pair's deviation
    pub fn l1_reduction_estimate(&self, from: &Worker, to: &Worker, schedule: &Schedule) -> f64 {
        let from_count = schedule.count(&from.id);
        let to_count = schedule.count(&to.id);
        if from_count == 0 {
            return 0.0;
        }
        let before = deviation_percent(from_count, from.target_shifts).abs()
            + deviation_percent(to_count, to.target_shifts).abs();
        let after = deviation_percent(from_count - 1, from.target_shifts).abs()
            + deviation_percent(to_count + 1, to.target_shifts).abs();
        before - after
    }

    /// Ranked (over-worker, under-worker) pairs worth rebalancing
    ///
    /// Pairs are ordered by the sum of their absolute deviations, ties broken
    /// by the expected L1 reduction of the transfer.
    ///
    /// # Arguments
    ///
    /// * `workers` - Full worker roster
    /// * `schedule` - Current schedule state
    ///
    /// # Returns
    ///
    /// Vector of (over-worker id, under-worker id) pairs, worst first
    pub fn rebalancing_recommendations(
        &self,
        workers: &[Worker],
        schedule: &Schedule,
    ) -> Vec<(String, String)> {
        let mut pairs: Vec<(f64, f64, String, String)> = Vec::new();
        for from in workers {
            let from_dev = deviation_percent(schedule.count(&from.id), from.target_shifts);
            if from_dev <= 0.0 {
                continue;
            }
            for to in workers {
                if from.id == to.id {
                    continue;
                }
                let to_dev = deviation_percent(schedule.count(&to.id), to.target_shifts);
                if to_dev >= 0.0 {
                    continue;
                }
                let severity = from_dev.abs() + to_dev.abs();
                let reduction = self.l1_reduction_estimate(from, to, schedule);
                pairs.push((severity, reduction, from.id.clone(), to.id.clone()));
            }
        }
        pairs.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then(b.1.total_cmp(&a.1))
                .then(a.2.cmp(&b.2))
                .then(a.3.cmp(&b.3))
        });
        pairs.into_iter().map(|(_, _, f, t)| (f, t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn validator() -> BalanceValidator {
        BalanceValidator::new(SolverPolicy::default())
    }

    fn schedule_with_counts(counts: &[(&str, u32)]) -> Schedule {
        let mut schedule = Schedule::new(date(1), date(31), counts.len());
        for (post, (worker, count)) in counts.iter().enumerate() {
            for day in 0..*count {
                schedule.assign(worker, date(day + 1), post);
            }
        }
        schedule
    }

    #[test]
    fn test_worker_balance_classification() {
        let worker = Worker::new("A", 10);
        let schedule = schedule_with_counts(&[("A", 11)]);
        let balance = validator().worker_balance(&worker, &schedule);
        assert_eq!(balance.count, 11);
        assert_eq!(balance.deviation_percent, 10.0);
        assert_eq!(balance.classification, DeviationClass::Emergency);
    }

    #[test]
    fn test_transfer_validity_improves_both() {
        let from = Worker::new("A", 10);
        let to = Worker::new("B", 10);
        let schedule = schedule_with_counts(&[("A", 11), ("B", 8)]);
        assert!(validator()
            .transfer_validity(&from, &to, &schedule, TolerancePhase::Phase1)
            .is_ok());
    }

    #[test]
    fn test_transfer_rejected_when_l1_grows() {
        let from = Worker::new("A", 10);
        let to = Worker::new("B", 10);
        // Both exactly on target: moving a shift only creates imbalance
        let schedule = schedule_with_counts(&[("A", 10), ("B", 10)]);
        assert!(validator()
            .transfer_validity(&from, &to, &schedule, TolerancePhase::Phase1)
            .is_err());
    }

    #[test]
    fn test_transfer_rejected_on_cap() {
        let from = Worker::new("A", 10);
        let to = Worker::new("B", 2); // cap 2
        let schedule = schedule_with_counts(&[("A", 11), ("B", 2)]);
        assert!(validator()
            .transfer_validity(&from, &to, &schedule, TolerancePhase::Phase1)
            .is_err());
    }

    #[test]
    fn test_recommendations_rank_by_severity() {
        let workers = vec![
            Worker::new("A", 10), // +30%
            Worker::new("B", 10), // -40%
            Worker::new("C", 10), // -10%
        ];
        let schedule = schedule_with_counts(&[("A", 13), ("B", 6), ("C", 9)]);
        let recs = validator().rebalancing_recommendations(&workers, &schedule);
        assert_eq!(recs.first(), Some(&("A".to_string(), "B".to_string())));
    }
}
