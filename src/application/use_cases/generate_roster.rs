//! Generate Roster use case module
//!
//! The orchestrator: runs the phase sequence (mandatory lock, multi-attempt
//! strict distribution, relaxed optimization, final push, validation) and
//! aggregates everything into the RosterResult. This is the only component
//! that flips the builder's mode or tolerance phase, and it backs up the
//! post-mandatory state so every attempt restarts from identical locks.

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::application::services::{
    IterationPlanner, ScheduleBuilder, ViolationReport, WorkerBalance,
};
use crate::application::use_cases::{
    distribute_remaining::DistributeRemaining, optimize_roster::OptimizeRoster,
    validate_tolerance::{ToleranceReport, ValidateTolerance},
};
use crate::domain::entities::{RosterProblem, Schedule, Worker};
use crate::domain::errors::ConfigIssue;

/// Summary of one initial-distribution attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub strategy: String,
    pub overall_score: f64,
    pub empty_slots: u32,
    pub work_imbalance: f64,
    pub weekend_imbalance: f64,
}

/// Per-worker statistics for the final report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStats {
    pub balance: WorkerBalance,
    pub weekend_count: u32,
    pub last_post_count: u32,
    pub weekday_counts: [u32; 7],
}

/// How and why the solve terminated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminationMetadata {
    pub mode_history: Vec<String>,
    pub attempts: Vec<AttemptSummary>,
    pub iterations_run: u32,
    pub converged: bool,
    pub stagnation: u32,
    pub coverage_percent: f64,
    pub blocked_attempts: u32,
    pub phase2_escalated: bool,
}

/// Aggregate outcome of a solve
#[derive(Debug)]
pub struct RosterResult {
    pub schedule: Schedule,
    pub workers: Vec<Worker>,
    pub worker_stats: Vec<WorkerStats>,
    pub violation_report: ViolationReport,
    pub tolerance: ToleranceReport,
    pub config_issues: Vec<ConfigIssue>,
    pub termination: TerminationMetadata,
}

/// Use case running the full phase sequence
pub struct GenerateRoster;

impl GenerateRoster {
    /// Creates a new GenerateRoster use case
    ///
    /// # Returns
    ///
    /// A new GenerateRoster instance
    pub fn new() -> Self {
        Self
    }

    /// Runs the full phase sequence for a problem
    ///
    /// Computes targets, locks mandatory assignments, runs the strict
    /// multi-attempt distribution, the relaxed optimizer (with one-way
    /// tolerance escalation), the final push, and the validation phase.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem definition to solve
    ///
    /// # Returns
    ///
    /// A RosterResult with the frozen schedule, statistics, violations,
    /// configuration issues, and termination metadata
    ///
    /// # Errors
    ///
    /// Returns an error when the roster definition is structurally invalid
    /// (inverted range, zero posts, no workers, duplicate ids)
    pub fn execute(&self, problem: &RosterProblem) -> Result<RosterResult> {
        let mut problem = problem.clone();
        problem.compute_targets();

        let mut config_issues = problem.validate();
        if config_issues
            .iter()
            .any(|i| matches!(i, ConfigIssue::InvalidDefinition(_)))
        {
            bail!(
                "roster definition is invalid: {}",
                config_issues
                    .iter()
                    .map(|i| i.to_string())
                    .collect::<Vec<_>>()
                    .join("; ")
            );
        }

        let planner = IterationPlanner::new();
        let plan = planner.plan(&problem);
        let attempts = problem.policy.initial_attempts.unwrap_or(plan.initial_attempts);
        let max_iterations = problem.policy.max_iterations.unwrap_or(plan.max_iterations);
        let deadline = problem
            .policy
            .time_budget_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let mut mode_history = Vec::new();

        // Phase 2: mandatory lock under strict rules, soft predicates off
        info!(workers = problem.workers.len(), days = problem.num_days(), "starting solve");
        mode_history.push("strict:mandatory".to_string());
        let mut builder = ScheduleBuilder::new(&problem);
        config_issues.extend(builder.assign_mandatory_guards());
        if let Err(reason) = builder.verify_invariants() {
            warn!(reason = %reason, "mandatory phase left an invariant broken");
        }

        // Phase 2.5: multi-attempt initial distribution from a common backup
        mode_history.push("strict:initial_distribution".to_string());
        let backup = builder.clone();
        let mut attempt_summaries = Vec::new();
        let mut best: Option<((f64, i64, f64, f64), ScheduleBuilder)> = None;
        for attempt in 1..=attempts {
            let mut candidate = backup.clone();
            let (strategy, order) = self.worker_order(attempt, &problem, candidate.schedule());
            let fill = candidate.fill_empty_shifts(&order, plan.fill_attempts);

            let empty = candidate.schedule().empty_slot_count();
            let work_imbalance = candidate.work_imbalance();
            let weekend_imbalance = candidate.weekend_imbalance();
            let key = (
                fill.cumulative_score,
                -(empty as i64),
                -work_imbalance,
                -weekend_imbalance,
            );
            info!(
                attempt,
                strategy = %strategy,
                filled = fill.total(),
                empty,
                "initial attempt finished"
            );
            attempt_summaries.push(AttemptSummary {
                strategy,
                overall_score: fill.cumulative_score,
                empty_slots: empty,
                work_imbalance,
                weekend_imbalance,
            });

            let is_better = match &best {
                None => true,
                Some((best_key, _)) => compare_keys(&key, best_key) == Ordering::Greater,
            };
            if is_better {
                best = Some((key, candidate));
            }
        }
        if let Some((_, winner)) = best {
            builder = winner;
        }

        // Phase 3: relaxed iterative optimization
        builder.enable_relaxed();
        mode_history.push("relaxed:phase1".to_string());
        let mut optimizer = OptimizeRoster::new(problem.policy.seed);
        let mut optimization = optimizer.execute(&mut builder, max_iterations, deadline);

        // One-way tolerance escalation on stalled, under-covered schedules
        let mut phase2_escalated = false;
        if builder.schedule().coverage_percent() < 95.0 && optimization.final_violations > 0 {
            builder.escalate_tolerance_phase();
            phase2_escalated = true;
            mode_history.push("relaxed:phase2".to_string());
            let second = optimizer.execute(&mut builder, max_iterations, deadline);
            optimization.iterations_run += second.iterations_run;
            optimization.converged = second.converged;
            optimization.final_violations = second.final_violations;
            optimization.stagnation = second.stagnation;
        }

        // Phase 3.5: advanced final push for any remaining empty slots
        if builder.schedule().empty_slot_count() > 0 {
            mode_history.push("relaxed:final_push".to_string());
            let order: Vec<String> = problem.workers.iter().map(|w| w.id.clone()).collect();
            DistributeRemaining::new().execute(&mut builder, &order);
        }

        // Phase 4: validation and reporting
        let violation_report = builder.checker().audit_schedule(
            builder.schedule(),
            builder.workers(),
            builder.mode(),
            builder.tolerance_envelope(),
        );
        let tolerance = ValidateTolerance::new().execute(&builder);
        if !builder.schedule().locked_all_present() {
            error!("a locked mandatory assignment is missing from the final schedule");
        }

        let worker_stats = self.collect_stats(&builder, &tolerance.balances);
        let termination = TerminationMetadata {
            mode_history,
            attempts: attempt_summaries,
            iterations_run: optimization.iterations_run,
            converged: optimization.converged,
            stagnation: optimization.stagnation,
            coverage_percent: builder.schedule().coverage_percent(),
            blocked_attempts: builder.blocked_attempts(),
            phase2_escalated,
        };
        info!(
            coverage = format!("{:.1}%", termination.coverage_percent),
            violations = violation_report.total(),
            "solve finished"
        );

        Ok(RosterResult {
            schedule: builder.schedule().clone(),
            workers: builder.workers().to_vec(),
            worker_stats,
            violation_report,
            tolerance,
            config_issues,
            termination,
        })
    }

    /// Worker-ordering strategy rotation for the initial attempts
    ///
    /// Strategies alternate between deterministic orderings and seeded
    /// shuffles so attempts explore different greedy paths.
    ///
    /// # Arguments
    ///
    /// * `attempt` - 1-based attempt index selecting the rotation entry
    /// * `problem` - The problem definition (workers, policy seed)
    /// * `schedule` - Post-mandatory schedule, for workload priorities
    ///
    /// # Returns
    ///
    /// The strategy label and the worker-id ordering it produced
    fn worker_order(
        &self,
        attempt: u32,
        problem: &RosterProblem,
        schedule: &Schedule,
    ) -> (String, Vec<String>) {
        let mut ids: Vec<String> = problem.workers.iter().map(|w| w.id.clone()).collect();
        ids.sort();
        let attempt_u64 = attempt as u64;

        match (attempt - 1) % 10 {
            0 => {
                let mut by_target: Vec<&Worker> = problem.workers.iter().collect();
                by_target.sort_by(|a, b| {
                    b.target_shifts.cmp(&a.target_shifts).then(a.id.cmp(&b.id))
                });
                (
                    "balanced".to_string(),
                    by_target.into_iter().map(|w| w.id.clone()).collect(),
                )
            }
            1 => self.shuffled(ids, problem.policy.seed.wrapping_add(42 + attempt_u64)),
            2 => ("by_id_asc".to_string(), ids),
            3 => self.shuffled(ids, problem.policy.seed.wrapping_add(100 + 7 * attempt_u64)),
            4 => {
                ids.reverse();
                ("by_id_desc".to_string(), ids)
            }
            5 => self.shuffled(ids, problem.policy.seed.wrapping_add(200 + 13 * attempt_u64)),
            6 => {
                let mut by_deficit: Vec<&Worker> = problem.workers.iter().collect();
                by_deficit.sort_by(|a, b| {
                    let da = a.target_shifts as i64 - schedule.count(&a.id) as i64;
                    let db = b.target_shifts as i64 - schedule.count(&b.id) as i64;
                    db.cmp(&da).then(a.id.cmp(&b.id))
                });
                (
                    "workload_priority".to_string(),
                    by_deficit.into_iter().map(|w| w.id.clone()).collect(),
                )
            }
            7 => self.shuffled(ids, problem.policy.seed.wrapping_add(300 + 17 * attempt_u64)),
            8 => {
                let mut alternating = Vec::with_capacity(ids.len());
                let mut front = 0usize;
                let mut back = ids.len();
                while front < back {
                    alternating.push(ids[front].clone());
                    front += 1;
                    if front < back {
                        back -= 1;
                        alternating.push(ids[back].clone());
                    }
                }
                ("alternating".to_string(), alternating)
            }
            _ => self.shuffled(ids, problem.policy.seed.wrapping_add(400 + 23 * attempt_u64)),
        }
    }

    fn shuffled(&self, mut ids: Vec<String>, seed: u64) -> (String, Vec<String>) {
        let mut rng = StdRng::seed_from_u64(seed);
        ids.shuffle(&mut rng);
        (format!("seed_{}", seed), ids)
    }

    /// Gathers the per-worker statistics for the final report
    ///
    /// # Arguments
    ///
    /// * `builder` - The schedule builder holding the finished roster
    /// * `balances` - Balances already computed by the tolerance validator
    ///
    /// # Returns
    ///
    /// One WorkerStats per worker with weekend, last-post, and weekday counts
    fn collect_stats(
        &self,
        builder: &ScheduleBuilder,
        balances: &[WorkerBalance],
    ) -> Vec<WorkerStats> {
        builder
            .workers()
            .iter()
            .map(|worker| {
                let balance = balances
                    .iter()
                    .find(|b| b.worker_id == worker.id)
                    .cloned()
                    .unwrap_or_else(|| builder.validator().worker_balance(worker, builder.schedule()));
                let mut weekday_counts = [0u32; 7];
                for date in builder.schedule().assignment_dates(&worker.id) {
                    weekday_counts
                        [builder.checker().calendar().weekday(date) as usize] += 1;
                }
                WorkerStats {
                    balance,
                    weekend_count: builder.checker().special_count(worker, builder.schedule()),
                    last_post_count: builder.schedule().last_post_count(&worker.id),
                    weekday_counts,
                }
            })
            .collect()
    }
}

impl Default for GenerateRoster {
    fn default() -> Self {
        Self::new()
    }
}

fn compare_keys(a: &(f64, i64, f64, f64), b: &(f64, i64, f64, f64)) -> Ordering {
    a.0.total_cmp(&b.0)
        .then(a.1.cmp(&b.1))
        .then(a.2.total_cmp(&b.2))
        .then(a.3.total_cmp(&b.3))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    #[test]
    fn test_mandatory_with_violated_gap() {
        // Both mandatory dates are placed even though they violate the gap;
        // the report carries an override note instead of a violation
        let workers = vec![Worker::new("A", 2)
            .with_gap(3)
            .with_mandatory_day(date(1, 15))
            .with_mandatory_day(date(1, 17))];
        let problem = RosterProblem::new(workers, date(1, 15), date(1, 17), 1);

        let result = GenerateRoster::new().execute(&problem).unwrap();
        assert!(result.schedule.post_of("A", date(1, 15)).is_some());
        assert!(result.schedule.post_of("A", date(1, 17)).is_some());
        assert!(!result.violation_report.mandatory_overrides.is_empty());
        assert!(result.schedule.locked_all_present());
    }

    #[test]
    fn test_incompatible_mandatory_clash_reported() {
        let workers = vec![
            Worker::new("A", 2).with_incompatible("B").with_mandatory_day(date(2, 10)),
            Worker::new("B", 2).with_incompatible("A").with_mandatory_day(date(2, 10)),
        ];
        let problem = RosterProblem::new(workers, date(2, 9), date(2, 12), 2);

        let result = GenerateRoster::new().execute(&problem).unwrap();
        assert_eq!(
            result
                .config_issues
                .iter()
                .filter(|i| matches!(i, ConfigIssue::MandatoryClash { .. }))
                .count(),
            1
        );
        // Exactly one of the two got the date
        assert_eq!(result.schedule.workers_on(date(2, 10)).len(), 1);
    }

    #[test]
    fn test_no_pattern_pairs_after_strict_distribution() {
        let workers = vec![
            Worker::new("A", 5).with_gap(1),
            Worker::new("B", 5).with_gap(1),
        ];
        let problem = RosterProblem::new(workers, date(1, 1), date(1, 10), 1);

        let result = GenerateRoster::new().execute(&problem).unwrap();
        for worker in &result.workers {
            let dates = result.schedule.assignment_dates(&worker.id);
            for (i, first) in dates.iter().enumerate() {
                for second in dates.iter().skip(i + 1) {
                    let distance = (*second - *first).num_days();
                    if distance == 7 || distance == 14 {
                        assert_ne!(
                            first.weekday(),
                            second.weekday(),
                            "pattern pair for {}",
                            worker.id
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_relaxation_respects_hard_cap_and_gap_floor() {
        let workers = vec![
            Worker::new("A", 20).with_gap(3),
            Worker::new("B", 20).with_gap(3),
            Worker::new("C", 20).with_gap(3),
        ];
        let problem = RosterProblem::new(workers, date(1, 1), date(1, 30), 2);

        let result = GenerateRoster::new().execute(&problem).unwrap();
        for worker in &result.workers {
            let count = result.schedule.count(&worker.id);
            assert!(count <= 22, "{} holds {} shifts", worker.id, count);

            let dates = result.schedule.assignment_dates(&worker.id);
            for pair in dates.windows(2) {
                assert!(
                    (pair[1] - pair[0]).num_days() >= 2,
                    "{} gap below relaxed floor",
                    worker.id
                );
            }
        }
    }

    #[test]
    fn test_balance_tolerance_or_escalation() {
        let workers: Vec<Worker> = ["A", "B", "C", "D", "E"]
            .iter()
            .map(|id| Worker::new(*id, 12).with_gap(1))
            .collect();
        let problem = RosterProblem::new(workers, date(1, 1), date(1, 30), 2);

        let result = GenerateRoster::new().execute(&problem).unwrap();
        let within_emergency = result
            .tolerance
            .balances
            .iter()
            .all(|b| b.deviation_percent.abs() <= 12.0);
        assert!(
            result.tolerance.all_within || (result.tolerance.escalated && within_emergency),
            "tolerance report: {:?}",
            result.tolerance.notes
        );
    }

    #[test]
    fn test_feasible_instance_terminates_clean() {
        let workers = vec![
            Worker::new("A", 5).with_gap(1),
            Worker::new("B", 5).with_gap(1),
        ];
        let problem = RosterProblem::new(workers, date(1, 1), date(1, 10), 1);

        let result = GenerateRoster::new().execute(&problem).unwrap();
        assert_eq!(result.schedule.empty_slot_count(), 0);
        assert_eq!(result.violation_report.total(), 0);
        assert!(result.termination.converged);
        assert!(result.termination.iterations_run <= 3);
        assert_eq!(result.termination.coverage_percent, 100.0);
    }

    #[test]
    fn test_invalid_definition_is_an_error() {
        let problem = RosterProblem::new(vec![Worker::new("A", 2)], date(2, 1), date(1, 1), 1);
        assert!(GenerateRoster::new().execute(&problem).is_err());
    }

    #[test]
    fn test_zero_target_worker_only_mandatory() {
        let workers = vec![
            Worker::new("A", 10).with_gap(1),
            Worker::new("B", 0).with_work_percentage(1),
        ];
        let mut problem = RosterProblem::new(workers, date(1, 1), date(1, 10), 1);
        // Pin B's target at zero explicitly
        problem.workers[1].target_shifts = 0;
        problem.workers[1].work_percentage = 1;

        let result = GenerateRoster::new().execute(&problem).unwrap();
        assert_eq!(result.schedule.count("B"), 0);
    }
}
