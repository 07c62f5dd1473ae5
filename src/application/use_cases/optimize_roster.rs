//! Optimize Roster use case module
//!
//! The violation-driven optimization loop. Each iteration audits the
//! schedule, proposes redistributions through the builder's rebalancing
//! transforms plus bounded random 2-swaps, and keeps the result only when
//! the violation count drops. Convergence and stagnation rules bound the
//! loop; a wall-clock budget is honored between iterations, never inside a
//! transform.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;
use tracing::{debug, info};

use crate::application::services::ScheduleBuilder;

/// Outcome of one optimizer run
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OptimizationOutcome {
    pub iterations_run: u32,
    pub converged: bool,
    pub final_violations: usize,
    pub stagnation: u32,
}

/// Use case driving the iterative optimization loop
pub struct OptimizeRoster {
    rng: StdRng,
}

impl OptimizeRoster {
    /// Creates a new OptimizeRoster use case
    ///
    /// # Arguments
    ///
    /// * `seed` - Seed for the perturbation generator
    ///
    /// # Returns
    ///
    /// A new OptimizeRoster with a deterministic RNG
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Runs up to `max_iterations` improvement iterations on the builder
    ///
    /// Stops on zero violations, on stagnation with few violations left, on
    /// a flat improvement trend, on three non-decreasing iterations in a
    /// row, or when the deadline passes.
    ///
    /// # Arguments
    ///
    /// * `builder` - The schedule builder owning the roster state
    /// * `max_iterations` - Iteration cap from the adaptive plan
    /// * `deadline` - Optional wall-clock cutoff, checked between iterations
    ///
    /// # Returns
    ///
    /// An OptimizationOutcome with iterations run, convergence, residual
    /// violations, and the final stagnation counter
    pub fn execute(
        &mut self,
        builder: &mut ScheduleBuilder,
        max_iterations: u32,
        deadline: Option<Instant>,
    ) -> OptimizationOutcome {
        let mut outcome = OptimizationOutcome::default();
        let mut stagnation: u32 = 0;
        let mut history: Vec<usize> = Vec::new();

        for iteration in 0..max_iterations {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    info!(iteration, "optimization budget exceeded; keeping best schedule");
                    break;
                }
            }

            let report = builder.checker().audit_schedule(
                builder.schedule(),
                builder.workers(),
                builder.mode(),
                builder.tolerance_envelope(),
            );
            let violations = report.total();
            history.push(violations);
            outcome.iterations_run = iteration + 1;
            outcome.final_violations = violations;

            if violations == 0 {
                outcome.converged = true;
                info!(iteration, "optimization converged with zero violations");
                break;
            }
            if violations <= 5 && stagnation >= 5 {
                debug!(iteration, violations, "few violations left and stagnating; stopping");
                break;
            }
            if trend_is_flat(&history) {
                debug!(iteration, "improvement trend below threshold; stopping");
                break;
            }
            if non_decreasing_tail(&history, 3) {
                debug!(iteration, "violations non-decreasing; stopping");
                break;
            }

            let intensity = (0.3 + 0.14 * stagnation as f64).min(1.0);
            let snapshot = builder.clone();
            let filled_before = builder.schedule().total_slots() - builder.schedule().empty_slot_count();

            // Redistributions, worst pairs first, bounded by the violation count
            let transfer_budget = (violations * 5).min(100) as u32;
            let mut applied = builder.balance_workloads();
            if applied < transfer_budget {
                applied += builder.rebalance_weekend_shifts();
            }
            if applied < transfer_budget {
                applied += builder.balance_weekday_distribution();
                builder.adjust_last_post_distribution();
                builder.redistribute_excess_shifts();
            }

            // Bounded random 2-swaps, proportional to intensity
            let swaps = (intensity * 6.0).round() as u32;
            for _ in 0..swaps {
                self.random_swap(builder);
            }

            // Moves must be net zero: no slot gained or lost inside an iteration
            let filled_after = builder.schedule().total_slots() - builder.schedule().empty_slot_count();
            debug_assert_eq!(filled_before, filled_after, "optimizer iteration changed coverage");

            let after = builder.checker().audit_schedule(
                builder.schedule(),
                builder.workers(),
                builder.mode(),
                builder.tolerance_envelope(),
            );
            if after.total() < violations {
                stagnation = 0;
                debug!(
                    iteration,
                    before = violations,
                    after = after.total(),
                    applied,
                    "iteration accepted"
                );
            } else {
                *builder = snapshot;
                stagnation += 1;
                debug!(iteration, stagnation, "iteration reverted");
            }
            outcome.stagnation = stagnation;
        }

        // The loop may end right after an accepted iteration; report the
        // violations actually left on the board
        let residual = builder
            .checker()
            .audit_schedule(
                builder.schedule(),
                builder.workers(),
                builder.mode(),
                builder.tolerance_envelope(),
            )
            .total();
        outcome.final_violations = residual;
        if residual == 0 {
            outcome.converged = true;
        }
        outcome
    }

    /// Swaps the dates of two random non-locked assignments
    ///
    /// # Arguments
    ///
    /// * `builder` - The schedule builder to perturb
    fn random_swap(&mut self, builder: &mut ScheduleBuilder) {
        let filled = builder.schedule().filled_slots();
        let movable: Vec<_> = filled
            .into_iter()
            .filter(|(date, _, worker)| !builder.is_protected(worker, *date))
            .collect();
        if movable.len() < 2 {
            return;
        }
        let first = &movable[self.rng.gen_range(0..movable.len())];
        let second = &movable[self.rng.gen_range(0..movable.len())];
        if first.2 == second.2 || first.0 == second.0 {
            return;
        }
        builder.swap_assignments(&first.2, first.0, &second.2, second.0);
    }
}

/// Average improvement over the last ten iterations below 0.3 per iteration
fn trend_is_flat(history: &[usize]) -> bool {
    if history.len() < 10 {
        return false;
    }
    let window = &history[history.len() - 10..];
    let improvement = window[0] as f64 - window[window.len() - 1] as f64;
    improvement / 10.0 < 0.3
}

fn non_decreasing_tail(history: &[usize], run: usize) -> bool {
    if history.len() < run + 1 {
        return false;
    }
    let tail = &history[history.len() - (run + 1)..];
    tail.windows(2).all(|pair| pair[1] >= pair[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{RosterProblem, Worker};
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn balanced_builder() -> ScheduleBuilder {
        let workers = vec![
            Worker::new("A", 5).with_gap(1),
            Worker::new("B", 5).with_gap(1),
        ];
        let problem = RosterProblem::new(workers, date(1), date(10), 1);
        let mut builder = ScheduleBuilder::new(&problem);
        let order = vec!["A".to_string(), "B".to_string()];
        builder.fill_empty_shifts(&order, 8);
        builder
    }

    #[test]
    fn test_converges_immediately_on_clean_schedule() {
        let mut builder = balanced_builder();
        builder.enable_relaxed();
        let outcome = OptimizeRoster::new(42).execute(&mut builder, 30, None);
        assert!(outcome.converged);
        assert_eq!(outcome.final_violations, 0);
        assert!(outcome.iterations_run <= 3);
    }

    #[test]
    fn test_net_zero_coverage_across_run() {
        let mut builder = balanced_builder();
        builder.enable_relaxed();
        let empty_before = builder.schedule().empty_slot_count();
        OptimizeRoster::new(7).execute(&mut builder, 30, None);
        assert_eq!(builder.schedule().empty_slot_count(), empty_before);
    }

    #[test]
    fn test_respects_deadline() {
        let mut builder = balanced_builder();
        builder.enable_relaxed();
        let deadline = Some(Instant::now());
        let outcome = OptimizeRoster::new(42).execute(&mut builder, 30, deadline);
        assert_eq!(outcome.iterations_run, 0);
    }

    #[test]
    fn test_trend_detection() {
        assert!(trend_is_flat(&[10, 10, 10, 10, 10, 10, 10, 10, 10, 9]));
        assert!(!trend_is_flat(&[20, 18, 16, 14, 12, 10, 8, 6, 4, 2]));
        assert!(non_decreasing_tail(&[5, 4, 4, 5, 6], 3));
        assert!(!non_decreasing_tail(&[5, 4, 3, 2, 1], 3));
    }
}
