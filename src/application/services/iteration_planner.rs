//! Iteration Planner service module
//!
//! This service sizes the solve effort to the problem: a complexity figure
//! derived from the instance dimensions and active constraint classes is
//! mapped onto attempt and iteration budgets. The orchestrator treats the
//! plan as a hint and may apply policy overrides.

use crate::domain::entities::RosterProblem;

/// Effort budgets derived from problem complexity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationPlan {
    /// Number of independent initial-distribution attempts
    pub initial_attempts: u32,
    /// Iteration cap for the optimizer loop
    pub max_iterations: u32,
    /// Pass cap for fill transforms
    pub fill_attempts: u32,
}

/// Service computing iteration budgets from instance complexity
pub struct IterationPlanner;

impl IterationPlanner {
    /// Creates a new IterationPlanner instance
    ///
    /// # Returns
    ///
    /// A new IterationPlanner
    pub fn new() -> Self {
        Self
    }

    /// Computes the complexity figure for a problem
    ///
    /// C = workers * posts * days * (1 + restriction_factor), where the
    /// restriction factor adds a small penalty per active constraint class.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem instance to measure
    ///
    /// # Returns
    ///
    /// The complexity figure driving the budget tiers
    pub fn complexity(&self, problem: &RosterProblem) -> f64 {
        let base = problem.workers.len() as f64
            * problem.num_posts as f64
            * problem.num_days() as f64;
        base * (1.0 + self.restriction_factor(problem))
    }

    /// Derives the effort plan for a problem
    ///
    /// Budget tiers:
    /// - C < 1000: 3 attempts, 20 iterations
    /// - C < 5000: 5 attempts, 30 iterations
    /// - C < 15000: 7 attempts, 40 iterations
    /// - otherwise: 10 attempts, 50 iterations
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem instance to size for
    ///
    /// # Returns
    ///
    /// An IterationPlan; the orchestrator treats it as a hint
    pub fn plan(&self, problem: &RosterProblem) -> IterationPlan {
        let complexity = self.complexity(problem);

        let (initial_attempts, max_iterations) = if complexity < 1000.0 {
            (3, 20)
        } else if complexity < 5000.0 {
            (5, 30)
        } else if complexity < 15000.0 {
            (7, 40)
        } else {
            (10, 50)
        };

        // Fill passes scale with posts but stay inside 8..=16
        let fill_attempts = (8 + problem.num_posts as u32 * 2).min(16);

        IterationPlan {
            initial_attempts,
            max_iterations,
            fill_attempts,
        }
    }

    fn restriction_factor(&self, problem: &RosterProblem) -> f64 {
        let mut factor = 0.0;
        if problem.workers.iter().any(|w| !w.incompatible_with.is_empty()) {
            factor += 0.1;
        }
        if problem.workers.iter().any(|w| !w.mandatory_days.is_empty()) {
            factor += 0.1;
        }
        if problem.workers.iter().any(|w| !w.days_off.is_empty()) {
            factor += 0.1;
        }
        if problem.workers.iter().any(|w| !w.work_periods.is_empty()) {
            factor += 0.1;
        }
        if problem.workers.iter().any(|w| w.gap_between_shifts > 1) {
            factor += 0.1;
        }
        factor
    }
}

impl Default for IterationPlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Worker;
    use chrono::NaiveDate;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn problem(workers: usize, posts: usize, days: u32) -> RosterProblem {
        let workers = (0..workers)
            .map(|i| Worker::new(format!("W{}", i), 5))
            .collect();
        RosterProblem::new(workers, date(1, 1), date(1, days), posts)
    }

    #[test]
    fn test_small_instance_budgets() {
        let plan = IterationPlanner::new().plan(&problem(3, 1, 10));
        assert_eq!(plan.initial_attempts, 3);
        assert_eq!(plan.max_iterations, 20);
    }

    #[test]
    fn test_large_instance_budgets() {
        let plan = IterationPlanner::new().plan(&problem(40, 4, 31));
        assert_eq!(plan.initial_attempts, 7);
        assert_eq!(plan.max_iterations, 40);
    }

    #[test]
    fn test_restrictions_raise_complexity() {
        let planner = IterationPlanner::new();
        let plain = problem(5, 2, 20);
        let mut restricted = plain.clone();
        restricted.workers[0] = Worker::new("W0", 5)
            .with_incompatible("W1")
            .with_day_off(date(1, 4));
        assert!(planner.complexity(&restricted) > planner.complexity(&plain));
    }

    #[test]
    fn test_fill_attempts_bounded() {
        assert_eq!(IterationPlanner::new().plan(&problem(3, 1, 10)).fill_attempts, 10);
        assert_eq!(IterationPlanner::new().plan(&problem(3, 8, 10)).fill_attempts, 16);
    }
}
