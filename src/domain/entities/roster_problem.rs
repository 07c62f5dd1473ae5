//! Roster Problem entity module
//!
//! This module defines the RosterProblem aggregate: the workers, the date
//! range, the post count, the holiday set, and the policy knobs that together
//! describe one solve.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::Worker;
use crate::domain::errors::ConfigIssue;
use crate::domain::value_objects::SolverPolicy;

/// The full problem definition consumed by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterProblem {
    pub workers: Vec<Worker>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub num_posts: usize,
    pub holidays: HashSet<NaiveDate>,
    pub policy: SolverPolicy,
}

impl RosterProblem {
    pub fn new(
        workers: Vec<Worker>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        num_posts: usize,
    ) -> Self {
        Self {
            workers,
            start_date,
            end_date,
            num_posts,
            holidays: HashSet::new(),
            policy: SolverPolicy::default(),
        }
    }

    pub fn with_holidays(mut self, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(holidays);
        self
    }

    pub fn with_policy(mut self, policy: SolverPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Looks a worker up by id
    pub fn worker(&self, id: &str) -> Option<&Worker> {
        self.workers.iter().find(|w| w.id == id)
    }

    pub fn num_days(&self) -> u32 {
        (self.end_date - self.start_date).num_days() as u32 + 1
    }

    pub fn total_slots(&self) -> u32 {
        self.num_days() * self.num_posts as u32
    }

    /// Fills in missing shift targets from work percentages
    ///
    /// Workers with an explicit non-zero target keep it. The remaining slots
    /// are split across the others proportionally to their work percentage:
    /// `round(total_slots * pct_w / sum(pct))`.
    pub fn compute_targets(&mut self) {
        let untargeted: Vec<usize> = self
            .workers
            .iter()
            .enumerate()
            .filter(|(_, w)| w.target_shifts == 0 && w.work_percentage > 0)
            .map(|(i, _)| i)
            .collect();
        if untargeted.is_empty() {
            return;
        }

        let assigned: u32 = self.workers.iter().map(|w| w.target_shifts).sum();
        let remaining = self.total_slots().saturating_sub(assigned);
        let pct_sum: u32 = untargeted
            .iter()
            .map(|&i| self.workers[i].work_percentage as u32)
            .sum();
        if pct_sum == 0 {
            return;
        }

        for &i in &untargeted {
            let pct = self.workers[i].work_percentage as f64;
            self.workers[i].target_shifts =
                (remaining as f64 * pct / pct_sum as f64).round() as u32;
        }
    }

    /// Validates the definition, returning every problem found
    ///
    /// Checks the range, the post count, duplicate ids, and per-worker gaps
    /// against the range length. Mandatory/incompatibility clashes are the
    /// mandatory phase's job; this pass is purely structural.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.end_date < self.start_date {
            issues.push(ConfigIssue::InvalidDefinition(format!(
                "end date {} precedes start date {}",
                self.end_date, self.start_date
            )));
        }
        if self.num_posts == 0 {
            issues.push(ConfigIssue::InvalidDefinition(
                "num_posts must be at least 1".to_string(),
            ));
        }
        if self.workers.is_empty() {
            issues.push(ConfigIssue::InvalidDefinition(
                "at least one worker is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for worker in &self.workers {
            if !seen.insert(worker.id.as_str()) {
                issues.push(ConfigIssue::InvalidDefinition(format!(
                    "duplicate worker id {}",
                    worker.id
                )));
            }
            if worker.gap_between_shifts > self.num_days() {
                issues.push(ConfigIssue::GapLargerThanRange {
                    worker_id: worker.id.clone(),
                    gap: worker.gap_between_shifts,
                    range_days: self.num_days(),
                });
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    #[test]
    fn test_compute_targets_from_percentages() {
        let workers = vec![
            Worker::new("A", 0).with_work_percentage(100),
            Worker::new("B", 0).with_work_percentage(100),
            Worker::new("C", 0).with_work_percentage(50),
        ];
        let mut problem = RosterProblem::new(workers, date(1, 1), date(1, 25), 1);
        problem.compute_targets();
        // 25 slots split 100:100:50
        assert_eq!(problem.worker("A").unwrap().target_shifts, 10);
        assert_eq!(problem.worker("B").unwrap().target_shifts, 10);
        assert_eq!(problem.worker("C").unwrap().target_shifts, 5);
    }

    #[test]
    fn test_explicit_targets_kept() {
        let workers = vec![Worker::new("A", 7), Worker::new("B", 0)];
        let mut problem = RosterProblem::new(workers, date(1, 1), date(1, 10), 1);
        problem.compute_targets();
        assert_eq!(problem.worker("A").unwrap().target_shifts, 7);
        assert_eq!(problem.worker("B").unwrap().target_shifts, 3);
    }

    #[test]
    fn test_validate_gap_larger_than_range() {
        let workers = vec![Worker::new("A", 5).with_gap(20)];
        let problem = RosterProblem::new(workers, date(1, 1), date(1, 10), 1);
        let issues = problem.validate();
        assert!(issues
            .iter()
            .any(|i| matches!(i, ConfigIssue::GapLargerThanRange { .. })));
    }

    #[test]
    fn test_validate_inverted_range() {
        let problem = RosterProblem::new(vec![Worker::new("A", 1)], date(2, 1), date(1, 1), 1);
        assert!(!problem.validate().is_empty());
    }
}
