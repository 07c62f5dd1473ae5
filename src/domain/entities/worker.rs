//! Worker entity module
//!
//! This module defines the Worker entity: the immutable per-run record of a
//! person who can fill posts, with availability, targets, incompatibility
//! relations, mandatory dates, and spacing rules.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// An inclusive interval of dates during which a worker may be assigned
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateInterval {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateInterval {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Represents a worker who can be assigned to roster posts
///
/// A Worker is immutable for the duration of a run. Target shifts are either
/// given explicitly or computed from the work percentage and the available
/// slots before solving starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Worker {
    /// Unique opaque identifier
    pub id: String,
    /// Part-time percentage in 1..=100
    pub work_percentage: u8,
    /// Number of shifts this worker should receive over the range
    pub target_shifts: u32,
    /// Allowed date intervals; empty means the whole roster range
    pub work_periods: Vec<DateInterval>,
    /// Explicitly unavailable dates
    pub days_off: HashSet<NaiveDate>,
    /// Dates on which this worker must be assigned
    pub mandatory_days: BTreeSet<NaiveDate>,
    /// Ids of workers that can never share a date with this one (symmetric)
    pub incompatible_with: HashSet<String>,
    /// Minimum days between any two assignments
    pub gap_between_shifts: u32,
    /// Cap on consecutive weekends in a rolling window
    pub max_consecutive_weekends: u32,
}

impl Worker {
    /// Creates a new Worker with the given id and target, full availability,
    /// and default spacing rules
    pub fn new(id: impl Into<String>, target_shifts: u32) -> Self {
        Self {
            id: id.into(),
            work_percentage: 100,
            target_shifts,
            work_periods: Vec::new(),
            days_off: HashSet::new(),
            mandatory_days: BTreeSet::new(),
            incompatible_with: HashSet::new(),
            gap_between_shifts: 3,
            max_consecutive_weekends: 3,
        }
    }

    pub fn with_work_percentage(mut self, percentage: u8) -> Self {
        self.work_percentage = percentage.clamp(1, 100);
        self
    }

    pub fn with_work_period(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.work_periods.push(DateInterval::new(start, end));
        self
    }

    pub fn with_day_off(mut self, date: NaiveDate) -> Self {
        self.days_off.insert(date);
        self
    }

    pub fn with_mandatory_day(mut self, date: NaiveDate) -> Self {
        self.mandatory_days.insert(date);
        self
    }

    pub fn with_incompatible(mut self, other_id: impl Into<String>) -> Self {
        self.incompatible_with.insert(other_id.into());
        self
    }

    pub fn with_gap(mut self, gap: u32) -> Self {
        self.gap_between_shifts = gap;
        self
    }

    /// Checks whether this worker may be assigned on the given date
    ///
    /// True iff the date lies inside some work period (an empty period list
    /// means the whole range) and is not an explicit day off.
    pub fn is_available(&self, date: NaiveDate) -> bool {
        if self.days_off.contains(&date) {
            return false;
        }
        self.work_periods.is_empty() || self.work_periods.iter().any(|p| p.contains(date))
    }

    /// Checks whether the given date is mandatory for this worker
    pub fn is_mandatory(&self, date: NaiveDate) -> bool {
        self.mandatory_days.contains(&date)
    }

    /// Checks whether another worker id is incompatible with this worker
    pub fn is_incompatible_with(&self, other_id: &str) -> bool {
        self.incompatible_with.contains(other_id)
    }

    /// Returns the hard cap on total shifts: floor(target * 1.10), never
    /// below the target itself
    pub fn hard_cap(&self) -> u32 {
        ((self.target_shifts as f64 * 1.10).floor() as u32).max(self.target_shifts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_new_worker() {
        let worker = Worker::new("W1", 10);
        assert_eq!(worker.id, "W1");
        assert_eq!(worker.target_shifts, 10);
        assert!(worker.is_available(date(2026, 1, 15)));
    }

    #[test]
    fn test_day_off_blocks_availability() {
        let worker = Worker::new("W1", 10).with_day_off(date(2026, 1, 15));
        assert!(!worker.is_available(date(2026, 1, 15)));
        assert!(worker.is_available(date(2026, 1, 16)));
    }

    #[test]
    fn test_work_period_restricts_availability() {
        let worker = Worker::new("W1", 10).with_work_period(date(2026, 1, 1), date(2026, 1, 10));
        assert!(worker.is_available(date(2026, 1, 10)));
        assert!(!worker.is_available(date(2026, 1, 11)));
    }

    #[test]
    fn test_mandatory_day() {
        let worker = Worker::new("W1", 10).with_mandatory_day(date(2026, 2, 10));
        assert!(worker.is_mandatory(date(2026, 2, 10)));
        assert!(!worker.is_mandatory(date(2026, 2, 11)));
    }

    #[test]
    fn test_hard_cap_rounding() {
        assert_eq!(Worker::new("W1", 20).hard_cap(), 22);
        assert_eq!(Worker::new("W2", 12).hard_cap(), 13);
        assert_eq!(Worker::new("W3", 0).hard_cap(), 0);
        // Cap never drops below the target itself
        assert_eq!(Worker::new("W4", 1).hard_cap(), 1);
    }
}
