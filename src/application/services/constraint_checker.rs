//! Constraint Checker service module
//!
//! This service evaluates hard and soft predicates over a candidate
//! assignment given the current schedule state. Hard predicates hold in both
//! modes; soft predicates are enforced as hard in Strict mode and gated by
//! per-worker deficit in Relaxed mode. Every predicate returns its reason on
//! failure for auditability.

use chrono::{Datelike, Duration, NaiveDate};
use std::collections::BTreeMap;

use crate::application::services::HolidayCalendar;
use crate::domain::entities::{Schedule, Worker};
use crate::domain::value_objects::{deviation_percent, RuleKind, RuleViolation, SolverMode};

/// Distances that form the prohibited same-weekday pattern
const PATTERN_DISTANCES: [i64; 2] = [7, 14];

/// Service evaluating the constraint algebra for candidate assignments
#[derive(Debug, Clone)]
pub struct ConstraintChecker {
    calendar: HolidayCalendar,
}

impl ConstraintChecker {
    /// Creates a new ConstraintChecker over the given calendar
    ///
    /// # Arguments
    ///
    /// * `calendar` - Calendar used for weekend/special-day classification
    ///
    /// # Returns
    ///
    /// A new ConstraintChecker instance
    pub fn new(calendar: HolidayCalendar) -> Self {
        Self { calendar }
    }

    /// Returns the calendar this checker classifies dates with
    pub fn calendar(&self) -> &HolidayCalendar {
        &self.calendar
    }

    /// Computes the deficit of a worker
    ///
    /// # Arguments
    ///
    /// * `worker` - The worker to measure
    /// * `schedule` - Current schedule state
    ///
    /// # Returns
    ///
    /// Target minus current count; positive means under target
    pub fn deficit(&self, worker: &Worker, schedule: &Schedule) -> i64 {
        worker.target_shifts as i64 - schedule.count(&worker.id) as i64
    }

    /// H1: the worker must be available on the date
    ///
    /// # Arguments
    ///
    /// * `worker` - Candidate worker
    /// * `date` - Candidate date
    ///
    /// # Returns
    ///
    /// Ok, or the availability violation with its reason
    pub fn check_availability(&self, worker: &Worker, date: NaiveDate) -> Result<(), RuleViolation> {
        if worker.is_available(date) {
            Ok(())
        } else {
            Err(RuleViolation::new(
                RuleKind::Availability,
                &worker.id,
                date,
                "day off or outside work periods",
            ))
        }
    }

    /// H2: no worker already assigned on the date may be incompatible
    ///
    /// The relation is symmetric: either side declaring the other is enough.
    ///
    /// # Arguments
    ///
    /// * `worker` - Candidate worker
    /// * `date` - Candidate date
    /// * `schedule` - Current schedule state
    /// * `workers` - Full worker roster, for the reverse declarations
    ///
    /// # Returns
    ///
    /// Ok, or the incompatibility violation naming the conflicting worker
    pub fn check_incompatibility(
        &self,
        worker: &Worker,
        date: NaiveDate,
        schedule: &Schedule,
        workers: &[Worker],
    ) -> Result<(), RuleViolation> {
        for assigned_id in schedule.workers_on(date) {
            let declared_by_other = workers
                .iter()
                .find(|w| w.id == assigned_id)
                .map(|w| w.is_incompatible_with(&worker.id))
                .unwrap_or(false);
            if worker.is_incompatible_with(assigned_id) || declared_by_other {
                return Err(RuleViolation::new(
                    RuleKind::Incompatibility,
                    &worker.id,
                    date,
                    format!("incompatible with {} already on duty", assigned_id),
                ));
            }
        }
        Ok(())
    }

    /// H3: accepting must keep the count within floor(target * 1.10)
    ///
    /// # Arguments
    ///
    /// * `worker` - Candidate worker
    /// * `schedule` - Current schedule state
    ///
    /// # Returns
    ///
    /// Ok, or the cap violation with the would-be count
    pub fn check_target_cap(&self, worker: &Worker, schedule: &Schedule) -> Result<(), RuleViolation> {
        let after = schedule.count(&worker.id) + 1;
        if after <= worker.hard_cap() {
            Ok(())
        } else {
            Err(RuleViolation::new(
                RuleKind::TargetCap,
                &worker.id,
                schedule.start(),
                format!("count {} would exceed cap {}", after, worker.hard_cap()),
            ))
        }
    }

    /// A worker holds at most one post per date
    pub fn check_double_booking(
        &self,
        worker: &Worker,
        date: NaiveDate,
        schedule: &Schedule,
    ) -> Result<(), RuleViolation> {
        if schedule.post_of(&worker.id, date).is_some() {
            Err(RuleViolation::new(
                RuleKind::DoubleBooking,
                &worker.id,
                date,
                "already holds a post on this date",
            ))
        } else {
            Ok(())
        }
    }

    /// S1: minimum gap between assignments
    ///
    /// In Relaxed mode the gap may drop by one day iff the worker's deficit
    /// is at least 3. The effective gap never drops below 1.
    ///
    /// # Arguments
    ///
    /// * `worker` - Candidate worker
    /// * `date` - Candidate date
    /// * `schedule` - Current schedule state
    /// * `mode` - Active constraint regime
    ///
    /// # Returns
    ///
    /// Ok, or the gap violation with the offending distance
    pub fn check_min_gap(
        &self,
        worker: &Worker,
        date: NaiveDate,
        schedule: &Schedule,
        mode: SolverMode,
    ) -> Result<(), RuleViolation> {
        let mut required = worker.gap_between_shifts;
        if mode.is_relaxed() && self.deficit(worker, schedule) >= 3 {
            required = required.saturating_sub(1);
        }
        let required = required.max(1);

        match schedule.min_distance(&worker.id, date) {
            Some(distance) if distance < required => Err(RuleViolation::new(
                RuleKind::MinGap,
                &worker.id,
                date,
                format!("distance {} below required gap {}", distance, required),
            )),
            _ => Ok(()),
        }
    }

    /// S2: no same-weekday assignment 7 or 14 days away
    ///
    /// Relaxed mode permits the pattern only when the worker's deficit
    /// exceeds 10% of their target.
    ///
    /// # Arguments
    ///
    /// * `worker` - Candidate worker
    /// * `date` - Candidate date
    /// * `schedule` - Current schedule state
    /// * `mode` - Active constraint regime
    ///
    /// # Returns
    ///
    /// Ok, or the pattern violation naming the clashing prior date
    pub fn check_pattern(
        &self,
        worker: &Worker,
        date: NaiveDate,
        schedule: &Schedule,
        mode: SolverMode,
    ) -> Result<(), RuleViolation> {
        if mode.is_relaxed() {
            let deficit = self.deficit(worker, schedule);
            if deficit as f64 > worker.target_shifts as f64 * 0.10 {
                return Ok(());
            }
        }
        for prior in schedule.assignment_dates(&worker.id) {
            let distance = (date - prior).num_days().abs();
            if PATTERN_DISTANCES.contains(&distance) && prior.weekday() == date.weekday() {
                return Err(RuleViolation::new(
                    RuleKind::Pattern,
                    &worker.id,
                    date,
                    format!("same weekday as {} at distance {}", prior, distance),
                ));
            }
        }
        Ok(())
    }

    /// S3: per-month count stays within the expected envelope
    ///
    /// # Arguments
    ///
    /// * `worker` - Candidate worker
    /// * `date` - Candidate date, determining the month under test
    /// * `schedule` - Current schedule state
    /// * `mode` - Active constraint regime
    ///
    /// # Returns
    ///
    /// Ok, or the monthly-balance violation with the expected share
    pub fn check_monthly_balance(
        &self,
        worker: &Worker,
        date: NaiveDate,
        schedule: &Schedule,
        mode: SolverMode,
    ) -> Result<(), RuleViolation> {
        let expected = self.expected_month_share(worker, schedule, date.year(), date.month());
        let after = schedule.month_count(&worker.id, date.year(), date.month()) as f64 + 1.0;
        if after <= self.upper_envelope(expected, mode) {
            Ok(())
        } else {
            Err(RuleViolation::new(
                RuleKind::MonthlyBalance,
                &worker.id,
                date,
                format!("month count {:.0} above expected {:.1}", after, expected),
            ))
        }
    }

    /// S4: special-day count stays within the expected envelope, and the
    /// rolling run of consecutive on-duty weekends stays under the cap
    ///
    /// Non-special dates pass trivially.
    ///
    /// # Arguments
    ///
    /// * `worker` - Candidate worker
    /// * `date` - Candidate date
    /// * `schedule` - Current schedule state
    /// * `mode` - Active constraint regime
    ///
    /// # Returns
    ///
    /// Ok, or the weekend-balance violation (envelope or consecutive cap)
    pub fn check_weekend_balance(
        &self,
        worker: &Worker,
        date: NaiveDate,
        schedule: &Schedule,
        mode: SolverMode,
    ) -> Result<(), RuleViolation> {
        if !self.calendar.is_special(date) {
            return Ok(());
        }
        let expected = self.expected_special_share(worker, schedule);
        let after = self.special_count(worker, schedule) as f64 + 1.0;
        if after > self.upper_envelope(expected, mode) {
            return Err(RuleViolation::new(
                RuleKind::WeekendBalance,
                &worker.id,
                date,
                format!("special-day count {:.0} above expected {:.1}", after, expected),
            ));
        }

        if worker.max_consecutive_weekends > 0 {
            let run = 1
                + self.special_week_run(worker, schedule, date, -1)
                + self.special_week_run(worker, schedule, date, 1);
            if run > worker.max_consecutive_weekends {
                return Err(RuleViolation::new(
                    RuleKind::WeekendBalance,
                    &worker.id,
                    date,
                    format!(
                        "would make {} consecutive on-duty weekends (cap {})",
                        run, worker.max_consecutive_weekends
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Length of the run of adjacent weeks (before or after the date's week)
    /// in which the worker already holds a special-day assignment
    fn special_week_run(
        &self,
        worker: &Worker,
        schedule: &Schedule,
        date: NaiveDate,
        direction: i64,
    ) -> u32 {
        let week_of =
            |d: NaiveDate| (d - Duration::days(self.weekday_offset(d))).num_days_from_ce() as i64;
        let base_week = week_of(date);
        let mut run = 0;
        loop {
            let probe_week = base_week + (run as i64 + 1) * 7 * direction;
            let has_special = schedule
                .assignment_dates(&worker.id)
                .iter()
                .any(|d| self.calendar.is_special(*d) && week_of(*d) == probe_week);
            if has_special {
                run += 1;
            } else {
                return run;
            }
        }
    }

    fn weekday_offset(&self, date: NaiveDate) -> i64 {
        date.weekday().num_days_from_monday() as i64
    }

    /// S5: last-post count stays within the fair-share envelope
    ///
    /// Applies only when the candidate post is the last one of the date.
    ///
    /// # Arguments
    ///
    /// * `worker` - Candidate worker
    /// * `date` - Candidate date
    /// * `post` - Candidate post index
    /// * `schedule` - Current schedule state
    /// * `mode` - Active constraint regime
    ///
    /// # Returns
    ///
    /// Ok, or the last-post violation with the fair share
    pub fn check_last_post(
        &self,
        worker: &Worker,
        date: NaiveDate,
        post: usize,
        schedule: &Schedule,
        mode: SolverMode,
    ) -> Result<(), RuleViolation> {
        if post + 1 != schedule.num_posts() {
            return Ok(());
        }
        let expected = worker.target_shifts as f64 / schedule.num_posts() as f64;
        let after = schedule.last_post_count(&worker.id) as f64 + 1.0;
        if after <= self.upper_envelope(expected, mode) {
            Ok(())
        } else {
            Err(RuleViolation::new(
                RuleKind::LastPostBalance,
                &worker.id,
                date,
                format!("last-post count {:.0} above fair share {:.1}", after, expected),
            ))
        }
    }

    /// Full candidate check: H1, H2, H3, double-booking, and the applicable
    /// soft predicates S1-S5
    ///
    /// # Arguments
    ///
    /// * `worker` - Candidate worker
    /// * `date` - Candidate date
    /// * `post` - Candidate post index
    /// * `schedule` - Current schedule state
    /// * `workers` - Full worker roster
    /// * `mode` - Active constraint regime
    ///
    /// # Returns
    ///
    /// Ok when every rule passes, or the first failing rule with its reason
    pub fn can_assign(
        &self,
        worker: &Worker,
        date: NaiveDate,
        post: usize,
        schedule: &Schedule,
        workers: &[Worker],
        mode: SolverMode,
    ) -> Result<(), RuleViolation> {
        self.check_availability(worker, date)?;
        self.check_double_booking(worker, date, schedule)?;
        self.check_incompatibility(worker, date, schedule, workers)?;
        self.check_target_cap(worker, schedule)?;
        self.check_min_gap(worker, date, schedule, mode)?;
        self.check_pattern(worker, date, schedule, mode)?;
        self.check_monthly_balance(worker, date, schedule, mode)?;
        self.check_weekend_balance(worker, date, schedule, mode)?;
        self.check_last_post(worker, date, post, schedule, mode)?;
        Ok(())
    }

    /// Audits a whole schedule, collecting residual violations by kind
    ///
    /// Gap and pattern findings between two locked mandatory dates of the
    /// same worker are reported as mandatory overrides, not violations.
    ///
    /// # Arguments
    ///
    /// * `schedule` - The schedule to audit
    /// * `workers` - Full worker roster
    /// * `mode` - Active constraint regime
    /// * `tolerance_percent` - Deviation envelope for target compliance
    ///
    /// # Returns
    ///
    /// A ViolationReport with per-kind counts and per-worker details
    pub fn audit_schedule(
        &self,
        schedule: &Schedule,
        workers: &[Worker],
        mode: SolverMode,
        tolerance_percent: f64,
    ) -> ViolationReport {
        let mut report = ViolationReport::default();

        for worker in workers {
            let dates = schedule.assignment_dates(&worker.id);
            let count = schedule.count(&worker.id);
            let deficit = self.deficit(worker, schedule);

            // Target compliance against the active tolerance envelope
            let deviation = deviation_percent(count, worker.target_shifts);
            if deviation.abs() > tolerance_percent {
                report.push(RuleViolation::new(
                    RuleKind::TargetCap,
                    &worker.id,
                    schedule.start(),
                    format!("deviation {:.1}% outside ±{:.0}%", deviation, tolerance_percent),
                ));
            }

            // Gap and pattern over consecutive/prior pairs
            let relaxed_gap_allowed = mode.is_relaxed() && deficit >= 3;
            let mut required_gap = worker.gap_between_shifts;
            if relaxed_gap_allowed {
                required_gap = required_gap.saturating_sub(1);
            }
            let required_gap = required_gap.max(1) as i64;
            let pattern_relaxed = mode.is_relaxed()
                && deficit as f64 > worker.target_shifts as f64 * 0.10;

            for pair in dates.windows(2) {
                let distance = (pair[1] - pair[0]).num_days();
                let both_locked = schedule.is_locked(&worker.id, pair[0])
                    && schedule.is_locked(&worker.id, pair[1]);
                if distance < required_gap {
                    if both_locked {
                        report.note_mandatory_override(&worker.id, pair[0], pair[1]);
                    } else {
                        report.push(RuleViolation::new(
                            RuleKind::MinGap,
                            &worker.id,
                            pair[1],
                            format!("distance {} below gap {}", distance, required_gap),
                        ));
                    }
                }
            }
            if !pattern_relaxed {
                for (i, first) in dates.iter().enumerate() {
                    for second in dates.iter().skip(i + 1) {
                        let distance = (*second - *first).num_days();
                        if PATTERN_DISTANCES.contains(&distance)
                            && first.weekday() == second.weekday()
                        {
                            let both_locked = schedule.is_locked(&worker.id, *first)
                                && schedule.is_locked(&worker.id, *second);
                            if both_locked {
                                report.note_mandatory_override(&worker.id, *first, *second);
                            } else {
                                report.push(RuleViolation::new(
                                    RuleKind::Pattern,
                                    &worker.id,
                                    *second,
                                    format!("repeats weekday of {} at distance {}", first, distance),
                                ));
                            }
                        }
                    }
                }
            }

            // Monthly and special-day envelopes
            for (year, month) in months_in_range(schedule.start(), schedule.end()) {
                let expected = self.expected_month_share(worker, schedule, year, month);
                let actual = schedule.month_count(&worker.id, year, month) as f64;
                if actual > self.upper_envelope(expected, mode) {
                    report.push(RuleViolation::new(
                        RuleKind::MonthlyBalance,
                        &worker.id,
                        NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(schedule.start()),
                        format!("month count {:.0} above expected {:.1}", actual, expected),
                    ));
                }
            }
            let expected_special = self.expected_special_share(worker, schedule);
            let special = self.special_count(worker, schedule) as f64;
            if special > self.upper_envelope(expected_special, mode) {
                report.push(RuleViolation::new(
                    RuleKind::WeekendBalance,
                    &worker.id,
                    schedule.start(),
                    format!(
                        "special-day count {:.0} above expected {:.1}",
                        special, expected_special
                    ),
                ));
            }
        }

        report
    }

    /// Expected shifts for a worker inside one calendar month of the range
    ///
    /// # Arguments
    ///
    /// * `worker` - The worker to measure
    /// * `schedule` - Schedule providing the range
    /// * `year` - Calendar year of the month
    /// * `month` - Calendar month (1-12)
    ///
    /// # Returns
    ///
    /// The target prorated by the month's share of the range
    pub fn expected_month_share(
        &self,
        worker: &Worker,
        schedule: &Schedule,
        year: i32,
        month: u32,
    ) -> f64 {
        let month_days = days_in_month_within(schedule.start(), schedule.end(), year, month);
        worker.target_shifts as f64 * month_days as f64 / schedule.num_days() as f64
    }

    /// Expected special-day shifts for a worker over the range
    ///
    /// # Arguments
    ///
    /// * `worker` - The worker to measure
    /// * `schedule` - Schedule providing the range
    ///
    /// # Returns
    ///
    /// The target prorated by the range's share of special days
    pub fn expected_special_share(&self, worker: &Worker, schedule: &Schedule) -> f64 {
        let special = self.calendar.special_days_in(schedule.start(), schedule.end());
        worker.target_shifts as f64 * special as f64 / schedule.num_days() as f64
    }

    /// Special-day shifts a worker currently holds
    pub fn special_count(&self, worker: &Worker, schedule: &Schedule) -> u32 {
        schedule.count_dates_where(&worker.id, |d| self.calendar.is_special(d))
    }

    // Strict allows expected + 1; Relaxed never tightens below that
    fn upper_envelope(&self, expected: f64, mode: SolverMode) -> f64 {
        match mode {
            SolverMode::Strict => expected + 1.0,
            SolverMode::Relaxed => (expected * 1.10).max(expected + 1.0),
        }
    }
}

/// Aggregated audit findings with per-kind counts
#[derive(Debug, Clone, Default)]
pub struct ViolationReport {
    pub violations: Vec<RuleViolation>,
    /// Gap/pattern conflicts between two locked mandatory dates
    pub mandatory_overrides: Vec<String>,
}

impl ViolationReport {
    pub fn push(&mut self, violation: RuleViolation) {
        self.violations.push(violation);
    }

    pub fn note_mandatory_override(&mut self, worker_id: &str, first: NaiveDate, second: NaiveDate) {
        self.mandatory_overrides.push(format!(
            "{}: mandatory pair {} / {} overrides spacing rules",
            worker_id, first, second
        ));
    }

    pub fn total(&self) -> usize {
        self.violations.len()
    }

    pub fn counts_by_kind(&self) -> BTreeMap<RuleKind, usize> {
        let mut counts = BTreeMap::new();
        for violation in &self.violations {
            *counts.entry(violation.rule).or_insert(0) += 1;
        }
        counts
    }
}

fn months_in_range(start: NaiveDate, end: NaiveDate) -> Vec<(i32, u32)> {
    let mut months = Vec::new();
    let mut date = start;
    while date <= end {
        let key = (date.year(), date.month());
        if months.last() != Some(&key) {
            months.push(key);
        }
        date += Duration::days(1);
    }
    months
}

fn days_in_month_within(start: NaiveDate, end: NaiveDate, year: i32, month: u32) -> u32 {
    let mut count = 0;
    let mut date = start;
    while date <= end {
        if date.year() == year && date.month() == month {
            count += 1;
        }
        date += Duration::days(1);
    }
    count
}
