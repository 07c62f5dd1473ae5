//! Schedule Builder service module
//!
//! The builder owns the schedule, the per-worker counters, and the locked
//! mandatory set. Every mutation of the roster goes through it: the mandatory
//! phase, candidate scoring and selection, the fill/swap/rebalance
//! transforms, and the dual-mode switch. Transforms are atomic: they either
//! commit with all invariants intact or roll back completely.

use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::application::services::{BalanceValidator, ConstraintChecker, HolidayCalendar};
use crate::domain::entities::{RosterProblem, Schedule, Slot, Worker};
use crate::domain::errors::ConfigIssue;
use crate::domain::value_objects::{
    AssignmentScore, SolverMode, SolverPolicy, TolerancePhase, TransformOutcome,
};

/// Result of a fill pass over the empty slots
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FillOutcome {
    /// Slots filled directly by candidate selection
    pub direct_fills: u32,
    /// Slots filled by relocating an existing assignment
    pub swap_fills: u32,
    /// Sum of the assignment scores of all accepted fills
    pub cumulative_score: f64,
}

impl FillOutcome {
    pub fn total(&self) -> u32 {
        self.direct_fills + self.swap_fills
    }
}

/// Owner of the roster state and sole author of its mutations
#[derive(Debug, Clone)]
pub struct ScheduleBuilder {
    schedule: Schedule,
    workers: Vec<Worker>,
    checker: ConstraintChecker,
    validator: BalanceValidator,
    policy: SolverPolicy,
    mode: SolverMode,
    phase: TolerancePhase,
    relaxed_transform_done: bool,
    blocked_attempts: u32,
    /// (worker, weekday, post) combinations that produced accepted fills
    pattern_memory: HashMap<(String, u32, usize), u32>,
}

impl ScheduleBuilder {
    /// Creates a new ScheduleBuilder for a problem
    ///
    /// Starts with an empty schedule, Strict mode, and tolerance Phase1.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem definition (workers, range, posts, policy)
    ///
    /// # Returns
    ///
    /// A new ScheduleBuilder owning all roster state
    pub fn new(problem: &RosterProblem) -> Self {
        let calendar = HolidayCalendar::new(problem.holidays.iter().copied());
        Self {
            schedule: Schedule::new(problem.start_date, problem.end_date, problem.num_posts),
            workers: problem.workers.clone(),
            checker: ConstraintChecker::new(calendar),
            validator: BalanceValidator::new(problem.policy.clone()),
            policy: problem.policy.clone(),
            mode: SolverMode::Strict,
            phase: TolerancePhase::Phase1,
            relaxed_transform_done: false,
            blocked_attempts: 0,
            pattern_memory: HashMap::new(),
        }
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn checker(&self) -> &ConstraintChecker {
        &self.checker
    }

    pub fn validator(&self) -> &BalanceValidator {
        &self.validator
    }

    pub fn mode(&self) -> SolverMode {
        self.mode
    }

    pub fn phase(&self) -> TolerancePhase {
        self.phase
    }

    pub fn blocked_attempts(&self) -> u32 {
        self.blocked_attempts
    }

    fn worker(&self, id: &str) -> Option<&Worker> {
        self.workers.iter().find(|w| w.id == id)
    }

    // ------------------------------------------------------------------
    // Mode switching (orchestrator only)
    // ------------------------------------------------------------------

    pub fn enable_relaxed(&mut self) {
        self.mode = SolverMode::Relaxed;
    }

    /// Re-enters Strict mode
    ///
    /// # Returns
    ///
    /// `false` (and no mode change) once any relaxed transform has run
    pub fn enable_strict(&mut self) -> bool {
        if self.relaxed_transform_done {
            warn!("refusing relaxed-to-strict switch after relaxed transforms");
            return false;
        }
        self.mode = SolverMode::Strict;
        true
    }

    /// One-way escalation from Phase1 to Phase2
    pub fn escalate_tolerance_phase(&mut self) {
        if self.phase == TolerancePhase::Phase1 {
            self.phase = TolerancePhase::Phase2;
            debug!("tolerance phase escalated to phase2");
        }
    }

    /// Active deviation envelope percent
    ///
    /// # Returns
    ///
    /// The policy tolerance for Phase1, the emergency tolerance for Phase2
    pub fn tolerance_envelope(&self) -> f64 {
        self.phase.envelope_percent(
            self.policy.tolerance_percent,
            self.policy.emergency_tolerance,
        )
    }

    // ------------------------------------------------------------------
    // Mandatory phase
    // ------------------------------------------------------------------

    /// Places every mandatory (worker, date) pair and locks it
    ///
    /// Only availability and incompatibility gate this phase; mandatory
    /// dominates the soft predicates. Clashes between incompatible mandatory
    /// workers keep the first placement and report the later one.
    ///
    /// # Returns
    ///
    /// Every configuration issue found: unavailability clashes,
    /// incompatible-mandatory clashes, and dates with no free post
    pub fn assign_mandatory_guards(&mut self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let plan: Vec<(String, NaiveDate)> = self
            .workers
            .iter()
            .flat_map(|w| {
                w.mandatory_days
                    .iter()
                    .filter(|d| self.schedule.contains_date(**d))
                    .map(|d| (w.id.clone(), *d))
                    .collect::<Vec<_>>()
            })
            .collect();

        for (worker_id, date) in plan {
            let worker = self
                .worker(&worker_id)
                .expect("mandatory plan references known worker")
                .clone();

            if self.checker.check_availability(&worker, date).is_err() {
                issues.push(ConfigIssue::MandatoryUnavailable {
                    worker_id: worker_id.clone(),
                    date,
                });
                continue;
            }
            if let Err(violation) =
                self.checker
                    .check_incompatibility(&worker, date, &self.schedule, &self.workers)
            {
                warn!(worker = %worker_id, %date, reason = %violation.reason, "mandatory clash");
                let conflicting = self
                    .schedule
                    .workers_on(date)
                    .into_iter()
                    .find(|other| {
                        worker.is_incompatible_with(other)
                            || self
                                .worker(other)
                                .map(|o| o.is_incompatible_with(&worker_id))
                                .unwrap_or(false)
                    })
                    .unwrap_or_default()
                    .to_string();
                issues.push(ConfigIssue::MandatoryClash {
                    worker_id: worker_id.clone(),
                    conflicting_id: conflicting,
                    date,
                });
                continue;
            }

            let Some(post) = self.schedule.first_empty_post(date) else {
                issues.push(ConfigIssue::MandatoryNoFreePost {
                    worker_id: worker_id.clone(),
                    date,
                });
                continue;
            };
            self.schedule.assign(&worker_id, date, post);
            self.schedule.lock_mandatory(&worker_id, date);
            debug!(worker = %worker_id, %date, post, "mandatory assignment locked");
        }

        debug_assert!(self.schedule.locked_all_present());
        issues
    }

    // ------------------------------------------------------------------
    // Protection oracle
    // ------------------------------------------------------------------

    /// Checks whether an assignment may be touched at all
    ///
    /// # Arguments
    ///
    /// * `worker_id` - Holder of the assignment
    /// * `date` - Date of the assignment
    ///
    /// # Returns
    ///
    /// `true` when the pair is locked or the date is mandatory for the worker
    pub fn is_protected(&self, worker_id: &str, date: NaiveDate) -> bool {
        self.schedule.is_locked(worker_id, date)
            || self
                .worker(worker_id)
                .map(|w| w.is_mandatory(date))
                .unwrap_or(false)
    }

    /// Protection oracle: every mutating path calls this before touching a
    /// slot. A refusal is logged with the calling op and counted.
    ///
    /// # Arguments
    ///
    /// * `worker_id` - Holder of the assignment about to be touched
    /// * `date` - Date of the assignment
    /// * `op` - Name of the calling operation, for the blocked-event log
    ///
    /// # Returns
    ///
    /// `true` when the mutation may proceed
    pub fn can_modify(&mut self, worker_id: &str, date: NaiveDate, op: &str) -> bool {
        if self.is_protected(worker_id, date) {
            self.blocked_attempts += 1;
            warn!(op, worker = worker_id, %date, "blocked: assignment is mandatory-locked");
            return false;
        }
        true
    }

    // ------------------------------------------------------------------
    // Scoring and candidate selection
    // ------------------------------------------------------------------

    /// Scores placing a worker into a slot; higher is better
    ///
    /// Deficit tiers dominate, followed by the exponential gap bonus, the
    /// weekend/monthly/last-post balance bonuses, the over-target penalty,
    /// and the pattern-reuse bonus. The score is a pure function of the
    /// current state.
    ///
    /// # Arguments
    ///
    /// * `worker` - Candidate worker
    /// * `date` - Candidate date
    /// * `post` - Candidate post index
    ///
    /// # Returns
    ///
    /// The candidate's AssignmentScore
    pub fn score(&self, worker: &Worker, date: NaiveDate, post: usize) -> AssignmentScore {
        let mut score = 0.0;
        let deficit = self.checker.deficit(worker, &self.schedule);

        score += match deficit {
            d if d >= 5 => 25000.0 + 5000.0 * d as f64,
            3 | 4 => 18000.0 + 3000.0 * deficit as f64,
            2 => 14000.0,
            1 => 10000.0,
            _ => 0.0,
        };

        let gap = worker.gap_between_shifts;
        match self.schedule.min_distance(&worker.id, date) {
            None => score += 500.0,
            Some(distance) if distance >= gap => {
                score += 500.0 + 200.0 * ((distance - gap) as f64).powf(1.5);
            }
            Some(_) => {}
        }

        if self.checker.calendar().is_special(date) {
            let expected = self.checker.expected_special_share(worker, &self.schedule);
            if (self.checker.special_count(worker, &self.schedule) as f64) < expected {
                score += 1500.0;
            }
        }

        let expected_month =
            self.checker
                .expected_month_share(worker, &self.schedule, date.year(), date.month());
        if (self.schedule.month_count(&worker.id, date.year(), date.month()) as f64)
            < expected_month
        {
            score += 800.0;
        }

        if post + 1 == self.schedule.num_posts() {
            let fair = worker.target_shifts as f64 / self.schedule.num_posts() as f64;
            if (self.schedule.last_post_count(&worker.id) as f64) < fair {
                score += 600.0;
            }
        }

        if deficit < 0 {
            score -= 2000.0 * (1 - deficit) as f64;
        } else if deficit == 0 {
            score -= 2000.0;
        }

        let weekday = date.weekday().num_days_from_monday();
        if let Some(hits) = self
            .pattern_memory
            .get(&(worker.id.clone(), weekday, post))
        {
            score += 250.0 * (*hits).min(4) as f64;
        }

        AssignmentScore::new(score)
    }

    /// Workers that can legally take the slot under the current mode
    ///
    /// # Arguments
    ///
    /// * `date` - Slot date
    /// * `post` - Slot post index
    ///
    /// # Returns
    ///
    /// Every worker passing `can_assign` for the slot
    pub fn candidates(&self, date: NaiveDate, post: usize) -> Vec<&Worker> {
        self.workers
            .iter()
            .filter(|w| {
                self.checker
                    .can_assign(w, date, post, &self.schedule, &self.workers, self.mode)
                    .is_ok()
            })
            .collect()
    }

    /// Picks the best candidate for a slot
    ///
    /// Ranking: score, then lower current count, then position in the given
    /// worker order, then id. The ordering strategy only breaks ties, keeping
    /// the score a pure function of state.
    ///
    /// # Arguments
    ///
    /// * `date` - Slot date
    /// * `post` - Slot post index
    /// * `order` - Worker-ordering strategy used as the tie-break
    ///
    /// # Returns
    ///
    /// The winning worker id, or None when no candidate exists
    pub fn select_worker(&self, date: NaiveDate, post: usize, order: &[String]) -> Option<String> {
        let mut ranked: Vec<(&Worker, AssignmentScore)> = self
            .candidates(date, post)
            .into_iter()
            .map(|w| (w, self.score(w, date, post)))
            .collect();
        ranked.sort_by(|(a, sa), (b, sb)| {
            sb.cmp(sa)
                .then_with(|| self.schedule.count(&a.id).cmp(&self.schedule.count(&b.id)))
                .then_with(|| order_position(order, &a.id).cmp(&order_position(order, &b.id)))
                .then_with(|| a.id.cmp(&b.id))
        });
        ranked.first().map(|(w, _)| w.id.clone())
    }

    /// Empty slot with the fewest candidates (most constrained first)
    fn most_constrained_slot(&self) -> Option<(Slot, usize)> {
        self.schedule
            .empty_slots()
            .into_iter()
            .map(|slot| (slot, self.candidates(slot.date, slot.post).len()))
            .filter(|(_, n)| *n > 0)
            .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
    }

    // ------------------------------------------------------------------
    // Fill transforms
    // ------------------------------------------------------------------

    fn apply_fill(&mut self, worker_id: &str, slot: Slot) -> f64 {
        let worker = self
            .worker(worker_id)
            .expect("fill references known worker")
            .clone();
        let score = self.score(&worker, slot.date, slot.post).value();
        self.schedule.assign(worker_id, slot.date, slot.post);
        let weekday = slot.date.weekday().num_days_from_monday();
        *self
            .pattern_memory
            .entry((worker_id.to_string(), weekday, slot.post))
            .or_insert(0) += 1;
        score
    }

    /// Places a specific worker into a specific empty slot
    ///
    /// # Arguments
    ///
    /// * `worker_id` - Worker to place
    /// * `slot` - Target (date, post)
    ///
    /// # Returns
    ///
    /// Accepted on success, or Rejected with the failing rule
    pub fn fill_slot(&mut self, worker_id: &str, slot: Slot) -> TransformOutcome {
        let Some(worker) = self.worker(worker_id).cloned() else {
            return TransformOutcome::Rejected("unknown worker".to_string());
        };
        if let Err(violation) = self.checker.can_assign(
            &worker,
            slot.date,
            slot.post,
            &self.schedule,
            &self.workers,
            self.mode,
        ) {
            return TransformOutcome::Rejected(violation.to_string());
        }
        self.apply_fill(worker_id, slot);
        TransformOutcome::Accepted
    }

    /// Empties a slot, refusing to touch locked mandatory assignments
    ///
    /// # Arguments
    ///
    /// * `slot` - The (date, post) to empty
    /// * `op` - Name of the calling operation, for the blocked-event log
    ///
    /// # Returns
    ///
    /// Accepted, Rejected when already empty, or Blocked by the oracle
    pub fn clear_slot(&mut self, slot: Slot, op: &str) -> TransformOutcome {
        let Some(holder) = self.schedule.worker_at(slot.date, slot.post).map(str::to_string)
        else {
            return TransformOutcome::Rejected("slot already empty".to_string());
        };
        if !self.can_modify(&holder, slot.date, op) {
            return TransformOutcome::Blocked { op: op.to_string() };
        }
        self.schedule.clear(slot.date, slot.post);
        TransformOutcome::Accepted
    }

    /// Fills empty slots, most constrained first, then by swap chains
    ///
    /// Repeats until a full pass fills nothing (a schedule without empty
    /// slots is a no-op). Never touches locked mandatory assignments.
    ///
    /// # Arguments
    ///
    /// * `order` - Worker-ordering strategy for tie-breaks and swap order
    /// * `max_passes` - Cap on fill passes (at least one runs)
    ///
    /// # Returns
    ///
    /// A FillOutcome with direct/swap fill counts and the cumulative score
    pub fn fill_empty_shifts(&mut self, order: &[String], max_passes: u32) -> FillOutcome {
        let mut outcome = FillOutcome::default();
        for _ in 0..max_passes.max(1) {
            let mut pass_fills = 0;

            // Pass 1: direct fills, most constrained slot first
            while let Some((slot, _)) = self.most_constrained_slot() {
                let Some(worker_id) = self.select_worker(slot.date, slot.post, order) else {
                    break;
                };
                outcome.cumulative_score += self.apply_fill(&worker_id, slot);
                outcome.direct_fills += 1;
                pass_fills += 1;
            }

            // Pass 2: swap-based fills for slots nobody can take directly
            for slot in self.schedule.empty_slots() {
                if self.try_swap_fill(slot, order) {
                    outcome.swap_fills += 1;
                    pass_fills += 1;
                }
            }

            if pass_fills == 0 {
                break;
            }
        }
        outcome
    }

    /// Relocates some worker A onto the empty slot, backfilling A's old slot
    /// with another worker B
    ///
    /// # Arguments
    ///
    /// * `slot` - The empty slot to fill
    /// * `order` - Worker-ordering strategy for the search order
    ///
    /// # Returns
    ///
    /// `true` when a two-worker chain was applied and survived the
    /// invariant check
    pub fn try_swap_fill(&mut self, slot: Slot, order: &[String]) -> bool {
        let worker_ids: Vec<String> = ordered_ids(&self.workers, order);
        for a_id in &worker_ids {
            let a = self.worker(a_id).expect("known worker").clone();
            if !a.is_available(slot.date) {
                continue;
            }
            for a_date in self.schedule.assignment_dates(a_id) {
                if a_date == slot.date || !self.can_modify(a_id, a_date, "swap_fill") {
                    continue;
                }
                let Some(a_post) = self.schedule.post_of(a_id, a_date) else {
                    continue;
                };

                let backup = self.schedule.clone();
                self.schedule.clear(a_date, a_post);

                let a_fits = self
                    .checker
                    .can_assign(&a, slot.date, slot.post, &self.schedule, &self.workers, self.mode)
                    .is_ok();
                if !a_fits {
                    self.schedule = backup;
                    continue;
                }
                self.schedule.assign(a_id, slot.date, slot.post);

                let backfill = worker_ids.iter().find(|b_id| {
                    *b_id != a_id
                        && self
                            .worker(b_id)
                            .map(|b| {
                                self.checker
                                    .can_assign(
                                        b,
                                        a_date,
                                        a_post,
                                        &self.schedule,
                                        &self.workers,
                                        self.mode,
                                    )
                                    .is_ok()
                            })
                            .unwrap_or(false)
                });
                match backfill {
                    Some(b_id) => {
                        let b_id = b_id.clone();
                        self.schedule.assign(&b_id, a_date, a_post);
                        if self.verify_invariants().is_ok() {
                            debug!(
                                empty = %slot.date,
                                mover = %a_id,
                                backfill = %b_id,
                                "swap fill applied"
                            );
                            return true;
                        }
                        self.schedule = backup;
                    }
                    None => {
                        self.schedule = backup;
                    }
                }
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Rebalancing transforms
    // ------------------------------------------------------------------

    /// Runs a mutation atomically: on any invariant breach the schedule is
    /// restored and the outcome downgraded to Rejected
    fn with_rollback<F>(&mut self, op: &str, f: F) -> TransformOutcome
    where
        F: FnOnce(&mut Self) -> TransformOutcome,
    {
        let backup = self.schedule.clone();
        if self.mode.is_relaxed() {
            self.relaxed_transform_done = true;
        }
        let outcome = f(self);
        match outcome {
            TransformOutcome::Accepted => {
                if let Err(reason) = self.verify_invariants() {
                    warn!(op, reason = %reason, "transform rolled back on invariant violation");
                    self.schedule = backup;
                    TransformOutcome::Rejected(reason)
                } else {
                    TransformOutcome::Accepted
                }
            }
            other => {
                self.schedule = backup;
                other
            }
        }
    }

    /// Moves one shift of `from` to `to`, keeping the same slot
    ///
    /// Consults the balance validator's transfer oracle first, then tries
    /// the source's dates in order until one can legally change hands.
    ///
    /// # Arguments
    ///
    /// * `from_id` - Worker giving up a shift
    /// * `to_id` - Worker receiving the shift
    ///
    /// # Returns
    ///
    /// Accepted on the first workable date, otherwise Rejected
    pub fn transfer_shift(&mut self, from_id: &str, to_id: &str) -> TransformOutcome {
        let (Some(from), Some(to)) = (self.worker(from_id).cloned(), self.worker(to_id).cloned())
        else {
            return TransformOutcome::Rejected("unknown worker".to_string());
        };
        if let Err(reason) =
            self.validator
                .transfer_validity(&from, &to, &self.schedule, self.phase)
        {
            return TransformOutcome::Rejected(reason);
        }

        self.with_rollback("transfer_shift", |builder| {
            for date in builder.schedule.assignment_dates(from_id) {
                if !builder.can_modify(from_id, date, "transfer_shift") {
                    continue;
                }
                let Some(post) = builder.schedule.post_of(from_id, date) else {
                    continue;
                };
                builder.schedule.clear(date, post);
                if builder
                    .checker
                    .can_assign(&to, date, post, &builder.schedule, &builder.workers, builder.mode)
                    .is_ok()
                {
                    builder.schedule.assign(to_id, date, post);
                    debug!(from = from_id, to = to_id, %date, post, "shift transferred");
                    return TransformOutcome::Accepted;
                }
                builder.schedule.assign(from_id, date, post);
            }
            TransformOutcome::Rejected("no transferable date".to_string())
        })
    }

    /// Moves shifts from over-target to under-target workers
    ///
    /// Follows the balance validator's ranked recommendations.
    ///
    /// # Returns
    ///
    /// Number of transfers that were accepted
    pub fn balance_workloads(&mut self) -> u32 {
        let recommendations = self
            .validator
            .rebalancing_recommendations(&self.workers, &self.schedule);
        let mut moves = 0;
        for (from, to) in recommendations {
            if self.transfer_shift(&from, &to).is_accepted() {
                moves += 1;
            }
        }
        moves
    }

    /// Evens out per-weekday counts by moving surplus-weekday shifts
    ///
    /// For each worker whose histogram has a weekday more than one above
    /// the even share, one assignment on that weekday is handed to an
    /// under-target replacement.
    ///
    /// # Returns
    ///
    /// Number of reassignments that were accepted
    pub fn balance_weekday_distribution(&mut self) -> u32 {
        let mut moves = 0;
        let worker_ids: Vec<String> = self.workers.iter().map(|w| w.id.clone()).collect();
        for worker_id in &worker_ids {
            let dates = self.schedule.assignment_dates(worker_id);
            if dates.len() < 3 {
                continue;
            }
            let mut histogram = [0u32; 7];
            for date in &dates {
                histogram[date.weekday().num_days_from_monday() as usize] += 1;
            }
            let expected = dates.len() as f64 / 7.0;
            let Some(overloaded) = (0..7).find(|i| histogram[*i] as f64 > expected + 1.0) else {
                continue;
            };

            let candidate_dates: Vec<NaiveDate> = dates
                .iter()
                .filter(|d| d.weekday().num_days_from_monday() as usize == overloaded)
                .copied()
                .collect();
            for date in candidate_dates {
                if self.reassign_date(worker_id, date, "balance_weekday").is_accepted() {
                    moves += 1;
                    break;
                }
            }
        }
        moves
    }

    /// Hands one date of a worker to some other worker that can take it
    fn reassign_date(&mut self, from_id: &str, date: NaiveDate, op: &'static str) -> TransformOutcome {
        self.with_rollback(op, |builder| {
            if !builder.can_modify(from_id, date, op) {
                return TransformOutcome::Blocked { op: op.to_string() };
            }
            let Some(post) = builder.schedule.post_of(from_id, date) else {
                return TransformOutcome::Rejected("not assigned on date".to_string());
            };
            builder.schedule.clear(date, post);
            let replacement = builder
                .workers
                .clone()
                .into_iter()
                .filter(|w| w.id != from_id && builder.checker.deficit(w, &builder.schedule) > 0)
                .find(|w| {
                    builder
                        .checker
                        .can_assign(w, date, post, &builder.schedule, &builder.workers, builder.mode)
                        .is_ok()
                });
            match replacement {
                Some(w) => {
                    builder.schedule.assign(&w.id, date, post);
                    TransformOutcome::Accepted
                }
                None => TransformOutcome::Rejected("no replacement candidate".to_string()),
            }
        })
    }

    /// Moves special-day shifts from weekend-heavy to weekend-light workers
    ///
    /// Tries a plain move first and falls back to swapping a special day
    /// against a regular one when no destination can absorb the extra shift.
    ///
    /// # Returns
    ///
    /// Number of moves or swaps that were accepted
    pub fn rebalance_weekend_shifts(&mut self) -> u32 {
        let mut moves = 0;
        let snapshot: Vec<(String, f64, u32)> = self
            .workers
            .iter()
            .map(|w| {
                (
                    w.id.clone(),
                    self.checker.expected_special_share(w, &self.schedule),
                    self.checker.special_count(w, &self.schedule),
                )
            })
            .collect();

        for (over_id, over_expected, over_count) in &snapshot {
            if (*over_count as f64) <= over_expected + 1.0 {
                continue;
            }
            for (under_id, under_expected, under_count) in &snapshot {
                if over_id == under_id || (*under_count as f64) >= *under_expected {
                    continue;
                }
                if self.move_special_day(over_id, under_id).is_accepted() {
                    moves += 1;
                    break;
                }
                // Plain move failed; correct both balances with a swap
                if self.swap_special_day_shifts(over_id, under_id).is_accepted() {
                    moves += 1;
                    break;
                }
            }
        }
        moves
    }

    fn move_special_day(&mut self, from_id: &str, to_id: &str) -> TransformOutcome {
        let Some(to) = self.worker(to_id).cloned() else {
            return TransformOutcome::Rejected("unknown worker".to_string());
        };
        self.with_rollback("rebalance_weekend", |builder| {
            let special_dates: Vec<NaiveDate> = builder
                .schedule
                .assignment_dates(from_id)
                .into_iter()
                .filter(|d| builder.checker.calendar().is_special(*d))
                .collect();
            for date in special_dates {
                if !builder.can_modify(from_id, date, "rebalance_weekend") {
                    continue;
                }
                let Some(post) = builder.schedule.post_of(from_id, date) else {
                    continue;
                };
                builder.schedule.clear(date, post);
                if builder
                    .checker
                    .can_assign(&to, date, post, &builder.schedule, &builder.workers, builder.mode)
                    .is_ok()
                {
                    builder.schedule.assign(to_id, date, post);
                    return TransformOutcome::Accepted;
                }
                builder.schedule.assign(from_id, date, post);
            }
            TransformOutcome::Rejected("no movable special day".to_string())
        })
    }

    /// Swaps one special-day shift against a regular one between two workers
    ///
    /// Corrects both weekend balances in a single transform.
    ///
    /// # Arguments
    ///
    /// * `heavy_id` - Worker above their special-day share
    /// * `light_id` - Worker below their special-day share
    ///
    /// # Returns
    ///
    /// Accepted for the first viable pair of dates, otherwise Rejected
    pub fn swap_special_day_shifts(&mut self, heavy_id: &str, light_id: &str) -> TransformOutcome {
        let (Some(heavy), Some(light)) =
            (self.worker(heavy_id).cloned(), self.worker(light_id).cloned())
        else {
            return TransformOutcome::Rejected("unknown worker".to_string());
        };
        self.with_rollback("swap_special_day", |builder| {
            let specials: Vec<NaiveDate> = builder
                .schedule
                .assignment_dates(heavy_id)
                .into_iter()
                .filter(|d| builder.checker.calendar().is_special(*d))
                .collect();
            let regulars: Vec<NaiveDate> = builder
                .schedule
                .assignment_dates(light_id)
                .into_iter()
                .filter(|d| !builder.checker.calendar().is_special(*d))
                .collect();

            for special in &specials {
                for regular in &regulars {
                    if !builder.can_modify(heavy_id, *special, "swap_special_day")
                        || !builder.can_modify(light_id, *regular, "swap_special_day")
                    {
                        continue;
                    }
                    let (Some(p1), Some(p2)) = (
                        builder.schedule.post_of(heavy_id, *special),
                        builder.schedule.post_of(light_id, *regular),
                    ) else {
                        continue;
                    };
                    builder.schedule.clear(*special, p1);
                    builder.schedule.clear(*regular, p2);
                    let fits = builder
                        .checker
                        .can_assign(&light, *special, p1, &builder.schedule, &builder.workers, builder.mode)
                        .is_ok()
                        && builder
                            .checker
                            .can_assign(&heavy, *regular, p2, &builder.schedule, &builder.workers, builder.mode)
                            .is_ok();
                    if fits {
                        builder.schedule.assign(light_id, *special, p1);
                        builder.schedule.assign(heavy_id, *regular, p2);
                        return TransformOutcome::Accepted;
                    }
                    builder.schedule.assign(heavy_id, *special, p1);
                    builder.schedule.assign(light_id, *regular, p2);
                }
            }
            TransformOutcome::Rejected("no viable special/regular pair".to_string())
        })
    }

    /// Swaps the dates of two assignments between two workers
    ///
    /// # Arguments
    ///
    /// * `first_id` - Holder of the first assignment
    /// * `first_date` - Date of the first assignment
    /// * `second_id` - Holder of the second assignment
    /// * `second_date` - Date of the second assignment
    ///
    /// # Returns
    ///
    /// Accepted when both workers fit their new dates, Blocked when either
    /// assignment is protected, otherwise Rejected
    pub fn swap_assignments(
        &mut self,
        first_id: &str,
        first_date: NaiveDate,
        second_id: &str,
        second_date: NaiveDate,
    ) -> TransformOutcome {
        let (Some(first), Some(second)) =
            (self.worker(first_id).cloned(), self.worker(second_id).cloned())
        else {
            return TransformOutcome::Rejected("unknown worker".to_string());
        };
        self.with_rollback("swap_assignments", |builder| {
            if !builder.can_modify(first_id, first_date, "swap_assignments")
                || !builder.can_modify(second_id, second_date, "swap_assignments")
            {
                return TransformOutcome::Blocked {
                    op: "swap_assignments".to_string(),
                };
            }
            let (Some(p1), Some(p2)) = (
                builder.schedule.post_of(first_id, first_date),
                builder.schedule.post_of(second_id, second_date),
            ) else {
                return TransformOutcome::Rejected("assignment vanished".to_string());
            };
            builder.schedule.clear(first_date, p1);
            builder.schedule.clear(second_date, p2);
            let fits = builder
                .checker
                .can_assign(&first, second_date, p2, &builder.schedule, &builder.workers, builder.mode)
                .is_ok()
                && builder
                    .checker
                    .can_assign(&second, first_date, p1, &builder.schedule, &builder.workers, builder.mode)
                    .is_ok();
            if fits {
                builder.schedule.assign(first_id, second_date, p2);
                builder.schedule.assign(second_id, first_date, p1);
                TransformOutcome::Accepted
            } else {
                builder.schedule.assign(first_id, first_date, p1);
                builder.schedule.assign(second_id, second_date, p2);
                TransformOutcome::Rejected("swap breaks constraints".to_string())
            }
        })
    }

    /// Within one date, swaps post indices to even out last-post counts
    ///
    /// Date membership never changes, so the spacing rules are unaffected;
    /// locked assignments keep their post.
    ///
    /// # Returns
    ///
    /// Number of post swaps applied
    pub fn adjust_last_post_distribution(&mut self) -> u32 {
        let last = self.schedule.num_posts() - 1;
        if last == 0 {
            return 0;
        }
        let mut swaps = 0;
        let dates: Vec<NaiveDate> = self.schedule.dates().collect();
        for date in dates {
            let Some(on_last) = self.schedule.worker_at(date, last).map(str::to_string) else {
                continue;
            };
            let num_posts = self.schedule.num_posts() as f64;
            let fair = |w: &Worker| w.target_shifts as f64 / num_posts;
            let Some(heavy) = self.worker(&on_last).cloned() else {
                continue;
            };
            if (self.schedule.last_post_count(&on_last) as f64) <= fair(&heavy) + 1.0 {
                continue;
            }

            for post in 0..last {
                let Some(other) = self.schedule.worker_at(date, post).map(str::to_string) else {
                    continue;
                };
                let Some(light) = self.worker(&other).cloned() else {
                    continue;
                };
                if (self.schedule.last_post_count(&other) as f64) >= fair(&light) {
                    continue;
                }
                if !self.can_modify(&on_last, date, "adjust_last_post")
                    || !self.can_modify(&other, date, "adjust_last_post")
                {
                    continue;
                }
                self.schedule.clear(date, last);
                self.schedule.clear(date, post);
                self.schedule.assign(&other, date, last);
                self.schedule.assign(&on_last, date, post);
                swaps += 1;
                break;
            }
        }
        swaps
    }

    /// Guard transform: forces a worker back under the hard cap
    ///
    /// Should never find work to do; transforms check H3 before committing.
    ///
    /// # Returns
    ///
    /// Number of forced moves applied
    pub fn redistribute_excess_shifts(&mut self) -> u32 {
        let mut moves = 0;
        let over: Vec<String> = self
            .workers
            .iter()
            .filter(|w| {
                self.schedule.count(&w.id) > w.hard_cap().max(self.schedule.locked_count(&w.id))
            })
            .map(|w| w.id.clone())
            .collect();
        for worker_id in over {
            warn!(worker = %worker_id, "worker above hard cap; forcing redistribution");
            let dates = self.schedule.assignment_dates(&worker_id);
            for date in dates {
                if self.reassign_date(&worker_id, date, "redistribute_excess").is_accepted() {
                    moves += 1;
                    break;
                }
            }
        }
        moves
    }

    // ------------------------------------------------------------------
    // Invariant verification
    // ------------------------------------------------------------------

    /// Verifies the structural invariants of the current state
    ///
    /// Checked after every transform: index coherence, locked mandatory
    /// presence, per-date compatibility, availability, the hard cap (with
    /// mandatory overage exempted), and mode-aware spacing rules.
    ///
    /// # Returns
    ///
    /// Ok, or a description of the first broken invariant
    pub fn verify_invariants(&self) -> Result<(), String> {
        if !self.schedule.is_coherent() {
            return Err("assignment index diverged from slots".to_string());
        }
        if !self.schedule.locked_all_present() {
            return Err("locked mandatory assignment missing".to_string());
        }

        for date in self.schedule.dates() {
            let on_duty = self.schedule.workers_on(date);
            for (i, a_id) in on_duty.iter().enumerate() {
                let Some(a) = self.worker(a_id) else {
                    return Err(format!("unknown worker {} on {}", a_id, date));
                };
                if !a.is_available(date) && !a.is_mandatory(date) {
                    return Err(format!("{} assigned while unavailable on {}", a_id, date));
                }
                for b_id in on_duty.iter().skip(i + 1) {
                    let declared_by_b = self
                        .worker(b_id)
                        .map(|b| b.is_incompatible_with(a_id))
                        .unwrap_or(false);
                    if a.is_incompatible_with(b_id) || declared_by_b {
                        return Err(format!(
                            "incompatible pair {} / {} share {}",
                            a_id, b_id, date
                        ));
                    }
                }
            }
        }

        for worker in &self.workers {
            let count = self.schedule.count(&worker.id);
            let allowed = worker.hard_cap().max(self.schedule.locked_count(&worker.id));
            if count > allowed {
                return Err(format!(
                    "{} holds {} shifts above allowance {}",
                    worker.id, count, allowed
                ));
            }

            let mut required_gap = worker.gap_between_shifts;
            if self.mode.is_relaxed() {
                required_gap = required_gap.saturating_sub(1);
            }
            let required_gap = required_gap.max(1) as i64;
            let dates = self.schedule.assignment_dates(&worker.id);
            for pair in dates.windows(2) {
                let both_locked = self.schedule.is_locked(&worker.id, pair[0])
                    && self.schedule.is_locked(&worker.id, pair[1]);
                if both_locked {
                    continue;
                }
                if (pair[1] - pair[0]).num_days() < required_gap {
                    return Err(format!(
                        "{} gap {} under minimum {}",
                        worker.id,
                        (pair[1] - pair[0]).num_days(),
                        required_gap
                    ));
                }
            }

            if self.mode == SolverMode::Strict {
                for (i, first) in dates.iter().enumerate() {
                    for second in dates.iter().skip(i + 1) {
                        let distance = (*second - *first).num_days();
                        if (distance == 7 || distance == 14)
                            && first.weekday() == second.weekday()
                            && !(self.schedule.is_locked(&worker.id, *first)
                                && self.schedule.is_locked(&worker.id, *second))
                        {
                            return Err(format!(
                                "{} repeats weekday {} days apart",
                                worker.id, distance
                            ));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Aggregates for attempt scoring
    // ------------------------------------------------------------------

    /// Sum of absolute target deviations across workers
    ///
    /// # Returns
    ///
    /// The global L1 deviation used in attempt scoring
    pub fn work_imbalance(&self) -> f64 {
        self.validator.l1_deviation(&self.workers, &self.schedule)
    }

    /// Sum of absolute special-day imbalances across workers
    ///
    /// # Returns
    ///
    /// The distance of every worker's special-day count from its expected
    /// share, summed
    pub fn weekend_imbalance(&self) -> f64 {
        self.workers
            .iter()
            .map(|w| {
                let expected = self.checker.expected_special_share(w, &self.schedule);
                (self.checker.special_count(w, &self.schedule) as f64 - expected).abs()
            })
            .sum()
    }
}

fn order_position(order: &[String], id: &str) -> usize {
    order.iter().position(|o| o == id).unwrap_or(usize::MAX)
}

fn ordered_ids(workers: &[Worker], order: &[String]) -> Vec<String> {
    let mut ids: Vec<String> = workers.iter().map(|w| w.id.clone()).collect();
    ids.sort_by_key(|id| (order_position(order, id), id.clone()));
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::RosterProblem;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn two_worker_problem() -> RosterProblem {
        let workers = vec![
            Worker::new("A", 5).with_gap(1),
            Worker::new("B", 5).with_gap(1),
        ];
        RosterProblem::new(workers, date(1, 1), date(1, 10), 1)
    }

    #[test]
    fn test_mandatory_guards_locked() {
        let mut problem = two_worker_problem();
        problem.workers[0] = problem.workers[0]
            .clone()
            .with_mandatory_day(date(1, 3))
            .with_mandatory_day(date(1, 7));
        let mut builder = ScheduleBuilder::new(&problem);
        let issues = builder.assign_mandatory_guards();
        assert!(issues.is_empty());
        assert_eq!(builder.schedule().count("A"), 2);
        assert!(builder.schedule().is_locked("A", date(1, 3)));
        assert!(builder.schedule().is_locked("A", date(1, 7)));
    }

    #[test]
    fn test_mandatory_gap_override_allowed() {
        // Mandatory dominates the gap rule: both dates are placed
        let workers = vec![Worker::new("A", 2)
            .with_gap(3)
            .with_mandatory_day(date(1, 15))
            .with_mandatory_day(date(1, 17))];
        let problem = RosterProblem::new(workers, date(1, 1), date(1, 31), 1);
        let mut builder = ScheduleBuilder::new(&problem);
        let issues = builder.assign_mandatory_guards();
        assert!(issues.is_empty());
        assert_eq!(builder.schedule().count("A"), 2);
        assert!(builder.verify_invariants().is_ok());
    }

    #[test]
    fn test_incompatible_mandatory_clash_places_one() {
        let workers = vec![
            Worker::new("A", 2).with_incompatible("B").with_mandatory_day(date(2, 10)),
            Worker::new("B", 2).with_incompatible("A").with_mandatory_day(date(2, 10)),
        ];
        let problem = RosterProblem::new(workers, date(2, 1), date(2, 20), 2);
        let mut builder = ScheduleBuilder::new(&problem);
        let issues = builder.assign_mandatory_guards();
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], ConfigIssue::MandatoryClash { .. }));
        assert_eq!(builder.schedule().workers_on(date(2, 10)).len(), 1);
    }

    #[test]
    fn test_mandatory_on_day_off_is_config_error() {
        let workers = vec![Worker::new("A", 2)
            .with_day_off(date(1, 5))
            .with_mandatory_day(date(1, 5))];
        let problem = RosterProblem::new(workers, date(1, 1), date(1, 10), 1);
        let mut builder = ScheduleBuilder::new(&problem);
        let issues = builder.assign_mandatory_guards();
        assert!(matches!(issues[0], ConfigIssue::MandatoryUnavailable { .. }));
        assert_eq!(builder.schedule().count("A"), 0);
    }

    #[test]
    fn test_protection_oracle_blocks_locked() {
        let mut problem = two_worker_problem();
        problem.workers[0] = problem.workers[0].clone().with_mandatory_day(date(1, 3));
        let mut builder = ScheduleBuilder::new(&problem);
        builder.assign_mandatory_guards();

        assert!(!builder.can_modify("A", date(1, 3), "test_op"));
        assert_eq!(builder.blocked_attempts(), 1);
        assert!(builder.can_modify("B", date(1, 3), "test_op"));
    }

    #[test]
    fn test_fill_prefers_deficit_worker() {
        let problem = two_worker_problem();
        let mut builder = ScheduleBuilder::new(&problem);
        let order: Vec<String> = vec!["A".to_string(), "B".to_string()];
        let outcome = builder.fill_empty_shifts(&order, 8);
        assert_eq!(outcome.total(), 10);
        assert_eq!(builder.schedule().empty_slot_count(), 0);
        // Equal targets, the fill splits evenly
        assert_eq!(builder.schedule().count("A"), 5);
        assert_eq!(builder.schedule().count("B"), 5);
        assert!(builder.verify_invariants().is_ok());
    }

    #[test]
    fn test_fill_is_idempotent_on_full_schedule() {
        let problem = two_worker_problem();
        let mut builder = ScheduleBuilder::new(&problem);
        let order: Vec<String> = vec!["A".to_string(), "B".to_string()];
        builder.fill_empty_shifts(&order, 8);
        let before = builder.schedule().clone();

        let outcome = builder.fill_empty_shifts(&order, 8);
        assert_eq!(outcome.total(), 0);
        assert_eq!(
            serde_json::to_string(&before).unwrap(),
            serde_json::to_string(builder.schedule()).unwrap()
        );
    }

    #[test]
    fn test_transfer_shift_moves_one() {
        let workers = vec![
            Worker::new("A", 4).with_gap(1),
            Worker::new("B", 6).with_gap(1),
        ];
        let problem = RosterProblem::new(workers, date(1, 1), date(1, 10), 1);
        let mut builder = ScheduleBuilder::new(&problem);
        // A sits above target; B stays empty
        for day in [1, 3, 5, 7, 9] {
            builder.schedule.assign("A", date(1, day), 0);
        }
        let outcome = builder.transfer_shift("A", "B");
        assert!(outcome.is_accepted());
        assert_eq!(builder.schedule().count("A"), 4);
        assert_eq!(builder.schedule().count("B"), 1);
    }

    #[test]
    fn test_transfer_never_touches_locked() {
        let workers = vec![
            Worker::new("A", 1).with_gap(1).with_mandatory_day(date(1, 5)),
            Worker::new("B", 9).with_gap(1),
        ];
        let problem = RosterProblem::new(workers, date(1, 1), date(1, 10), 1);
        let mut builder = ScheduleBuilder::new(&problem);
        builder.assign_mandatory_guards();

        // A is exactly on target with only the locked date; B under target.
        let outcome = builder.transfer_shift("A", "B");
        assert!(!outcome.is_accepted());
        assert!(builder.schedule().is_locked("A", date(1, 5)));
        assert_eq!(builder.schedule().count("A"), 1);
    }

    #[test]
    fn test_swap_assignments_roundtrip() {
        let problem = two_worker_problem();
        let mut builder = ScheduleBuilder::new(&problem);
        builder.schedule.assign("A", date(1, 2), 0);
        builder.schedule.assign("B", date(1, 8), 0);

        let outcome = builder.swap_assignments("A", date(1, 2), "B", date(1, 8));
        assert!(outcome.is_accepted());
        assert_eq!(builder.schedule().worker_at(date(1, 2), 0), Some("B"));
        assert_eq!(builder.schedule().worker_at(date(1, 8), 0), Some("A"));
    }

    #[test]
    fn test_relaxed_to_strict_forbidden_after_transform() {
        let problem = two_worker_problem();
        let mut builder = ScheduleBuilder::new(&problem);
        builder.enable_relaxed();
        builder.schedule.assign("A", date(1, 2), 0);
        builder.schedule.assign("B", date(1, 8), 0);
        builder.swap_assignments("A", date(1, 2), "B", date(1, 8));

        assert!(!builder.enable_strict());
        assert_eq!(builder.mode(), SolverMode::Relaxed);
    }

    #[test]
    fn test_swap_special_day_for_regular() {
        let problem = two_worker_problem();
        let mut builder = ScheduleBuilder::new(&problem);
        // A holds a Saturday, B a plain Tuesday
        builder.schedule.assign("A", date(1, 3), 0);
        builder.schedule.assign("B", date(1, 6), 0);

        let outcome = builder.swap_special_day_shifts("A", "B");
        assert!(outcome.is_accepted());
        assert_eq!(builder.schedule().worker_at(date(1, 3), 0), Some("B"));
        assert_eq!(builder.schedule().worker_at(date(1, 6), 0), Some("A"));
    }

    #[test]
    fn test_rollback_restores_state() {
        let problem = two_worker_problem();
        let mut builder = ScheduleBuilder::new(&problem);
        builder.schedule.assign("A", date(1, 2), 0);
        let before = serde_json::to_string(builder.schedule()).unwrap();

        let outcome = builder.with_rollback("failing_op", |b| {
            b.schedule.clear(date(1, 2), 0);
            TransformOutcome::Rejected("synthetic failure".to_string())
        });
        assert!(!outcome.is_accepted());
        assert_eq!(before, serde_json::to_string(builder.schedule()).unwrap());
    }

    #[test]
    fn test_adjust_last_post_swaps_within_date() {
        let workers = vec![
            Worker::new("A", 4).with_gap(1),
            Worker::new("B", 4).with_gap(1),
        ];
        let problem = RosterProblem::new(workers, date(1, 1), date(1, 4), 2);
        let mut builder = ScheduleBuilder::new(&problem);
        // A always on the last post, B never
        for day in 1..=4 {
            builder.schedule.assign("B", date(1, day), 0);
            builder.schedule.assign("A", date(1, day), 1);
        }
        let swaps = builder.adjust_last_post_distribution();
        assert!(swaps > 0);
        assert!(builder.schedule().last_post_count("A") < 4);
        assert!(builder.schedule().last_post_count("B") > 0);
    }
}
