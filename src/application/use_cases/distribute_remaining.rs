//! Distribute Remaining use case module
//!
//! Final-push strategies for slots the initial distribution and the
//! optimizer could not fill: windowed chunk fill, adaptive backtracking over
//! the most constrained slots, two/three-worker swap chains, and bounded
//! progressive relaxation. Every placement goes through the builder, so the
//! protection oracle and rollback discipline keep holding.

use chrono::Duration;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::application::services::ScheduleBuilder;
use crate::domain::entities::Slot;

const BACKTRACK_DEPTH: u32 = 8;
const BACKTRACK_NODES: u32 = 200;
const CHUNK_DAYS: i64 = 7;

/// Per-strategy fill counts from the final push
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinalPushOutcome {
    pub chunk_fills: u32,
    pub backtrack_fills: u32,
    pub swap_chain_fills: u32,
    pub relaxation_fills: u32,
}

impl FinalPushOutcome {
    pub fn total(&self) -> u32 {
        self.chunk_fills + self.backtrack_fills + self.swap_chain_fills + self.relaxation_fills
    }
}

/// Use case applying the four final-push strategies in order
pub struct DistributeRemaining;

impl DistributeRemaining {
    /// Creates a new DistributeRemaining use case
    ///
    /// # Returns
    ///
    /// A new DistributeRemaining instance
    pub fn new() -> Self {
        Self
    }

    /// Applies the four final-push strategies until the schedule is full or
    /// every strategy is exhausted
    ///
    /// # Arguments
    ///
    /// * `builder` - The schedule builder owning the roster state
    /// * `order` - Worker-ordering strategy for swap searches
    ///
    /// # Returns
    ///
    /// A FinalPushOutcome with the fill count per strategy
    pub fn execute(&self, builder: &mut ScheduleBuilder, order: &[String]) -> FinalPushOutcome {
        let mut outcome = FinalPushOutcome::default();
        if builder.schedule().empty_slot_count() == 0 {
            return outcome;
        }

        outcome.chunk_fills = self.chunk_fill(builder);
        if builder.schedule().empty_slot_count() > 0 {
            outcome.backtrack_fills = self.backtrack_fill(builder);
        }
        if builder.schedule().empty_slot_count() > 0 {
            outcome.swap_chain_fills = self.swap_chain_fill(builder, order);
        }
        if builder.schedule().empty_slot_count() > 0 {
            outcome.relaxation_fills = self.progressive_relaxation(builder, order);
        }

        info!(
            chunk = outcome.chunk_fills,
            backtrack = outcome.backtrack_fills,
            chains = outcome.swap_chain_fills,
            relaxation = outcome.relaxation_fills,
            remaining = builder.schedule().empty_slot_count(),
            "final push finished"
        );
        outcome
    }

    /// Strategy 1: fill 7-day windows with deficit-priority ordering
    ///
    /// # Arguments
    ///
    /// * `builder` - The schedule builder owning the roster state
    ///
    /// # Returns
    ///
    /// Number of slots filled by windowed direct placement
    fn chunk_fill(&self, builder: &mut ScheduleBuilder) -> u32 {
        let mut fills = 0;
        let mut window_start = builder.schedule().start();
        let end = builder.schedule().end();

        while window_start <= end {
            let window_end = (window_start + Duration::days(CHUNK_DAYS - 1)).min(end);
            let window_slots: Vec<Slot> = builder
                .schedule()
                .empty_slots()
                .into_iter()
                .filter(|s| s.date >= window_start && s.date <= window_end)
                .collect();

            for slot in window_slots {
                let mut ranked: Vec<(i64, f64, String)> = builder
                    .candidates(slot.date, slot.post)
                    .into_iter()
                    .map(|w| {
                        (
                            builder.checker().deficit(w, builder.schedule()),
                            builder.score(w, slot.date, slot.post).value(),
                            w.id.clone(),
                        )
                    })
                    .collect();
                ranked.sort_by(|a, b| {
                    b.0.cmp(&a.0)
                        .then(b.1.total_cmp(&a.1))
                        .then(a.2.cmp(&b.2))
                });
                if let Some((_, _, worker_id)) = ranked.first() {
                    if builder.fill_slot(&worker_id.clone(), slot).is_accepted() {
                        fills += 1;
                    }
                }
            }
            window_start = window_end + Duration::days(1);
        }
        debug!(fills, "chunk fill finished");
        fills
    }

    /// Strategy 2: MRV backtracking with memoized dead ends
    ///
    /// # Arguments
    ///
    /// * `builder` - The schedule builder owning the roster state
    ///
    /// # Returns
    ///
    /// Number of slots the bounded search managed to fill
    fn backtrack_fill(&self, builder: &mut ScheduleBuilder) -> u32 {
        let before = builder.schedule().empty_slot_count();
        let mut memo: HashSet<(Slot, String)> = HashSet::new();
        let mut nodes = BACKTRACK_NODES;
        self.backtrack(builder, &mut memo, &mut nodes, BACKTRACK_DEPTH);
        before - builder.schedule().empty_slot_count()
    }

    fn backtrack(
        &self,
        builder: &mut ScheduleBuilder,
        memo: &mut HashSet<(Slot, String)>,
        nodes: &mut u32,
        depth: u32,
    ) -> bool {
        if builder.schedule().empty_slot_count() == 0 {
            return true;
        }
        if depth == 0 || *nodes == 0 {
            return false;
        }

        // Most constrained empty slot first; a zero-candidate slot fails fast
        let mut slots: Vec<(usize, Slot)> = builder
            .schedule()
            .empty_slots()
            .into_iter()
            .map(|slot| (builder.candidates(slot.date, slot.post).len(), slot))
            .collect();
        slots.sort();
        let Some((candidate_count, slot)) = slots.first().copied() else {
            return true;
        };
        if candidate_count == 0 {
            return false;
        }

        let mut ranked: Vec<(f64, String)> = builder
            .candidates(slot.date, slot.post)
            .into_iter()
            .map(|w| (builder.score(w, slot.date, slot.post).value(), w.id.clone()))
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

        for (_, worker_id) in ranked {
            if memo.contains(&(slot, worker_id.clone())) || *nodes == 0 {
                continue;
            }
            *nodes -= 1;
            if !builder.fill_slot(&worker_id, slot).is_accepted() {
                continue;
            }
            if self.backtrack(builder, memo, nodes, depth - 1) {
                return true;
            }
            builder.clear_slot(slot, "backtrack_fill");
            memo.insert((slot, worker_id));
        }
        false
    }

    /// Strategy 3: two- and three-worker swap chains onto each empty slot
    ///
    /// # Arguments
    ///
    /// * `builder` - The schedule builder owning the roster state
    /// * `order` - Worker-ordering strategy for the chain search
    ///
    /// # Returns
    ///
    /// Number of slots filled by relocation chains
    fn swap_chain_fill(&self, builder: &mut ScheduleBuilder, order: &[String]) -> u32 {
        let mut fills = 0;
        for slot in builder.schedule().empty_slots() {
            if builder.try_swap_fill(slot, order) {
                fills += 1;
                continue;
            }
            if self.three_worker_chain(builder, slot, order) {
                fills += 1;
            }
        }
        fills
    }

    /// A fills the slot; B takes A's old slot; C takes B's old slot
    ///
    /// # Arguments
    ///
    /// * `builder` - The schedule builder owning the roster state
    /// * `slot` - The empty slot to fill
    /// * `order` - Worker-ordering strategy for the second-level swap
    ///
    /// # Returns
    ///
    /// `true` when a full chain was applied; the builder is restored to its
    /// prior state otherwise
    fn three_worker_chain(
        &self,
        builder: &mut ScheduleBuilder,
        slot: Slot,
        order: &[String],
    ) -> bool {
        let snapshot = builder.clone();
        let worker_ids: Vec<String> = builder.workers().iter().map(|w| w.id.clone()).collect();

        for a_id in &worker_ids {
            for a_date in builder.schedule().assignment_dates(a_id) {
                if a_date == slot.date || builder.is_protected(a_id, a_date) {
                    continue;
                }
                let Some(a_post) = builder.schedule().post_of(a_id, a_date) else {
                    continue;
                };
                let a_slot = Slot::new(a_date, a_post);
                if !builder.clear_slot(a_slot, "three_worker_chain").is_accepted() {
                    continue;
                }
                if !builder.fill_slot(a_id, slot).is_accepted() {
                    *builder = snapshot.clone();
                    continue;
                }
                // A's old slot now needs a taker via a second-level swap
                if builder.try_swap_fill(a_slot, order) {
                    debug!(empty = %slot.date, mover = %a_id, "three-worker chain applied");
                    return true;
                }
                *builder = snapshot.clone();
            }
        }
        *builder = snapshot;
        false
    }

    /// Strategy 4: escalate the tolerance phase, accepting only improvements
    ///
    /// Runs a fill round under the current relaxed envelope, then widens to
    /// the emergency envelope; each stage is kept only when coverage grew.
    ///
    /// # Arguments
    ///
    /// * `builder` - The schedule builder owning the roster state
    /// * `order` - Worker-ordering strategy for the fill rounds
    ///
    /// # Returns
    ///
    /// Number of slots gained across the accepted stages
    fn progressive_relaxation(&self, builder: &mut ScheduleBuilder, order: &[String]) -> u32 {
        let mut fills = 0;

        // Stage 1: another fill round under the current relaxed envelope
        let snapshot = builder.clone();
        let before = builder.schedule().empty_slot_count();
        builder.enable_relaxed();
        let outcome = builder.fill_empty_shifts(order, 4);
        if builder.schedule().empty_slot_count() < before {
            fills += outcome.total();
        } else {
            *builder = snapshot;
        }

        // Stage 2: widen to the emergency envelope, keep only improvements
        if builder.schedule().empty_slot_count() > 0 {
            let snapshot = builder.clone();
            let before = builder.schedule().empty_slot_count();
            builder.escalate_tolerance_phase();
            let outcome = builder.fill_empty_shifts(order, 4);
            if builder.schedule().empty_slot_count() < before {
                fills += outcome.total();
            } else {
                *builder = snapshot;
            }
        }
        fills
    }
}

impl Default for DistributeRemaining {
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
    fn test_noop_on_full_schedule() {
        let workers = vec![
            Worker::new("A", 5).with_gap(1),
            Worker::new("B", 5).with_gap(1),
        ];
        let problem = RosterProblem::new(workers, date(1), date(10), 1);
        let mut builder = ScheduleBuilder::new(&problem);
        let order = vec!["A".to_string(), "B".to_string()];
        builder.fill_empty_shifts(&order, 8);
        assert_eq!(builder.schedule().empty_slot_count(), 0);

        let outcome = DistributeRemaining::new().execute(&mut builder, &order);
        assert_eq!(outcome.total(), 0);
    }

    #[test]
    fn test_chunk_fill_takes_leftovers() {
        let workers = vec![
            Worker::new("A", 6).with_gap(1),
            Worker::new("B", 6).with_gap(1),
        ];
        let problem = RosterProblem::new(workers, date(1), date(12), 1);
        let mut builder = ScheduleBuilder::new(&problem);
        let order = vec!["A".to_string(), "B".to_string()];
        // Leave the schedule mostly empty and let the engine push coverage up
        let outcome = DistributeRemaining::new().execute(&mut builder, &order);
        assert!(outcome.chunk_fills > 0);
        assert_eq!(builder.schedule().empty_slot_count(), 0);
        assert!(builder.verify_invariants().is_ok());
    }

    #[test]
    fn test_backtracking_handles_tight_instance() {
        // One worker per post pair with heavy incompatibilities: greedy order
        // matters, backtracking must still cover the feasible slots
        let workers = vec![
            Worker::new("A", 4).with_gap(1).with_incompatible("B"),
            Worker::new("B", 4).with_gap(1),
            Worker::new("C", 4).with_gap(1),
        ];
        let problem = RosterProblem::new(workers, date(1), date(6), 2);
        let mut builder = ScheduleBuilder::new(&problem);
        let order = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        DistributeRemaining::new().execute(&mut builder, &order);
        // A and B never share a date
        for day in 1..=6 {
            let on_duty = builder.schedule().workers_on(date(day));
            assert!(!(on_duty.contains(&"A") && on_duty.contains(&"B")));
        }
        assert!(builder.verify_invariants().is_ok());
    }
}
