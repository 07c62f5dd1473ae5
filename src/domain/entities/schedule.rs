//! Schedule entity module
//!
//! This module defines the Schedule: the date-to-posts assignment map, the
//! derived per-worker assignment index, and the append-only locked-mandatory
//! set. The two maps are kept coherent through the assign/clear primitives;
//! everything richer (transforms, scoring) lives in the schedule builder.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A (date, post) pair addressing one assignable position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot {
    pub date: NaiveDate,
    pub post: usize,
}

impl Slot {
    pub fn new(date: NaiveDate, post: usize) -> Self {
        Self { date, post }
    }
}

/// The duty roster under construction
///
/// Maps every date of the range to an ordered sequence of posts, each filled
/// by at most one worker. The per-worker index is derived and maintained
/// transactionally with every slot change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    start: NaiveDate,
    end: NaiveDate,
    num_posts: usize,
    slots: BTreeMap<NaiveDate, Vec<Option<String>>>,
    /// Derived worker -> sorted assignment dates; rebuilt after deserialization
    #[serde(skip)]
    assignments: HashMap<String, BTreeSet<NaiveDate>>,
    /// Append-only after the mandatory phase
    locked_mandatory: BTreeSet<(String, NaiveDate)>,
}

impl Schedule {
    /// Creates an empty schedule covering [start, end] with the given number
    /// of posts per date
    pub fn new(start: NaiveDate, end: NaiveDate, num_posts: usize) -> Self {
        let mut slots = BTreeMap::new();
        let mut date = start;
        while date <= end {
            slots.insert(date, vec![None; num_posts]);
            date += Duration::days(1);
        }
        Self {
            start,
            end,
            num_posts,
            slots,
            assignments: HashMap::new(),
            locked_mandatory: BTreeSet::new(),
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn num_posts(&self) -> usize {
        self.num_posts
    }

    pub fn num_days(&self) -> u32 {
        (self.end - self.start).num_days() as u32 + 1
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Iterates all dates of the range in order
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.slots.keys().copied()
    }

    /// Returns the worker at a slot, if any
    pub fn worker_at(&self, date: NaiveDate, post: usize) -> Option<&str> {
        self.slots.get(&date)?.get(post)?.as_deref()
    }

    /// Returns the post a worker holds on a date, if any
    pub fn post_of(&self, worker_id: &str, date: NaiveDate) -> Option<usize> {
        self.slots
            .get(&date)?
            .iter()
            .position(|p| p.as_deref() == Some(worker_id))
    }

    /// Returns the ids of all workers assigned on a date
    pub fn workers_on(&self, date: NaiveDate) -> Vec<&str> {
        self.slots
            .get(&date)
            .map(|posts| posts.iter().filter_map(|p| p.as_deref()).collect())
            .unwrap_or_default()
    }

    /// Returns the first empty post index on a date, if any
    pub fn first_empty_post(&self, date: NaiveDate) -> Option<usize> {
        self.slots.get(&date)?.iter().position(|p| p.is_none())
    }

    /// Iterates every empty slot in date order
    pub fn empty_slots(&self) -> Vec<Slot> {
        self.slots
            .iter()
            .flat_map(|(date, posts)| {
                posts
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.is_none())
                    .map(|(post, _)| Slot::new(*date, post))
            })
            .collect()
    }

    /// Iterates every filled slot as (date, post, worker id)
    pub fn filled_slots(&self) -> Vec<(NaiveDate, usize, String)> {
        self.slots
            .iter()
            .flat_map(|(date, posts)| {
                posts
                    .iter()
                    .enumerate()
                    .filter_map(move |(post, p)| p.as_ref().map(|w| (*date, post, w.clone())))
            })
            .collect()
    }

    /// Writes a worker into a slot, keeping the assignment index coherent
    ///
    /// Returns false when the slot is occupied, the worker already holds a
    /// post on the date, or the slot address is outside the roster.
    pub fn assign(&mut self, worker_id: &str, date: NaiveDate, post: usize) -> bool {
        let Some(posts) = self.slots.get_mut(&date) else {
            return false;
        };
        if post >= posts.len() || posts[post].is_some() {
            return false;
        }
        if posts.iter().any(|p| p.as_deref() == Some(worker_id)) {
            return false;
        }
        posts[post] = Some(worker_id.to_string());
        self.assignments
            .entry(worker_id.to_string())
            .or_default()
            .insert(date);
        true
    }

    /// Clears a slot, keeping the assignment index coherent
    ///
    /// Returns the removed worker id, or None when the slot was empty.
    pub fn clear(&mut self, date: NaiveDate, post: usize) -> Option<String> {
        let posts = self.slots.get_mut(&date)?;
        let removed = posts.get_mut(post)?.take()?;
        if let Some(dates) = self.assignments.get_mut(&removed) {
            dates.remove(&date);
            if dates.is_empty() {
                self.assignments.remove(&removed);
            }
        }
        Some(removed)
    }

    /// Total shifts currently held by a worker
    pub fn count(&self, worker_id: &str) -> u32 {
        self.assignments
            .get(worker_id)
            .map(|d| d.len() as u32)
            .unwrap_or(0)
    }

    /// Sorted assignment dates of a worker
    pub fn assignment_dates(&self, worker_id: &str) -> Vec<NaiveDate> {
        self.assignments
            .get(worker_id)
            .map(|d| d.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Minimum day distance from a date to any assignment of the worker
    pub fn min_distance(&self, worker_id: &str, date: NaiveDate) -> Option<u32> {
        self.assignments.get(worker_id).and_then(|dates| {
            dates
                .iter()
                .map(|d| (*d - date).num_days().unsigned_abs() as u32)
                .min()
        })
    }

    /// Counts assignments of a worker on dates satisfying a predicate
    pub fn count_dates_where<F>(&self, worker_id: &str, predicate: F) -> u32
    where
        F: Fn(NaiveDate) -> bool,
    {
        self.assignments
            .get(worker_id)
            .map(|dates| dates.iter().filter(|d| predicate(**d)).count() as u32)
            .unwrap_or(0)
    }

    /// Counts a worker's assignments within a calendar month of the range
    pub fn month_count(&self, worker_id: &str, year: i32, month: u32) -> u32 {
        self.count_dates_where(worker_id, |d| d.year() == year && d.month() == month)
    }

    /// Counts a worker's assignments on the last post
    pub fn last_post_count(&self, worker_id: &str) -> u32 {
        let last = self.num_posts - 1;
        self.slots
            .values()
            .filter(|posts| posts[last].as_deref() == Some(worker_id))
            .count() as u32
    }

    pub fn total_slots(&self) -> u32 {
        self.num_days() * self.num_posts as u32
    }

    pub fn empty_slot_count(&self) -> u32 {
        self.slots
            .values()
            .map(|posts| posts.iter().filter(|p| p.is_none()).count() as u32)
            .sum()
    }

    pub fn coverage_percent(&self) -> f64 {
        let total = self.total_slots();
        if total == 0 {
            return 100.0;
        }
        (total - self.empty_slot_count()) as f64 / total as f64 * 100.0
    }

    /// Adds a (worker, date) pair to the locked mandatory set
    pub fn lock_mandatory(&mut self, worker_id: &str, date: NaiveDate) {
        self.locked_mandatory
            .insert((worker_id.to_string(), date));
    }

    pub fn is_locked(&self, worker_id: &str, date: NaiveDate) -> bool {
        self.locked_mandatory
            .contains(&(worker_id.to_string(), date))
    }

    pub fn locked_mandatory(&self) -> &BTreeSet<(String, NaiveDate)> {
        &self.locked_mandatory
    }

    /// Shifts a worker holds on locked mandatory dates
    pub fn locked_count(&self, worker_id: &str) -> u32 {
        self.locked_mandatory
            .iter()
            .filter(|(w, _)| w == worker_id)
            .count() as u32
    }

    /// Rebuilds the derived worker index from the slot map
    ///
    /// Needed after deserialization, where the index is skipped.
    pub fn rebuild_index(&mut self) {
        self.assignments.clear();
        for (date, posts) in &self.slots {
            for worker in posts.iter().flatten() {
                self.assignments
                    .entry(worker.clone())
                    .or_default()
                    .insert(*date);
            }
        }
    }

    /// Verifies that the slot map and the worker index agree (invariant I1)
    pub fn is_coherent(&self) -> bool {
        let mut derived: HashMap<String, BTreeSet<NaiveDate>> = HashMap::new();
        for (date, posts) in &self.slots {
            for worker in posts.iter().flatten() {
                derived.entry(worker.clone()).or_default().insert(*date);
            }
        }
        derived == self.assignments
    }

    /// Verifies that every locked mandatory pair is present on its date
    /// (invariant I2)
    pub fn locked_all_present(&self) -> bool {
        self.locked_mandatory
            .iter()
            .all(|(worker, date)| self.post_of(worker, *date).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn schedule() -> Schedule {
        Schedule::new(date(1), date(10), 2)
    }

    #[test]
    fn test_new_schedule_is_empty() {
        let s = schedule();
        assert_eq!(s.num_days(), 10);
        assert_eq!(s.total_slots(), 20);
        assert_eq!(s.empty_slot_count(), 20);
        assert_eq!(s.coverage_percent(), 0.0);
    }

    #[test]
    fn test_assign_and_clear_keep_index_coherent() {
        let mut s = schedule();
        assert!(s.assign("W1", date(3), 0));
        assert!(s.assign("W1", date(7), 1));
        assert_eq!(s.count("W1"), 2);
        assert!(s.is_coherent());

        assert_eq!(s.clear(date(3), 0), Some("W1".to_string()));
        assert_eq!(s.count("W1"), 1);
        assert!(s.is_coherent());
    }

    #[test]
    fn test_double_booking_rejected() {
        let mut s = schedule();
        assert!(s.assign("W1", date(3), 0));
        assert!(!s.assign("W1", date(3), 1));
        assert!(!s.assign("W2", date(3), 0));
    }

    #[test]
    fn test_min_distance() {
        let mut s = schedule();
        s.assign("W1", date(2), 0);
        s.assign("W1", date(9), 0);
        assert_eq!(s.min_distance("W1", date(4)), Some(2));
        assert_eq!(s.min_distance("W2", date(4)), None);
    }

    #[test]
    fn test_locked_mandatory_tracking() {
        let mut s = schedule();
        s.assign("W1", date(5), 0);
        s.lock_mandatory("W1", date(5));
        assert!(s.is_locked("W1", date(5)));
        assert!(s.locked_all_present());
        assert_eq!(s.locked_count("W1"), 1);

        s.clear(date(5), 0);
        assert!(!s.locked_all_present());
    }

    #[test]
    fn test_last_post_count() {
        let mut s = schedule();
        s.assign("W1", date(1), 1);
        s.assign("W1", date(4), 1);
        s.assign("W1", date(8), 0);
        assert_eq!(s.last_post_count("W1"), 2);
    }

    #[test]
    fn test_rebuild_index_matches() {
        let mut s = schedule();
        s.assign("W1", date(2), 0);
        s.assign("W2", date(2), 1);
        s.assign("W1", date(6), 1);

        let json = serde_json::to_string(&s).unwrap();
        let mut restored: Schedule = serde_json::from_str(&json).unwrap();
        restored.rebuild_index();
        assert!(restored.is_coherent());
        assert_eq!(restored.count("W1"), 2);
        assert_eq!(restored.count("W2"), 1);
    }

    proptest! {
        #[test]
        fn prop_assign_clear_roundtrip(day in 1u32..=10, post in 0usize..2) {
            let mut s = schedule();
            let before = s.clone();
            prop_assert!(s.assign("W1", date(day), post));
            s.clear(date(day), post);
            prop_assert!(s.is_coherent());
            prop_assert_eq!(s.count("W1"), 0);
            prop_assert_eq!(s.empty_slot_count(), before.empty_slot_count());
        }
    }
}
