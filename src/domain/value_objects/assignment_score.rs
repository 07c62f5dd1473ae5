//! Assignment Score value object module
//!
//! This module defines the AssignmentScore value object used to rank
//! candidate (worker, date, post) assignments during selection.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Represents the desirability of placing a worker into a slot
///
/// Scores are produced by the schedule builder's scoring function. The
/// ordering is total (NaN-free by construction); ties between candidates are
/// broken at the selection site by current count and then worker id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AssignmentScore(f64);

impl AssignmentScore {
    /// Creates a new AssignmentScore with the given value
    pub fn new(score: f64) -> Self {
        Self(score)
    }

    /// Returns the numeric value of the score
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Adds a bonus (or, when negative, a penalty) to this score
    pub fn add(&self, bonus: f64) -> Self {
        Self(self.0 + bonus)
    }
}

impl Eq for AssignmentScore {}

impl PartialOrd for AssignmentScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AssignmentScore {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for AssignmentScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

impl From<f64> for AssignmentScore {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_ordering() {
        let low = AssignmentScore::new(500.0);
        let high = AssignmentScore::new(25000.0);
        assert!(low < high);
    }

    #[test]
    fn test_score_add() {
        let score = AssignmentScore::new(100.0).add(400.0).add(-50.0);
        assert_eq!(score.value(), 450.0);
    }
}
