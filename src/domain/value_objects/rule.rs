//! Rule value object module
//!
//! This module defines the constraint rule kinds, the violation record every
//! predicate returns on failure, and the typed outcome of a transform.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of constraint rules checked by the engine
///
/// Hard rules (availability, incompatibility, target cap, double booking) are
/// enforced in every mode. The remaining kinds are soft: hard in Strict mode,
/// deficit-gated in Relaxed mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleKind {
    /// Worker unavailable on the date (day off or outside work periods)
    Availability,
    /// An incompatible worker is already assigned on the date
    Incompatibility,
    /// Accepting would exceed the +10% hard cap over target
    TargetCap,
    /// Worker already holds a post on the date
    DoubleBooking,
    /// Minimum gap between two assignments of the worker
    MinGap,
    /// Two same-weekday assignments 7 or 14 days apart
    Pattern,
    /// Per-month count outside the expected envelope
    MonthlyBalance,
    /// Special-day count outside the expected envelope
    WeekendBalance,
    /// Last-post count outside the fair-share envelope
    LastPostBalance,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuleKind::Availability => "availability",
            RuleKind::Incompatibility => "incompatibility",
            RuleKind::TargetCap => "target_cap",
            RuleKind::DoubleBooking => "double_booking",
            RuleKind::MinGap => "min_gap",
            RuleKind::Pattern => "pattern_7_14",
            RuleKind::MonthlyBalance => "monthly_balance",
            RuleKind::WeekendBalance => "weekend_balance",
            RuleKind::LastPostBalance => "last_post_balance",
        };
        write!(f, "{}", name)
    }
}

/// A failed predicate with the rule that failed and a human-readable reason
///
/// Every predicate returns a pass/fail verdict carrying its reason so the
/// audit trail can explain why a candidate was rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleViolation {
    pub rule: RuleKind,
    pub worker_id: String,
    pub date: NaiveDate,
    pub reason: String,
}

impl RuleViolation {
    pub fn new(rule: RuleKind, worker_id: &str, date: NaiveDate, reason: impl Into<String>) -> Self {
        Self {
            rule,
            worker_id: worker_id.to_string(),
            date,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} on {}: {}", self.rule, self.worker_id, self.date, self.reason)
    }
}

/// Typed outcome of a schedule transform
///
/// Blocked outcomes come from the protection oracle and are never surfaced
/// as success; rejected outcomes carry the reason the transform was undone.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    /// The transform was applied and the invariant check passed
    Accepted,
    /// The transform was rolled back
    Rejected(String),
    /// The protection oracle refused to touch a locked mandatory assignment
    Blocked { op: String },
}

impl TransformOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, TransformOutcome::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_kind_display() {
        assert_eq!(RuleKind::Pattern.to_string(), "pattern_7_14");
        assert_eq!(RuleKind::TargetCap.to_string(), "target_cap");
    }

    #[test]
    fn test_outcome_accepted() {
        assert!(TransformOutcome::Accepted.is_accepted());
        assert!(!TransformOutcome::Rejected("gap".to_string()).is_accepted());
        assert!(!TransformOutcome::Blocked { op: "fill".to_string() }.is_accepted());
    }
}
