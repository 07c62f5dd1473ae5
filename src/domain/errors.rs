//! Domain errors module
//!
//! Configuration problems are reported, not recovered: the affected slot is
//! left empty and the final report flags the issue. The CLI maps a non-empty
//! issue list to exit code 3.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A configuration-level problem detected while building the roster
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
pub enum ConfigIssue {
    #[error("mandatory clash on {date}: {worker_id} is incompatible with already-placed {conflicting_id}")]
    MandatoryClash {
        worker_id: String,
        conflicting_id: String,
        date: NaiveDate,
    },

    #[error("mandatory day {date} for {worker_id} falls on a day off or outside every work period")]
    MandatoryUnavailable { worker_id: String, date: NaiveDate },

    #[error("no free post left on {date} for mandatory worker {worker_id}")]
    MandatoryNoFreePost { worker_id: String, date: NaiveDate },

    #[error("gap {gap} for {worker_id} exceeds the {range_days}-day roster range")]
    GapLargerThanRange {
        worker_id: String,
        gap: u32,
        range_days: u32,
    },

    #[error("invalid roster definition: {0}")]
    InvalidDefinition(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_display() {
        let issue = ConfigIssue::MandatoryUnavailable {
            worker_id: "W1".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 2, 10).unwrap(),
        };
        let text = issue.to_string();
        assert!(text.contains("W1"));
        assert!(text.contains("2026-02-10"));
    }
}
