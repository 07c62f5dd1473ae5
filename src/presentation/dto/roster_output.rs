use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::application::use_cases::generate_roster::{RosterResult, TerminationMetadata};

/// Sentinel written into unfilled posts
const EMPTY_SENTINEL: &str = "empty";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterOutput {
    pub summary: SummaryOutput,
    pub schedule: Vec<DayOutput>,
    pub worker_stats: Vec<WorkerStatsOutput>,
    pub violations: ViolationsOutput,
    pub termination: TerminationMetadata,
    pub config_issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryOutput {
    pub generated_date: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub num_posts: usize,
    pub total_slots: u32,
    pub empty_slots: u32,
    pub coverage_percent: f64,
    pub total_violations: usize,
    pub all_within_tolerance: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayOutput {
    pub date: NaiveDate,
    /// Worker id per post, or the "empty" sentinel
    pub posts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatsOutput {
    pub id: String,
    pub count: u32,
    pub target: u32,
    pub weekend_count: u32,
    pub last_post_count: u32,
    pub deviation_percent: f64,
    pub classification: String,
    pub weekday_counts: [u32; 7],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationsOutput {
    pub total: usize,
    pub counts_by_kind: BTreeMap<String, usize>,
    pub details: Vec<ViolationDetailOutput>,
    pub mandatory_overrides: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationDetailOutput {
    pub kind: String,
    pub worker_id: String,
    pub date: NaiveDate,
    pub reason: String,
}

impl RosterOutput {
    pub fn from_result(result: &RosterResult) -> Self {
        let schedule = result
            .schedule
            .dates()
            .map(|date| DayOutput {
                date,
                posts: (0..result.schedule.num_posts())
                    .map(|post| {
                        result
                            .schedule
                            .worker_at(date, post)
                            .unwrap_or(EMPTY_SENTINEL)
                            .to_string()
                    })
                    .collect(),
            })
            .collect();

        let worker_stats = result
            .worker_stats
            .iter()
            .map(|stats| WorkerStatsOutput {
                id: stats.balance.worker_id.clone(),
                count: stats.balance.count,
                target: stats.balance.target,
                weekend_count: stats.weekend_count,
                last_post_count: stats.last_post_count,
                deviation_percent: stats.balance.deviation_percent,
                classification: stats.balance.classification.to_string(),
                weekday_counts: stats.weekday_counts,
            })
            .collect();

        let violations = ViolationsOutput {
            total: result.violation_report.total(),
            counts_by_kind: result
                .violation_report
                .counts_by_kind()
                .into_iter()
                .map(|(kind, count)| (kind.to_string(), count))
                .collect(),
            details: result
                .violation_report
                .violations
                .iter()
                .map(|v| ViolationDetailOutput {
                    kind: v.rule.to_string(),
                    worker_id: v.worker_id.clone(),
                    date: v.date,
                    reason: v.reason.clone(),
                })
                .collect(),
            mandatory_overrides: result.violation_report.mandatory_overrides.clone(),
        };

        let summary = SummaryOutput {
            generated_date: Utc::now().format("%Y-%m-%d").to_string(),
            start_date: result.schedule.start(),
            end_date: result.schedule.end(),
            num_posts: result.schedule.num_posts(),
            total_slots: result.schedule.total_slots(),
            empty_slots: result.schedule.empty_slot_count(),
            coverage_percent: result.termination.coverage_percent,
            total_violations: result.violation_report.total(),
            all_within_tolerance: result.tolerance.all_within,
        };

        Self {
            summary,
            schedule,
            worker_stats,
            violations,
            termination: result.termination.clone(),
            config_issues: result.config_issues.iter().map(|i| i.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::GenerateRoster;
    use crate::domain::entities::{RosterProblem, Worker};

    #[test]
    fn test_empty_sentinel_in_output() {
        let workers = vec![Worker::new("A", 1).with_gap(1)];
        let problem = RosterProblem::new(
            workers,
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 3).unwrap(),
            1,
        );
        let result = GenerateRoster::new().execute(&problem).unwrap();
        let output = RosterOutput::from_result(&result);

        assert_eq!(output.schedule.len(), 3);
        let rendered: Vec<&String> = output.schedule.iter().flat_map(|d| &d.posts).collect();
        assert!(rendered.iter().any(|p| p.as_str() == "A"));
        assert!(rendered.iter().any(|p| p.as_str() == "empty"));
    }

    #[test]
    fn test_report_document_shape() {
        let workers = vec![
            Worker::new("A", 5).with_gap(1),
            Worker::new("B", 5).with_gap(1),
        ];
        let problem = RosterProblem::new(
            workers,
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            1,
        );
        let result = GenerateRoster::new().execute(&problem).unwrap();
        let output = RosterOutput::from_result(&result);

        let json = serde_json::to_string_pretty(&output).unwrap();
        assert!(json.contains("coverage_percent"));
        assert!(json.contains("worker_stats"));
        assert!(json.contains("mode_history"));
    }
}
