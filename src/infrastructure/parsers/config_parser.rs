//! Roster Config Parser module
//!
//! This module provides functionality to parse roster configuration JSON
//! documents and convert them into the domain problem definition (workers,
//! range, posts, holidays, policy knobs).

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::domain::entities::{DateInterval, RosterProblem, Worker};
use crate::domain::value_objects::SolverPolicy;

/// On-disk worker definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub id: String,
    #[serde(default = "default_percentage")]
    pub work_percentage: u8,
    /// Explicit target; absent or zero means "derive from percentage"
    #[serde(default)]
    pub target_shifts: u32,
    #[serde(default)]
    pub work_periods: Vec<PeriodConfig>,
    #[serde(default)]
    pub days_off: Vec<NaiveDate>,
    #[serde(default)]
    pub mandatory_days: Vec<NaiveDate>,
    #[serde(default)]
    pub incompatible_with: Vec<String>,
    #[serde(default = "default_gap")]
    pub gap_between_shifts: u32,
    #[serde(default = "default_weekend_cap")]
    pub max_consecutive_weekends: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PeriodConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

fn default_percentage() -> u8 {
    100
}

fn default_gap() -> u32 {
    3
}

fn default_weekend_cap() -> u32 {
    3
}

/// On-disk roster configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub num_posts: usize,
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
    #[serde(default)]
    pub policy: Option<SolverPolicy>,
    pub workers: Vec<WorkerConfig>,
}

/// Parser for roster configuration JSON files
pub struct ConfigParser;

impl ConfigParser {
    pub fn new() -> Self {
        Self
    }

    /// Parses a configuration file from disk into a problem definition
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the config JSON file
    ///
    /// # Returns
    ///
    /// The assembled problem definition
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the JSON does not
    /// match the expected document shape.
    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<RosterProblem> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {:?}", path.as_ref()))?;
        self.parse_str(&content)
    }

    /// Parses a configuration document from a JSON string
    ///
    /// # Arguments
    ///
    /// * `content` - The JSON document text
    ///
    /// # Returns
    ///
    /// The assembled problem definition
    ///
    /// # Errors
    ///
    /// Returns an error when the JSON does not match the document shape
    pub fn parse_str(&self, content: &str) -> Result<RosterProblem> {
        let config: RosterConfig =
            serde_json::from_str(content).context("Failed to parse roster config JSON")?;
        Ok(self.to_problem(config))
    }

    fn to_problem(&self, config: RosterConfig) -> RosterProblem {
        let workers = config
            .workers
            .into_iter()
            .map(|w| {
                let mut worker = Worker::new(w.id, w.target_shifts)
                    .with_work_percentage(w.work_percentage)
                    .with_gap(w.gap_between_shifts);
                worker.max_consecutive_weekends = w.max_consecutive_weekends;
                worker.work_periods = w
                    .work_periods
                    .iter()
                    .map(|p| DateInterval::new(p.start, p.end))
                    .collect();
                worker.days_off = w.days_off.into_iter().collect();
                worker.mandatory_days = w.mandatory_days.into_iter().collect();
                worker.incompatible_with = w.incompatible_with.into_iter().collect();
                worker
            })
            .collect();

        let mut problem = RosterProblem::new(
            workers,
            config.start_date,
            config.end_date,
            config.num_posts,
        )
        .with_holidays(config.holidays);
        if let Some(policy) = config.policy {
            problem = problem.with_policy(policy);
        }
        problem
    }
}

impl Default for ConfigParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "start_date": "2026-03-01",
        "end_date": "2026-03-31",
        "num_posts": 2,
        "holidays": ["2026-03-19"],
        "policy": { "tolerance_percent": 8.0, "seed": 7 },
        "workers": [
            {
                "id": "W1",
                "work_percentage": 100,
                "mandatory_days": ["2026-03-10"],
                "incompatible_with": ["W2"],
                "gap_between_shifts": 2
            },
            { "id": "W2", "work_percentage": 50 }
        ]
    }"#;

    #[test]
    fn test_parse_sample_config() {
        let problem = ConfigParser::new().parse_str(SAMPLE).unwrap();
        assert_eq!(problem.num_posts, 2);
        assert_eq!(problem.workers.len(), 2);
        assert!(problem.holidays.contains(&NaiveDate::from_ymd_opt(2026, 3, 19).unwrap()));
        assert_eq!(problem.policy.seed, 7);

        let w1 = problem.worker("W1").unwrap();
        assert_eq!(w1.gap_between_shifts, 2);
        assert!(w1.is_mandatory(NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()));
        assert!(w1.is_incompatible_with("W2"));

        let w2 = problem.worker("W2").unwrap();
        assert_eq!(w2.work_percentage, 50);
        assert_eq!(w2.gap_between_shifts, 3);
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        assert!(ConfigParser::new().parse_str("{ not json").is_err());
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        assert!(ConfigParser::new().parse_str(r#"{ "num_posts": 1 }"#).is_err());
    }
}
