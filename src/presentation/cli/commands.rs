//! CLI Commands module
//!
//! This module provides command implementations for the CLI interface,
//! including roster solving, report generation, checkpoint handling, and
//! summary printing.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::application::use_cases::generate_roster::{GenerateRoster, RosterResult};
use crate::infrastructure::output::Checkpoint;
use crate::infrastructure::parsers::ConfigParser;
use crate::presentation::dto::RosterOutput;

/// Command for solving a roster and emitting the JSON report
///
/// Parses the config document, runs the full phase sequence, writes the
/// report to stdout or a file, and maps the outcome onto the exit code
/// contract (0 clean, 1 violations, 2 low coverage, 3 configuration error).
pub struct SolveCommand;

impl SolveCommand {
    /// Executes the solve command and returns the process exit code
    ///
    /// # Arguments
    ///
    /// * `config_path` - Path to the roster config JSON file
    /// * `output_path` - Optional report destination; stdout when absent
    /// * `checkpoint_path` - Optional schedule checkpoint destination
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be parsed, the roster
    /// definition is structurally invalid, or an output file cannot be
    /// written.
    pub fn execute(
        config_path: &Path,
        output_path: Option<&Path>,
        checkpoint_path: Option<&Path>,
    ) -> Result<i32> {
        info!("Loading roster config: {:?}", config_path);
        let parser = ConfigParser::new();
        let problem = parser
            .parse_file(config_path)
            .context("Failed to parse roster config")?;

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
                .template("{spinner:.cyan} {msg}")
                .unwrap(),
        );
        spinner.set_message("🧩 Solving roster...");
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));

        let result = GenerateRoster::new()
            .execute(&problem)
            .context("Roster generation failed")?;

        spinner.finish_with_message(format!(
            "✓ Solve finished with {:.1}% coverage",
            result.termination.coverage_percent
        ));

        let output = RosterOutput::from_result(&result);
        let report = serde_json::to_string_pretty(&output)
            .context("Failed to serialize roster report")?;
        match output_path {
            Some(path) => {
                info!("Writing JSON report: {:?}", path);
                fs::write(path, &report)
                    .with_context(|| format!("Failed to write JSON report {:?}", path))?;
                Self::print_summary(&result);
            }
            None => {
                // Report goes to stdout; keep it machine-readable
                println!("{}", report);
            }
        }

        if let Some(path) = checkpoint_path {
            info!("Writing schedule checkpoint: {:?}", path);
            Checkpoint::new()
                .save(&result.schedule, path)
                .context("Failed to write checkpoint")?;
        }

        Ok(Self::exit_code(&result))
    }

    /// Maps a result onto the exit-code contract
    fn exit_code(result: &RosterResult) -> i32 {
        if !result.config_issues.is_empty() {
            return 3;
        }
        let coverage = result.termination.coverage_percent;
        let violations = result.violation_report.total();
        if coverage >= 95.0 {
            if violations == 0 {
                0
            } else {
                1
            }
        } else {
            2
        }
    }

    /// Prints a comprehensive solve summary to the console
    fn print_summary(result: &RosterResult) {
        println!("\n{}", "=".repeat(80));
        println!("📊 ROSTER GENERATION SUMMARY");
        println!("{}", "=".repeat(80));

        Self::print_overall(result);
        Self::print_worker_table(result);
        Self::print_violations(result);
        Self::print_attempts(result);
        Self::print_config_issues(result);

        println!("\n{}", "=".repeat(80));
    }

    fn print_overall(result: &RosterResult) {
        let t = &result.termination;
        println!("\n📈 Overall:");
        println!("  • Days:                    {}", result.schedule.num_days());
        println!("  • Posts per day:           {}", result.schedule.num_posts());
        println!("  • Coverage:                {:.1}%", t.coverage_percent);
        println!("  • Empty slots:             {}", result.schedule.empty_slot_count());
        println!("  • Violations:              {}", result.violation_report.total());
        println!("  • Optimizer iterations:    {}", t.iterations_run);
        println!("  • Converged:               {}", if t.converged { "yes" } else { "no" });
        println!("  • Mode history:            {}", t.mode_history.join(" → "));
        if t.phase2_escalated {
            println!("  ⚠️  Emergency tolerance phase was activated");
        }
        if t.blocked_attempts > 0 {
            println!(
                "  • Blocked mutation attempts on mandatory slots: {}",
                t.blocked_attempts
            );
        }
    }

    fn print_worker_table(result: &RosterResult) {
        println!("\n👥 Worker balance:");
        for stats in &result.worker_stats {
            let b = &stats.balance;
            println!(
                "  {:<12} {:>3}/{:<3} shifts  dev {:>6.1}%  [{}]  weekends: {}  last post: {}",
                b.worker_id,
                b.count,
                b.target,
                b.deviation_percent,
                b.classification,
                stats.weekend_count,
                stats.last_post_count
            );
        }
    }

    fn print_violations(result: &RosterResult) {
        let report = &result.violation_report;
        if report.total() == 0 && report.mandatory_overrides.is_empty() {
            println!("\n✅ No residual constraint violations");
            return;
        }
        if report.total() > 0 {
            println!("\n⚠️  Violations by kind:");
            for (kind, count) in report.counts_by_kind() {
                println!("  • {:<20} {}", kind.to_string(), count);
            }
        }
        for note in &report.mandatory_overrides {
            println!("  • override: {}", note);
        }
    }

    fn print_attempts(result: &RosterResult) {
        println!("\n🔁 Initial attempts:");
        for (i, attempt) in result.termination.attempts.iter().enumerate() {
            println!(
                "  {}. {:<18} score {:>10.0}  empty {:>3}  imbalance {:>6.1}",
                i + 1,
                attempt.strategy,
                attempt.overall_score,
                attempt.empty_slots,
                attempt.work_imbalance
            );
        }
    }

    fn print_config_issues(result: &RosterResult) {
        if result.config_issues.is_empty() {
            return;
        }
        println!("\n🚫 Configuration issues:");
        for issue in &result.config_issues {
            println!("  • {}", issue);
        }
    }
}

/// Command verifying a schedule checkpoint on disk
pub struct CheckCommand;

impl CheckCommand {
    /// Executes the checkpoint verification command
    ///
    /// # Arguments
    ///
    /// * `checkpoint_path` - Path to the checkpoint JSON file
    ///
    /// # Returns
    ///
    /// Exit code 0 when the checkpoint round-trips cleanly
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the checkpoint breaks
    /// an invariant on load
    pub fn execute(checkpoint_path: &Path) -> Result<i32> {
        info!("Verifying checkpoint: {:?}", checkpoint_path);
        let schedule = Checkpoint::new()
            .load(checkpoint_path)
            .context("Checkpoint verification failed")?;

        println!("✓ Checkpoint is coherent");
        println!("  • Range:          {} .. {}", schedule.start(), schedule.end());
        println!("  • Posts per day:  {}", schedule.num_posts());
        println!("  • Coverage:       {:.1}%", schedule.coverage_percent());
        println!("  • Locked pairs:   {}", schedule.locked_mandatory().len());
        Ok(0)
    }
}
