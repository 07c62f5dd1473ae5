//! Solver Policy value object module
//!
//! Tunable knobs for the assignment engine. Values come from the config
//! document; every field has a sensible default.

use serde::{Deserialize, Serialize};

/// Policy knobs controlling tolerances, seeding, and budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverPolicy {
    /// Base deviation tolerance percent (Phase1 envelope)
    #[serde(default = "default_tolerance")]
    pub tolerance_percent: f64,
    /// Emergency deviation tolerance percent (Phase2 absolute cap)
    #[serde(default = "default_emergency")]
    pub emergency_tolerance: f64,
    /// Critical classification boundary percent
    #[serde(default = "default_critical")]
    pub critical_tolerance: f64,
    /// Seed for ordering strategies and perturbations
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Optional wall-clock budget in milliseconds, checked between iterations
    #[serde(default)]
    pub time_budget_ms: Option<u64>,
    /// Optional override of the adaptive max iteration count
    #[serde(default)]
    pub max_iterations: Option<u32>,
    /// Optional override of the adaptive initial attempt count
    #[serde(default)]
    pub initial_attempts: Option<u32>,
}

fn default_tolerance() -> f64 {
    8.0
}

fn default_emergency() -> f64 {
    12.0
}

fn default_critical() -> f64 {
    15.0
}

fn default_seed() -> u64 {
    42
}

impl Default for SolverPolicy {
    fn default() -> Self {
        Self {
            tolerance_percent: default_tolerance(),
            emergency_tolerance: default_emergency(),
            critical_tolerance: default_critical(),
            seed: default_seed(),
            time_budget_ms: None,
            max_iterations: None,
            initial_attempts: None,
        }
    }
}

impl SolverPolicy {
    /// Emergency classification boundary, between the base tolerance and the
    /// critical boundary (defaults 8 / 10 / 15)
    pub fn emergency_classification_boundary(&self) -> f64 {
        (self.tolerance_percent + 2.0).min(self.critical_tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = SolverPolicy::default();
        assert_eq!(policy.tolerance_percent, 8.0);
        assert_eq!(policy.emergency_tolerance, 12.0);
        assert_eq!(policy.critical_tolerance, 15.0);
        assert_eq!(policy.seed, 42);
        assert!(policy.time_budget_ms.is_none());
    }
}
