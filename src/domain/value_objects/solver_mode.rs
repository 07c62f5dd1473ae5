//! Solver Mode value object module
//!
//! This module defines the dual constraint regime of the engine and the
//! tolerance phases available inside the relaxed regime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Constraint regime under which candidate assignments are checked
///
/// In Strict mode every soft predicate is enforced as hard. In Relaxed mode
/// soft predicates are gated by per-worker deficit. The initial distribution
/// runs Strict; the optimizer and the final push run Relaxed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SolverMode {
    /// Soft predicates enforced as hard; used for the initial distribution
    Strict,
    /// Soft predicates gated by per-worker deficit; used for optimization
    Relaxed,
}

impl SolverMode {
    /// Checks whether this mode permits deficit-based relaxations
    pub fn is_relaxed(&self) -> bool {
        matches!(self, SolverMode::Relaxed)
    }
}

impl fmt::Display for SolverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverMode::Strict => write!(f, "strict"),
            SolverMode::Relaxed => write!(f, "relaxed"),
        }
    }
}

/// Tolerance tier within the relaxed regime
///
/// Phase1 targets deviations within the configured tolerance; Phase2 widens
/// the envelope to the emergency tolerance. The transition is one-way and
/// happens only when coverage stays below 95% and progress stalls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum TolerancePhase {
    /// Deviation goal within the base tolerance (default ±8%)
    Phase1,
    /// Absolute cap at the emergency tolerance (default ±12%)
    Phase2,
}

impl TolerancePhase {
    /// Returns the deviation envelope percent for this phase
    ///
    /// # Arguments
    ///
    /// * `tolerance_percent` - Base tolerance knob (Phase1)
    /// * `emergency_tolerance` - Emergency tolerance knob (Phase2)
    pub fn envelope_percent(&self, tolerance_percent: f64, emergency_tolerance: f64) -> f64 {
        match self {
            TolerancePhase::Phase1 => tolerance_percent,
            TolerancePhase::Phase2 => emergency_tolerance,
        }
    }
}

impl fmt::Display for TolerancePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TolerancePhase::Phase1 => write!(f, "phase1"),
            TolerancePhase::Phase2 => write!(f, "phase2"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_is_relaxed() {
        assert!(!SolverMode::Strict.is_relaxed());
        assert!(SolverMode::Relaxed.is_relaxed());
    }

    #[test]
    fn test_phase_envelope() {
        assert_eq!(TolerancePhase::Phase1.envelope_percent(8.0, 12.0), 8.0);
        assert_eq!(TolerancePhase::Phase2.envelope_percent(8.0, 12.0), 12.0);
    }

    #[test]
    fn test_phase_ordering_is_one_way() {
        assert!(TolerancePhase::Phase1 < TolerancePhase::Phase2);
    }
}
