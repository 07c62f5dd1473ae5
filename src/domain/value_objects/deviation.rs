//! Deviation value object module
//!
//! This module defines the per-worker target deviation computation and the
//! classification bands used by the balance validator and the final report.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a worker's deviation from their shift target
///
/// Bands are driven by three thresholds: the base tolerance, the emergency
/// threshold, and the critical threshold. Anything beyond critical is
/// classified as extreme.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviationClass {
    /// |deviation| within the base tolerance
    Within,
    /// Above tolerance but within the emergency threshold
    Emergency,
    /// Above emergency but within the critical threshold
    Critical,
    /// Beyond the critical threshold
    Extreme,
}

impl DeviationClass {
    /// Classifies an absolute deviation percent against the given thresholds
    ///
    /// # Arguments
    ///
    /// * `abs_deviation_percent` - Absolute value of the deviation percent
    /// * `tolerance` - Base tolerance boundary (default 8)
    /// * `emergency` - Emergency boundary (default 10)
    /// * `critical` - Critical boundary (default 15)
    pub fn classify(abs_deviation_percent: f64, tolerance: f64, emergency: f64, critical: f64) -> Self {
        if abs_deviation_percent <= tolerance {
            DeviationClass::Within
        } else if abs_deviation_percent <= emergency {
            DeviationClass::Emergency
        } else if abs_deviation_percent <= critical {
            DeviationClass::Critical
        } else {
            DeviationClass::Extreme
        }
    }
}

impl fmt::Display for DeviationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviationClass::Within => write!(f, "within"),
            DeviationClass::Emergency => write!(f, "emergency"),
            DeviationClass::Critical => write!(f, "critical"),
            DeviationClass::Extreme => write!(f, "extreme"),
        }
    }
}

/// Computes the signed deviation percent of a count against a target
///
/// Zero targets divide by one so that any assignment on a zero-target worker
/// surfaces as a positive deviation instead of a division error.
pub fn deviation_percent(count: u32, target: u32) -> f64 {
    (count as f64 - target as f64) / (target.max(1) as f64) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_classify_bands() {
        assert_eq!(DeviationClass::classify(0.0, 8.0, 10.0, 15.0), DeviationClass::Within);
        assert_eq!(DeviationClass::classify(8.0, 8.0, 10.0, 15.0), DeviationClass::Within);
        assert_eq!(DeviationClass::classify(9.5, 8.0, 10.0, 15.0), DeviationClass::Emergency);
        assert_eq!(DeviationClass::classify(12.0, 8.0, 10.0, 15.0), DeviationClass::Critical);
        assert_eq!(DeviationClass::classify(15.1, 8.0, 10.0, 15.0), DeviationClass::Extreme);
    }

    #[test]
    fn test_deviation_percent() {
        assert_eq!(deviation_percent(22, 20), 10.0);
        assert_eq!(deviation_percent(18, 20), -10.0);
        assert_eq!(deviation_percent(0, 0), 0.0);
        assert_eq!(deviation_percent(2, 0), 200.0);
    }

    proptest! {
        #[test]
        fn prop_classification_is_total_and_monotone(dev in 0.0f64..200.0) {
            let class = DeviationClass::classify(dev, 8.0, 10.0, 15.0);
            let wider = DeviationClass::classify(dev + 1.0, 8.0, 10.0, 15.0);
            prop_assert!(wider >= class);
        }

        #[test]
        fn prop_deviation_sign_matches_count(count in 0u32..100, target in 1u32..100) {
            let dev = deviation_percent(count, target);
            if count > target {
                prop_assert!(dev > 0.0);
            } else if count < target {
                prop_assert!(dev < 0.0);
            } else {
                prop_assert_eq!(dev, 0.0);
            }
        }
    }
}
