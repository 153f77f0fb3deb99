//! # Capacity Math
//!
//! How much room a pattern leaves its counter, and how close a sequence is
//! to running out.
//!
//! ```text
//! INV-{COUNTER:4}   max = 10^4 − 1 = 9999
//! INV-{COUNTER}     max = i64::MAX   (no padding: unbounded)
//! INV-{YEAR}        max = i64::MAX   (no counter)
//!
//! utilization = current / max × 100
//! risk_score  = clamp(utilization / threshold × 100, 0, 100)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::SequenceResult;
use crate::pattern::Pattern;

/// Sentinel capacity for patterns whose counter is not width-bound.
pub const UNBOUNDED: i64 = i64::MAX;

/// Largest counter value the first `{COUNTER:N}` token can render in N digits.
///
/// Paddings too wide for `i64` are treated as unbounded.
pub fn calculate_max_value(pattern: &str) -> SequenceResult<i64> {
    Ok(max_value_of(&Pattern::compile(pattern)?))
}

/// Same as [`calculate_max_value`] for an already compiled pattern.
pub fn max_value_of(pattern: &Pattern) -> i64 {
    pattern
        .counter()
        .and_then(|counter| counter.padding)
        .and_then(|width| u32::try_from(width).ok())
        .and_then(|width| 10_i64.checked_pow(width))
        .map_or(UNBOUNDED, |limit| limit - 1)
}

/// Percentage of capacity consumed, in `[0, 100]` for sane inputs.
pub fn utilization_percent(current: i64, max_value: i64) -> f64 {
    if max_value <= 0 {
        return 100.0;
    }
    (current.max(0) as f64 / max_value as f64) * 100.0
}

/// Risk of hitting the threshold, scaled so the threshold itself scores 100.
pub fn risk_score(current: i64, max_value: i64, threshold: f64) -> f64 {
    if threshold <= 0.0 {
        return 100.0;
    }
    (utilization_percent(current, max_value) / threshold * 100.0).clamp(0.0, 100.0)
}

/// Result of one exhaustion check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExhaustionStatus {
    pub current_value: i64,
    pub max_value: i64,
    pub utilization_percent: f64,
    pub threshold: f64,
    pub threshold_reached: bool,
    /// Pattern switched to, when the check triggered a migration.
    pub migrated_to: Option<String>,
}

impl ExhaustionStatus {
    pub fn evaluate(current: i64, max_value: i64, threshold: f64) -> Self {
        let utilization = utilization_percent(current, max_value);
        ExhaustionStatus {
            current_value: current,
            max_value,
            utilization_percent: utilization,
            threshold,
            threshold_reached: utilization >= threshold,
            migrated_to: None,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_max_value() {
        assert_eq!(calculate_max_value("INV-{COUNTER:4}").unwrap(), 9999);
        assert_eq!(calculate_max_value("{COUNTER:1}").unwrap(), 9);
        assert_eq!(calculate_max_value("INV-{COUNTER}").unwrap(), UNBOUNDED);
        assert_eq!(calculate_max_value("INV-{YEAR}").unwrap(), UNBOUNDED);
        assert_eq!(calculate_max_value("INV-{COUNTER:40}").unwrap(), UNBOUNDED);
        assert!(calculate_max_value("INV-{COUNTER:0}").is_err());
    }

    #[test]
    fn test_utilization_and_threshold() {
        let status = ExhaustionStatus::evaluate(9000, 9999, 90.0);
        assert!(status.utilization_percent > 90.0);
        assert!(status.threshold_reached);

        let status = ExhaustionStatus::evaluate(100, 9999, 90.0);
        assert!(!status.threshold_reached);

        assert_eq!(utilization_percent(0, UNBOUNDED), 0.0);
    }

    #[test]
    fn test_risk_score_is_clamped() {
        assert_eq!(risk_score(0, 9999, 90.0), 0.0);
        assert_eq!(risk_score(9999, 9999, 90.0), 100.0);
        let half = risk_score(4500, 10_000, 90.0);
        assert!((half - 50.0).abs() < 1e-9);
        assert_eq!(risk_score(-5, 9999, 90.0), 0.0);
    }
}
