//! # Counter Rules
//!
//! Reset triggers and override validation. The engine applies these while
//! holding the counter lock; nothing here touches storage.
//!
//! ## Reset Decision
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         needs_reset()                                   │
//! │                                                                         │
//! │  reset_limit = Some(n) and generation_count ≥ n ──────► RESET          │
//! │                                                                         │
//! │  reset_period = Some(p) and p boundary crossed                         │
//! │  between last_reset_at and now ───────────────────────► RESET          │
//! │                                                                         │
//! │  otherwise ───────────────────────────────────────────► keep counting  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};

use crate::error::{SequenceError, SequenceResult, ValidationError};
use crate::types::{CounterState, Sequence};

/// Returns true if the counter must restart from zero before the next increment.
pub fn needs_reset(state: &CounterState, sequence: &Sequence, now: DateTime<Utc>) -> bool {
    if let Some(limit) = sequence.reset_limit {
        if state.generation_count >= limit {
            return true;
        }
    }

    match (sequence.reset_period, state.last_reset_at) {
        (Some(period), Some(since)) => period.has_elapsed(since, now),
        _ => false,
    }
}

/// Validates a manual counter override.
///
/// ## Rules
/// - `requested` must be positive
/// - `requested` must be strictly greater than the current value
///
/// ## Example
/// ```rust
/// use seqgen_core::counter::validate_override;
///
/// assert!(validate_override("invoice", 10, 5).is_err());
/// assert!(validate_override("invoice", 10, 15).is_ok());
/// ```
pub fn validate_override(name: &str, current: i64, requested: i64) -> SequenceResult<()> {
    if requested <= 0 || requested <= current {
        return Err(SequenceError::InvalidCounterValue {
            name: name.to_string(),
            current,
            requested,
        });
    }
    Ok(())
}

/// Counter value after one generation step.
pub fn next_value(current: i64, step: i64) -> SequenceResult<i64> {
    current.checked_add(step).ok_or_else(|| {
        SequenceError::Validation(ValidationError::OutOfRange {
            field: "counter".to_string(),
            min: 0,
            max: i64::MAX,
        })
    })
}

/// Values `start + step·1 ..= start + step·count` for a bulk run.
pub fn bulk_values(start: i64, step: i64, count: usize) -> SequenceResult<Vec<i64>> {
    let mut values = Vec::with_capacity(count);
    let mut value = start;
    for _ in 0..count {
        value = next_value(value, step)?;
        values.push(value);
    }
    Ok(values)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ResetPeriod, SequenceDefinition};
    use chrono::TimeZone;

    fn sequence() -> Sequence {
        SequenceDefinition::new("invoice", "INV-{COUNTER:4}")
            .into_sequence(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_reset_limit() {
        let mut seq = sequence();
        seq.reset_limit = Some(3);
        let now = Utc::now();

        let state = CounterState {
            current_value: 3,
            generation_count: 2,
            last_reset_at: None,
        };
        assert!(!needs_reset(&state, &seq, now));

        let state = CounterState {
            generation_count: 3,
            ..state
        };
        assert!(needs_reset(&state, &seq, now));
    }

    #[test]
    fn test_reset_period() {
        let mut seq = sequence();
        seq.reset_period = Some(ResetPeriod::Monthly);

        let state = CounterState {
            current_value: 10,
            generation_count: 10,
            last_reset_at: Some(Utc.with_ymd_and_hms(2024, 5, 20, 0, 0, 0).unwrap()),
        };
        assert!(!needs_reset(&state, &seq, Utc.with_ymd_and_hms(2024, 5, 31, 0, 0, 0).unwrap()));
        assert!(needs_reset(&state, &seq, Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));

        // Never reset before: the period is not due
        let state = CounterState {
            last_reset_at: None,
            ..state
        };
        assert!(!needs_reset(&state, &seq, Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_no_reset_configured() {
        let state = CounterState {
            current_value: 1_000_000,
            generation_count: 1_000_000,
            last_reset_at: Some(Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()),
        };
        assert!(!needs_reset(&state, &sequence(), Utc::now()));
    }

    #[test]
    fn test_validate_override() {
        assert!(validate_override("invoice", 10, 5).is_err());
        assert!(validate_override("invoice", 10, 10).is_err());
        assert!(validate_override("invoice", 0, 0).is_err());
        assert!(validate_override("invoice", 0, -4).is_err());
        assert!(validate_override("invoice", 10, 15).is_ok());

        let err = validate_override("invoice", 10, 5).unwrap_err();
        assert!(matches!(
            err,
            SequenceError::InvalidCounterValue {
                current: 10,
                requested: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_bulk_values() {
        assert_eq!(bulk_values(10, 5, 3).unwrap(), vec![15, 20, 25]);
        assert!(bulk_values(0, 1, 0).unwrap().is_empty());
        assert!(bulk_values(i64::MAX - 1, 1, 2).is_err());
    }
}
