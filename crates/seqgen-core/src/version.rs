//! # Pattern Version Rules
//!
//! Effective-date range checks for pattern versions.
//!
//! ## Range Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every version covers the half-open range [effective_from, until)       │
//! │  (`until = None` runs forever).                                         │
//! │                                                                         │
//! │  v1  [2024-01-01 ─────────────── 2024-07-01)                           │
//! │  v2                              [2024-07-01 ───────────────────► ∞    │
//! │                                                                         │
//! │  OK: ranges touch but never overlap                                    │
//! │                                                                         │
//! │  v3            [2024-03-01 ──────────► ∞     ✗ PatternVersionConflict  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};

use crate::error::{SequenceError, SequenceResult, ValidationError};
use crate::types::PatternVersion;

/// Returns true if `[a_from, a_until)` and `[b_from, b_until)` share any instant.
pub fn ranges_overlap(
    a_from: DateTime<Utc>,
    a_until: Option<DateTime<Utc>>,
    b_from: DateTime<Utc>,
    b_until: Option<DateTime<Utc>>,
) -> bool {
    let a_starts_before_b_ends = b_until.map_or(true, |end| a_from < end);
    let b_starts_before_a_ends = a_until.map_or(true, |end| b_from < end);
    a_starts_before_b_ends && b_starts_before_a_ends
}

/// Validates a proposed range against the existing versions of a sequence.
///
/// ## Errors
/// - `Validation` if `from ≥ until`
/// - `PatternVersionConflict` if the range overlaps any existing version
pub fn validate_effective_range(
    sequence: &str,
    existing: &[PatternVersion],
    from: DateTime<Utc>,
    until: Option<DateTime<Utc>>,
) -> SequenceResult<()> {
    if let Some(end) = until {
        if end <= from {
            return Err(ValidationError::InvalidFormat {
                field: "effective_until".to_string(),
                reason: "must be after effective_from".to_string(),
            }
            .into());
        }
    }

    let conflict = existing
        .iter()
        .any(|v| ranges_overlap(v.effective_from, v.effective_until, from, until));

    if conflict {
        return Err(SequenceError::PatternVersionConflict {
            sequence: sequence.to_string(),
            from,
            until,
        });
    }

    Ok(())
}

/// Picks the version effective at `at`.
///
/// Ranges never overlap, so at most one matches; the latest start wins if
/// a store ever hands back overlapping rows.
pub fn effective_at(versions: &[PatternVersion], at: DateTime<Utc>) -> Option<&PatternVersion> {
    versions
        .iter()
        .filter(|v| v.is_effective_at(at))
        .max_by_key(|v| v.effective_from)
}

/// The open-ended version, if one exists.
pub fn open_ended(versions: &[PatternVersion]) -> Option<&PatternVersion> {
    versions
        .iter()
        .filter(|v| v.effective_until.is_none())
        .max_by_key(|v| v.effective_from)
}

/// Checks that a new open-ended version starting at `from` may replace
/// `replaces`, the open version it was planned against (`None` when the
/// sequence had none).
///
/// Stores run this again under their write lock, so two migrations planned
/// against the same open version cannot both land.
///
/// ## Errors
/// `PatternVersionConflict` if the open version is no longer `replaces`,
/// if `from` does not come after its start, or if `[from, ∞)` overlaps any
/// closed version.
pub fn check_supersede(
    sequence: &str,
    existing: &[PatternVersion],
    replaces: Option<&str>,
    from: DateTime<Utc>,
) -> SequenceResult<()> {
    let conflict = || SequenceError::PatternVersionConflict {
        sequence: sequence.to_string(),
        from,
        until: None,
    };

    let open = open_ended(existing);
    if open.map(|v| v.id.as_str()) != replaces {
        return Err(conflict());
    }
    if open.is_some_and(|v| v.effective_from >= from) {
        return Err(conflict());
    }

    // Once closed at `from`, the replaced version only touches the new range
    let closed: Vec<PatternVersion> = existing
        .iter()
        .filter(|v| Some(v.id.as_str()) != replaces)
        .cloned()
        .collect();
    validate_effective_range(sequence, &closed, from, None)
}

// =============================================================================
// Unit Tests
// =============================================================================
