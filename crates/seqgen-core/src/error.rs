//! # Error Types
//!
//! Domain-specific error types for seqgen-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  seqgen-core errors (this file)                                        │
//! │  ├── SequenceError    - Every failure a caller of the engine can see   │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  seqgen-engine errors                                                  │
//! │  └── ConfigError      - Engine configuration load/validate failures    │
//! │                                                                         │
//! │  seqgen-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  Flow: ValidationError → SequenceError ← DbError (as Storage)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (sequence name, values, ranges)
//! 3. Errors are enum variants, never String
//! 4. Nothing here is retried internally; every error reaches the caller

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Formats an optional scope for error messages.
fn scope_label(scope: &Option<String>) -> &str {
    scope.as_deref().unwrap_or("<global>")
}

/// Formats an optional range end for error messages.
fn until_label(until: &Option<DateTime<Utc>>) -> String {
    until
        .map(|u| u.to_rfc3339())
        .unwrap_or_else(|| "open-ended".to_string())
}

// =============================================================================
// Sequence Error
// =============================================================================

/// Errors surfaced by sequencing operations.
#[derive(Debug, Error)]
pub enum SequenceError {
    /// No sequence definition for the name/scope pair.
    ///
    /// ## When This Occurs
    /// - Name was never configured
    /// - Scoped lookup found neither an exact nor an unscoped definition
    #[error("Sequence not found: {name} (scope {})", scope_label(.scope))]
    SequenceNotFound { name: String, scope: Option<String> },

    /// The sequence is locked and refuses to mint numbers.
    #[error("Sequence {name} (scope {}) is locked", scope_label(.scope))]
    SequenceLocked { name: String, scope: Option<String> },

    /// Counter crossed the exhaustion threshold and the overflow behavior
    /// is `ThrowException`.
    ///
    /// ## User Workflow
    /// ```text
    /// generate("invoice")
    ///      │
    ///      ▼
    /// utilization = 9500 / 9999 = 95% ≥ threshold 90%
    ///      │
    ///      ▼
    /// SequenceExhausted { name: "invoice", current: 9500, max: 9999 }
    ///      │
    ///      ▼
    /// Operator extends the pattern or unlocks a new version
    /// ```
    #[error("Sequence {name} is exhausted: current value {current} of maximum {max}")]
    SequenceExhausted { name: String, current: i64, max: i64 },

    /// Pattern is malformed or cannot be resolved.
    ///
    /// ## When This Occurs
    /// - Unbalanced braces (`INV-{BAD`)
    /// - Invalid variable name (`{bad_lowercase}`)
    /// - Non-positive padding (`{COUNTER:0}`)
    /// - Custom variable missing from the context at render time
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Counter override is not positive or does not advance the counter.
    #[error("Invalid counter value {requested} for {name}: must be positive and greater than current value {current}")]
    InvalidCounterValue {
        name: String,
        current: i64,
        requested: i64,
    },

    /// New pattern version overlaps an existing effective range.
    #[error(
        "Pattern version for {sequence} overlaps an existing version: [{}, {})",
        .from.to_rfc3339(),
        until_label(.until)
    )]
    PatternVersionConflict {
        sequence: String,
        from: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
    },

    /// Reservation id does not exist.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The injected store failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl SequenceError {
    /// Creates an InvalidPattern error.
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        SequenceError::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Creates a SequenceNotFound error.
    pub fn not_found(name: impl Into<String>, scope: Option<&str>) -> Self {
        SequenceError::SequenceNotFound {
            name: name.into(),
            scope: scope.map(str::to_string),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before any store is touched.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., sequence already defined).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with SequenceError.
pub type SequenceResult<T> = Result<T, SequenceError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SequenceError::SequenceExhausted {
            name: "invoice".to_string(),
            current: 9500,
            max: 9999,
        };
        assert_eq!(
            err.to_string(),
            "Sequence invoice is exhausted: current value 9500 of maximum 9999"
        );

        let err = SequenceError::not_found("po", None);
        assert_eq!(err.to_string(), "Sequence not found: po (scope <global>)");

        let err = SequenceError::SequenceLocked {
            name: "grn".to_string(),
            scope: Some("branch-7".to_string()),
        };
        assert_eq!(err.to_string(), "Sequence grn (scope branch-7) is locked");
    }

    #[test]
    fn test_conflict_message_mentions_open_range() {
        let from = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let err = SequenceError::PatternVersionConflict {
            sequence: "invoice".to_string(),
            from,
            until: None,
        };
        assert!(err.to_string().contains("open-ended"));
    }

    #[test]
    fn test_validation_converts_to_sequence_error() {
        let validation_err = ValidationError::Required {
            field: "name".to_string(),
        };
        let err: SequenceError = validation_err.into();
        assert!(matches!(err, SequenceError::Validation(_)));
    }
}
