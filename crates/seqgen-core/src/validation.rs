//! # Validation Module
//!
//! Input validation for sequence definitions and service arguments.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Service call (seqgen-engine)                                 │
//! │  ├── Argument checks (count, ttl, numbers)                             │
//! │  └── THIS MODULE: definition and argument rules                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Pattern compiler                                             │
//! │  └── Syntax, variable names, padding                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Store (SQLite)                                               │
//! │  ├── UNIQUE (name, scope)                                              │
//! │  └── CHECK / foreign key constraints                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use seqgen_core::validation::{validate_sequence_name, validate_bulk_count};
//!
//! validate_sequence_name("invoice").unwrap();
//! validate_bulk_count(50, 1000).unwrap();
//! ```

use crate::error::{SequenceResult, ValidationError};
use crate::pattern::validate_syntax;
use crate::types::SequenceDefinition;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest sequence name or scope accepted.
pub const MAX_NAME_LEN: usize = 100;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a sequence name.
///
/// ## Rules
/// - Must not be empty
/// - At most 100 characters
/// - Letters, numbers, hyphens, underscores and dots only
///
/// ## Example
/// ```rust
/// use seqgen_core::validation::validate_sequence_name;
///
/// assert!(validate_sequence_name("purchase_order").is_ok());
/// assert!(validate_sequence_name("").is_err());
/// assert!(validate_sequence_name("bad name").is_err());
/// ```
pub fn validate_sequence_name(name: &str) -> ValidationResult<()> {
    validate_identifier("name", name)
}

/// Validates a scope identifier (same rules as names).
pub fn validate_scope(scope: &str) -> ValidationResult<()> {
    validate_identifier("scope", scope)
}

fn validate_identifier(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    if !value
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, hyphens, underscores, and dots"
                .to_string(),
        });
    }

    Ok(())
}

/// Validates a list of numbers passed to release/finalize.
pub fn validate_numbers(numbers: &[String]) -> ValidationResult<()> {
    if numbers.is_empty() {
        return Err(ValidationError::Required {
            field: "numbers".to_string(),
        });
    }
    if numbers.iter().any(|n| n.trim().is_empty()) {
        return Err(ValidationError::InvalidFormat {
            field: "numbers".to_string(),
            reason: "must not contain empty entries".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a step size (≥ 1).
pub fn validate_step(step: i64) -> ValidationResult<()> {
    if step < 1 {
        return Err(ValidationError::MustBePositive {
            field: "step".to_string(),
        });
    }
    Ok(())
}

/// Validates an exhaustion threshold percentage (0 < t ≤ 100).
pub fn validate_threshold(threshold: f64) -> ValidationResult<()> {
    if !(threshold > 0.0 && threshold <= 100.0) {
        return Err(ValidationError::OutOfRange {
            field: "exhaustion_threshold".to_string(),
            min: 0,
            max: 100,
        });
    }
    Ok(())
}

/// Validates a bulk count against the configured maximum.
///
/// ## Example
/// ```rust
/// use seqgen_core::validation::validate_bulk_count;
///
/// assert!(validate_bulk_count(0, 1000).is_err());
/// assert!(validate_bulk_count(1001, 1000).is_err());
/// assert!(validate_bulk_count(1000, 1000).is_ok());
/// ```
pub fn validate_bulk_count(count: usize, max: usize) -> ValidationResult<()> {
    if count == 0 || count > max {
        return Err(ValidationError::OutOfRange {
            field: "count".to_string(),
            min: 1,
            max: max as i64,
        });
    }
    Ok(())
}

/// Validates a reservation TTL in minutes.
pub fn validate_ttl_minutes(ttl: i64, max: i64) -> ValidationResult<()> {
    if ttl < 1 || ttl > max {
        return Err(ValidationError::OutOfRange {
            field: "ttl_minutes".to_string(),
            min: 1,
            max,
        });
    }
    Ok(())
}

// =============================================================================
// Definition Validator
// =============================================================================

/// Validates a full sequence definition, pattern syntax included.
pub fn validate_definition(def: &SequenceDefinition) -> SequenceResult<()> {
    validate_sequence_name(&def.name)?;
    if let Some(scope) = &def.scope {
        validate_scope(scope)?;
    }
    validate_step(def.step)?;
    validate_threshold(def.exhaustion_threshold)?;
    if let Some(limit) = def.reset_limit {
        if limit < 1 {
            return Err(ValidationError::MustBePositive {
                field: "reset_limit".to_string(),
            }
            .into());
        }
    }
    validate_syntax(&def.pattern)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SequenceError;

    #[test]
    fn test_validate_sequence_name() {
        assert!(validate_sequence_name("invoice").is_ok());
        assert!(validate_sequence_name("grn.branch-7_v2").is_ok());
        assert!(validate_sequence_name("").is_err());
        assert!(validate_sequence_name("   ").is_err());
        assert!(validate_sequence_name("has space").is_err());
        assert!(validate_sequence_name(&"a".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_step_and_threshold() {
        assert!(validate_step(1).is_ok());
        assert!(validate_step(0).is_err());
        assert!(validate_step(-3).is_err());

        assert!(validate_threshold(90.0).is_ok());
        assert!(validate_threshold(100.0).is_ok());
        assert!(validate_threshold(0.0).is_err());
        assert!(validate_threshold(100.5).is_err());
        assert!(validate_threshold(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_ttl_and_numbers() {
        assert!(validate_ttl_minutes(30, 1440).is_ok());
        assert!(validate_ttl_minutes(0, 1440).is_err());
        assert!(validate_ttl_minutes(1441, 1440).is_err());

        assert!(validate_numbers(&["INV-1".to_string()]).is_ok());
        assert!(validate_numbers(&[]).is_err());
        assert!(validate_numbers(&["".to_string()]).is_err());
    }

    #[test]
    fn test_validate_definition() {
        let def = SequenceDefinition::new("invoice", "INV-{COUNTER:4}");
        assert!(validate_definition(&def).is_ok());

        let bad_pattern = SequenceDefinition::new("invoice", "INV-{COUNTER:4");
        assert!(matches!(
            validate_definition(&bad_pattern),
            Err(SequenceError::InvalidPattern { .. })
        ));

        let bad_step = SequenceDefinition::new("invoice", "INV-{COUNTER}").step(0);
        assert!(matches!(
            validate_definition(&bad_step),
            Err(SequenceError::Validation(_))
        ));

        let bad_limit = SequenceDefinition::new("invoice", "INV-{COUNTER}").reset_limit(0);
        assert!(validate_definition(&bad_limit).is_err());
    }
}
