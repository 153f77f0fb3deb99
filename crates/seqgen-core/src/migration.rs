//! # Migration Patterns
//!
//! Computes the pattern a sequence switches to when its counter runs out
//! of room.
//!
//! ## Strategies
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Migration Strategies                              │
//! │                                                                         │
//! │  AddSuffix         INV-{COUNTER:4}  ──►  INV-A-{COUNTER:4}             │
//! │                    INV{COUNTER:4}   ──►  INV-A-{COUNTER:4}             │
//! │                    INV-{YEAR}       ──►  INV-{YEAR}-A                  │
//! │                                                                         │
//! │  ExtendPadding     INV-{COUNTER:4}  ──►  INV-{COUNTER:5}   (10× room)  │
//! │                    INV-{COUNTER}    ──►  INV-{COUNTER}     (unbounded) │
//! │                                                                         │
//! │  Suffixes run A, B, … Z, AA, AB, … and are always applied to the       │
//! │  sequence's base pattern, so repeated switches never stack.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::SequenceResult;
use crate::pattern::Pattern;
use crate::types::OverflowBehavior;

/// Characters that already separate a literal prefix from the counter.
const SEPARATORS: &[char] = &['-', '_', '/', '.', ' '];

/// How a sequence moves to a new pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStrategy {
    /// Insert a letter suffix before the counter.
    AddSuffix,
    /// Widen the counter padding by one digit.
    ExtendPadding,
}

impl MigrationStrategy {
    /// The strategy an overflow behavior asks for, if any.
    pub fn for_overflow(behavior: OverflowBehavior) -> Option<Self> {
        match behavior {
            OverflowBehavior::ThrowException => None,
            OverflowBehavior::SwitchPattern => Some(MigrationStrategy::AddSuffix),
            OverflowBehavior::ExtendPadding => Some(MigrationStrategy::ExtendPadding),
        }
    }
}

impl std::fmt::Display for MigrationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationStrategy::AddSuffix => write!(f, "add_suffix"),
            MigrationStrategy::ExtendPadding => write!(f, "extend_padding"),
        }
    }
}

impl std::str::FromStr for MigrationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "add_suffix" => Ok(MigrationStrategy::AddSuffix),
            "extend_padding" => Ok(MigrationStrategy::ExtendPadding),
            other => Err(format!("Unknown migration strategy: '{}'", other)),
        }
    }
}

/// Letter suffix for the `index`-th migration: 0 → A, 25 → Z, 26 → AA.
pub fn suffix_for(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Inserts `suffix` right before the first counter token.
///
/// A `-` is added in front of the suffix when the preceding character is
/// not already a separator. Without a counter token the suffix is
/// appended as `-{suffix}`.
///
/// ## Example
/// ```rust
/// use seqgen_core::migration::generate_migration_pattern;
///
/// assert_eq!(
///     generate_migration_pattern("INV-{COUNTER:4}", "A").unwrap(),
///     "INV-A-{COUNTER:4}"
/// );
/// ```
pub fn generate_migration_pattern(pattern: &str, suffix: &str) -> SequenceResult<String> {
    let compiled = Pattern::compile(pattern)?;

    let Some(counter) = compiled.counter() else {
        return Ok(format!("{}-{}", pattern, suffix));
    };

    let (head, tail) = pattern.split_at(counter.span.start);
    let needs_separator = head
        .chars()
        .last()
        .map_or(false, |c| !SEPARATORS.contains(&c));

    let mut out = String::with_capacity(pattern.len() + suffix.len() + 2);
    out.push_str(head);
    if needs_separator {
        out.push('-');
    }
    out.push_str(suffix);
    out.push('-');
    out.push_str(tail);
    Ok(out)
}

/// Widens the first padded counter token by one digit.
pub fn extend_padding(pattern: &str) -> SequenceResult<String> {
    let compiled = Pattern::compile(pattern)?;

    let Some(counter) = compiled.counter() else {
        return Ok(pattern.to_string());
    };
    let Some(width) = counter.padding else {
        return Ok(pattern.to_string());
    };

    let token = format!("{{{}:{}}}", counter.name, width + 1);
    let mut out = String::with_capacity(pattern.len() + 1);
    out.push_str(&pattern[..counter.span.start]);
    out.push_str(&token);
    out.push_str(&pattern[counter.span.end..]);
    Ok(out)
}

/// Computes the migrated pattern for a strategy.
///
/// `base` is the sequence's own pattern, `current` the one in effect now,
/// and `migrations` how many versions the sequence already has.
pub fn migrated_pattern(
    strategy: MigrationStrategy,
    base: &str,
    current: &str,
    migrations: usize,
) -> SequenceResult<String> {
    match strategy {
        MigrationStrategy::AddSuffix => generate_migration_pattern(base, &suffix_for(migrations)),
        MigrationStrategy::ExtendPadding => extend_padding(current),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_sequence() {
        assert_eq!(suffix_for(0), "A");
        assert_eq!(suffix_for(1), "B");
        assert_eq!(suffix_for(25), "Z");
        assert_eq!(suffix_for(26), "AA");
        assert_eq!(suffix_for(27), "AB");
        assert_eq!(suffix_for(701), "ZZ");
        assert_eq!(suffix_for(702), "AAA");
    }

    #[test]
    fn test_generate_migration_pattern() {
        assert_eq!(
            generate_migration_pattern("INV-{COUNTER:4}", "A").unwrap(),
            "INV-A-{COUNTER:4}"
        );
        assert_eq!(
            generate_migration_pattern("INV{COUNTER:4}", "A").unwrap(),
            "INV-A-{COUNTER:4}"
        );
        assert_eq!(
            generate_migration_pattern("INV-{YEAR}-{COUNTER:5}", "B").unwrap(),
            "INV-{YEAR}-B-{COUNTER:5}"
        );
        assert_eq!(
            generate_migration_pattern("{COUNTER:4}", "A").unwrap(),
            "A-{COUNTER:4}"
        );
        assert_eq!(
            generate_migration_pattern("INV-{YEAR}", "A").unwrap(),
            "INV-{YEAR}-A"
        );
        assert!(generate_migration_pattern("INV-{BAD", "A").is_err());
    }

    #[test]
    fn test_extend_padding() {
        assert_eq!(extend_padding("INV-{COUNTER:4}").unwrap(), "INV-{COUNTER:5}");
        assert_eq!(
            extend_padding("PO-{YEAR}-{COUNTER:9}/X").unwrap(),
            "PO-{YEAR}-{COUNTER:10}/X"
        );
        assert_eq!(extend_padding("INV-{COUNTER}").unwrap(), "INV-{COUNTER}");
        assert_eq!(extend_padding("INV-{YEAR}").unwrap(), "INV-{YEAR}");
    }

    #[test]
    fn test_migrated_pattern_uses_base_for_suffix() {
        let base = "INV-{COUNTER:4}";
        assert_eq!(
            migrated_pattern(MigrationStrategy::AddSuffix, base, "INV-A-{COUNTER:4}", 1).unwrap(),
            "INV-B-{COUNTER:4}"
        );
        assert_eq!(
            migrated_pattern(MigrationStrategy::ExtendPadding, base, "INV-{COUNTER:5}", 1).unwrap(),
            "INV-{COUNTER:6}"
        );
    }

    #[test]
    fn test_strategy_for_overflow() {
        assert_eq!(MigrationStrategy::for_overflow(OverflowBehavior::ThrowException), None);
        assert_eq!(
            MigrationStrategy::for_overflow(OverflowBehavior::SwitchPattern),
            Some(MigrationStrategy::AddSuffix)
        );
        assert_eq!(
            "EXTEND_PADDING".parse::<MigrationStrategy>().unwrap(),
            MigrationStrategy::ExtendPadding
        );
    }
}
