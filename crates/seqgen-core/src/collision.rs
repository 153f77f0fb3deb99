//! Structural collision heuristic between two patterns.
//!
//! Two patterns are collision-prone when their literal skeletons match and
//! their variables appear with the same names at the same skeleton
//! positions. Padding widths and value ranges are not compared.

use crate::error::SequenceResult;
use crate::pattern::{Pattern, Segment};

/// `(variable name, offset into the skeleton)` for every variable.
fn variable_layout(pattern: &Pattern) -> Vec<(&str, usize)> {
    let mut offset = 0;
    let mut layout = Vec::new();
    for segment in pattern.segments() {
        match segment {
            Segment::Literal(text) => offset += text.len(),
            Segment::Variable(var) => layout.push((var.name.as_str(), offset)),
        }
    }
    layout
}

/// Returns true if numbers from the two patterns could coincide.
pub fn detect_collisions(first: &str, second: &str) -> SequenceResult<bool> {
    let a = Pattern::compile(first)?;
    let b = Pattern::compile(second)?;

    if a.skeleton() != b.skeleton() {
        return Ok(false);
    }
    Ok(variable_layout(&a) == variable_layout(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_collisions() {
        assert!(!detect_collisions("A-{COUNTER:4}", "A-{YEAR}").unwrap());
        assert!(detect_collisions("A-{COUNTER:4}", "A-{COUNTER:4}").unwrap());

        // Padding is ignored
        assert!(detect_collisions("A-{COUNTER:4}", "A-{COUNTER:6}").unwrap());

        // Different skeletons never collide
        assert!(!detect_collisions("A-{COUNTER}", "B-{COUNTER}").unwrap());

        // Same skeleton, variables shifted
        assert!(!detect_collisions("{YEAR}-{COUNTER}", "-{YEAR}{COUNTER}").unwrap());
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        assert!(detect_collisions("A-{COUNTER", "A-{COUNTER}").is_err());
    }
}
