//! # Pattern Parser
//!
//! Tokenizes, validates and renders pattern templates.
//!
//! ## Pattern Grammar
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Pattern Grammar                                 │
//! │                                                                         │
//! │  pattern   := ( literal | variable )*                                  │
//! │  variable  := '{' NAME ( ':' PADDING )? '}'                            │
//! │  NAME      := YEAR | YY | MONTH | DAY | COUNTER | [A-Z][A-Z0-9_]*      │
//! │  PADDING   := positive integer (zero-pad to this width)                │
//! │                                                                         │
//! │  "INV-{YEAR}-{COUNTER:5}"                                              │
//! │   ├── Literal  "INV-"                                                  │
//! │   ├── Variable YEAR                                                    │
//! │   ├── Literal  "-"                                                     │
//! │   └── Variable COUNTER (padding 5)                                     │
//! │                                                                         │
//! │  parse(.., counter 42, date 2024-06-01) → "INV-2024-00042"             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use std::collections::HashMap;
//! use chrono::NaiveDate;
//! use seqgen_core::pattern::parse;
//!
//! let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
//! let number = parse("INV-{YEAR}-{COUNTER:5}", 42, &HashMap::new(), date).unwrap();
//! assert_eq!(number, "INV-2024-00042");
//! ```

use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{SequenceError, SequenceResult};

/// Caller-supplied values for custom variables. Keys match case-insensitively.
pub type VariableContext = HashMap<String, String>;

/// Names resolved by the engine itself.
pub const BUILTIN_VARIABLES: &[&str] = &["YEAR", "YY", "MONTH", "DAY", "COUNTER"];

static CUSTOM_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").expect("static regex"));

// =============================================================================
// Tokens
// =============================================================================

/// What a variable resolves from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    Year,
    ShortYear,
    Month,
    Day,
    Counter,
    Custom,
}

impl VariableKind {
    fn from_name(name: &str) -> Self {
        match name {
            "YEAR" => VariableKind::Year,
            "YY" => VariableKind::ShortYear,
            "MONTH" => VariableKind::Month,
            "DAY" => VariableKind::Day,
            "COUNTER" => VariableKind::Counter,
            _ => VariableKind::Custom,
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, VariableKind::Custom)
    }
}

/// A parsed `{NAME[:PADDING]}` token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternVariable {
    pub name: String,
    pub padding: Option<usize>,
    pub kind: VariableKind,
    /// Byte range of the whole token (braces included) in the source.
    pub span: Range<usize>,
}

/// One piece of a tokenized pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Variable(PatternVariable),
}

// =============================================================================
// Pattern
// =============================================================================

/// A validated, tokenized pattern template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Tokenizes and validates a pattern.
    ///
    /// ## Errors
    /// `InvalidPattern` on unbalanced braces, empty or invalid names, and
    /// padding that isn't a positive integer.
    pub fn compile(source: &str) -> SequenceResult<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices();

        while let Some((start, c)) = chars.next() {
            match c {
                '{' => {
                    let mut body = String::new();
                    let mut end = None;
                    for (i, inner) in chars.by_ref() {
                        match inner {
                            '}' => {
                                end = Some(i + 1);
                                break;
                            }
                            '{' => {
                                return Err(SequenceError::invalid_pattern(
                                    source,
                                    format!("nested '{{' at offset {}", i),
                                ));
                            }
                            other => body.push(other),
                        }
                    }

                    let end = end.ok_or_else(|| {
                        SequenceError::invalid_pattern(
                            source,
                            format!("unbalanced braces: '{{' at offset {} is never closed", start),
                        )
                    })?;

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Variable(parse_token(source, &body, start..end)?));
                }
                '}' => {
                    return Err(SequenceError::invalid_pattern(
                        source,
                        format!("unbalanced braces: unexpected '}}' at offset {}", start),
                    ));
                }
                other => literal.push(other),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Pattern {
            source: source.to_string(),
            segments,
        })
    }

    /// The original template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Variables in order of appearance.
    pub fn variables(&self) -> impl Iterator<Item = &PatternVariable> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Variable(v) => Some(v),
            Segment::Literal(_) => None,
        })
    }

    /// The first `{COUNTER}` token, if any.
    pub fn counter(&self) -> Option<&PatternVariable> {
        self.variables().find(|v| v.kind == VariableKind::Counter)
    }

    /// Literal text with every variable removed.
    pub fn skeleton(&self) -> String {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Literal(text) => Some(text.as_str()),
                Segment::Variable(_) => None,
            })
            .collect()
    }

    /// Renders the pattern for one counter value.
    pub fn render(
        &self,
        counter_value: i64,
        context: &VariableContext,
        date: NaiveDate,
    ) -> SequenceResult<String> {
        let mut out = String::with_capacity(self.source.len() + 8);

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(var) => {
                    let value = match var.kind {
                        VariableKind::Year => date.year().to_string(),
                        VariableKind::ShortYear => format!("{:02}", date.year().rem_euclid(100)),
                        VariableKind::Month => format!("{:02}", date.month()),
                        VariableKind::Day => format!("{:02}", date.day()),
                        VariableKind::Counter => counter_value.to_string(),
                        VariableKind::Custom => lookup(context, &var.name)
                            .ok_or_else(|| {
                                SequenceError::invalid_pattern(
                                    &self.source,
                                    format!("unresolved variable {}", var.name),
                                )
                            })?
                            .to_string(),
                    };

                    match var.padding {
                        Some(width) => out.push_str(&format!("{:0>width$}", value, width = width)),
                        None => out.push_str(&value),
                    }
                }
            }
        }

        Ok(out)
    }

    /// Builds an anchored regex matching numbers this pattern can produce.
    ///
    /// Custom variables match `[A-Z0-9]+` and `COUNTER` matches `\d+`
    /// whatever their padding; the regex is looser than the renderer.
    pub fn validation_regex(&self) -> SequenceResult<Regex> {
        let mut expr = String::from("^");

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => expr.push_str(&regex::escape(text)),
                Segment::Variable(var) => expr.push_str(match var.kind {
                    VariableKind::Year => r"\d{4}",
                    VariableKind::ShortYear | VariableKind::Month | VariableKind::Day => r"\d{2}",
                    VariableKind::Counter => r"\d+",
                    VariableKind::Custom => "[A-Z0-9]+",
                }),
            }
        }
        expr.push('$');

        Regex::new(&expr).map_err(|e| SequenceError::invalid_pattern(&self.source, e.to_string()))
    }
}

/// Parses the inside of a `{...}` token.
fn parse_token(source: &str, body: &str, span: Range<usize>) -> SequenceResult<PatternVariable> {
    let (name, padding) = match body.split_once(':') {
        Some((name, padding)) => (name, Some(padding)),
        None => (body, None),
    };

    if name.is_empty() {
        return Err(SequenceError::invalid_pattern(
            source,
            format!("empty variable name at offset {}", span.start),
        ));
    }

    let kind = VariableKind::from_name(name);
    if kind == VariableKind::Custom && !CUSTOM_NAME.is_match(name) {
        return Err(SequenceError::invalid_pattern(
            source,
            format!(
                "invalid variable name '{}': must be a built-in or match [A-Z][A-Z0-9_]*",
                name
            ),
        ));
    }

    let padding = match padding {
        None => None,
        Some(raw) => {
            let width: i64 = raw.trim().parse().map_err(|_| {
                SequenceError::invalid_pattern(
                    source,
                    format!("padding '{}' for {} is not an integer", raw, name),
                )
            })?;
            if width <= 0 {
                return Err(SequenceError::invalid_pattern(
                    source,
                    format!("padding for {} must be positive, got {}", name, width),
                ));
            }
            Some(width as usize)
        }
    };

    Ok(PatternVariable {
        name: name.to_string(),
        padding,
        kind,
        span,
    })
}

/// Case-insensitive context lookup.
fn lookup<'a>(context: &'a VariableContext, name: &str) -> Option<&'a str> {
    context
        .get(name)
        .or_else(|| {
            context
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
        .map(String::as_str)
}

// =============================================================================
// Free-Function API
// =============================================================================

/// Renders `pattern` for `counter_value` on `date`.
pub fn parse(
    pattern: &str,
    counter_value: i64,
    context: &VariableContext,
    date: NaiveDate,
) -> SequenceResult<String> {
    Pattern::compile(pattern)?.render(counter_value, context, date)
}

/// Checks pattern syntax without rendering.
pub fn validate_syntax(pattern: &str) -> SequenceResult<()> {
    Pattern::compile(pattern).map(|_| ())
}

/// Lists the variables of a pattern in order.
pub fn extract_variables(pattern: &str) -> SequenceResult<Vec<PatternVariable>> {
    Ok(Pattern::compile(pattern)?.variables().cloned().collect())
}

/// Builds the validation regex of a pattern.
pub fn generate_validation_regex(pattern: &str) -> SequenceResult<Regex> {
    Pattern::compile(pattern)?.validation_regex()
}

// =============================================================================
// Unit Tests
// =============================================================================
