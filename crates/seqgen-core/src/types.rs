//! # Domain Types
//!
//! Core domain types used throughout the sequencing engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Sequence     │   │  CounterState   │   │      Gap        │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │ 1 │  current_value  │   │  number         │       │
//! │  │  name, scope    │──►│  generation_cnt │   │  reason         │       │
//! │  │  pattern, step  │ * │  last_reset_at  │   │  filled         │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  Reservation    │   │ PatternVersion  │   │   GapPolicy     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  None           │       │
//! │  │  id, numbers    │   │  pattern        │   │  FillEager      │       │
//! │  │  expires_at     │   │  [from, until)  │   ├─────────────────┤       │
//! │  └─────────────────┘   └─────────────────┘   │ OverflowBehavior│       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every sequence has:
//! - `id`: UUID v4 - immutable, used by counters, gaps, reservations, versions
//! - Business key: `(name, scope)` - what callers use

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Policies
// =============================================================================

/// Whether `generate()` reclaims voided numbers before incrementing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Never reuse gaps.
    #[default]
    None,
    /// Reuse the oldest unfilled gap before touching the counter.
    FillEager,
}

impl GapPolicy {
    /// Returns true if `generate()` should try a gap first.
    pub fn fills_gaps(&self) -> bool {
        match self {
            GapPolicy::None => false,
            GapPolicy::FillEager => true,
        }
    }
}

/// What happens when the counter nears its pattern-defined capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowBehavior {
    /// Refuse to generate with `SequenceExhausted`.
    #[default]
    ThrowException,
    /// Migrate to a suffixed pattern (`INV-{COUNTER:4}` → `INV-A-{COUNTER:4}`).
    SwitchPattern,
    /// Migrate to a wider counter (`{COUNTER:4}` → `{COUNTER:5}`).
    ExtendPadding,
}

/// Calendar period after which a counter restarts from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPeriod {
    Daily,
    Monthly,
    Yearly,
}

impl ResetPeriod {
    /// Returns true if `now` lies in a later period than `since` (UTC calendar).
    pub fn has_elapsed(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if now <= since {
            return false;
        }
        match self {
            ResetPeriod::Daily => now.date_naive() != since.date_naive(),
            ResetPeriod::Monthly => (now.year(), now.month()) != (since.year(), since.month()),
            ResetPeriod::Yearly => now.year() != since.year(),
        }
    }
}

impl std::fmt::Display for GapPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GapPolicy::None => write!(f, "none"),
            GapPolicy::FillEager => write!(f, "fill_eager"),
        }
    }
}

impl std::str::FromStr for GapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(GapPolicy::None),
            "fill_eager" => Ok(GapPolicy::FillEager),
            other => Err(format!("Unknown gap policy: '{}'", other)),
        }
    }
}

impl std::fmt::Display for OverflowBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverflowBehavior::ThrowException => write!(f, "throw_exception"),
            OverflowBehavior::SwitchPattern => write!(f, "switch_pattern"),
            OverflowBehavior::ExtendPadding => write!(f, "extend_padding"),
        }
    }
}

impl std::str::FromStr for OverflowBehavior {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "throw_exception" => Ok(OverflowBehavior::ThrowException),
            "switch_pattern" => Ok(OverflowBehavior::SwitchPattern),
            "extend_padding" => Ok(OverflowBehavior::ExtendPadding),
            other => Err(format!("Unknown overflow behavior: '{}'", other)),
        }
    }
}

impl std::fmt::Display for ResetPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResetPeriod::Daily => write!(f, "daily"),
            ResetPeriod::Monthly => write!(f, "monthly"),
            ResetPeriod::Yearly => write!(f, "yearly"),
        }
    }
}

impl std::str::FromStr for ResetPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(ResetPeriod::Daily),
            "monthly" => Ok(ResetPeriod::Monthly),
            "yearly" => Ok(ResetPeriod::Yearly),
            other => Err(format!("Unknown reset period: '{}'", other)),
        }
    }
}

// =============================================================================
// Sequence
// =============================================================================

/// A named, optionally scoped numbering configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Business name ("invoice", "purchase_order").
    pub name: String,

    /// Scope this definition is bound to. `None` serves every scope.
    pub scope: Option<String>,

    /// Static pattern template. Pattern versions may supersede it.
    pub pattern: String,

    /// Counter increment per generated number (≥ 1).
    pub step: i64,

    pub gap_policy: GapPolicy,

    pub overflow_behavior: OverflowBehavior,

    /// Utilization percentage that triggers the overflow behavior.
    pub exhaustion_threshold: f64,

    /// Auto-reset after this many generations.
    pub reset_limit: Option<i64>,

    /// Auto-reset at calendar boundaries.
    pub reset_period: Option<ResetPeriod>,

    /// Locked sequences refuse to generate.
    pub locked: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Caller-facing description of a sequence to create.
///
/// ## Example
/// ```rust
/// use seqgen_core::types::{GapPolicy, SequenceDefinition};
///
/// let def = SequenceDefinition::new("invoice", "INV-{YEAR}-{COUNTER:5}")
///     .gap_policy(GapPolicy::FillEager)
///     .step(1);
/// assert_eq!(def.name, "invoice");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceDefinition {
    pub name: String,

    #[serde(default)]
    pub scope: Option<String>,

    pub pattern: String,

    #[serde(default = "default_step")]
    pub step: i64,

    #[serde(default)]
    pub gap_policy: GapPolicy,

    #[serde(default)]
    pub overflow_behavior: OverflowBehavior,

    #[serde(default = "default_threshold")]
    pub exhaustion_threshold: f64,

    #[serde(default)]
    pub reset_limit: Option<i64>,

    #[serde(default)]
    pub reset_period: Option<ResetPeriod>,
}

fn default_step() -> i64 {
    1
}

fn default_threshold() -> f64 {
    90.0
}

impl SequenceDefinition {
    /// Creates a definition with default policies (step 1, no gap filling,
    /// throw on exhaustion at 90%).
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        SequenceDefinition {
            name: name.into(),
            scope: None,
            pattern: pattern.into(),
            step: default_step(),
            gap_policy: GapPolicy::default(),
            overflow_behavior: OverflowBehavior::default(),
            exhaustion_threshold: default_threshold(),
            reset_limit: None,
            reset_period: None,
        }
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn step(mut self, step: i64) -> Self {
        self.step = step;
        self
    }

    pub fn gap_policy(mut self, policy: GapPolicy) -> Self {
        self.gap_policy = policy;
        self
    }

    pub fn overflow_behavior(mut self, behavior: OverflowBehavior) -> Self {
        self.overflow_behavior = behavior;
        self
    }

    pub fn exhaustion_threshold(mut self, threshold: f64) -> Self {
        self.exhaustion_threshold = threshold;
        self
    }

    pub fn reset_limit(mut self, limit: i64) -> Self {
        self.reset_limit = Some(limit);
        self
    }

    pub fn reset_period(mut self, period: ResetPeriod) -> Self {
        self.reset_period = Some(period);
        self
    }

    /// Materializes the definition into an unlocked sequence with a fresh id.
    pub fn into_sequence(self, now: DateTime<Utc>) -> Sequence {
        Sequence {
            id: uuid::Uuid::new_v4().to_string(),
            name: self.name,
            scope: self.scope,
            pattern: self.pattern,
            step: self.step,
            gap_policy: self.gap_policy,
            overflow_behavior: self.overflow_behavior,
            exhaustion_threshold: self.exhaustion_threshold,
            reset_limit: self.reset_limit,
            reset_period: self.reset_period,
            locked: false,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Counter
// =============================================================================

/// Snapshot of the counter backing one (sequence, scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CounterState {
    pub current_value: i64,

    /// Generations since the last reset.
    pub generation_count: i64,

    pub last_reset_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Gap
// =============================================================================

/// A voided number eligible for reuse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub id: String,
    pub sequence_id: String,
    pub scope: Option<String>,
    pub number: String,
    pub reason: Option<String>,
    pub filled: bool,
    pub created_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
}

/// Aggregated view of the gaps of one (sequence, scope).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapReport {
    pub total: usize,
    pub filled: usize,
    pub unfilled: usize,
    pub gaps: Vec<Gap>,
}

impl GapReport {
    pub fn from_gaps(gaps: Vec<Gap>) -> Self {
        let filled = gaps.iter().filter(|g| g.filled).count();
        GapReport {
            total: gaps.len(),
            filled,
            unfilled: gaps.len() - filled,
            gaps,
        }
    }
}

// =============================================================================
// Reservation
// =============================================================================

/// State of a reserved number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    Released,
    Finalized,
    Expired,
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReservationStatus::Active => write!(f, "active"),
            ReservationStatus::Released => write!(f, "released"),
            ReservationStatus::Finalized => write!(f, "finalized"),
            ReservationStatus::Expired => write!(f, "expired"),
        }
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ReservationStatus::Active),
            "released" => Ok(ReservationStatus::Released),
            "finalized" => Ok(ReservationStatus::Finalized),
            "expired" => Ok(ReservationStatus::Expired),
            other => Err(format!("Unknown reservation status: '{}'", other)),
        }
    }
}

/// One number held by a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedNumber {
    pub number: String,
    pub status: ReservationStatus,
}

/// A TTL-bound hold on numbers that were already consumed from the counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub sequence_id: String,
    pub scope: Option<String>,
    pub numbers: Vec<ReservedNumber>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// Derived status: any active number keeps the reservation active.
    pub fn status(&self) -> ReservationStatus {
        let has = |s: ReservationStatus| self.numbers.iter().any(|n| n.status == s);

        if has(ReservationStatus::Active) {
            ReservationStatus::Active
        } else if !self.numbers.is_empty()
            && self
                .numbers
                .iter()
                .all(|n| n.status == ReservationStatus::Finalized)
        {
            ReservationStatus::Finalized
        } else if has(ReservationStatus::Expired) {
            ReservationStatus::Expired
        } else {
            ReservationStatus::Released
        }
    }

    /// Numbers still held.
    pub fn active_numbers(&self) -> Vec<&str> {
        self.numbers
            .iter()
            .filter(|n| n.status == ReservationStatus::Active)
            .map(|n| n.number.as_str())
            .collect()
    }

    /// Returns true once the TTL has passed (the sweep may not have run yet).
    pub fn is_past_ttl(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// What `reserve()` hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationReceipt {
    pub reservation_id: String,
    pub numbers: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// Pattern Version
// =============================================================================

/// An effective-dated pattern for a sequence. Range is `[from, until)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternVersion {
    pub id: String,
    pub sequence_id: String,
    pub pattern: String,
    pub effective_from: DateTime<Utc>,
    /// `None` = open-ended.
    pub effective_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PatternVersion {
    /// Returns true if `at` lies within `[effective_from, effective_until)`.
    pub fn is_effective_at(&self, at: DateTime<Utc>) -> bool {
        at >= self.effective_from && self.effective_until.map_or(true, |until| at < until)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_policy_defaults() {
        assert_eq!(GapPolicy::default(), GapPolicy::None);
        assert_eq!(OverflowBehavior::default(), OverflowBehavior::ThrowException);
        assert!(GapPolicy::FillEager.fills_gaps());
        assert!(!GapPolicy::None.fills_gaps());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("fill_eager".parse::<GapPolicy>().unwrap(), GapPolicy::FillEager);
        assert_eq!(
            "SWITCH_PATTERN".parse::<OverflowBehavior>().unwrap(),
            OverflowBehavior::SwitchPattern
        );
        assert!("sometimes".parse::<GapPolicy>().is_err());
    }

    #[test]
    fn test_reset_period_boundaries() {
        let since = at(2024, 6, 1, 10);
        assert!(!ResetPeriod::Daily.has_elapsed(since, at(2024, 6, 1, 23)));
        assert!(ResetPeriod::Daily.has_elapsed(since, at(2024, 6, 2, 0)));
        assert!(!ResetPeriod::Monthly.has_elapsed(since, at(2024, 6, 30, 0)));
        assert!(ResetPeriod::Monthly.has_elapsed(since, at(2024, 7, 1, 0)));
        assert!(!ResetPeriod::Yearly.has_elapsed(since, at(2024, 12, 31, 0)));
        assert!(ResetPeriod::Yearly.has_elapsed(since, at(2025, 1, 1, 0)));
        // Clock skew never triggers a reset
        assert!(!ResetPeriod::Daily.has_elapsed(since, at(2024, 5, 1, 0)));
    }

    #[test]
    fn test_pattern_version_range_is_half_open() {
        let version = PatternVersion {
            id: "v1".into(),
            sequence_id: "s1".into(),
            pattern: "INV-{COUNTER:4}".into(),
            effective_from: at(2024, 1, 1, 0),
            effective_until: Some(at(2024, 7, 1, 0)),
            created_at: at(2024, 1, 1, 0),
        };
        assert!(version.is_effective_at(at(2024, 1, 1, 0)));
        assert!(version.is_effective_at(at(2024, 6, 30, 23)));
        assert!(!version.is_effective_at(at(2024, 7, 1, 0)));
        assert!(!version.is_effective_at(at(2023, 12, 31, 23)));
    }

    #[test]
    fn test_reservation_status_derivation() {
        let mut reservation = Reservation {
            id: "r1".into(),
            sequence_id: "s1".into(),
            scope: None,
            numbers: vec![
                ReservedNumber {
                    number: "INV-1".into(),
                    status: ReservationStatus::Active,
                },
                ReservedNumber {
                    number: "INV-2".into(),
                    status: ReservationStatus::Finalized,
                },
            ],
            expires_at: at(2024, 1, 1, 1),
            created_at: at(2024, 1, 1, 0),
        };
        assert_eq!(reservation.status(), ReservationStatus::Active);
        assert_eq!(reservation.active_numbers(), vec!["INV-1"]);

        reservation.numbers[0].status = ReservationStatus::Finalized;
        assert_eq!(reservation.status(), ReservationStatus::Finalized);

        reservation.numbers[0].status = ReservationStatus::Expired;
        assert_eq!(reservation.status(), ReservationStatus::Expired);

        reservation.numbers[0].status = ReservationStatus::Released;
        assert_eq!(reservation.status(), ReservationStatus::Released);
    }

    #[test]
    fn test_gap_report_counts() {
        let gap = |filled| Gap {
            id: "g".into(),
            sequence_id: "s".into(),
            scope: None,
            number: "INV-001".into(),
            reason: None,
            filled,
            created_at: at(2024, 1, 1, 0),
            filled_at: None,
        };
        let report = GapReport::from_gaps(vec![gap(true), gap(false), gap(false)]);
        assert_eq!(report.total, 3);
        assert_eq!(report.filled, 1);
        assert_eq!(report.unfilled, 2);
    }

    #[test]
    fn test_definition_defaults() {
        let def: SequenceDefinition = serde_json::from_str(
            r#"{"name":"po","pattern":"PO-{COUNTER:6}","gap_policy":"fill_eager","reset_period":"yearly"}"#,
        )
        .unwrap();
        assert_eq!(def.step, 1);
        assert_eq!(def.gap_policy, GapPolicy::FillEager);
        assert_eq!(def.reset_period, Some(ResetPeriod::Yearly));
        assert_eq!(def.exhaustion_threshold, 90.0);
    }
}
