//! # Exhaustion Monitor
//!
//! Watches how much of a pattern's counter capacity is used and applies the
//! sequence's overflow behavior once the threshold is crossed.
//!
//! ## Decision Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  utilization = current / max × 100                                      │
//! │       │                                                                 │
//! │       ├── < threshold ─────────────────────────► Ok(status)             │
//! │       │                                                                 │
//! │       └── ≥ threshold ── audit "threshold reached"                      │
//! │                │                                                        │
//! │                ├── ThrowException ──► Err(SequenceExhausted)            │
//! │                ├── SwitchPattern  ──► migrate(AddSuffix)                │
//! │                └── ExtendPadding  ──► migrate(ExtendPadding)            │
//! │                                                                         │
//! │  Static pattern resolution never sees versions, so the migrating        │
//! │  branches only log a warning there.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The check reads the counter and the versions through a held counter
//! guard and stages any migration on it. `check()` is what an external
//! scheduler calls; `generate()` runs the same check under the guard it
//! mints with when `exhaustion.check_on_generate` is enabled.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use seqgen_core::capacity::{self, ExhaustionStatus};
use seqgen_core::error::{SequenceError, SequenceResult};
use seqgen_core::migration::MigrationStrategy;
use seqgen_core::pattern::Pattern;
use seqgen_core::types::{OverflowBehavior, Sequence};

use super::migration::StagedMigration;
use super::{load_sequence, PatternMigrationService, PatternVersionManager};
use crate::audit::{emit, AuditEvent};
use crate::config::PatternResolution;
use crate::store::{CounterGuard, Stores};

/// A capacity check taken under a counter guard. Audited through
/// [`ExhaustionMonitor::report`] once the guard is released.
#[derive(Debug, Clone)]
pub(crate) struct CapacityCheck {
    pub status: ExhaustionStatus,
    /// Pattern in effect once a staged migration commits.
    pub pattern: String,
    pub migration: Option<StagedMigration>,
    exhausted: bool,
}

impl CapacityCheck {
    /// `SequenceExhausted` when the overflow behavior refuses to continue.
    pub fn refusal(&self, sequence: &Sequence) -> Option<SequenceError> {
        self.exhausted.then(|| SequenceError::SequenceExhausted {
            name: sequence.name.clone(),
            current: self.status.current_value,
            max: self.status.max_value,
        })
    }
}

#[derive(Clone)]
pub struct ExhaustionMonitor {
    stores: Stores,
    versions: PatternVersionManager,
    migration: PatternMigrationService,
}

impl ExhaustionMonitor {
    pub fn new(
        stores: Stores,
        versions: PatternVersionManager,
        migration: PatternMigrationService,
    ) -> Self {
        ExhaustionMonitor {
            stores,
            versions,
            migration,
        }
    }

    /// `10^N − 1` for `{COUNTER:N}`, `i64::MAX` when unbounded.
    pub fn calculate_max_value(&self, pattern: &str) -> SequenceResult<i64> {
        capacity::calculate_max_value(pattern)
    }

    /// Checks a sequence by name.
    pub async fn check(&self, name: &str, scope: Option<&str>) -> SequenceResult<ExhaustionStatus> {
        let sequence = load_sequence(&self.stores, name, scope).await?;
        self.check_sequence(&sequence, scope).await
    }

    /// Checks against the capacity of the pattern currently in effect.
    pub async fn check_sequence(
        &self,
        sequence: &Sequence,
        scope: Option<&str>,
    ) -> SequenceResult<ExhaustionStatus> {
        self.run(sequence, scope, None).await
    }

    /// Evaluates utilization against `max_value` and applies the overflow
    /// behavior when the threshold is reached.
    pub async fn check_exhaustion(
        &self,
        sequence: &Sequence,
        scope: Option<&str>,
        max_value: i64,
    ) -> SequenceResult<ExhaustionStatus> {
        self.run(sequence, scope, Some(max_value)).await
    }

    async fn run(
        &self,
        sequence: &Sequence,
        scope: Option<&str>,
        max_value: Option<i64>,
    ) -> SequenceResult<ExhaustionStatus> {
        let mut guard = self.stores.counters.lock(&sequence.id, scope).await?;
        let check = self
            .check_locked(sequence, guard.as_mut(), max_value, Utc::now())
            .await?;

        if check.migration.is_some() {
            guard.commit().await?;
        } else {
            drop(guard);
        }

        self.report(sequence, scope, &check).await;
        match check.refusal(sequence) {
            Some(err) => Err(err),
            None => Ok(check.status),
        }
    }

    /// Runs the check on a held guard. A migration is staged on the guard
    /// and lands when the caller commits it. `max_value` defaults to the
    /// capacity of the pattern in effect at `now`.
    pub(crate) async fn check_locked(
        &self,
        sequence: &Sequence,
        guard: &mut dyn CounterGuard,
        max_value: Option<i64>,
        now: DateTime<Utc>,
    ) -> SequenceResult<CapacityCheck> {
        let (versions, pattern) = self.versions.resolve_locked(sequence, guard, now).await?;
        let max_value = match max_value {
            Some(max) => max,
            None => capacity::max_value_of(&Pattern::compile(&pattern)?),
        };

        let status = ExhaustionStatus::evaluate(
            guard.state().current_value,
            max_value,
            sequence.exhaustion_threshold,
        );
        let mut check = CapacityCheck {
            status,
            pattern,
            migration: None,
            exhausted: false,
        };

        if !check.status.threshold_reached {
            debug!(
                sequence = %sequence.name,
                utilization = check.status.utilization_percent,
                "Capacity within threshold"
            );
            return Ok(check);
        }

        let strategy = match sequence.overflow_behavior {
            OverflowBehavior::ThrowException => {
                check.exhausted = true;
                return Ok(check);
            }
            OverflowBehavior::SwitchPattern => MigrationStrategy::AddSuffix,
            OverflowBehavior::ExtendPadding => MigrationStrategy::ExtendPadding,
        };

        match self.versions.resolution() {
            PatternResolution::Versioned => {
                let staged = self
                    .migration
                    .stage(sequence, guard, &versions, strategy, now)?;
                check.pattern = staged.version.pattern.clone();
                check.status.migrated_to = Some(staged.version.pattern.clone());
                check.migration = Some(staged);
            }
            PatternResolution::Static => {
                warn!(
                    sequence = %sequence.name,
                    %strategy,
                    "Threshold reached but static pattern resolution skips migration"
                );
            }
        }

        Ok(check)
    }

    /// Audits a check whose guard has been committed or dropped.
    pub(crate) async fn report(&self, sequence: &Sequence, scope: Option<&str>, check: &CapacityCheck) {
        if !check.status.threshold_reached {
            return;
        }

        emit(
            self.stores.audit.as_ref(),
            sequence,
            scope,
            AuditEvent::ExhaustionThresholdReached {
                current_value: check.status.current_value,
                max_value: check.status.max_value,
                utilization_percent: check.status.utilization_percent,
                threshold: check.status.threshold,
            },
        )
        .await;

        if let Some(staged) = &check.migration {
            self.migration.report(sequence, scope, staged).await;
        }
    }

    /// Risk in `[0, 100]`: utilization relative to the threshold.
    pub async fn risk_score(
        &self,
        sequence: &Sequence,
        scope: Option<&str>,
        max_value: i64,
    ) -> SequenceResult<f64> {
        let state = self.stores.counters.snapshot(&sequence.id, scope).await?;
        Ok(capacity::risk_score(
            state.current_value,
            max_value,
            sequence.exhaustion_threshold,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{testing, CounterService};
    use seqgen_core::types::SequenceDefinition;

    fn monitor(stores: &Stores, resolution: PatternResolution) -> ExhaustionMonitor {
        let versions = PatternVersionManager::new(stores.clone(), resolution);
        let migration = PatternMigrationService::new(
            stores.clone(),
            versions.clone(),
            CounterService::new(stores.clone()),
        );
        ExhaustionMonitor::new(stores.clone(), versions, migration)
    }

    #[tokio::test]
    async fn test_below_threshold() {
        let (stores, audit) = testing::stores();
        let seq = testing::insert(&stores, SequenceDefinition::new("invoice", "INV-{COUNTER:4}")).await;
        testing::set_counter(&stores, &seq, None, 100).await;

        let status = monitor(&stores, PatternResolution::Versioned)
            .check("invoice", None)
            .await
            .unwrap();
        assert_eq!(status.max_value, 9999);
        assert!(!status.threshold_reached);
        assert!(audit.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_throw_exception() {
        let (stores, audit) = testing::stores();
        let seq = testing::insert(&stores, SequenceDefinition::new("invoice", "INV-{COUNTER:4}")).await;
        testing::set_counter(&stores, &seq, None, 9500).await;

        let err = monitor(&stores, PatternResolution::Versioned)
            .check("invoice", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SequenceError::SequenceExhausted {
                current: 9500,
                max: 9999,
                ..
            }
        ));
        assert_eq!(audit.kinds().await, vec!["exhaustion_threshold_reached"]);
    }

    #[tokio::test]
    async fn test_switch_pattern_yields_suffixed_version() {
        let (stores, _) = testing::stores();
        let seq = testing::insert(
            &stores,
            SequenceDefinition::new("invoice", "INV-{COUNTER:4}")
                .overflow_behavior(OverflowBehavior::SwitchPattern),
        )
        .await;
        testing::set_counter(&stores, &seq, None, 9000).await;
        let monitor = monitor(&stores, PatternResolution::Versioned);

        let status = monitor.check("invoice", None).await.unwrap();
        assert!(status.threshold_reached);
        assert_eq!(status.migrated_to.as_deref(), Some("INV-A-{COUNTER:4}"));

        let versions = PatternVersionManager::new(stores.clone(), PatternResolution::Versioned);
        assert_eq!(
            versions.active_pattern(&seq, Utc::now()).await.unwrap(),
            "INV-A-{COUNTER:4}"
        );

        // Counter restarted under the new pattern
        let status = monitor.check("invoice", None).await.unwrap();
        assert!(!status.threshold_reached);
    }

    #[tokio::test]
    async fn test_static_resolution_skips_migration() {
        let (stores, _) = testing::stores();
        let seq = testing::insert(
            &stores,
            SequenceDefinition::new("invoice", "INV-{COUNTER:4}")
                .overflow_behavior(OverflowBehavior::ExtendPadding),
        )
        .await;
        testing::set_counter(&stores, &seq, None, 9990).await;

        let status = monitor(&stores, PatternResolution::Static)
            .check("invoice", None)
            .await
            .unwrap();
        assert!(status.threshold_reached);
        assert!(status.migrated_to.is_none());
        assert!(stores.versions.versions(&seq.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_risk_score() {
        let (stores, _) = testing::stores();
        let seq = testing::insert(&stores, SequenceDefinition::new("invoice", "INV-{COUNTER:2}")).await;
        testing::set_counter(&stores, &seq, None, 45).await;
        let monitor = monitor(&stores, PatternResolution::Versioned);

        let score = monitor.risk_score(&seq, None, 99).await.unwrap();
        assert!(score > 50.0 && score < 51.0);
        assert_eq!(monitor.calculate_max_value("INV-{COUNTER:4}").unwrap(), 9999);
    }
}
