//! # Pattern Migration Service
//!
//! Moves a sequence onto a roomier pattern by recording a new open-ended
//! pattern version.
//!
//! ```text
//! migrate(invoice, AddSuffix)
//!      │
//!      ├── lock counter
//!      ├── base "INV-{COUNTER:4}", 0 versions → suffix "A"
//!      ├── new pattern "INV-A-{COUNTER:4}" (syntax checked)
//!      ├── stage on the guard: close open version, new one from `effective_from`
//!      ├── reset counter: the new literal keeps numbers unique
//!      └── commit: version and counter land together
//!
//! migrate(invoice, ExtendPadding)
//!      │
//!      ├── current "INV-{COUNTER:4}" → "INV-{COUNTER:5}"
//!      └── stage and commit (counter keeps counting)
//! ```

use chrono::{DateTime, Utc};
use tracing::info;

use seqgen_core::error::SequenceResult;
use seqgen_core::migration::{migrated_pattern, MigrationStrategy};
use seqgen_core::pattern::validate_syntax;
use seqgen_core::types::{PatternVersion, Sequence};
use seqgen_core::version::{check_supersede, effective_at, open_ended};

use super::{CounterService, PatternVersionManager};
use crate::audit::{emit, AuditEvent};
use crate::store::{CounterGuard, Stores};

/// Recorded as `performed_by` for counter resets done by a migration.
pub const MIGRATION_ACTOR: &str = "system:migration";

/// A migration staged on a counter guard, reported once the guard commits.
#[derive(Debug, Clone)]
pub(crate) struct StagedMigration {
    pub strategy: MigrationStrategy,
    pub from_pattern: String,
    pub version: PatternVersion,
    /// Counter value before a suffix migration reset it.
    pub reset_from: Option<i64>,
}

#[derive(Clone)]
pub struct PatternMigrationService {
    stores: Stores,
    versions: PatternVersionManager,
    counters: CounterService,
}

impl PatternMigrationService {
    pub fn new(stores: Stores, versions: PatternVersionManager, counters: CounterService) -> Self {
        PatternMigrationService {
            stores,
            versions,
            counters,
        }
    }

    /// Computes the next pattern for `strategy` without recording it.
    pub async fn plan(
        &self,
        sequence: &Sequence,
        strategy: MigrationStrategy,
        at: DateTime<Utc>,
    ) -> SequenceResult<(String, String)> {
        let current = self.versions.active_pattern(sequence, at).await?;
        let migrations = self.versions.versions(sequence).await?.len();
        let next = migrated_pattern(strategy, &sequence.pattern, &current, migrations)?;
        validate_syntax(&next)?;
        Ok((current, next))
    }

    /// Records the migrated pattern effective from `effective_from` (now by
    /// default). Suffix migrations also reset the counter of `scope`.
    pub async fn migrate(
        &self,
        sequence: &Sequence,
        scope: Option<&str>,
        strategy: MigrationStrategy,
        effective_from: Option<DateTime<Utc>>,
    ) -> SequenceResult<PatternVersion> {
        let effective_from = effective_from.unwrap_or_else(Utc::now);

        let mut guard = self.stores.counters.lock(&sequence.id, scope).await?;
        let versions = guard.versions().await?;
        let staged = self.stage(sequence, guard.as_mut(), &versions, strategy, effective_from)?;
        guard.commit().await?;

        self.report(sequence, scope, &staged).await;
        Ok(staged.version)
    }

    /// Stages the migration on a held counter guard. Nothing is written
    /// until the caller commits the guard.
    pub(crate) fn stage(
        &self,
        sequence: &Sequence,
        guard: &mut dyn CounterGuard,
        versions: &[PatternVersion],
        strategy: MigrationStrategy,
        effective_from: DateTime<Utc>,
    ) -> SequenceResult<StagedMigration> {
        let current = effective_at(versions, effective_from)
            .map_or_else(|| sequence.pattern.clone(), |v| v.pattern.clone());
        let next = migrated_pattern(strategy, &sequence.pattern, &current, versions.len())?;
        validate_syntax(&next)?;

        let replaces = open_ended(versions).map(|v| v.id.clone());
        check_supersede(&sequence.name, versions, replaces.as_deref(), effective_from)?;

        let version = self.versions.new_version(sequence, &next, effective_from, None);
        guard.supersede_version(replaces, version.clone());

        let reset_from = match strategy {
            MigrationStrategy::AddSuffix => {
                let previous = guard.state().current_value;
                guard.reset(Utc::now());
                Some(previous)
            }
            MigrationStrategy::ExtendPadding => None,
        };

        Ok(StagedMigration {
            strategy,
            from_pattern: current,
            version,
            reset_from,
        })
    }

    /// Logs and audits a committed migration.
    pub(crate) async fn report(&self, sequence: &Sequence, scope: Option<&str>, staged: &StagedMigration) {
        info!(
            sequence = %sequence.name,
            strategy = %staged.strategy,
            from = %staged.from_pattern,
            to = %staged.version.pattern,
            "Pattern migrated"
        );
        emit(
            self.stores.audit.as_ref(),
            sequence,
            scope,
            AuditEvent::PatternMigrated {
                strategy: staged.strategy,
                from_pattern: staged.from_pattern.clone(),
                to_pattern: staged.version.pattern.clone(),
            },
        )
        .await;

        if let Some(previous) = staged.reset_from {
            self.counters
                .report_reset(sequence, scope, previous, MIGRATION_ACTOR)
                .await;
        }
    }
}
