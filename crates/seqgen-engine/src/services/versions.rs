//! # Pattern Version Manager
//!
//! Effective-dated patterns for a sequence.
//!
//! ```text
//! active_pattern(invoice, 2024-09-01)
//!      │
//!      ├── v2 [2024-07-01, ∞) "INV-A-{COUNTER:4}"  ◄── contains the instant
//!      │
//!      └── no version? → sequence.pattern
//! ```

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use seqgen_core::error::SequenceResult;
use seqgen_core::pattern::validate_syntax;
use seqgen_core::types::{PatternVersion, Sequence};
use seqgen_core::version::{check_supersede, effective_at, open_ended, validate_effective_range};

use crate::config::PatternResolution;
use crate::store::{CounterGuard, Stores};

#[derive(Clone)]
pub struct PatternVersionManager {
    stores: Stores,
    resolution: PatternResolution,
}

impl PatternVersionManager {
    pub fn new(stores: Stores, resolution: PatternResolution) -> Self {
        PatternVersionManager { stores, resolution }
    }

    pub fn resolution(&self) -> PatternResolution {
        self.resolution
    }

    /// Pattern of the version effective at `at`, else the sequence's own.
    pub async fn active_pattern(
        &self,
        sequence: &Sequence,
        at: DateTime<Utc>,
    ) -> SequenceResult<String> {
        let version = self.stores.versions.active_version(&sequence.id, at).await?;
        Ok(version.map_or_else(|| sequence.pattern.clone(), |v| v.pattern))
    }

    /// The pattern numbers are rendered with under the configured resolution.
    pub async fn resolve(&self, sequence: &Sequence, at: DateTime<Utc>) -> SequenceResult<String> {
        match self.resolution {
            PatternResolution::Versioned => self.active_pattern(sequence, at).await,
            PatternResolution::Static => Ok(sequence.pattern.clone()),
        }
    }

    /// [`resolve`](Self::resolve) read through a held counter guard, so the
    /// pattern cannot change before the guard commits. Also returns the
    /// versions read, empty under static resolution.
    pub(crate) async fn resolve_locked(
        &self,
        sequence: &Sequence,
        guard: &mut dyn CounterGuard,
        at: DateTime<Utc>,
    ) -> SequenceResult<(Vec<PatternVersion>, String)> {
        let versions = match self.resolution {
            PatternResolution::Versioned => guard.versions().await?,
            PatternResolution::Static => Vec::new(),
        };
        let pattern = effective_at(&versions, at)
            .map_or_else(|| sequence.pattern.clone(), |v| v.pattern.clone());
        Ok((versions, pattern))
    }

    /// All versions ordered by `effective_from`.
    pub async fn versions(&self, sequence: &Sequence) -> SequenceResult<Vec<PatternVersion>> {
        self.stores.versions.versions(&sequence.id).await
    }

    /// Records a version for `[effective_from, effective_until)`.
    ///
    /// ## Errors
    /// - `InvalidPattern` if the pattern does not compile
    /// - `Validation` if the range is empty
    /// - `PatternVersionConflict` if it overlaps an existing version
    pub async fn create_version(
        &self,
        sequence: &Sequence,
        pattern: &str,
        effective_from: DateTime<Utc>,
        effective_until: Option<DateTime<Utc>>,
    ) -> SequenceResult<PatternVersion> {
        validate_syntax(pattern)?;

        // Early check for a conflict naming the sequence; the store repeats
        // it under its write lock
        let existing = self.versions(sequence).await?;
        validate_effective_range(&sequence.name, &existing, effective_from, effective_until)?;

        let version = self.new_version(sequence, pattern, effective_from, effective_until);
        self.stores.versions.create_version(&version).await?;

        info!(
            sequence = %sequence.name,
            pattern,
            from = %effective_from,
            "Pattern version created"
        );
        Ok(version)
    }

    /// Closes the open-ended version at `effective_from` and records
    /// `pattern` as the new open-ended version, in one store write.
    pub async fn supersede(
        &self,
        sequence: &Sequence,
        pattern: &str,
        effective_from: DateTime<Utc>,
    ) -> SequenceResult<PatternVersion> {
        validate_syntax(pattern)?;

        let existing = self.versions(sequence).await?;
        let replaces = open_ended(&existing).map(|v| v.id.clone());
        check_supersede(&sequence.name, &existing, replaces.as_deref(), effective_from)?;

        let version = self.new_version(sequence, pattern, effective_from, None);
        debug!(sequence = %sequence.name, replaces = ?replaces, "Superseding open pattern version");
        self.stores
            .versions
            .supersede_version(replaces.as_deref(), &version)
            .await?;

        info!(
            sequence = %sequence.name,
            pattern,
            from = %effective_from,
            "Pattern version superseded"
        );
        Ok(version)
    }

    pub(crate) fn new_version(
        &self,
        sequence: &Sequence,
        pattern: &str,
        effective_from: DateTime<Utc>,
        effective_until: Option<DateTime<Utc>>,
    ) -> PatternVersion {
        PatternVersion {
            id: uuid::Uuid::new_v4().to_string(),
            sequence_id: sequence.id.clone(),
            pattern: pattern.to_string(),
            effective_from,
            effective_until,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing;
    use chrono::{Duration, TimeZone};
    use seqgen_core::error::SequenceError;
    use seqgen_core::types::SequenceDefinition;

    fn day(m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, m, d, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_active_pattern_falls_back_to_static() {
        let (stores, _) = testing::stores();
        let seq = testing::insert(&stores, SequenceDefinition::new("invoice", "INV-{COUNTER:4}")).await;
        let manager = PatternVersionManager::new(stores, PatternResolution::Versioned);

        assert_eq!(manager.active_pattern(&seq, day(3, 1)).await.unwrap(), "INV-{COUNTER:4}");

        manager
            .create_version(&seq, "INV-{YEAR}-{COUNTER:4}", day(6, 1), Some(day(9, 1)))
            .await
            .unwrap();
        assert_eq!(
            manager.active_pattern(&seq, day(7, 1)).await.unwrap(),
            "INV-{YEAR}-{COUNTER:4}"
        );
        assert_eq!(manager.active_pattern(&seq, day(9, 1)).await.unwrap(), "INV-{COUNTER:4}");
    }

    #[tokio::test]
    async fn test_overlapping_version_conflicts() {
        let (stores, _) = testing::stores();
        let seq = testing::insert(&stores, SequenceDefinition::new("invoice", "INV-{COUNTER:4}")).await;
        let manager = PatternVersionManager::new(stores, PatternResolution::Versioned);

        manager
            .create_version(&seq, "A-{COUNTER:4}", day(1, 1), Some(day(7, 1)))
            .await
            .unwrap();

        let err = manager
            .create_version(&seq, "B-{COUNTER:4}", day(6, 1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SequenceError::PatternVersionConflict { .. }));

        let err = manager
            .create_version(&seq, "B-{COUNTER", day(8, 1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SequenceError::InvalidPattern { .. }));

        assert!(manager
            .create_version(&seq, "B-{COUNTER:4}", day(7, 1), None)
            .await
            .is_ok());
        assert_eq!(manager.versions(&seq).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_supersede_closes_open_version() {
        let (stores, _) = testing::stores();
        let seq = testing::insert(&stores, SequenceDefinition::new("invoice", "INV-{COUNTER:4}")).await;
        let manager = PatternVersionManager::new(stores, PatternResolution::Versioned);

        let now = Utc::now();
        manager
            .supersede(&seq, "INV-A-{COUNTER:4}", now - Duration::days(2))
            .await
            .unwrap();
        manager
            .supersede(&seq, "INV-B-{COUNTER:4}", now - Duration::days(1))
            .await
            .unwrap();

        let versions = manager.versions(&seq).await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].effective_until, Some(now - Duration::days(1)));
        assert_eq!(versions[1].effective_until, None);
        assert_eq!(manager.active_pattern(&seq, now).await.unwrap(), "INV-B-{COUNTER:4}");

        // Cannot supersede at or before the open version's start
        assert!(manager
            .supersede(&seq, "INV-C-{COUNTER:4}", now - Duration::days(1))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_static_resolution_ignores_versions() {
        let (stores, _) = testing::stores();
        let seq = testing::insert(&stores, SequenceDefinition::new("invoice", "INV-{COUNTER:4}")).await;
        let manager = PatternVersionManager::new(stores, PatternResolution::Static);

        manager
            .supersede(&seq, "INV-A-{COUNTER:4}", Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(manager.resolve(&seq, Utc::now()).await.unwrap(), "INV-{COUNTER:4}");
        assert_eq!(
            manager.active_pattern(&seq, Utc::now()).await.unwrap(),
            "INV-A-{COUNTER:4}"
        );
    }
}
