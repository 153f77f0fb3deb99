//! # Sequence Engine
//!
//! Facade wiring every service over one set of [`Stores`] and one
//! [`EngineConfig`]. This is what applications hold.
//!
//! ```rust,ignore
//! use seqgen_engine::{EngineConfig, SequenceEngine, Stores};
//!
//! let engine = SequenceEngine::new(Stores::in_memory(), EngineConfig::load_or_default(None));
//! engine.bootstrap().await?;
//!
//! let number = engine.generate("invoice", Some("branch-7"), &context).await?;
//! ```

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use seqgen_core::capacity::ExhaustionStatus;
use seqgen_core::error::SequenceResult;
use seqgen_core::migration::MigrationStrategy;
use seqgen_core::pattern::VariableContext;
use seqgen_core::types::{
    CounterState, Gap, GapReport, PatternVersion, Reservation, ReservationReceipt, Sequence,
    SequenceDefinition,
};

use crate::config::EngineConfig;
use crate::services::{
    load_sequence, BulkGeneratorService, CounterService, ExhaustionMonitor, GapManager,
    PatternMigrationService, PatternVersionManager, ReservationService, SequenceManager,
    SequenceMetrics, SequenceMetricsService, SequenceValidationService,
};
use crate::store::Stores;

#[derive(Clone)]
pub struct SequenceEngine {
    stores: Stores,
    config: EngineConfig,
    manager: SequenceManager,
    bulk: BulkGeneratorService,
    reservations: ReservationService,
    gaps: GapManager,
    versions: PatternVersionManager,
    migration: PatternMigrationService,
    exhaustion: ExhaustionMonitor,
    counters: CounterService,
    validation: SequenceValidationService,
    metrics: SequenceMetricsService,
}

impl SequenceEngine {
    pub fn new(stores: Stores, config: EngineConfig) -> Self {
        let versions = PatternVersionManager::new(stores.clone(), config.pattern_resolution);
        let counters = CounterService::new(stores.clone());
        let migration =
            PatternMigrationService::new(stores.clone(), versions.clone(), counters.clone());
        let exhaustion =
            ExhaustionMonitor::new(stores.clone(), versions.clone(), migration.clone());
        let manager = SequenceManager::new(
            stores.clone(),
            versions.clone(),
            exhaustion.clone(),
            counters.clone(),
            config.exhaustion.check_on_generate,
        );
        let bulk =
            BulkGeneratorService::new(stores.clone(), versions.clone(), config.bulk.max_count);
        let gaps = GapManager::new(stores.clone());
        let reservations = ReservationService::new(
            stores.clone(),
            bulk.clone(),
            gaps.clone(),
            config.reservation.clone(),
        );
        let validation = SequenceValidationService::new(stores.clone());
        let metrics = SequenceMetricsService::new(stores.clone(), versions.clone());

        SequenceEngine {
            stores,
            config,
            manager,
            bulk,
            reservations,
            gaps,
            versions,
            migration,
            exhaustion,
            counters,
            validation,
            metrics,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registers the `[[sequences]]` of the configuration that do not exist
    /// yet. Returns how many were created.
    pub async fn bootstrap(&self) -> SequenceResult<usize> {
        let mut created = 0;
        for definition in &self.config.sequences {
            let existing = self
                .stores
                .sequences
                .find_by_name_and_scope(&definition.name, definition.scope.as_deref())
                .await?;
            if existing.is_some_and(|s| s.scope == definition.scope) {
                debug!(sequence = %definition.name, scope = ?definition.scope, "Sequence already registered");
                continue;
            }
            self.manager.create_sequence(definition.clone()).await?;
            created += 1;
        }
        info!(created, configured = self.config.sequences.len(), "Sequences bootstrapped");
        Ok(created)
    }

    // =========================================================================
    // Sequences
    // =========================================================================

    pub async fn create_sequence(&self, definition: SequenceDefinition) -> SequenceResult<Sequence> {
        self.manager.create_sequence(definition).await
    }

    pub async fn sequence(&self, name: &str, scope: Option<&str>) -> SequenceResult<Sequence> {
        self.manager.sequence(name, scope).await
    }

    pub async fn list_sequences(&self) -> SequenceResult<Vec<Sequence>> {
        self.manager.list_sequences().await
    }

    // =========================================================================
    // Generation
    // =========================================================================

    pub async fn generate(
        &self,
        name: &str,
        scope: Option<&str>,
        context: &VariableContext,
    ) -> SequenceResult<String> {
        self.manager.generate(name, scope, context).await
    }

    pub async fn preview(
        &self,
        name: &str,
        scope: Option<&str>,
        context: &VariableContext,
    ) -> SequenceResult<String> {
        self.manager.preview(name, scope, context).await
    }

    pub async fn generate_bulk(
        &self,
        name: &str,
        count: usize,
        scope: Option<&str>,
        context: &VariableContext,
    ) -> SequenceResult<Vec<String>> {
        self.bulk.generate_bulk(name, count, scope, context).await
    }

    pub fn compose_child(
        &self,
        parent_number: &str,
        child_pattern: &str,
        child_counter: Option<i64>,
        context: &VariableContext,
    ) -> SequenceResult<String> {
        self.manager
            .compose_child(parent_number, child_pattern, child_counter, context)
    }

    // =========================================================================
    // Counter & Lock
    // =========================================================================

    pub async fn counter_state(&self, name: &str, scope: Option<&str>) -> SequenceResult<CounterState> {
        self.counters.state(name, scope).await
    }

    pub async fn reset_counter(
        &self,
        name: &str,
        scope: Option<&str>,
        performed_by: &str,
    ) -> SequenceResult<CounterState> {
        self.counters.reset(name, scope, performed_by).await
    }

    pub async fn override_counter(
        &self,
        name: &str,
        new_value: i64,
        scope: Option<&str>,
        performed_by: &str,
    ) -> SequenceResult<CounterState> {
        self.manager
            .override_counter(name, new_value, scope, performed_by)
            .await
    }

    pub async fn lock(&self, name: &str, scope: Option<&str>, performed_by: &str) -> SequenceResult<()> {
        self.manager.lock(name, scope, performed_by).await
    }

    pub async fn unlock(&self, name: &str, scope: Option<&str>, performed_by: &str) -> SequenceResult<()> {
        self.manager.unlock(name, scope, performed_by).await
    }

    // =========================================================================
    // Reservations
    // =========================================================================

    pub async fn reserve(
        &self,
        name: &str,
        count: usize,
        ttl_minutes: Option<i64>,
        scope: Option<&str>,
        context: &VariableContext,
    ) -> SequenceResult<ReservationReceipt> {
        self.reservations
            .reserve(name, count, ttl_minutes, scope, context)
            .await
    }

    pub async fn release(&self, name: &str, numbers: &[String], scope: Option<&str>) -> SequenceResult<usize> {
        self.reservations.release(name, numbers, scope).await
    }

    pub async fn finalize(&self, name: &str, numbers: &[String], scope: Option<&str>) -> SequenceResult<usize> {
        self.reservations.finalize(name, numbers, scope).await
    }

    pub async fn active_reservations(
        &self,
        name: &str,
        scope: Option<&str>,
    ) -> SequenceResult<Vec<Reservation>> {
        self.reservations.active_reservations(name, scope).await
    }

    pub async fn reservation(&self, reservation_id: &str) -> SequenceResult<Reservation> {
        self.reservations.reservation(reservation_id).await
    }

    pub async fn release_expired(&self) -> SequenceResult<usize> {
        self.reservations.release_expired().await
    }

    // =========================================================================
    // Gaps
    // =========================================================================

    pub async fn record_gap(
        &self,
        name: &str,
        number: &str,
        reason: Option<&str>,
        scope: Option<&str>,
    ) -> SequenceResult<Gap> {
        self.gaps.record_gap(name, number, reason, scope).await
    }

    pub async fn gap_report(&self, name: &str, scope: Option<&str>) -> SequenceResult<GapReport> {
        self.gaps.gap_report(name, scope).await
    }

    pub async fn clear_gaps(&self, name: &str, scope: Option<&str>) -> SequenceResult<usize> {
        self.gaps.clear_gaps(name, scope).await
    }

    // =========================================================================
    // Pattern Versions & Migration
    // =========================================================================

    pub async fn pattern_versions(&self, name: &str, scope: Option<&str>) -> SequenceResult<Vec<PatternVersion>> {
        let sequence = load_sequence(&self.stores, name, scope).await?;
        self.versions.versions(&sequence).await
    }

    pub async fn active_pattern(
        &self,
        name: &str,
        scope: Option<&str>,
        at: DateTime<Utc>,
    ) -> SequenceResult<String> {
        let sequence = load_sequence(&self.stores, name, scope).await?;
        self.versions.active_pattern(&sequence, at).await
    }

    pub async fn create_pattern_version(
        &self,
        name: &str,
        scope: Option<&str>,
        pattern: &str,
        effective_from: DateTime<Utc>,
        effective_until: Option<DateTime<Utc>>,
    ) -> SequenceResult<PatternVersion> {
        let sequence = load_sequence(&self.stores, name, scope).await?;
        self.versions
            .create_version(&sequence, pattern, effective_from, effective_until)
            .await
    }

    pub async fn migrate(
        &self,
        name: &str,
        scope: Option<&str>,
        strategy: MigrationStrategy,
        effective_from: Option<DateTime<Utc>>,
    ) -> SequenceResult<PatternVersion> {
        let sequence = load_sequence(&self.stores, name, scope).await?;
        self.migration
            .migrate(&sequence, scope, strategy, effective_from)
            .await
    }

    pub async fn check_exhaustion(&self, name: &str, scope: Option<&str>) -> SequenceResult<ExhaustionStatus> {
        self.exhaustion.check(name, scope).await
    }

    // =========================================================================
    // Validation & Metrics
    // =========================================================================

    pub async fn validate_number(&self, name: &str, number: &str, scope: Option<&str>) -> SequenceResult<bool> {
        self.validation.validate_number(name, number, scope).await
    }

    pub fn validate_syntax(&self, pattern: &str) -> SequenceResult<()> {
        self.validation.validate_syntax(pattern)
    }

    pub fn detect_collisions(&self, first: &str, second: &str) -> SequenceResult<bool> {
        self.validation.detect_collisions(first, second)
    }

    pub async fn metrics(&self, name: &str, scope: Option<&str>) -> SequenceResult<SequenceMetrics> {
        self.metrics.metrics(name, scope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PatternResolution, ReleasePolicy};
    use seqgen_core::types::GapPolicy;
    use std::collections::HashMap;

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.sequences = vec![
            SequenceDefinition::new("invoice", "INV-{YEAR}-{COUNTER:5}").gap_policy(GapPolicy::FillEager),
            SequenceDefinition::new("grn", "GRN-{BRANCH}-{COUNTER:4}").scope("b1"),
        ];
        config
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let engine = SequenceEngine::new(Stores::in_memory(), config());
        assert_eq!(engine.bootstrap().await.unwrap(), 2);
        assert_eq!(engine.bootstrap().await.unwrap(), 0);
        assert_eq!(engine.list_sequences().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_void_and_reuse_flow() {
        let mut config = config();
        config.reservation.release_policy = ReleasePolicy::ReturnToGaps;
        let engine = SequenceEngine::new(Stores::in_memory(), config);
        engine.bootstrap().await.unwrap();
        let year = Utc::now().format("%Y").to_string();
        let ctx = HashMap::new();

        let receipt = engine.reserve("invoice", 2, None, None, &ctx).await.unwrap();
        assert_eq!(receipt.numbers[0], format!("INV-{}-00001", year));

        engine.release("invoice", &receipt.numbers[..1], None).await.unwrap();
        assert_eq!(engine.gap_report("invoice", None).await.unwrap().unfilled, 1);

        // The released number is handed out again before the counter moves
        assert_eq!(engine.generate("invoice", None, &ctx).await.unwrap(), receipt.numbers[0]);
        assert_eq!(
            engine.generate("invoice", None, &ctx).await.unwrap(),
            format!("INV-{}-00003", year)
        );
        assert!(engine
            .validate_number("invoice", &receipt.numbers[1], None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_scoped_definition_not_visible_elsewhere() {
        let engine = SequenceEngine::new(Stores::in_memory(), config());
        engine.bootstrap().await.unwrap();

        let mut ctx = HashMap::new();
        ctx.insert("BRANCH".to_string(), "KHI".to_string());
        assert_eq!(engine.generate("grn", Some("b1"), &ctx).await.unwrap(), "GRN-KHI-0001");
        assert!(engine.generate("grn", Some("b2"), &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_static_resolution_ignores_versions() {
        let mut config = config();
        config.pattern_resolution = PatternResolution::Static;
        let engine = SequenceEngine::new(Stores::in_memory(), config);
        engine.bootstrap().await.unwrap();

        engine
            .create_pattern_version("invoice", None, "NEW-{COUNTER}", Utc::now() - chrono::Duration::hours(1), None)
            .await
            .unwrap();
        assert_eq!(
            engine.active_pattern("invoice", None, Utc::now()).await.unwrap(),
            "NEW-{COUNTER}"
        );
        let number = engine.generate("invoice", None, &HashMap::new()).await.unwrap();
        assert!(number.starts_with("INV-"));
    }
}
