//! # Services
//!
//! Stateless orchestration over [`Stores`](crate::store::Stores). Each
//! service is a small cloneable struct holding the stores and the
//! services it composes.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Service Graph                                   │
//! │                                                                         │
//! │  SequenceManager ──┬──► PatternVersionManager                          │
//! │                    ├──► ExhaustionMonitor ──► PatternMigrationService  │
//! │                    │                           ├──► PatternVersionMgr  │
//! │                    │                           └──► CounterService     │
//! │                    └──► CounterService                                 │
//! │                                                                         │
//! │  ReservationService ──► BulkGeneratorService ──► PatternVersionManager │
//! │                                                                         │
//! │  GapManager, SequenceValidationService, SequenceMetricsService         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use seqgen_core::error::{SequenceError, SequenceResult};
use seqgen_core::types::Sequence;

use crate::store::Stores;

pub mod bulk;
pub mod counter;
pub mod exhaustion;
pub mod gaps;
pub mod manager;
pub mod metrics;
pub mod migration;
pub mod reservation;
pub mod validation;
pub mod versions;

pub use bulk::BulkGeneratorService;
pub use counter::CounterService;
pub use exhaustion::ExhaustionMonitor;
pub use gaps::GapManager;
pub use manager::SequenceManager;
pub use metrics::{SequenceMetrics, SequenceMetricsService};
pub use migration::PatternMigrationService;
pub use reservation::ReservationService;
pub use validation::SequenceValidationService;
pub use versions::PatternVersionManager;

/// Looks up a sequence definition or fails with `SequenceNotFound`.
pub(crate) async fn load_sequence(
    stores: &Stores,
    name: &str,
    scope: Option<&str>,
) -> SequenceResult<Sequence> {
    stores
        .sequences
        .find_by_name_and_scope(name, scope)
        .await?
        .ok_or_else(|| SequenceError::not_found(name, scope))
}

/// Fails with `SequenceLocked` if the sequence refuses to mint numbers.
pub(crate) fn ensure_unlocked(sequence: &Sequence, scope: Option<&str>) -> SequenceResult<()> {
    if sequence.locked {
        return Err(SequenceError::SequenceLocked {
            name: sequence.name.clone(),
            scope: scope.map(str::to_string),
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use chrono::Utc;
    use seqgen_core::types::{Sequence, SequenceDefinition};

    use super::{
        CounterService, ExhaustionMonitor, PatternMigrationService, PatternVersionManager,
        SequenceManager,
    };
    use crate::audit::RecordingAudit;
    use crate::config::PatternResolution;
    use crate::store::{MemoryStore, Stores};

    /// In-memory stores with a recording audit sink.
    pub fn stores() -> (Stores, Arc<RecordingAudit>) {
        let audit = Arc::new(RecordingAudit::new());
        let stores = Stores::from_backend(Arc::new(MemoryStore::new()), audit.clone());
        (stores, audit)
    }

    /// A manager wired the way the engine wires it, checking exhaustion on
    /// every generate.
    pub fn manager(stores: &Stores) -> SequenceManager {
        let versions = PatternVersionManager::new(stores.clone(), PatternResolution::Versioned);
        let counters = CounterService::new(stores.clone());
        let migration =
            PatternMigrationService::new(stores.clone(), versions.clone(), counters.clone());
        let exhaustion = ExhaustionMonitor::new(stores.clone(), versions.clone(), migration);
        SequenceManager::new(stores.clone(), versions, exhaustion, counters, true)
    }

    pub async fn insert(stores: &Stores, def: SequenceDefinition) -> Sequence {
        let sequence = def.into_sequence(Utc::now());
        stores.sequences.insert(&sequence).await.unwrap();
        sequence
    }

    /// Moves a counter to `value` directly through the store.
    pub async fn set_counter(stores: &Stores, sequence: &Sequence, scope: Option<&str>, value: i64) {
        let mut guard = stores.counters.lock(&sequence.id, scope).await.unwrap();
        guard.set_value(value);
        guard.commit().await.unwrap();
    }
}
