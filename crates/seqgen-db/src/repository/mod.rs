//! # Repository Module
//!
//! SQLite implementations of the seqgen-engine store contracts.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SqliteStore (one pool, every contract)                                 │
//! │  ├── sequence.rs     SequenceStore        → sequences                   │
//! │  ├── counter.rs      CounterStore         → counters (tx-held guard)    │
//! │  ├── gap.rs          GapStore             → gaps                        │
//! │  ├── reservation.rs  ReservationStore     → reservations, reserved_...  │
//! │  └── version.rs      PatternVersionStore  → pattern_versions            │
//! │                                                                         │
//! │  SqliteAudit (audit.rs)  SequenceAudit    → sequence_audit_log          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each file keeps its SQL in inherent `DbResult` methods; the trait impls
//! convert to `SequenceResult` at the boundary.

use sqlx::SqlitePool;

pub mod audit;
pub mod counter;
pub mod gap;
pub mod reservation;
pub mod sequence;
pub mod version;

pub use audit::SqliteAudit;

/// Store over one SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteStore { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Column value for a caller scope; unscoped rows use `''`.
pub(crate) fn scope_key(scope: Option<&str>) -> &str {
    scope.unwrap_or("")
}

pub(crate) fn scope_from_key(key: String) -> Option<String> {
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::Utc;
    use seqgen_core::types::{Sequence, SequenceDefinition};
    use seqgen_engine::SequenceStore;

    use super::SqliteStore;
    use crate::pool::{Database, DbConfig};

    pub async fn store() -> SqliteStore {
        Database::new(DbConfig::in_memory()).await.unwrap().store()
    }

    pub async fn insert(store: &SqliteStore, def: SequenceDefinition) -> Sequence {
        let sequence = def.into_sequence(Utc::now());
        store.insert(&sequence).await.unwrap();
        sequence
    }
}
