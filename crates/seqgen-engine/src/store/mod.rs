//! # Store Contracts
//!
//! Async traits the services run on. `memory` implements all of them
//! in-process; `seqgen-db` implements them on SQLite.
//!
//! ## Counter Critical Section
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    lock → read → increment → commit                     │
//! │                                                                         │
//! │  let mut guard = counters.lock(seq_id, scope).await?;   ◄── row locked │
//! │  let state = guard.state();                                            │
//! │  guard.increment(step, 1);                              ◄── buffered   │
//! │  guard.commit().await?;                                 ◄── persisted  │
//! │                                                                         │
//! │  Dropping the guard without commit() rolls back and releases the lock. │
//! │  Never call another store while holding a guard.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pattern versions that must move together with a counter (a suffix
//! migration resets the counter it renders with) are read and staged on the
//! guard itself; `commit()` writes both or neither.
//!
//! Scopes are part of every counter, gap and reservation key. A sequence
//! definition is looked up by exact `(name, scope)` first and falls back to
//! the unscoped definition, so one definition can serve many scopes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use seqgen_core::error::SequenceResult;
use seqgen_core::types::{CounterState, Gap, PatternVersion, Reservation, Sequence};

use crate::audit::{SequenceAudit, TracingAudit};

pub mod memory;

pub use memory::MemoryStore;

// =============================================================================
// Store Bundle
// =============================================================================

/// Every store a service may need, plus the audit sink.
#[derive(Clone)]
pub struct Stores {
    pub sequences: Arc<dyn SequenceStore>,
    pub counters: Arc<dyn CounterStore>,
    pub gaps: Arc<dyn GapStore>,
    pub reservations: Arc<dyn ReservationStore>,
    pub versions: Arc<dyn PatternVersionStore>,
    pub audit: Arc<dyn SequenceAudit>,
}

impl Stores {
    /// Uses one backend for every contract.
    pub fn from_backend<S>(backend: Arc<S>, audit: Arc<dyn SequenceAudit>) -> Self
    where
        S: SequenceStore
            + CounterStore
            + GapStore
            + ReservationStore
            + PatternVersionStore
            + 'static,
    {
        Stores {
            sequences: backend.clone(),
            counters: backend.clone(),
            gaps: backend.clone(),
            reservations: backend.clone(),
            versions: backend,
            audit,
        }
    }

    /// A fresh [`MemoryStore`] audited through `tracing`.
    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::new()), Arc::new(TracingAudit))
    }
}

// =============================================================================
// Sequences
// =============================================================================

#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Exact `(name, scope)` match, then the unscoped definition of `name`.
    async fn find_by_name_and_scope(
        &self,
        name: &str,
        scope: Option<&str>,
    ) -> SequenceResult<Option<Sequence>>;

    /// Inserts a new definition. Fails with `Validation(Duplicate)` when
    /// `(name, scope)` already exists.
    async fn insert(&self, sequence: &Sequence) -> SequenceResult<()>;

    async fn set_locked(&self, sequence_id: &str, locked: bool) -> SequenceResult<()>;

    /// Every definition, ordered by name then scope.
    async fn list(&self) -> SequenceResult<Vec<Sequence>>;
}

// =============================================================================
// Counters
// =============================================================================

/// Exclusive hold on one counter. Mutations are buffered until `commit`.
#[async_trait]
pub trait CounterGuard: Send {
    /// State including uncommitted changes.
    fn state(&self) -> CounterState;

    /// Sets the value and generation count to zero.
    fn reset(&mut self, at: DateTime<Utc>);

    /// Overwrites the value and restarts the generation count.
    fn set_value(&mut self, value: i64);

    fn increment(&mut self, by: i64, generations: i64);

    /// Pattern versions of the locked counter's sequence, ordered by
    /// `effective_from`, including any staged by this guard.
    async fn versions(&mut self) -> SequenceResult<Vec<PatternVersion>>;

    /// Stages `version` as the new open-ended version replacing the open
    /// version `replaces`. Written by `commit` with the counter state, which
    /// fails with `PatternVersionConflict` (writing nothing) if another
    /// writer replaced the open version first.
    fn supersede_version(&mut self, replaces: Option<String>, version: PatternVersion);

    /// Persists the buffered state and releases the lock.
    async fn commit(self: Box<Self>) -> SequenceResult<()>;
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Unlocked read. A counter that was never locked reads as zero.
    async fn snapshot(&self, sequence_id: &str, scope: Option<&str>)
        -> SequenceResult<CounterState>;

    /// Waits for and takes the counter lock, creating the counter
    /// (value 0, `last_reset_at = now`) on first use.
    async fn lock(
        &self,
        sequence_id: &str,
        scope: Option<&str>,
    ) -> SequenceResult<Box<dyn CounterGuard>>;
}

// =============================================================================
// Gaps
// =============================================================================

#[async_trait]
pub trait GapStore: Send + Sync {
    async fn record_gap(&self, gap: &Gap) -> SequenceResult<()>;

    /// Oldest unfilled gap.
    async fn next_gap(&self, sequence_id: &str, scope: Option<&str>)
        -> SequenceResult<Option<Gap>>;

    async fn mark_gap_filled(&self, gap_id: &str, at: DateTime<Utc>) -> SequenceResult<()>;

    /// `next_gap` + `mark_gap_filled` as one atomic step.
    async fn claim_next_gap(
        &self,
        sequence_id: &str,
        scope: Option<&str>,
        at: DateTime<Utc>,
    ) -> SequenceResult<Option<Gap>>;

    /// Every gap, oldest first.
    async fn gaps(&self, sequence_id: &str, scope: Option<&str>) -> SequenceResult<Vec<Gap>>;

    /// Deletes every gap. Returns how many were removed.
    async fn clear_gaps(&self, sequence_id: &str, scope: Option<&str>) -> SequenceResult<usize>;
}

// =============================================================================
// Reservations
// =============================================================================

#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn reserve(&self, reservation: &Reservation) -> SequenceResult<()>;

    async fn find(&self, reservation_id: &str) -> SequenceResult<Option<Reservation>>;

    /// Marks the listed numbers released if still active. Returns the ones changed.
    async fn release(
        &self,
        sequence_id: &str,
        scope: Option<&str>,
        numbers: &[String],
    ) -> SequenceResult<Vec<String>>;

    /// Marks the listed numbers finalized if still active. Returns the ones changed.
    async fn finalize(
        &self,
        sequence_id: &str,
        scope: Option<&str>,
        numbers: &[String],
    ) -> SequenceResult<Vec<String>>;

    /// Reservations holding at least one active number.
    async fn active_reservations(
        &self,
        sequence_id: &str,
        scope: Option<&str>,
    ) -> SequenceResult<Vec<Reservation>>;

    /// Marks active numbers of every reservation past `now` as expired and
    /// returns those reservations as updated.
    async fn release_expired(&self, now: DateTime<Utc>) -> SequenceResult<Vec<Reservation>>;
}

// =============================================================================
// Pattern Versions
// =============================================================================

#[async_trait]
pub trait PatternVersionStore: Send + Sync {
    async fn active_version(
        &self,
        sequence_id: &str,
        at: DateTime<Utc>,
    ) -> SequenceResult<Option<PatternVersion>>;

    /// Records `version`, re-checking its range against the stored versions
    /// in the same write. Fails with `PatternVersionConflict` on overlap.
    async fn create_version(&self, version: &PatternVersion) -> SequenceResult<()>;

    /// Closes `replaces` at `version.effective_from` and records `version`
    /// as the open-ended version, as one write checked by
    /// [`check_supersede`](seqgen_core::version::check_supersede).
    async fn supersede_version(
        &self,
        replaces: Option<&str>,
        version: &PatternVersion,
    ) -> SequenceResult<()>;

    /// All versions ordered by `effective_from`.
    async fn versions(&self, sequence_id: &str) -> SequenceResult<Vec<PatternVersion>>;
}
