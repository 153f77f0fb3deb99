//! In-process implementation of every store contract.
//!
//! Each counter has its own `tokio::sync::Mutex` gate; the guard returned by
//! [`CounterStore::lock`] owns that gate, so concurrent `generate()` calls on
//! one `(sequence, scope)` queue up while other counters proceed. Committed
//! state sits behind a separate `RwLock` so snapshots never wait on a gate.
//!
//! Pattern versions share one `RwLock`. Every version write, including the
//! one a counter guard stages, re-runs the range check while holding it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use seqgen_core::error::{SequenceResult, ValidationError};
use seqgen_core::types::{
    CounterState, Gap, PatternVersion, Reservation, ReservationStatus, Sequence,
};
use seqgen_core::version::{check_supersede, validate_effective_range};

use super::{
    CounterGuard, CounterStore, GapStore, PatternVersionStore, ReservationStore, SequenceStore,
};

type Key = (String, Option<String>);

fn key(id: &str, scope: Option<&str>) -> Key {
    (id.to_string(), scope.map(str::to_string))
}

#[derive(Debug, Default)]
struct CounterCell {
    gate: Arc<Mutex<()>>,
    committed: Arc<RwLock<Option<CounterState>>>,
}

/// Every table in memory. Cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sequences: RwLock<Vec<Sequence>>,
    counters: Mutex<HashMap<Key, Arc<CounterCell>>>,
    gaps: Mutex<Vec<Gap>>,
    reservations: Mutex<Vec<Reservation>>,
    versions: Arc<RwLock<Vec<PatternVersion>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn cell(&self, sequence_id: &str, scope: Option<&str>) -> Arc<CounterCell> {
        let mut counters = self.counters.lock().await;
        counters
            .entry(key(sequence_id, scope))
            .or_default()
            .clone()
    }
}

// =============================================================================
// Sequences
// =============================================================================

#[async_trait]
impl SequenceStore for MemoryStore {
    async fn find_by_name_and_scope(
        &self,
        name: &str,
        scope: Option<&str>,
    ) -> SequenceResult<Option<Sequence>> {
        let sequences = self.sequences.read().await;
        let exact = sequences
            .iter()
            .find(|s| s.name == name && s.scope.as_deref() == scope);
        let found = exact.or_else(|| {
            sequences
                .iter()
                .find(|s| s.name == name && s.scope.is_none())
        });
        Ok(found.cloned())
    }

    async fn insert(&self, sequence: &Sequence) -> SequenceResult<()> {
        let mut sequences = self.sequences.write().await;
        if sequences
            .iter()
            .any(|s| s.name == sequence.name && s.scope == sequence.scope)
        {
            return Err(ValidationError::Duplicate {
                field: "sequence".to_string(),
                value: sequence.name.clone(),
            }
            .into());
        }
        sequences.push(sequence.clone());
        Ok(())
    }

    async fn set_locked(&self, sequence_id: &str, locked: bool) -> SequenceResult<()> {
        let mut sequences = self.sequences.write().await;
        if let Some(seq) = sequences.iter_mut().find(|s| s.id == sequence_id) {
            seq.locked = locked;
            seq.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list(&self) -> SequenceResult<Vec<Sequence>> {
        let mut all = self.sequences.read().await.clone();
        all.sort_by(|a, b| (&a.name, &a.scope).cmp(&(&b.name, &b.scope)));
        Ok(all)
    }
}

// =============================================================================
// Counters
// =============================================================================

struct MemoryCounterGuard {
    _gate: OwnedMutexGuard<()>,
    sequence_id: String,
    committed: Arc<RwLock<Option<CounterState>>>,
    versions: Arc<RwLock<Vec<PatternVersion>>>,
    pending: CounterState,
    staged: Option<(Option<String>, PatternVersion)>,
}

#[async_trait]
impl CounterGuard for MemoryCounterGuard {
    fn state(&self) -> CounterState {
        self.pending
    }

    fn reset(&mut self, at: DateTime<Utc>) {
        self.pending = CounterState {
            current_value: 0,
            generation_count: 0,
            last_reset_at: Some(at),
        };
    }

    fn set_value(&mut self, value: i64) {
        self.pending.current_value = value;
        self.pending.generation_count = 0;
    }

    fn increment(&mut self, by: i64, generations: i64) {
        self.pending.current_value = self.pending.current_value.saturating_add(by);
        self.pending.generation_count = self.pending.generation_count.saturating_add(generations);
    }

    async fn versions(&mut self) -> SequenceResult<Vec<PatternVersion>> {
        let mut owned = versions_of(&self.versions.read().await, &self.sequence_id);
        if let Some((replaces, version)) = &self.staged {
            close_and_push(&mut owned, replaces.as_deref(), version);
        }
        Ok(owned)
    }

    fn supersede_version(&mut self, replaces: Option<String>, version: PatternVersion) {
        self.staged = Some((replaces, version));
    }

    async fn commit(self: Box<Self>) -> SequenceResult<()> {
        let guard = *self;
        if let Some((replaces, version)) = &guard.staged {
            let mut versions = guard.versions.write().await;
            supersede_in(&mut versions, replaces.as_deref(), version)?;
        }
        *guard.committed.write().await = Some(guard.pending);
        Ok(())
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn snapshot(
        &self,
        sequence_id: &str,
        scope: Option<&str>,
    ) -> SequenceResult<CounterState> {
        let cell = {
            let counters = self.counters.lock().await;
            counters.get(&key(sequence_id, scope)).cloned()
        };
        match cell {
            Some(cell) => Ok(cell.committed.read().await.unwrap_or_default()),
            None => Ok(CounterState::default()),
        }
    }

    async fn lock(
        &self,
        sequence_id: &str,
        scope: Option<&str>,
    ) -> SequenceResult<Box<dyn CounterGuard>> {
        let cell = self.cell(sequence_id, scope).await;
        let gate = cell.gate.clone().lock_owned().await;

        let pending = {
            let mut committed = cell.committed.write().await;
            *committed.get_or_insert(CounterState {
                current_value: 0,
                generation_count: 0,
                last_reset_at: Some(Utc::now()),
            })
        };

        Ok(Box::new(MemoryCounterGuard {
            _gate: gate,
            sequence_id: sequence_id.to_string(),
            committed: cell.committed.clone(),
            versions: self.versions.clone(),
            pending,
            staged: None,
        }))
    }
}

// =============================================================================
// Gaps
// =============================================================================

fn same_owner(gap: &Gap, sequence_id: &str, scope: Option<&str>) -> bool {
    gap.sequence_id == sequence_id && gap.scope.as_deref() == scope
}

#[async_trait]
impl GapStore for MemoryStore {
    async fn record_gap(&self, gap: &Gap) -> SequenceResult<()> {
        self.gaps.lock().await.push(gap.clone());
        Ok(())
    }

    async fn next_gap(
        &self,
        sequence_id: &str,
        scope: Option<&str>,
    ) -> SequenceResult<Option<Gap>> {
        let gaps = self.gaps.lock().await;
        Ok(gaps
            .iter()
            .filter(|g| same_owner(g, sequence_id, scope) && !g.filled)
            .min_by_key(|g| g.created_at)
            .cloned())
    }

    async fn mark_gap_filled(&self, gap_id: &str, at: DateTime<Utc>) -> SequenceResult<()> {
        let mut gaps = self.gaps.lock().await;
        if let Some(gap) = gaps.iter_mut().find(|g| g.id == gap_id) {
            gap.filled = true;
            gap.filled_at = Some(at);
        }
        Ok(())
    }

    async fn claim_next_gap(
        &self,
        sequence_id: &str,
        scope: Option<&str>,
        at: DateTime<Utc>,
    ) -> SequenceResult<Option<Gap>> {
        let mut gaps = self.gaps.lock().await;
        let oldest = gaps
            .iter_mut()
            .filter(|g| same_owner(g, sequence_id, scope) && !g.filled)
            .min_by_key(|g| g.created_at);

        Ok(oldest.map(|gap| {
            gap.filled = true;
            gap.filled_at = Some(at);
            gap.clone()
        }))
    }

    async fn gaps(&self, sequence_id: &str, scope: Option<&str>) -> SequenceResult<Vec<Gap>> {
        let gaps = self.gaps.lock().await;
        let mut owned: Vec<Gap> = gaps
            .iter()
            .filter(|g| same_owner(g, sequence_id, scope))
            .cloned()
            .collect();
        owned.sort_by_key(|g| g.created_at);
        Ok(owned)
    }

    async fn clear_gaps(&self, sequence_id: &str, scope: Option<&str>) -> SequenceResult<usize> {
        let mut gaps = self.gaps.lock().await;
        let before = gaps.len();
        gaps.retain(|g| !same_owner(g, sequence_id, scope));
        Ok(before - gaps.len())
    }
}

// =============================================================================
// Reservations
// =============================================================================

impl MemoryStore {
    async fn transition(
        &self,
        sequence_id: &str,
        scope: Option<&str>,
        numbers: &[String],
        to: ReservationStatus,
    ) -> Vec<String> {
        let mut reservations = self.reservations.lock().await;
        let mut changed = Vec::new();

        for reservation in reservations
            .iter_mut()
            .filter(|r| r.sequence_id == sequence_id && r.scope.as_deref() == scope)
        {
            for entry in reservation.numbers.iter_mut() {
                if entry.status == ReservationStatus::Active && numbers.contains(&entry.number) {
                    entry.status = to;
                    changed.push(entry.number.clone());
                }
            }
        }
        changed
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn reserve(&self, reservation: &Reservation) -> SequenceResult<()> {
        self.reservations.lock().await.push(reservation.clone());
        Ok(())
    }

    async fn find(&self, reservation_id: &str) -> SequenceResult<Option<Reservation>> {
        let reservations = self.reservations.lock().await;
        Ok(reservations.iter().find(|r| r.id == reservation_id).cloned())
    }

    async fn release(
        &self,
        sequence_id: &str,
        scope: Option<&str>,
        numbers: &[String],
    ) -> SequenceResult<Vec<String>> {
        Ok(self
            .transition(sequence_id, scope, numbers, ReservationStatus::Released)
            .await)
    }

    async fn finalize(
        &self,
        sequence_id: &str,
        scope: Option<&str>,
        numbers: &[String],
    ) -> SequenceResult<Vec<String>> {
        Ok(self
            .transition(sequence_id, scope, numbers, ReservationStatus::Finalized)
            .await)
    }

    async fn active_reservations(
        &self,
        sequence_id: &str,
        scope: Option<&str>,
    ) -> SequenceResult<Vec<Reservation>> {
        let reservations = self.reservations.lock().await;
        Ok(reservations
            .iter()
            .filter(|r| {
                r.sequence_id == sequence_id
                    && r.scope.as_deref() == scope
                    && r.status() == ReservationStatus::Active
            })
            .cloned()
            .collect())
    }

    async fn release_expired(&self, now: DateTime<Utc>) -> SequenceResult<Vec<Reservation>> {
        let mut reservations = self.reservations.lock().await;
        let mut expired = Vec::new();

        for reservation in reservations.iter_mut().filter(|r| r.is_past_ttl(now)) {
            let mut touched = false;
            for entry in reservation.numbers.iter_mut() {
                if entry.status == ReservationStatus::Active {
                    entry.status = ReservationStatus::Expired;
                    touched = true;
                }
            }
            if touched {
                expired.push(reservation.clone());
            }
        }
        Ok(expired)
    }
}

// =============================================================================
// Pattern Versions
// =============================================================================

/// Versions of one sequence, earliest `effective_from` first.
fn versions_of(all: &[PatternVersion], sequence_id: &str) -> Vec<PatternVersion> {
    let mut owned: Vec<PatternVersion> = all
        .iter()
        .filter(|v| v.sequence_id == sequence_id)
        .cloned()
        .collect();
    owned.sort_by_key(|v| v.effective_from);
    owned
}

fn close_and_push(list: &mut Vec<PatternVersion>, replaces: Option<&str>, version: &PatternVersion) {
    if let Some(open) = list.iter_mut().find(|v| Some(v.id.as_str()) == replaces) {
        open.effective_until = Some(version.effective_from);
    }
    list.push(version.clone());
}

fn supersede_in(
    all: &mut Vec<PatternVersion>,
    replaces: Option<&str>,
    version: &PatternVersion,
) -> SequenceResult<()> {
    let existing = versions_of(all, &version.sequence_id);
    check_supersede(&version.sequence_id, &existing, replaces, version.effective_from)?;
    close_and_push(all, replaces, version);
    Ok(())
}

#[async_trait]
impl PatternVersionStore for MemoryStore {
    async fn active_version(
        &self,
        sequence_id: &str,
        at: DateTime<Utc>,
    ) -> SequenceResult<Option<PatternVersion>> {
        let versions = self.versions.read().await;
        Ok(versions
            .iter()
            .filter(|v| v.sequence_id == sequence_id && v.is_effective_at(at))
            .max_by_key(|v| v.effective_from)
            .cloned())
    }

    async fn create_version(&self, version: &PatternVersion) -> SequenceResult<()> {
        let mut versions = self.versions.write().await;
        let existing = versions_of(&versions, &version.sequence_id);
        validate_effective_range(
            &version.sequence_id,
            &existing,
            version.effective_from,
            version.effective_until,
        )?;
        versions.push(version.clone());
        Ok(())
    }

    async fn supersede_version(
        &self,
        replaces: Option<&str>,
        version: &PatternVersion,
    ) -> SequenceResult<()> {
        let mut versions = self.versions.write().await;
        supersede_in(&mut versions, replaces, version)
    }

    async fn versions(&self, sequence_id: &str) -> SequenceResult<Vec<PatternVersion>> {
        Ok(versions_of(&self.versions.read().await, sequence_id))
    }
}
