//! # Bulk Generator
//!
//! Mints a contiguous run of numbers under one counter lock.
//!
//! ```text
//! lock ─► resolve pattern ─► values start+step·1 ..= start+step·count ─► render all ─► increment(step·count) ─► commit
//!                                                        │
//!                                                        └── any failure: guard dropped, counter unchanged
//! ```
//!
//! Bulk runs skip gap reclaiming, auto-reset and the exhaustion check.

use chrono::Utc;
use tracing::info;

use seqgen_core::counter::bulk_values;
use seqgen_core::error::{SequenceResult, ValidationError};
use seqgen_core::pattern::{Pattern, VariableContext};
use seqgen_core::types::Sequence;
use seqgen_core::validation::validate_bulk_count;

use super::{ensure_unlocked, load_sequence, PatternVersionManager};
use crate::audit::{emit, AuditEvent};
use crate::store::Stores;

#[derive(Clone)]
pub struct BulkGeneratorService {
    stores: Stores,
    versions: PatternVersionManager,
    max_count: usize,
}

impl BulkGeneratorService {
    pub fn new(stores: Stores, versions: PatternVersionManager, max_count: usize) -> Self {
        BulkGeneratorService {
            stores,
            versions,
            max_count,
        }
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    /// Generates `count` numbers in order. All or nothing.
    pub async fn generate_bulk(
        &self,
        name: &str,
        count: usize,
        scope: Option<&str>,
        context: &VariableContext,
    ) -> SequenceResult<Vec<String>> {
        validate_bulk_count(count, self.max_count)?;
        let sequence = load_sequence(&self.stores, name, scope).await?;
        self.generate_bulk_for(&sequence, count, scope, context).await
    }

    pub(crate) async fn generate_bulk_for(
        &self,
        sequence: &Sequence,
        count: usize,
        scope: Option<&str>,
        context: &VariableContext,
    ) -> SequenceResult<Vec<String>> {
        validate_bulk_count(count, self.max_count)?;
        ensure_unlocked(sequence, scope)?;

        let now = Utc::now();
        let date = now.date_naive();
        let total_step = i64::try_from(count)
            .ok()
            .and_then(|c| c.checked_mul(sequence.step))
            .ok_or_else(|| ValidationError::OutOfRange {
                field: "count".to_string(),
                min: 1,
                max: self.max_count as i64,
            })?;

        let mut guard = self.stores.counters.lock(&sequence.id, scope).await?;
        let (_, pattern) = self
            .versions
            .resolve_locked(sequence, guard.as_mut(), now)
            .await?;
        let pattern = Pattern::compile(&pattern)?;
        let values = bulk_values(guard.state().current_value, sequence.step, count)?;
        let numbers = values
            .iter()
            .map(|value| pattern.render(*value, context, date))
            .collect::<SequenceResult<Vec<_>>>()?;
        guard.increment(total_step, count as i64);
        guard.commit().await?;

        // validate_bulk_count guarantees at least one number
        let (first, last) = match (numbers.first(), numbers.last()) {
            (Some(first), Some(last)) => (first.clone(), last.clone()),
            _ => return Ok(numbers),
        };

        info!(sequence = %sequence.name, ?scope, count, %first, %last, "Bulk numbers generated");
        emit(
            self.stores.audit.as_ref(),
            sequence,
            scope,
            AuditEvent::BulkGenerated { count, first, last },
        )
        .await;

        Ok(numbers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatternResolution;
    use crate::services::{testing, GapManager};
    use seqgen_core::error::SequenceError;
    use seqgen_core::types::{GapPolicy, SequenceDefinition};
    use std::collections::HashMap;

    fn service(stores: &Stores) -> BulkGeneratorService {
        let versions = PatternVersionManager::new(stores.clone(), PatternResolution::Versioned);
        BulkGeneratorService::new(stores.clone(), versions, 100)
    }

    #[tokio::test]
    async fn test_bulk_matches_sequential_run() {
        let (stores, audit) = testing::stores();
        let bulk_seq = testing::insert(&stores, SequenceDefinition::new("po", "PO-{COUNTER:3}").step(2)).await;
        let twin = testing::insert(&stores, SequenceDefinition::new("po_twin", "PO-{COUNTER:3}").step(2)).await;
        testing::set_counter(&stores, &bulk_seq, None, 10).await;
        testing::set_counter(&stores, &twin, None, 10).await;

        let numbers = service(&stores).generate_bulk("po", 3, None, &HashMap::new()).await.unwrap();

        let manager = testing::manager(&stores);
        let mut sequential = Vec::new();
        for _ in 0..3 {
            sequential.push(manager.generate("po_twin", None, &HashMap::new()).await.unwrap());
        }
        assert_eq!(numbers, sequential);

        let after_bulk = stores.counters.snapshot(&bulk_seq.id, None).await.unwrap();
        let after_sequential = stores.counters.snapshot(&twin.id, None).await.unwrap();
        assert_eq!(after_bulk.current_value, after_sequential.current_value);
        assert_eq!(after_bulk.generation_count, 3);

        assert_eq!(
            audit.entries().await[0].event,
            AuditEvent::BulkGenerated {
                count: 3,
                first: numbers[0].clone(),
                last: numbers[2].clone(),
            }
        );
    }

    #[tokio::test]
    async fn test_bulk_skips_gaps_and_reset() {
        let (stores, _) = testing::stores();
        let seq = testing::insert(
            &stores,
            SequenceDefinition::new("ticket", "T-{COUNTER:3}")
                .gap_policy(GapPolicy::FillEager)
                .reset_limit(2),
        )
        .await;

        // Two numbers issued: the reset limit is reached
        let mut guard = stores.counters.lock(&seq.id, None).await.unwrap();
        guard.increment(2, 2);
        guard.commit().await.unwrap();
        GapManager::new(stores.clone())
            .record_gap("ticket", "T-001", Some("voided"), None)
            .await
            .unwrap();

        let numbers = service(&stores).generate_bulk("ticket", 3, None, &HashMap::new()).await.unwrap();
        assert_eq!(numbers, vec!["T-003", "T-004", "T-005"]);

        let gaps = stores.gaps.gaps(&seq.id, None).await.unwrap();
        assert_eq!(gaps.len(), 1);
        assert!(!gaps[0].filled);

        let state = stores.counters.snapshot(&seq.id, None).await.unwrap();
        assert_eq!(state.current_value, 5);
        assert_eq!(state.generation_count, 5);

        // A single generate still takes the gap first
        let manager = testing::manager(&stores);
        assert_eq!(manager.generate("ticket", None, &HashMap::new()).await.unwrap(), "T-001");
    }

    #[tokio::test]
    async fn test_count_bounds() {
        let (stores, _) = testing::stores();
        testing::insert(&stores, SequenceDefinition::new("po", "PO-{COUNTER}")).await;
        let bulk = service(&stores);

        assert!(bulk.generate_bulk("po", 0, None, &HashMap::new()).await.is_err());
        assert!(bulk.generate_bulk("po", 101, None, &HashMap::new()).await.is_err());
        assert_eq!(bulk.generate_bulk("po", 100, None, &HashMap::new()).await.unwrap().len(), 100);
    }

    #[tokio::test]
    async fn test_render_failure_rolls_back() {
        let (stores, audit) = testing::stores();
        let seq = testing::insert(&stores, SequenceDefinition::new("grn", "GRN-{BRANCH}-{COUNTER}")).await;
        let bulk = service(&stores);

        let err = bulk.generate_bulk("grn", 5, None, &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, SequenceError::InvalidPattern { .. }));
        assert_eq!(stores.counters.snapshot(&seq.id, None).await.unwrap().current_value, 0);
        assert!(audit.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_locked_sequence_refused() {
        let (stores, _) = testing::stores();
        let seq = testing::insert(&stores, SequenceDefinition::new("po", "PO-{COUNTER}")).await;
        stores.sequences.set_locked(&seq.id, true).await.unwrap();

        let err = service(&stores)
            .generate_bulk("po", 2, None, &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SequenceError::SequenceLocked { .. }));
    }
}
