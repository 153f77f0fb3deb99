//! # Gap Manager
//!
//! Voided numbers that `FillEager` sequences hand out again before touching
//! their counter. Reclaiming happens inside `generate()` through the store's
//! atomic `claim_next_gap`.

use chrono::Utc;
use tracing::info;

use seqgen_core::error::{SequenceResult, ValidationError};
use seqgen_core::types::{Gap, GapReport, Sequence};

use super::load_sequence;
use crate::store::Stores;

#[derive(Clone)]
pub struct GapManager {
    stores: Stores,
}

impl GapManager {
    pub fn new(stores: Stores) -> Self {
        GapManager { stores }
    }

    /// Records `number` as reusable.
    pub async fn record_gap(
        &self,
        name: &str,
        number: &str,
        reason: Option<&str>,
        scope: Option<&str>,
    ) -> SequenceResult<Gap> {
        if number.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "number".to_string(),
            }
            .into());
        }

        let sequence = load_sequence(&self.stores, name, scope).await?;
        self.record_for(&sequence, number, reason, scope).await
    }

    pub(crate) async fn record_for(
        &self,
        sequence: &Sequence,
        number: &str,
        reason: Option<&str>,
        scope: Option<&str>,
    ) -> SequenceResult<Gap> {
        let gap = self
            .record_by_id(&sequence.id, number, reason, scope)
            .await?;
        info!(sequence = %sequence.name, number, ?reason, "Gap recorded");
        Ok(gap)
    }

    /// Records a gap when only the sequence id is at hand (expiry sweep).
    pub(crate) async fn record_by_id(
        &self,
        sequence_id: &str,
        number: &str,
        reason: Option<&str>,
        scope: Option<&str>,
    ) -> SequenceResult<Gap> {
        let gap = Gap {
            id: uuid::Uuid::new_v4().to_string(),
            sequence_id: sequence_id.to_string(),
            scope: scope.map(str::to_string),
            number: number.to_string(),
            reason: reason.map(str::to_string),
            filled: false,
            created_at: Utc::now(),
            filled_at: None,
        };
        self.stores.gaps.record_gap(&gap).await?;
        Ok(gap)
    }

    /// Every gap, oldest first.
    pub async fn gaps(&self, name: &str, scope: Option<&str>) -> SequenceResult<Vec<Gap>> {
        let sequence = load_sequence(&self.stores, name, scope).await?;
        self.stores.gaps.gaps(&sequence.id, scope).await
    }

    pub async fn gap_report(&self, name: &str, scope: Option<&str>) -> SequenceResult<GapReport> {
        Ok(GapReport::from_gaps(self.gaps(name, scope).await?))
    }

    /// Deletes every gap of the sequence/scope.
    pub async fn clear_gaps(&self, name: &str, scope: Option<&str>) -> SequenceResult<usize> {
        let sequence = load_sequence(&self.stores, name, scope).await?;
        let cleared = self.stores.gaps.clear_gaps(&sequence.id, scope).await?;
        info!(sequence = %sequence.name, cleared, "Gaps cleared");
        Ok(cleared)
    }
}
