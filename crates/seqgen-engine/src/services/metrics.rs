//! # Sequence Metrics
//!
//! Point-in-time health snapshot of one (sequence, scope), assembled from
//! unlocked reads. Values may be stale under concurrent generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use seqgen_core::capacity::{self, UNBOUNDED};
use seqgen_core::error::SequenceResult;
use seqgen_core::pattern::Pattern;

use super::{load_sequence, PatternVersionManager};
use crate::store::Stores;

/// Serializable metrics snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceMetrics {
    pub name: String,
    pub scope: Option<String>,

    /// Pattern in effect now.
    pub pattern: String,

    pub current_value: i64,
    pub generation_count: i64,

    /// Largest counter value the pattern can render; `None` when unbounded.
    pub total_capacity: Option<i64>,

    pub utilization_percent: f64,
    pub risk_score: f64,

    pub active_reservations: usize,
    pub gap_count: usize,
    pub unfilled_gap_count: usize,

    pub last_reset_at: Option<DateTime<Utc>>,
    pub locked: bool,
}

#[derive(Clone)]
pub struct SequenceMetricsService {
    stores: Stores,
    versions: PatternVersionManager,
}

impl SequenceMetricsService {
    pub fn new(stores: Stores, versions: PatternVersionManager) -> Self {
        SequenceMetricsService { stores, versions }
    }

    pub async fn metrics(&self, name: &str, scope: Option<&str>) -> SequenceResult<SequenceMetrics> {
        let sequence = load_sequence(&self.stores, name, scope).await?;

        let pattern = self.versions.resolve(&sequence, Utc::now()).await?;
        let max_value = capacity::max_value_of(&Pattern::compile(&pattern)?);
        let state = self.stores.counters.snapshot(&sequence.id, scope).await?;
        let gaps = self.stores.gaps.gaps(&sequence.id, scope).await?;
        let active_reservations = self
            .stores
            .reservations
            .active_reservations(&sequence.id, scope)
            .await?
            .len();

        Ok(SequenceMetrics {
            name: sequence.name,
            scope: scope.map(str::to_string),
            pattern,
            current_value: state.current_value,
            generation_count: state.generation_count,
            total_capacity: (max_value != UNBOUNDED).then_some(max_value),
            utilization_percent: capacity::utilization_percent(state.current_value, max_value),
            risk_score: capacity::risk_score(
                state.current_value,
                max_value,
                sequence.exhaustion_threshold,
            ),
            active_reservations,
            gap_count: gaps.len(),
            unfilled_gap_count: gaps.iter().filter(|g| !g.filled).count(),
            last_reset_at: state.last_reset_at,
            locked: sequence.locked,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatternResolution;
    use crate::services::{testing, GapManager};
    use seqgen_core::types::SequenceDefinition;

    #[tokio::test]
    async fn test_metrics_snapshot() {
        let (stores, _) = testing::stores();
        let seq = testing::insert(&stores, SequenceDefinition::new("invoice", "INV-{COUNTER:3}")).await;
        testing::set_counter(&stores, &seq, Some("b1"), 450).await;
        GapManager::new(stores.clone())
            .record_gap("invoice", "INV-007", None, Some("b1"))
            .await
            .unwrap();

        let service = SequenceMetricsService::new(
            stores.clone(),
            PatternVersionManager::new(stores.clone(), PatternResolution::Versioned),
        );
        let metrics = service.metrics("invoice", Some("b1")).await.unwrap();

        assert_eq!(metrics.scope.as_deref(), Some("b1"));
        assert_eq!(metrics.current_value, 450);
        assert_eq!(metrics.total_capacity, Some(999));
        assert!((metrics.utilization_percent - 45.045).abs() < 0.01);
        assert!(metrics.risk_score > 50.0 && metrics.risk_score < 50.1);
        assert_eq!(metrics.gap_count, 1);
        assert_eq!(metrics.unfilled_gap_count, 1);
        assert!(!metrics.locked);

        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["pattern"], "INV-{COUNTER:3}");
    }

    #[tokio::test]
    async fn test_unbounded_capacity() {
        let (stores, _) = testing::stores();
        testing::insert(&stores, SequenceDefinition::new("ticket", "T{COUNTER}")).await;
        let service = SequenceMetricsService::new(
            stores.clone(),
            PatternVersionManager::new(stores.clone(), PatternResolution::Versioned),
        );

        let metrics = service.metrics("ticket", None).await.unwrap();
        assert_eq!(metrics.total_capacity, None);
        assert_eq!(metrics.utilization_percent, 0.0);
    }
}
