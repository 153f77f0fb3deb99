//! # Counter Service
//!
//! Manual counter operations: reset, override and snapshot. Automatic
//! resets happen inside `generate()` under the same lock as the increment.

use chrono::Utc;
use tracing::info;

use seqgen_core::counter::validate_override;
use seqgen_core::error::SequenceResult;
use seqgen_core::types::{CounterState, Sequence};

use super::load_sequence;
use crate::audit::{emit, AuditEvent};
use crate::store::Stores;

#[derive(Clone)]
pub struct CounterService {
    stores: Stores,
}

impl CounterService {
    pub fn new(stores: Stores) -> Self {
        CounterService { stores }
    }

    /// Unlocked snapshot; may be stale by the time it is read.
    pub async fn state(&self, name: &str, scope: Option<&str>) -> SequenceResult<CounterState> {
        let sequence = load_sequence(&self.stores, name, scope).await?;
        self.stores.counters.snapshot(&sequence.id, scope).await
    }

    /// Sets the counter back to zero.
    pub async fn reset(
        &self,
        name: &str,
        scope: Option<&str>,
        performed_by: &str,
    ) -> SequenceResult<CounterState> {
        let sequence = load_sequence(&self.stores, name, scope).await?;
        self.reset_sequence(&sequence, scope, performed_by).await
    }

    async fn reset_sequence(
        &self,
        sequence: &Sequence,
        scope: Option<&str>,
        performed_by: &str,
    ) -> SequenceResult<CounterState> {
        let mut guard = self.stores.counters.lock(&sequence.id, scope).await?;
        let previous = guard.state().current_value;
        guard.reset(Utc::now());
        let state = guard.state();
        guard.commit().await?;

        self.report_reset(sequence, scope, previous, performed_by).await;
        Ok(state)
    }

    /// Logs and audits a reset that has been committed.
    pub(crate) async fn report_reset(
        &self,
        sequence: &Sequence,
        scope: Option<&str>,
        previous: i64,
        performed_by: &str,
    ) {
        info!(sequence = %sequence.name, ?scope, previous, performed_by, "Counter reset");
        emit(
            self.stores.audit.as_ref(),
            sequence,
            scope,
            AuditEvent::CounterReset {
                previous_value: previous,
                performed_by: performed_by.to_string(),
            },
        )
        .await;
    }

    /// Moves the counter forward to `new_value`.
    ///
    /// ## Errors
    /// `InvalidCounterValue` if `new_value` is not positive or not greater
    /// than the current value.
    pub async fn override_value(
        &self,
        name: &str,
        new_value: i64,
        scope: Option<&str>,
        performed_by: &str,
    ) -> SequenceResult<CounterState> {
        let sequence = load_sequence(&self.stores, name, scope).await?;

        let mut guard = self.stores.counters.lock(&sequence.id, scope).await?;
        let old = guard.state().current_value;
        validate_override(&sequence.name, old, new_value)?;
        guard.set_value(new_value);
        let state = guard.state();
        guard.commit().await?;

        info!(sequence = %sequence.name, ?scope, old, new_value, performed_by, "Counter overridden");
        emit(
            self.stores.audit.as_ref(),
            &sequence,
            scope,
            AuditEvent::CounterOverridden {
                old_value: old,
                new_value,
                performed_by: performed_by.to_string(),
            },
        )
        .await;

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing;
    use seqgen_core::error::SequenceError;
    use seqgen_core::types::SequenceDefinition;

    #[tokio::test]
    async fn test_override_must_advance() {
        let (stores, audit) = testing::stores();
        let seq = testing::insert(&stores, SequenceDefinition::new("invoice", "INV-{COUNTER}")).await;
        testing::set_counter(&stores, &seq, None, 10).await;
        let counters = CounterService::new(stores);

        let err = counters
            .override_value("invoice", 5, None, "ops")
            .await
            .unwrap_err();
        assert!(matches!(err, SequenceError::InvalidCounterValue { current: 10, .. }));
        assert_eq!(counters.state("invoice", None).await.unwrap().current_value, 10);

        let state = counters.override_value("invoice", 15, None, "ops").await.unwrap();
        assert_eq!(state.current_value, 15);
        assert_eq!(audit.kinds().await, vec!["counter_overridden"]);
    }

    #[tokio::test]
    async fn test_reset() {
        let (stores, audit) = testing::stores();
        let seq = testing::insert(&stores, SequenceDefinition::new("invoice", "INV-{COUNTER}")).await;
        testing::set_counter(&stores, &seq, Some("b1"), 42).await;
        let counters = CounterService::new(stores);

        let state = counters.reset("invoice", Some("b1"), "ops").await.unwrap();
        assert_eq!(state.current_value, 0);
        assert_eq!(state.generation_count, 0);
        assert!(state.last_reset_at.is_some());

        let entries = audit.entries().await;
        assert_eq!(
            entries[0].event,
            AuditEvent::CounterReset {
                previous_value: 42,
                performed_by: "ops".into()
            }
        );
    }
}
