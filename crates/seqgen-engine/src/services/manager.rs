//! # Sequence Manager
//!
//! The primary API: mint, preview and administer numbers.
//!
//! ## generate()
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. load (name, scope) ─── locked? ──────────────► Err(SequenceLocked)  │
//! │  2. FillEager and an unfilled gap? ── claim ─────► Ok(gap number)       │
//! │  3. ┌── lock counter ─────────────────────────────────────────────┐     │
//! │     │   exhaustion check (config): throw, or stage a migration    │     │
//! │     │   resolve pattern (versioned | static) through the guard    │     │
//! │     │   needs reset? → reset to 0                                 │     │
//! │     │   value = current + step                                    │     │
//! │     │   render(value)          (failure drops guard: no change)   │     │
//! │     │   increment(step), commit (with any staged version)         │     │
//! │     └─────────────────────────────────────────────────────────────┘     │
//! │  4. audit threshold and migration, reset (if any), "number generated"   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use tracing::{debug, info};

use seqgen_core::counter::{needs_reset, next_value};
use seqgen_core::error::{SequenceResult, ValidationError};
use seqgen_core::pattern::{parse, Pattern, VariableContext};
use seqgen_core::types::{CounterState, Sequence, SequenceDefinition};
use seqgen_core::validation::validate_definition;

use super::{ensure_unlocked, load_sequence, CounterService, ExhaustionMonitor, PatternVersionManager};
use crate::audit::{emit, AuditEvent};
use crate::store::Stores;

/// Recorded as `performed_by` for resets triggered by a reset limit or period.
pub const AUTO_RESET_ACTOR: &str = "system:auto_reset";

#[derive(Clone)]
pub struct SequenceManager {
    stores: Stores,
    versions: PatternVersionManager,
    exhaustion: ExhaustionMonitor,
    counters: CounterService,
    check_exhaustion: bool,
}

impl SequenceManager {
    pub fn new(
        stores: Stores,
        versions: PatternVersionManager,
        exhaustion: ExhaustionMonitor,
        counters: CounterService,
        check_exhaustion: bool,
    ) -> Self {
        SequenceManager {
            stores,
            versions,
            exhaustion,
            counters,
            check_exhaustion,
        }
    }

    // =========================================================================
    // Definitions
    // =========================================================================

    /// Validates and stores a new sequence definition.
    pub async fn create_sequence(&self, definition: SequenceDefinition) -> SequenceResult<Sequence> {
        validate_definition(&definition)?;

        let exists = self
            .stores
            .sequences
            .find_by_name_and_scope(&definition.name, definition.scope.as_deref())
            .await?
            .is_some_and(|s| s.scope == definition.scope);
        if exists {
            return Err(ValidationError::Duplicate {
                field: "sequence".to_string(),
                value: definition.name,
            }
            .into());
        }

        let sequence = definition.into_sequence(Utc::now());
        self.stores.sequences.insert(&sequence).await?;

        info!(sequence = %sequence.name, scope = ?sequence.scope, pattern = %sequence.pattern, "Sequence created");
        Ok(sequence)
    }

    pub async fn sequence(&self, name: &str, scope: Option<&str>) -> SequenceResult<Sequence> {
        load_sequence(&self.stores, name, scope).await
    }

    pub async fn list_sequences(&self) -> SequenceResult<Vec<Sequence>> {
        self.stores.sequences.list().await
    }

    // =========================================================================
    // Generation
    // =========================================================================

    /// Mints the next number.
    pub async fn generate(
        &self,
        name: &str,
        scope: Option<&str>,
        context: &VariableContext,
    ) -> SequenceResult<String> {
        let sequence = load_sequence(&self.stores, name, scope).await?;
        ensure_unlocked(&sequence, scope)?;

        if sequence.gap_policy.fills_gaps() {
            let claimed = self
                .stores
                .gaps
                .claim_next_gap(&sequence.id, scope, Utc::now())
                .await?;
            if let Some(gap) = claimed {
                info!(sequence = %sequence.name, ?scope, number = %gap.number, "Gap reclaimed");
                emit(
                    self.stores.audit.as_ref(),
                    &sequence,
                    scope,
                    AuditEvent::GapReclaimed {
                        number: gap.number.clone(),
                    },
                )
                .await;
                return Ok(gap.number);
            }
        }

        let now = Utc::now();
        let mut guard = self.stores.counters.lock(&sequence.id, scope).await?;

        let capacity = if self.check_exhaustion {
            let check = self
                .exhaustion
                .check_locked(&sequence, guard.as_mut(), None, now)
                .await?;
            if let Some(err) = check.refusal(&sequence) {
                drop(guard);
                self.exhaustion.report(&sequence, scope, &check).await;
                return Err(err);
            }
            Some(check)
        } else {
            None
        };

        let pattern = match &capacity {
            Some(check) => Pattern::compile(&check.pattern)?,
            None => {
                let (_, pattern) = self
                    .versions
                    .resolve_locked(&sequence, guard.as_mut(), now)
                    .await?;
                Pattern::compile(&pattern)?
            }
        };

        let before = guard.state();
        let reset_from = if needs_reset(&before, &sequence, now) {
            guard.reset(now);
            Some(before.current_value)
        } else {
            None
        };

        let value = next_value(guard.state().current_value, sequence.step)?;
        let number = pattern.render(value, context, now.date_naive())?;
        guard.increment(sequence.step, 1);
        guard.commit().await?;

        if let Some(check) = &capacity {
            self.exhaustion.report(&sequence, scope, check).await;
        }

        if let Some(previous_value) = reset_from {
            info!(sequence = %sequence.name, ?scope, previous_value, "Counter auto-reset");
            emit(
                self.stores.audit.as_ref(),
                &sequence,
                scope,
                AuditEvent::CounterReset {
                    previous_value,
                    performed_by: AUTO_RESET_ACTOR.to_string(),
                },
            )
            .await;
        }

        debug!(sequence = %sequence.name, ?scope, value, number = %number, "Number generated");
        emit(
            self.stores.audit.as_ref(),
            &sequence,
            scope,
            AuditEvent::NumberGenerated {
                number: number.clone(),
                counter_value: value,
            },
        )
        .await;

        Ok(number)
    }

    /// Renders what `generate()` would return right now without changing
    /// anything. Advisory only: another caller may take the number first.
    pub async fn preview(
        &self,
        name: &str,
        scope: Option<&str>,
        context: &VariableContext,
    ) -> SequenceResult<String> {
        let sequence = load_sequence(&self.stores, name, scope).await?;

        if sequence.gap_policy.fills_gaps() {
            if let Some(gap) = self.stores.gaps.next_gap(&sequence.id, scope).await? {
                return Ok(gap.number);
            }
        }

        let now = Utc::now();
        let pattern = Pattern::compile(&self.versions.resolve(&sequence, now).await?)?;
        let state = self.stores.counters.snapshot(&sequence.id, scope).await?;
        let current = if needs_reset(&state, &sequence, now) {
            0
        } else {
            state.current_value
        };

        pattern.render(next_value(current, sequence.step)?, context, now.date_naive())
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Moves the counter forward; see [`CounterService::override_value`].
    pub async fn override_counter(
        &self,
        name: &str,
        new_value: i64,
        scope: Option<&str>,
        performed_by: &str,
    ) -> SequenceResult<CounterState> {
        self.counters
            .override_value(name, new_value, scope, performed_by)
            .await
    }

    /// Refuses further generation until [`unlock`](Self::unlock).
    pub async fn lock(
        &self,
        name: &str,
        scope: Option<&str>,
        performed_by: &str,
    ) -> SequenceResult<()> {
        self.set_locked(name, scope, true, performed_by).await
    }

    pub async fn unlock(
        &self,
        name: &str,
        scope: Option<&str>,
        performed_by: &str,
    ) -> SequenceResult<()> {
        self.set_locked(name, scope, false, performed_by).await
    }

    async fn set_locked(
        &self,
        name: &str,
        scope: Option<&str>,
        locked: bool,
        performed_by: &str,
    ) -> SequenceResult<()> {
        let sequence = load_sequence(&self.stores, name, scope).await?;
        self.stores.sequences.set_locked(&sequence.id, locked).await?;

        info!(sequence = %sequence.name, ?scope, locked, performed_by, "Lock status changed");
        emit(
            self.stores.audit.as_ref(),
            &sequence,
            scope,
            AuditEvent::LockStatusChanged {
                locked,
                performed_by: performed_by.to_string(),
            },
        )
        .await;
        Ok(())
    }

    /// `parent_number` followed by `child_pattern` rendered for
    /// `child_counter` (default 1). Nothing is persisted.
    pub fn compose_child(
        &self,
        parent_number: &str,
        child_pattern: &str,
        child_counter: Option<i64>,
        context: &VariableContext,
    ) -> SequenceResult<String> {
        let child = parse(
            child_pattern,
            child_counter.unwrap_or(1),
            context,
            Utc::now().date_naive(),
        )?;
        Ok(format!("{}{}", parent_number, child))
    }
}
