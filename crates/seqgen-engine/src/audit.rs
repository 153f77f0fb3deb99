//! # Sequence Audit
//!
//! Every state change the services make is reported to a [`SequenceAudit`]
//! sink after it is committed.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Audit Sinks                                    │
//! │                                                                         │
//! │  TracingAudit    → `tracing` events, target "seqgen::audit"             │
//! │  RecordingAudit  → in-memory Vec, read back in tests                    │
//! │  SqliteAudit     → sequence_audit_log table (seqgen-db)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failing sink never undoes the change it reports: services log the
//! failure with `warn!` and return the committed result.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use seqgen_core::error::SequenceResult;
use seqgen_core::migration::MigrationStrategy;
use seqgen_core::types::Sequence;

/// Target used by [`TracingAudit`].
pub const AUDIT_TARGET: &str = "seqgen::audit";

// =============================================================================
// Events
// =============================================================================

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    NumberGenerated {
        number: String,
        counter_value: i64,
    },
    GapReclaimed {
        number: String,
    },
    BulkGenerated {
        count: usize,
        first: String,
        last: String,
    },
    CounterReset {
        previous_value: i64,
        performed_by: String,
    },
    CounterOverridden {
        old_value: i64,
        new_value: i64,
        performed_by: String,
    },
    LockStatusChanged {
        locked: bool,
        performed_by: String,
    },
    ExhaustionThresholdReached {
        current_value: i64,
        max_value: i64,
        utilization_percent: f64,
        threshold: f64,
    },
    PatternMigrated {
        strategy: MigrationStrategy,
        from_pattern: String,
        to_pattern: String,
    },
}

impl AuditEvent {
    /// Stable event name, stored alongside the JSON payload.
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::NumberGenerated { .. } => "number_generated",
            AuditEvent::GapReclaimed { .. } => "gap_reclaimed",
            AuditEvent::BulkGenerated { .. } => "bulk_generated",
            AuditEvent::CounterReset { .. } => "counter_reset",
            AuditEvent::CounterOverridden { .. } => "counter_overridden",
            AuditEvent::LockStatusChanged { .. } => "lock_status_changed",
            AuditEvent::ExhaustionThresholdReached { .. } => "exhaustion_threshold_reached",
            AuditEvent::PatternMigrated { .. } => "pattern_migrated",
        }
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence_id: String,
    pub sequence_name: String,
    pub scope: Option<String>,
    pub event: AuditEvent,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(sequence: &Sequence, scope: Option<&str>, event: AuditEvent) -> Self {
        AuditEntry {
            sequence_id: sequence.id.clone(),
            sequence_name: sequence.name.clone(),
            scope: scope.map(str::to_string),
            event,
            recorded_at: Utc::now(),
        }
    }
}

// =============================================================================
// Sink Trait
// =============================================================================

#[async_trait]
pub trait SequenceAudit: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> SequenceResult<()>;
}

/// Records an entry, logging instead of failing when the sink errors.
pub(crate) async fn emit(
    sink: &dyn SequenceAudit,
    sequence: &Sequence,
    scope: Option<&str>,
    event: AuditEvent,
) {
    let entry = AuditEntry::new(sequence, scope, event);
    if let Err(e) = sink.record(&entry).await {
        warn!(
            sequence = %sequence.name,
            event = entry.event.kind(),
            error = %e,
            "Failed to record audit entry"
        );
    }
}

// =============================================================================
// Tracing Sink
// =============================================================================

/// Emits each entry as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAudit;

#[async_trait]
impl SequenceAudit for TracingAudit {
    async fn record(&self, entry: &AuditEntry) -> SequenceResult<()> {
        let scope = entry.scope.as_deref().unwrap_or("");
        match &entry.event {
            AuditEvent::ExhaustionThresholdReached {
                current_value,
                max_value,
                utilization_percent,
                threshold,
            } => warn!(
                target: AUDIT_TARGET,
                sequence = %entry.sequence_name,
                scope,
                current_value,
                max_value,
                utilization_percent,
                threshold,
                "Exhaustion threshold reached"
            ),
            event => {
                let details = serde_json::to_string(event).unwrap_or_default();
                info!(
                    target: AUDIT_TARGET,
                    sequence = %entry.sequence_name,
                    scope,
                    event = event.kind(),
                    details = %details,
                    "Sequence audit"
                );
            }
        }
        Ok(())
    }
}

// =============================================================================
// Recording Sink
// =============================================================================

/// Keeps every entry in memory.
#[derive(Debug, Default)]
pub struct RecordingAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().await.clone()
    }

    /// Kinds of the recorded events, in order.
    pub async fn kinds(&self) -> Vec<&'static str> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|e| e.event.kind())
            .collect()
    }
}

#[async_trait]
impl SequenceAudit for RecordingAudit {
    async fn record(&self, entry: &AuditEntry) -> SequenceResult<()> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }
}
