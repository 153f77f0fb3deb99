//! # Audit Log Repository
//!
//! Append-only `sequence_audit_log`. The event payload is stored as JSON in
//! `details`, with its kind copied into `event_type` for filtering.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use seqgen_core::error::SequenceResult;
use seqgen_engine::{AuditEntry, SequenceAudit};

use super::{scope_from_key, scope_key};
use crate::error::DbResult;

#[derive(Debug, FromRow)]
struct AuditRow {
    sequence_id: String,
    sequence_name: String,
    scope_key: String,
    details: String,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = crate::error::DbError;

    fn try_from(row: AuditRow) -> DbResult<Self> {
        Ok(AuditEntry {
            sequence_id: row.sequence_id,
            sequence_name: row.sequence_name,
            scope: scope_from_key(row.scope_key),
            event: serde_json::from_str(&row.details)?,
            recorded_at: row.recorded_at,
        })
    }
}

/// Audit sink writing to SQLite.
#[derive(Debug, Clone)]
pub struct SqliteAudit {
    pool: SqlitePool,
}

impl SqliteAudit {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteAudit { pool }
    }

    pub async fn insert(&self, entry: &AuditEntry) -> DbResult<()> {
        let details = serde_json::to_string(&entry.event)?;

        sqlx::query(
            r#"
            INSERT INTO sequence_audit_log (sequence_id, sequence_name, scope_key, event_type, details, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&entry.sequence_id)
        .bind(&entry.sequence_name)
        .bind(scope_key(entry.scope.as_deref()))
        .bind(entry.event.kind())
        .bind(details)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Entries for one sequence in the order they were written.
    pub async fn entries(&self, sequence_id: &str) -> DbResult<Vec<AuditEntry>> {
        sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT sequence_id, sequence_name, scope_key, details, recorded_at
            FROM sequence_audit_log
            WHERE sequence_id = ?1
            ORDER BY id ASC
            "#,
        )
        .bind(sequence_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(AuditEntry::try_from)
        .collect()
    }

    /// Number of entries of one kind, e.g. `"counter_reset"`.
    pub async fn count_events(&self, sequence_id: &str, event_type: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sequence_audit_log WHERE sequence_id = ?1 AND event_type = ?2",
        )
        .bind(sequence_id)
        .bind(event_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[async_trait]
impl SequenceAudit for SqliteAudit {
    async fn record(&self, entry: &AuditEntry) -> SequenceResult<()> {
        Ok(self.insert(entry).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use seqgen_engine::AuditEvent;

    fn entry(event: AuditEvent) -> AuditEntry {
        AuditEntry {
            sequence_id: "seq-1".to_string(),
            sequence_name: "po".to_string(),
            scope: Some("b1".to_string()),
            event,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_entries_read_back_in_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let audit = db.audit();

        let generated = entry(AuditEvent::NumberGenerated {
            number: "PO-1".to_string(),
            counter_value: 1,
        });
        let reset = entry(AuditEvent::CounterReset {
            previous_value: 1,
            performed_by: "alice".to_string(),
        });
        audit.record(&generated).await.unwrap();
        audit.record(&reset).await.unwrap();

        let entries = audit.entries("seq-1").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event, generated.event);
        assert_eq!(entries[1].event, reset.event);
        assert_eq!(entries[1].scope.as_deref(), Some("b1"));

        assert_eq!(audit.count_events("seq-1", "counter_reset").await.unwrap(), 1);
        assert!(audit.entries("seq-2").await.unwrap().is_empty());
    }
}
