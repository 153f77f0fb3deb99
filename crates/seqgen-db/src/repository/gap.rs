//! # Gap Repository
//!
//! `claim` is a single `UPDATE … RETURNING`, so two concurrent callers can
//! never receive the same gap.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use seqgen_core::error::SequenceResult;
use seqgen_core::types::Gap;
use seqgen_engine::GapStore;

use super::{scope_from_key, scope_key, SqliteStore};
use crate::error::DbResult;

#[derive(Debug, FromRow)]
struct GapRow {
    id: String,
    sequence_id: String,
    scope_key: String,
    number: String,
    reason: Option<String>,
    filled: bool,
    created_at: DateTime<Utc>,
    filled_at: Option<DateTime<Utc>>,
}

impl From<GapRow> for Gap {
    fn from(row: GapRow) -> Self {
        Gap {
            id: row.id,
            sequence_id: row.sequence_id,
            scope: scope_from_key(row.scope_key),
            number: row.number,
            reason: row.reason,
            filled: row.filled,
            created_at: row.created_at,
            filled_at: row.filled_at,
        }
    }
}

impl SqliteStore {
    pub async fn insert_gap(&self, gap: &Gap) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO gaps (id, sequence_id, scope_key, number, reason, filled, created_at, filled_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&gap.id)
        .bind(&gap.sequence_id)
        .bind(scope_key(gap.scope.as_deref()))
        .bind(&gap.number)
        .bind(&gap.reason)
        .bind(gap.filled)
        .bind(gap.created_at)
        .bind(gap.filled_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Oldest unfilled gap, left unfilled.
    pub async fn oldest_gap(&self, sequence_id: &str, scope: Option<&str>) -> DbResult<Option<Gap>> {
        let row = sqlx::query_as::<_, GapRow>(
            r#"
            SELECT id, sequence_id, scope_key, number, reason, filled, created_at, filled_at
            FROM gaps
            WHERE sequence_id = ?1 AND scope_key = ?2 AND filled = 0
            ORDER BY created_at ASC, rowid ASC
            LIMIT 1
            "#,
        )
        .bind(sequence_id)
        .bind(scope_key(scope))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Gap::from))
    }

    pub async fn fill_gap(&self, gap_id: &str, at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query("UPDATE gaps SET filled = 1, filled_at = ?2 WHERE id = ?1")
            .bind(gap_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Marks the oldest unfilled gap filled and returns it.
    pub async fn claim_gap(
        &self,
        sequence_id: &str,
        scope: Option<&str>,
        at: DateTime<Utc>,
    ) -> DbResult<Option<Gap>> {
        let row = sqlx::query_as::<_, GapRow>(
            r#"
            UPDATE gaps SET filled = 1, filled_at = ?3
            WHERE id = (
                SELECT id FROM gaps
                WHERE sequence_id = ?1 AND scope_key = ?2 AND filled = 0
                ORDER BY created_at ASC, rowid ASC
                LIMIT 1
            )
            RETURNING id, sequence_id, scope_key, number, reason, filled, created_at, filled_at
            "#,
        )
        .bind(sequence_id)
        .bind(scope_key(scope))
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Gap::from))
    }

    pub async fn list_gaps(&self, sequence_id: &str, scope: Option<&str>) -> DbResult<Vec<Gap>> {
        let rows = sqlx::query_as::<_, GapRow>(
            r#"
            SELECT id, sequence_id, scope_key, number, reason, filled, created_at, filled_at
            FROM gaps
            WHERE sequence_id = ?1 AND scope_key = ?2
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(sequence_id)
        .bind(scope_key(scope))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Gap::from).collect())
    }

    pub async fn delete_gaps(&self, sequence_id: &str, scope: Option<&str>) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM gaps WHERE sequence_id = ?1 AND scope_key = ?2")
            .bind(sequence_id)
            .bind(scope_key(scope))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl GapStore for SqliteStore {
    async fn record_gap(&self, gap: &Gap) -> SequenceResult<()> {
        Ok(self.insert_gap(gap).await?)
    }

    async fn next_gap(&self, sequence_id: &str, scope: Option<&str>) -> SequenceResult<Option<Gap>> {
        Ok(self.oldest_gap(sequence_id, scope).await?)
    }

    async fn mark_gap_filled(&self, gap_id: &str, at: DateTime<Utc>) -> SequenceResult<()> {
        Ok(self.fill_gap(gap_id, at).await?)
    }

    async fn claim_next_gap(
        &self,
        sequence_id: &str,
        scope: Option<&str>,
        at: DateTime<Utc>,
    ) -> SequenceResult<Option<Gap>> {
        Ok(self.claim_gap(sequence_id, scope, at).await?)
    }

    async fn gaps(&self, sequence_id: &str, scope: Option<&str>) -> SequenceResult<Vec<Gap>> {
        Ok(self.list_gaps(sequence_id, scope).await?)
    }

    async fn clear_gaps(&self, sequence_id: &str, scope: Option<&str>) -> SequenceResult<usize> {
        Ok(self.delete_gaps(sequence_id, scope).await? as usize)
    }
}
