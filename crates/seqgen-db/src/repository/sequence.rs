//! # Sequence Repository
//!
//! Sequence definitions keyed by `(name, scope_key)`.
//!
//! ## Scoped Lookup
//! ```text
//! find("grn", Some("b1"))
//!      │
//!      │  WHERE name = 'grn' AND scope_key IN ('b1', '')
//!      │  ORDER BY scope_key = ''          ◄── exact scope sorts first
//!      ▼
//! row for (grn, b1)  or else  row for (grn, '')
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::debug;

use seqgen_core::error::SequenceResult;
use seqgen_core::types::Sequence;
use seqgen_engine::SequenceStore;

use super::{scope_from_key, scope_key, SqliteStore};
use crate::error::{DbError, DbResult};

const SEQUENCE_COLUMNS: &str = "id, name, scope_key, pattern, step, gap_policy, overflow_behavior, \
     exhaustion_threshold, reset_limit, reset_period, locked, created_at, updated_at";

#[derive(Debug, FromRow)]
struct SequenceRow {
    id: String,
    name: String,
    scope_key: String,
    pattern: String,
    step: i64,
    gap_policy: String,
    overflow_behavior: String,
    exhaustion_threshold: f64,
    reset_limit: Option<i64>,
    reset_period: Option<String>,
    locked: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SequenceRow> for Sequence {
    type Error = DbError;

    fn try_from(row: SequenceRow) -> DbResult<Self> {
        let gap_policy = row
            .gap_policy
            .parse()
            .map_err(|_| DbError::decode("gap_policy", &row.gap_policy))?;
        let overflow_behavior = row
            .overflow_behavior
            .parse()
            .map_err(|_| DbError::decode("overflow_behavior", &row.overflow_behavior))?;
        let reset_period = row
            .reset_period
            .as_deref()
            .map(|p| p.parse().map_err(|_| DbError::decode("reset_period", p)))
            .transpose()?;

        Ok(Sequence {
            id: row.id,
            name: row.name,
            scope: scope_from_key(row.scope_key),
            pattern: row.pattern,
            step: row.step,
            gap_policy,
            overflow_behavior,
            exhaustion_threshold: row.exhaustion_threshold,
            reset_limit: row.reset_limit,
            reset_period,
            locked: row.locked,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl SqliteStore {
    /// Exact `(name, scope)` match, else the unscoped definition.
    pub async fn find_sequence(&self, name: &str, scope: Option<&str>) -> DbResult<Option<Sequence>> {
        let sql = format!(
            "SELECT {} FROM sequences \
             WHERE name = ?1 AND scope_key IN (?2, '') \
             ORDER BY scope_key = '' \
             LIMIT 1",
            SEQUENCE_COLUMNS
        );
        let row = sqlx::query_as::<_, SequenceRow>(&sql)
            .bind(name)
            .bind(scope_key(scope))
            .fetch_optional(&self.pool)
            .await?;

        row.map(Sequence::try_from).transpose()
    }

    pub async fn insert_sequence(&self, sequence: &Sequence) -> DbResult<()> {
        debug!(sequence = %sequence.name, scope = ?sequence.scope, "Inserting sequence");

        sqlx::query(
            r#"
            INSERT INTO sequences (
                id, name, scope_key, pattern, step, gap_policy, overflow_behavior,
                exhaustion_threshold, reset_limit, reset_period, locked, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7,
                ?8, ?9, ?10, ?11, ?12, ?13
            )
            "#,
        )
        .bind(&sequence.id)
        .bind(&sequence.name)
        .bind(scope_key(sequence.scope.as_deref()))
        .bind(&sequence.pattern)
        .bind(sequence.step)
        .bind(sequence.gap_policy.to_string())
        .bind(sequence.overflow_behavior.to_string())
        .bind(sequence.exhaustion_threshold)
        .bind(sequence.reset_limit)
        .bind(sequence.reset_period.map(|p| p.to_string()))
        .bind(sequence.locked)
        .bind(sequence.created_at)
        .bind(sequence.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: sequence.name.clone(),
            },
            other => other,
        })?;

        Ok(())
    }

    pub async fn set_sequence_locked(&self, sequence_id: &str, locked: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE sequences SET locked = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(sequence_id)
            .bind(locked)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sequence", sequence_id));
        }
        Ok(())
    }

    pub async fn list_sequences(&self) -> DbResult<Vec<Sequence>> {
        let sql = format!(
            "SELECT {} FROM sequences ORDER BY name, scope_key",
            SEQUENCE_COLUMNS
        );
        sqlx::query_as::<_, SequenceRow>(&sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Sequence::try_from)
            .collect()
    }
}

#[async_trait]
impl SequenceStore for SqliteStore {
    async fn find_by_name_and_scope(
        &self,
        name: &str,
        scope: Option<&str>,
    ) -> SequenceResult<Option<Sequence>> {
        Ok(self.find_sequence(name, scope).await?)
    }

    async fn insert(&self, sequence: &Sequence) -> SequenceResult<()> {
        Ok(self.insert_sequence(sequence).await?)
    }

    async fn set_locked(&self, sequence_id: &str, locked: bool) -> SequenceResult<()> {
        Ok(self.set_sequence_locked(sequence_id, locked).await?)
    }

    async fn list(&self) -> SequenceResult<Vec<Sequence>> {
        Ok(self.list_sequences().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing;
    use seqgen_core::error::{SequenceError, ValidationError};
    use seqgen_core::types::{GapPolicy, ResetPeriod, SequenceDefinition};

    #[tokio::test]
    async fn test_round_trip_and_scoped_fallback() {
        let store = testing::store().await;
        let global = testing::insert(
            &store,
            SequenceDefinition::new("grn", "GRN-{COUNTER}")
                .gap_policy(GapPolicy::FillEager)
                .reset_period(ResetPeriod::Monthly),
        )
        .await;
        let scoped = testing::insert(&store, SequenceDefinition::new("grn", "B1-{COUNTER}").scope("b1")).await;

        let found = store.find_sequence("grn", None).await.unwrap().unwrap();
        assert_eq!(found.id, global.id);
        assert_eq!(found.gap_policy, GapPolicy::FillEager);
        assert_eq!(found.reset_period, Some(ResetPeriod::Monthly));
        assert_eq!(found.scope, None);

        let found = store.find_sequence("grn", Some("b1")).await.unwrap().unwrap();
        assert_eq!(found.id, scoped.id);
        assert_eq!(found.scope.as_deref(), Some("b1"));

        let found = store.find_sequence("grn", Some("b2")).await.unwrap().unwrap();
        assert_eq!(found.id, global.id);

        assert!(store.find_sequence("po", None).await.unwrap().is_none());
        assert_eq!(store.list_sequences().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let store = testing::store().await;
        testing::insert(&store, SequenceDefinition::new("po", "PO-{COUNTER}")).await;

        let again = SequenceDefinition::new("po", "PO2-{COUNTER}").into_sequence(Utc::now());
        let err = store.insert(&again).await.unwrap_err();
        assert!(matches!(
            err,
            SequenceError::Validation(ValidationError::Duplicate { ref value, .. }) if value == "po"
        ));
    }

    #[tokio::test]
    async fn test_set_locked() {
        let store = testing::store().await;
        let seq = testing::insert(&store, SequenceDefinition::new("po", "PO-{COUNTER}")).await;

        store.set_locked(&seq.id, true).await.unwrap();
        assert!(store.find_sequence("po", None).await.unwrap().unwrap().locked);
        assert!(store.set_locked("missing", true).await.is_err());
    }
}
