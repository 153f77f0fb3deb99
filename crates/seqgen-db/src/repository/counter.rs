//! # Counter Repository
//!
//! The counter row lock is a transaction.
//!
//! ```text
//! lock()
//!   BEGIN
//!   INSERT INTO counters … ON CONFLICT DO NOTHING   ◄── first statement is a write:
//!   SELECT current_value, …                             takes SQLite's write lock
//!      │
//!      ▼  guard mutates a buffered CounterState
//!      │
//! commit()                         drop(guard)
//!   UPDATE counters SET …            ROLLBACK (sqlx on drop)
//!   COMMIT
//! ```
//!
//! Other writers wait on the lock for up to the configured busy timeout.
//! The guard owns a pooled connection until it is committed or dropped.
//! A version staged on the guard is written by `commit()` inside the same
//! transaction, before the counter update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, Transaction};

use seqgen_core::error::SequenceResult;
use seqgen_core::types::{CounterState, PatternVersion};
use seqgen_engine::{CounterGuard, CounterStore};

use super::version::{load_versions, supersede_on};
use super::{scope_key, SqliteStore};
use crate::error::{DbError, DbResult};

#[derive(Debug, FromRow)]
struct CounterRow {
    current_value: i64,
    generation_count: i64,
    last_reset_at: Option<DateTime<Utc>>,
}

impl From<CounterRow> for CounterState {
    fn from(row: CounterRow) -> Self {
        CounterState {
            current_value: row.current_value,
            generation_count: row.generation_count,
            last_reset_at: row.last_reset_at,
        }
    }
}

/// Holds the open transaction and the pending state.
pub struct SqliteCounterGuard {
    tx: Transaction<'static, Sqlite>,
    sequence_id: String,
    scope_key: String,
    pending: CounterState,
    staged: Option<(Option<String>, PatternVersion)>,
}

impl SqliteCounterGuard {
    async fn write(mut self) -> SequenceResult<()> {
        if let Some((replaces, version)) = &self.staged {
            supersede_on(&mut self.tx, replaces.as_deref(), version).await?;
        }

        sqlx::query(
            r#"
            UPDATE counters SET
                current_value = ?3,
                generation_count = ?4,
                last_reset_at = ?5
            WHERE sequence_id = ?1 AND scope_key = ?2
            "#,
        )
        .bind(&self.sequence_id)
        .bind(&self.scope_key)
        .bind(self.pending.current_value)
        .bind(self.pending.generation_count)
        .bind(self.pending.last_reset_at)
        .execute(&mut *self.tx)
        .await
        .map_err(DbError::from)?;

        self.tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }
}

#[async_trait]
impl CounterGuard for SqliteCounterGuard {
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
        let mut versions = load_versions(&mut self.tx, &self.sequence_id).await?;
        if let Some((replaces, version)) = &self.staged {
            if let Some(open) = versions.iter_mut().find(|v| Some(&v.id) == replaces.as_ref()) {
                open.effective_until = Some(version.effective_from);
            }
            versions.push(version.clone());
        }
        Ok(versions)
    }

    fn supersede_version(&mut self, replaces: Option<String>, version: PatternVersion) {
        self.staged = Some((replaces, version));
    }

    async fn commit(self: Box<Self>) -> SequenceResult<()> {
        (*self).write().await
    }
}

impl SqliteStore {
    /// Committed counter state; zero when the row does not exist yet.
    pub async fn counter_snapshot(&self, sequence_id: &str, scope: Option<&str>) -> DbResult<CounterState> {
        let row = sqlx::query_as::<_, CounterRow>(
            r#"
            SELECT current_value, generation_count, last_reset_at
            FROM counters
            WHERE sequence_id = ?1 AND scope_key = ?2
            "#,
        )
        .bind(sequence_id)
        .bind(scope_key(scope))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CounterState::from).unwrap_or_default())
    }

    /// Opens the counter transaction, creating the row on first use.
    pub async fn lock_counter(&self, sequence_id: &str, scope: Option<&str>) -> DbResult<SqliteCounterGuard> {
        let key = scope_key(scope).to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO counters (sequence_id, scope_key, current_value, generation_count, last_reset_at)
            VALUES (?1, ?2, 0, 0, ?3)
            ON CONFLICT (sequence_id, scope_key) DO NOTHING
            "#,
        )
        .bind(sequence_id)
        .bind(&key)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, CounterRow>(
            r#"
            SELECT current_value, generation_count, last_reset_at
            FROM counters
            WHERE sequence_id = ?1 AND scope_key = ?2
            "#,
        )
        .bind(sequence_id)
        .bind(&key)
        .fetch_one(&mut *tx)
        .await?;

        Ok(SqliteCounterGuard {
            tx,
            sequence_id: sequence_id.to_string(),
            scope_key: key,
            pending: row.into(),
            staged: None,
        })
    }
}

#[async_trait]
impl CounterStore for SqliteStore {
    async fn snapshot(&self, sequence_id: &str, scope: Option<&str>) -> SequenceResult<CounterState> {
        Ok(self.counter_snapshot(sequence_id, scope).await?)
    }

    async fn lock(
        &self,
        sequence_id: &str,
        scope: Option<&str>,
    ) -> SequenceResult<Box<dyn CounterGuard>> {
        let guard = self.lock_counter(sequence_id, scope).await?;
        Ok(Box::new(guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing;
    use seqgen_core::types::SequenceDefinition;
    use seqgen_engine::PatternVersionStore;

    #[tokio::test]
    async fn test_commit_persists_and_drop_rolls_back() {
        let store = testing::store().await;
        let seq = testing::insert(&store, SequenceDefinition::new("po", "PO-{COUNTER}")).await;

        let mut guard = store.lock(&seq.id, Some("b1")).await.unwrap();
        assert_eq!(guard.state().current_value, 0);
        assert!(guard.state().last_reset_at.is_some());
        guard.increment(5, 1);
        guard.commit().await.unwrap();

        let state = store.snapshot(&seq.id, Some("b1")).await.unwrap();
        assert_eq!(state.current_value, 5);
        assert_eq!(state.generation_count, 1);

        {
            let mut guard = store.lock(&seq.id, Some("b1")).await.unwrap();
            guard.increment(100, 1);
        }
        assert_eq!(store.snapshot(&seq.id, Some("b1")).await.unwrap().current_value, 5);

        // Other scopes are separate rows
        assert_eq!(store.snapshot(&seq.id, None).await.unwrap(), CounterState::default());
    }

    #[tokio::test]
    async fn test_set_value_clears_generation_count() {
        let store = testing::store().await;
        let seq = testing::insert(&store, SequenceDefinition::new("po", "PO-{COUNTER}")).await;

        let mut guard = store.lock(&seq.id, None).await.unwrap();
        guard.increment(3, 3);
        guard.set_value(40);
        guard.commit().await.unwrap();

        let state = store.snapshot(&seq.id, None).await.unwrap();
        assert_eq!(state.current_value, 40);
        assert_eq!(state.generation_count, 0);
    }

    #[tokio::test]
    async fn test_staged_version_shares_the_transaction() {
        let store = testing::store().await;
        let seq = testing::insert(&store, SequenceDefinition::new("inv", "INV-{COUNTER:4}")).await;
        let now = Utc::now();
        let suffixed = |id: &str| PatternVersion {
            id: id.to_string(),
            sequence_id: seq.id.clone(),
            pattern: format!("INV-{}-{{COUNTER:4}}", id),
            effective_from: now,
            effective_until: None,
            created_at: now,
        };

        let mut guard = store.lock(&seq.id, None).await.unwrap();
        guard.set_value(9000);
        guard.supersede_version(None, suffixed("A"));
        guard.reset(now);
        assert_eq!(guard.versions().await.unwrap().len(), 1);
        guard.commit().await.unwrap();

        assert_eq!(store.snapshot(&seq.id, None).await.unwrap().current_value, 0);
        assert_eq!(store.versions(&seq.id).await.unwrap()[0].pattern, "INV-A-{COUNTER:4}");

        // Planned as if no version existed yet: rejected, counter untouched
        let mut guard = store.lock(&seq.id, None).await.unwrap();
        guard.increment(1, 1);
        guard.supersede_version(None, suffixed("B"));
        assert!(guard.commit().await.is_err());

        assert_eq!(store.snapshot(&seq.id, None).await.unwrap().current_value, 0);
        assert_eq!(store.versions(&seq.id).await.unwrap().len(), 1);
    }
}
