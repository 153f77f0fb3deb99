//! # Pattern Version Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};

use seqgen_core::error::SequenceResult;
use seqgen_core::types::PatternVersion;
use seqgen_core::version;
use seqgen_engine::PatternVersionStore;

use super::SqliteStore;
use crate::error::{DbError, DbResult};

#[derive(Debug, FromRow)]
struct PatternVersionRow {
    id: String,
    sequence_id: String,
    pattern: String,
    effective_from: DateTime<Utc>,
    effective_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<PatternVersionRow> for PatternVersion {
    fn from(row: PatternVersionRow) -> Self {
        PatternVersion {
            id: row.id,
            sequence_id: row.sequence_id,
            pattern: row.pattern,
            effective_from: row.effective_from,
            effective_until: row.effective_until,
            created_at: row.created_at,
        }
    }
}

// =============================================================================
// Connection-level statements
// =============================================================================
//
// Shared by the store methods below and by the counter guard, which runs them
// inside its own transaction.

pub(crate) async fn load_versions(
    conn: &mut SqliteConnection,
    sequence_id: &str,
) -> DbResult<Vec<PatternVersion>> {
    let rows = sqlx::query_as::<_, PatternVersionRow>(
        r#"
        SELECT id, sequence_id, pattern, effective_from, effective_until, created_at
        FROM pattern_versions
        WHERE sequence_id = ?1
        "#,
    )
    .bind(sequence_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut versions: Vec<PatternVersion> = rows.into_iter().map(PatternVersion::from).collect();
    versions.sort_by_key(|v| v.effective_from);
    Ok(versions)
}

async fn insert_version(conn: &mut SqliteConnection, version: &PatternVersion) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO pattern_versions (id, sequence_id, pattern, effective_from, effective_until, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&version.id)
    .bind(&version.sequence_id)
    .bind(&version.pattern)
    .bind(version.effective_from)
    .bind(version.effective_until)
    .bind(version.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn set_version_until(
    conn: &mut SqliteConnection,
    version_id: &str,
    until: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query("UPDATE pattern_versions SET effective_until = ?2 WHERE id = ?1")
        .bind(version_id)
        .bind(until)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("PatternVersion", version_id));
    }
    Ok(())
}

/// Takes SQLite's write lock for the rest of the transaction, so the range
/// check that follows cannot race another writer.
async fn lock_versions(conn: &mut SqliteConnection, sequence_id: &str) -> DbResult<()> {
    sqlx::query("UPDATE sequences SET updated_at = updated_at WHERE id = ?1")
        .bind(sequence_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Checks and applies a supersede on a connection that already holds the
/// write lock.
pub(crate) async fn supersede_on(
    conn: &mut SqliteConnection,
    replaces: Option<&str>,
    version: &PatternVersion,
) -> SequenceResult<()> {
    let existing = load_versions(conn, &version.sequence_id).await?;
    version::check_supersede(&version.sequence_id, &existing, replaces, version.effective_from)?;

    if let Some(open) = replaces {
        set_version_until(conn, open, version.effective_from).await?;
    }
    insert_version(conn, version).await?;
    Ok(())
}

// =============================================================================
// Store
// =============================================================================

impl SqliteStore {
    /// Versions of a sequence, earliest `effective_from` first.
    pub async fn list_versions(&self, sequence_id: &str) -> DbResult<Vec<PatternVersion>> {
        let mut conn = self.pool.acquire().await?;
        load_versions(&mut conn, sequence_id).await
    }

    pub async fn effective_version(
        &self,
        sequence_id: &str,
        at: DateTime<Utc>,
    ) -> DbResult<Option<PatternVersion>> {
        let versions = self.list_versions(sequence_id).await?;
        Ok(version::effective_at(&versions, at).cloned())
    }

    /// Inserts `version` after checking its range inside one transaction.
    pub async fn insert_checked(&self, version: &PatternVersion) -> SequenceResult<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        lock_versions(&mut tx, &version.sequence_id).await?;

        let existing = load_versions(&mut tx, &version.sequence_id).await?;
        version::validate_effective_range(
            &version.sequence_id,
            &existing,
            version.effective_from,
            version.effective_until,
        )?;
        insert_version(&mut tx, version).await?;

        tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }

    /// Closes `replaces` and inserts `version` inside one transaction.
    pub async fn supersede_checked(
        &self,
        replaces: Option<&str>,
        version: &PatternVersion,
    ) -> SequenceResult<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        lock_versions(&mut tx, &version.sequence_id).await?;
        supersede_on(&mut tx, replaces, version).await?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }
}

#[async_trait]
impl PatternVersionStore for SqliteStore {
    async fn active_version(
        &self,
        sequence_id: &str,
        at: DateTime<Utc>,
    ) -> SequenceResult<Option<PatternVersion>> {
        Ok(self.effective_version(sequence_id, at).await?)
    }

    async fn create_version(&self, version: &PatternVersion) -> SequenceResult<()> {
        self.insert_checked(version).await
    }

    async fn supersede_version(
        &self,
        replaces: Option<&str>,
        version: &PatternVersion,
    ) -> SequenceResult<()> {
        self.supersede_checked(replaces, version).await
    }

    async fn versions(&self, sequence_id: &str) -> SequenceResult<Vec<PatternVersion>> {
        Ok(self.list_versions(sequence_id).await?)
    }
}
