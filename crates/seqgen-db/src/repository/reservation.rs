//! # Reservation Repository
//!
//! A reservation row plus one `reserved_numbers` row per held number,
//! ordered by `position`. Status changes only ever move numbers out of
//! `active`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, Transaction};
use tracing::debug;

use seqgen_core::error::SequenceResult;
use seqgen_core::types::{Reservation, ReservationStatus, ReservedNumber};
use seqgen_engine::ReservationStore;

use super::{scope_from_key, scope_key, SqliteStore};
use crate::error::{DbError, DbResult};

#[derive(Debug, FromRow)]
struct ReservationRow {
    id: String,
    sequence_id: String,
    scope_key: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct ReservedNumberRow {
    number: String,
    status: String,
}

impl TryFrom<ReservedNumberRow> for ReservedNumber {
    type Error = DbError;

    fn try_from(row: ReservedNumberRow) -> DbResult<Self> {
        let status = row
            .status
            .parse()
            .map_err(|_| DbError::decode("status", &row.status))?;
        Ok(ReservedNumber {
            number: row.number,
            status,
        })
    }
}

const ACTIVE: &str = "active";

impl SqliteStore {
    pub async fn insert_reservation(&self, reservation: &Reservation) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO reservations (id, sequence_id, scope_key, expires_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&reservation.id)
        .bind(&reservation.sequence_id)
        .bind(scope_key(reservation.scope.as_deref()))
        .bind(reservation.expires_at)
        .bind(reservation.created_at)
        .execute(&mut *tx)
        .await?;

        for (position, entry) in reservation.numbers.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO reserved_numbers (reservation_id, position, number, status)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(&reservation.id)
            .bind(position as i64)
            .bind(&entry.number)
            .bind(entry.status.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(reservation_id = %reservation.id, count = reservation.numbers.len(), "Reservation stored");
        Ok(())
    }

    pub async fn find_reservation(&self, reservation_id: &str) -> DbResult<Option<Reservation>> {
        let row = sqlx::query_as::<_, ReservationRow>(
            "SELECT id, sequence_id, scope_key, expires_at, created_at FROM reservations WHERE id = ?1",
        )
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// Moves the listed numbers from `active` to `to`. Returns those changed.
    pub async fn transition_numbers(
        &self,
        sequence_id: &str,
        scope: Option<&str>,
        numbers: &[String],
        to: ReservationStatus,
    ) -> DbResult<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let mut changed = Vec::new();

        for number in numbers {
            let updated: Vec<String> = sqlx::query_scalar(
                r#"
                UPDATE reserved_numbers SET status = ?4
                WHERE number = ?3 AND status = 'active'
                  AND reservation_id IN (
                      SELECT id FROM reservations WHERE sequence_id = ?1 AND scope_key = ?2
                  )
                RETURNING number
                "#,
            )
            .bind(sequence_id)
            .bind(scope_key(scope))
            .bind(number)
            .bind(to.to_string())
            .fetch_all(&mut *tx)
            .await?;
            changed.extend(updated);
        }

        tx.commit().await?;
        Ok(changed)
    }

    pub async fn list_active_reservations(
        &self,
        sequence_id: &str,
        scope: Option<&str>,
    ) -> DbResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT r.id, r.sequence_id, r.scope_key, r.expires_at, r.created_at
            FROM reservations r
            WHERE r.sequence_id = ?1 AND r.scope_key = ?2
              AND EXISTS (
                  SELECT 1 FROM reserved_numbers n
                  WHERE n.reservation_id = r.id AND n.status = ?3
              )
            ORDER BY r.created_at ASC, r.rowid ASC
            "#,
        )
        .bind(sequence_id)
        .bind(scope_key(scope))
        .bind(ACTIVE)
        .fetch_all(&self.pool)
        .await?;

        let mut reservations = Vec::with_capacity(rows.len());
        for row in rows {
            reservations.push(self.hydrate(row).await?);
        }
        Ok(reservations)
    }

    /// Expires every active number of reservations past their TTL at `now`.
    pub async fn expire_reservations(&self, now: DateTime<Utc>) -> DbResult<Vec<Reservation>> {
        let mut tx = self.pool.begin().await?;

        let candidates = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT r.id, r.sequence_id, r.scope_key, r.expires_at, r.created_at
            FROM reservations r
            WHERE EXISTS (
                SELECT 1 FROM reserved_numbers n
                WHERE n.reservation_id = r.id AND n.status = ?1
            )
            ORDER BY r.created_at ASC, r.rowid ASC
            "#,
        )
        .bind(ACTIVE)
        .fetch_all(&mut *tx)
        .await?;

        let mut expired = Vec::new();
        for row in candidates.into_iter().filter(|r| now >= r.expires_at) {
            sqlx::query(
                "UPDATE reserved_numbers SET status = ?2 WHERE reservation_id = ?1 AND status = ?3",
            )
            .bind(&row.id)
            .bind(ReservationStatus::Expired.to_string())
            .bind(ACTIVE)
            .execute(&mut *tx)
            .await?;

            let numbers = load_numbers(&mut tx, &row.id).await?;
            expired.push(into_reservation(row, numbers));
        }

        tx.commit().await?;
        Ok(expired)
    }

    async fn hydrate(&self, row: ReservationRow) -> DbResult<Reservation> {
        let numbers = sqlx::query_as::<_, ReservedNumberRow>(
            "SELECT number, status FROM reserved_numbers WHERE reservation_id = ?1 ORDER BY position",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ReservedNumber::try_from)
        .collect::<DbResult<Vec<_>>>()?;
        Ok(into_reservation(row, numbers))
    }
}

async fn load_numbers(
    tx: &mut Transaction<'static, Sqlite>,
    reservation_id: &str,
) -> DbResult<Vec<ReservedNumber>> {
    sqlx::query_as::<_, ReservedNumberRow>(
        "SELECT number, status FROM reserved_numbers WHERE reservation_id = ?1 ORDER BY position",
    )
    .bind(reservation_id)
    .fetch_all(&mut **tx)
    .await?
    .into_iter()
    .map(ReservedNumber::try_from)
    .collect()
}

fn into_reservation(row: ReservationRow, numbers: Vec<ReservedNumber>) -> Reservation {
    Reservation {
        id: row.id,
        sequence_id: row.sequence_id,
        scope: scope_from_key(row.scope_key),
        numbers,
        expires_at: row.expires_at,
        created_at: row.created_at,
    }
}

#[async_trait]
impl ReservationStore for SqliteStore {
    async fn reserve(&self, reservation: &Reservation) -> SequenceResult<()> {
        Ok(self.insert_reservation(reservation).await?)
    }

    async fn find(&self, reservation_id: &str) -> SequenceResult<Option<Reservation>> {
        Ok(self.find_reservation(reservation_id).await?)
    }

    async fn release(
        &self,
        sequence_id: &str,
        scope: Option<&str>,
        numbers: &[String],
    ) -> SequenceResult<Vec<String>> {
        Ok(self
            .transition_numbers(sequence_id, scope, numbers, ReservationStatus::Released)
            .await?)
    }

    async fn finalize(
        &self,
        sequence_id: &str,
        scope: Option<&str>,
        numbers: &[String],
    ) -> SequenceResult<Vec<String>> {
        Ok(self
            .transition_numbers(sequence_id, scope, numbers, ReservationStatus::Finalized)
            .await?)
    }

    async fn active_reservations(
        &self,
        sequence_id: &str,
        scope: Option<&str>,
    ) -> SequenceResult<Vec<Reservation>> {
        Ok(self.list_active_reservations(sequence_id, scope).await?)
    }

    async fn release_expired(&self, now: DateTime<Utc>) -> SequenceResult<Vec<Reservation>> {
        Ok(self.expire_reservations(now).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing;
    use chrono::Duration;
    use seqgen_core::types::SequenceDefinition;

    fn reservation(sequence_id: &str, numbers: &[&str], ttl: Duration) -> Reservation {
        let now = Utc::now();
        Reservation {
            id: uuid::Uuid::new_v4().to_string(),
            sequence_id: sequence_id.to_string(),
            scope: None,
            numbers: numbers
                .iter()
                .map(|n| ReservedNumber {
                    number: n.to_string(),
                    status: ReservationStatus::Active,
                })
                .collect(),
            expires_at: now + ttl,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_release_finalize_and_find() {
        let store = testing::store().await;
        let seq = testing::insert(&store, SequenceDefinition::new("po", "PO-{COUNTER}")).await;
        let r = reservation(&seq.id, &["PO-1", "PO-2", "PO-3"], Duration::minutes(30));
        store.reserve(&r).await.unwrap();

        let released = store
            .release(&seq.id, None, &["PO-2".to_string(), "PO-9".to_string()])
            .await
            .unwrap();
        assert_eq!(released, vec!["PO-2"]);

        // Already released: not active any more
        let finalized = store
            .finalize(&seq.id, None, &["PO-1".to_string(), "PO-2".to_string()])
            .await
            .unwrap();
        assert_eq!(finalized, vec!["PO-1"]);

        let found = store.find(&r.id).await.unwrap().unwrap();
        let statuses: Vec<_> = found.numbers.iter().map(|n| n.status).collect();
        assert_eq!(
            statuses,
            vec![
                ReservationStatus::Finalized,
                ReservationStatus::Released,
                ReservationStatus::Active
            ]
        );
        assert_eq!(store.active_reservations(&seq.id, None).await.unwrap().len(), 1);
        assert!(store.find("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_expired() {
        let store = testing::store().await;
        let seq = testing::insert(&store, SequenceDefinition::new("po", "PO-{COUNTER}")).await;
        let short = reservation(&seq.id, &["PO-1", "PO-2"], Duration::minutes(5));
        let long = reservation(&seq.id, &["PO-3"], Duration::minutes(60));
        store.reserve(&short).await.unwrap();
        store.reserve(&long).await.unwrap();
        store.finalize(&seq.id, None, &["PO-1".to_string()]).await.unwrap();

        let expired = store
            .release_expired(Utc::now() + Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, short.id);
        assert_eq!(expired[0].numbers[1].status, ReservationStatus::Expired);
        assert_eq!(expired[0].numbers[0].status, ReservationStatus::Finalized);

        let active = store.active_reservations(&seq.id, None).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, long.id);
    }
}
