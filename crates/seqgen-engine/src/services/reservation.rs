//! # Reservation Service
//!
//! Holds bulk-generated numbers for a limited time until the caller
//! finalizes or releases them.
//!
//! ## Number Lifecycle
//! ```text
//!                 ┌──────────── finalize ────────────► Finalized
//!                 │
//! reserve ──► Active ──────────── release ─────────────► Released ─┐
//!                 │                                                │ return_to_gaps
//!                 └──── release_expired (TTL passed) ──► Expired ──┴──► gap
//! ```
//!
//! Reserved numbers are consumed from the counter up front. With the
//! `discard` release policy released and expired numbers are never issued
//! again; `return_to_gaps` records each as a gap instead.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use seqgen_core::error::{SequenceError, SequenceResult};
use seqgen_core::pattern::VariableContext;
use seqgen_core::types::{Reservation, ReservationReceipt, ReservationStatus, ReservedNumber};
use seqgen_core::validation::{validate_numbers, validate_ttl_minutes};

use super::{load_sequence, BulkGeneratorService, GapManager};
use crate::config::ReservationSettings;
use crate::store::Stores;

const RELEASED_REASON: &str = "reservation released";
const EXPIRED_REASON: &str = "reservation expired";

#[derive(Clone)]
pub struct ReservationService {
    stores: Stores,
    bulk: BulkGeneratorService,
    gaps: GapManager,
    settings: ReservationSettings,
}

impl ReservationService {
    pub fn new(
        stores: Stores,
        bulk: BulkGeneratorService,
        gaps: GapManager,
        settings: ReservationSettings,
    ) -> Self {
        ReservationService {
            stores,
            bulk,
            gaps,
            settings,
        }
    }

    /// Generates `count` numbers and holds them for `ttl_minutes`
    /// (the configured default when `None`).
    pub async fn reserve(
        &self,
        name: &str,
        count: usize,
        ttl_minutes: Option<i64>,
        scope: Option<&str>,
        context: &VariableContext,
    ) -> SequenceResult<ReservationReceipt> {
        let ttl = ttl_minutes.unwrap_or(self.settings.default_ttl_minutes);
        validate_ttl_minutes(ttl, self.settings.max_ttl_minutes)?;

        let sequence = load_sequence(&self.stores, name, scope).await?;
        let numbers = self
            .bulk
            .generate_bulk_for(&sequence, count, scope, context)
            .await?;

        let now = Utc::now();
        let reservation = Reservation {
            id: uuid::Uuid::new_v4().to_string(),
            sequence_id: sequence.id.clone(),
            scope: scope.map(str::to_string),
            numbers: numbers
                .iter()
                .map(|number| ReservedNumber {
                    number: number.clone(),
                    status: ReservationStatus::Active,
                })
                .collect(),
            expires_at: now + Duration::minutes(ttl),
            created_at: now,
        };
        self.stores.reservations.reserve(&reservation).await?;

        info!(
            sequence = %sequence.name,
            ?scope,
            reservation_id = %reservation.id,
            count,
            ttl_minutes = ttl,
            "Numbers reserved"
        );

        Ok(ReservationReceipt {
            reservation_id: reservation.id,
            numbers,
            expires_at: reservation.expires_at,
        })
    }

    /// Gives up held numbers. Returns how many were still active.
    pub async fn release(
        &self,
        name: &str,
        numbers: &[String],
        scope: Option<&str>,
    ) -> SequenceResult<usize> {
        validate_numbers(numbers)?;
        let sequence = load_sequence(&self.stores, name, scope).await?;

        let released = self
            .stores
            .reservations
            .release(&sequence.id, scope, numbers)
            .await?;

        if self.settings.release_policy.returns_to_gaps() {
            for number in &released {
                self.gaps
                    .record_for(&sequence, number, Some(RELEASED_REASON), scope)
                    .await?;
            }
        }

        info!(sequence = %sequence.name, ?scope, released = released.len(), "Reserved numbers released");
        Ok(released.len())
    }

    /// Confirms held numbers as used. Returns how many were still active.
    pub async fn finalize(
        &self,
        name: &str,
        numbers: &[String],
        scope: Option<&str>,
    ) -> SequenceResult<usize> {
        validate_numbers(numbers)?;
        let sequence = load_sequence(&self.stores, name, scope).await?;

        let finalized = self
            .stores
            .reservations
            .finalize(&sequence.id, scope, numbers)
            .await?;

        info!(sequence = %sequence.name, ?scope, finalized = finalized.len(), "Reserved numbers finalized");
        Ok(finalized.len())
    }

    /// Reservations still holding at least one active number.
    pub async fn active_reservations(
        &self,
        name: &str,
        scope: Option<&str>,
    ) -> SequenceResult<Vec<Reservation>> {
        let sequence = load_sequence(&self.stores, name, scope).await?;
        self.stores
            .reservations
            .active_reservations(&sequence.id, scope)
            .await
    }

    pub async fn reservation(&self, reservation_id: &str) -> SequenceResult<Reservation> {
        self.stores
            .reservations
            .find(reservation_id)
            .await?
            .ok_or_else(|| SequenceError::ReservationNotFound(reservation_id.to_string()))
    }

    /// Expires every reservation whose TTL has passed.
    pub async fn release_expired(&self) -> SequenceResult<usize> {
        self.release_expired_at(Utc::now()).await
    }

    /// Same as [`release_expired`](Self::release_expired) with an explicit clock.
    /// Returns the number of reservations that had numbers expired.
    pub async fn release_expired_at(&self, now: DateTime<Utc>) -> SequenceResult<usize> {
        let expired = self.stores.reservations.release_expired(now).await?;

        if self.settings.release_policy.returns_to_gaps() {
            for reservation in &expired {
                let numbers = reservation
                    .numbers
                    .iter()
                    .filter(|n| n.status == ReservationStatus::Expired);
                for entry in numbers {
                    self.gaps
                        .record_by_id(
                            &reservation.sequence_id,
                            &entry.number,
                            Some(EXPIRED_REASON),
                            reservation.scope.as_deref(),
                        )
                        .await?;
                }
            }
        }

        if expired.is_empty() {
            debug!("No reservations expired");
        } else {
            info!(expired = expired.len(), "Expired reservations released");
        }
        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PatternResolution, ReleasePolicy};
    use crate::services::{testing, PatternVersionManager};
    use seqgen_core::types::SequenceDefinition;
    use std::collections::HashMap;

    fn service(stores: &Stores, release_policy: ReleasePolicy) -> ReservationService {
        let versions = PatternVersionManager::new(stores.clone(), PatternResolution::Versioned);
        let bulk = BulkGeneratorService::new(stores.clone(), versions, 100);
        let settings = ReservationSettings {
            release_policy,
            ..ReservationSettings::default()
        };
        ReservationService::new(stores.clone(), bulk, GapManager::new(stores.clone()), settings)
    }

    #[tokio::test]
    async fn test_reserve_release_finalize() {
        let (stores, _) = testing::stores();
        testing::insert(&stores, SequenceDefinition::new("po", "PO-{COUNTER:3}")).await;
        let reservations = service(&stores, ReleasePolicy::Discard);

        let receipt = reservations
            .reserve("po", 3, Some(10), None, &HashMap::new())
            .await
            .unwrap();
        assert_eq!(receipt.numbers, vec!["PO-001", "PO-002", "PO-003"]);

        let released = reservations
            .release("po", &["PO-002".to_string(), "PO-999".to_string()], None)
            .await
            .unwrap();
        assert_eq!(released, 1);

        let finalized = reservations
            .finalize("po", &["PO-001".to_string(), "PO-002".to_string()], None)
            .await
            .unwrap();
        assert_eq!(finalized, 1);

        let reservation = reservations.reservation(&receipt.reservation_id).await.unwrap();
        assert_eq!(reservation.active_numbers(), vec!["PO-003"]);
        assert_eq!(reservations.active_reservations("po", None).await.unwrap().len(), 1);

        // Discard: nothing comes back as a gap
        assert!(GapManager::new(stores.clone()).gaps("po", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ttl_bounds() {
        let (stores, _) = testing::stores();
        testing::insert(&stores, SequenceDefinition::new("po", "PO-{COUNTER}")).await;
        let reservations = service(&stores, ReleasePolicy::Discard);

        assert!(reservations.reserve("po", 1, Some(0), None, &HashMap::new()).await.is_err());
        assert!(reservations
            .reserve("po", 1, Some(24 * 60 + 1), None, &HashMap::new())
            .await
            .is_err());

        let receipt = reservations.reserve("po", 1, None, None, &HashMap::new()).await.unwrap();
        let ttl = receipt.expires_at - Utc::now();
        assert!(ttl <= Duration::minutes(30) && ttl > Duration::minutes(29));
    }

    #[tokio::test]
    async fn test_expiry_returns_numbers_to_gaps() {
        let (stores, _) = testing::stores();
        testing::insert(&stores, SequenceDefinition::new("po", "PO-{COUNTER}")).await;
        let reservations = service(&stores, ReleasePolicy::ReturnToGaps);

        let receipt = reservations
            .reserve("po", 2, Some(5), Some("b1"), &HashMap::new())
            .await
            .unwrap();
        reservations
            .finalize("po", &["PO-1".to_string()], Some("b1"))
            .await
            .unwrap();

        assert_eq!(reservations.release_expired_at(Utc::now()).await.unwrap(), 0);
        let later = receipt.expires_at + Duration::seconds(1);
        assert_eq!(reservations.release_expired_at(later).await.unwrap(), 1);
        assert_eq!(reservations.release_expired_at(later).await.unwrap(), 0);

        let gaps = GapManager::new(stores.clone()).gaps("po", Some("b1")).await.unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].number, "PO-2");
        assert_eq!(gaps[0].reason.as_deref(), Some(EXPIRED_REASON));

        let reservation = reservations.reservation(&receipt.reservation_id).await.unwrap();
        assert!(reservation.active_numbers().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_reservation() {
        let (stores, _) = testing::stores();
        let err = service(&stores, ReleasePolicy::Discard)
            .reservation("missing")
            .await
            .unwrap_err();
        assert!(matches!(err, SequenceError::ReservationNotFound(_)));
    }
}
