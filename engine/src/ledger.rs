//! Reservation ledger: paired (reservation, seat) state changes.
//!
//! Four call paths touch the same two records - manual release, batch
//! release, the timeout sweep, and checkout conversion. Centralizing
//! every transition of the pair in this component keeps seat and
//! reservation from drifting apart.
//!
//! # Ordering within a pair
//!
//! The seat is always transitioned first, because the seat is the
//! engine's pessimistic gate: if the second (reservation) write fails,
//! the seat is either free again (release paths, self-consistent) or
//! held/sold longer than the ledger says, which the sweep or a retried
//! completion repairs. The opposite order could leave a free seat with
//! a live reservation and allow a second active hold on one seat.
//!
//! # Commutativity
//!
//! Reservation transitions are version-checked, so racing paths (sweep
//! vs manual release) commute: whichever reaches the record first wins
//! and the loser observes a non-active record, which is a no-op.

use crate::config::EngineConfig;
use crate::registry::SeatRegistry;
use crate::retry::{retry_transient, RetryPolicy};
use chrono::Duration;
use seathold_core::environment::Clock;
use seathold_core::error::{HoldError, StoreError};
use seathold_core::notify::{NotificationChannel, SeatEvent};
use seathold_core::store::{ReservationStore, UpdateOutcome};
use seathold_core::types::{
    ClaimantId, GroupRequestId, Reservation, ReservationId, ReservationKind, ReservationStatus,
    SeatId,
};
use std::sync::Arc;

/// See [`crate::registry`]; same bound, same reasoning.
const MAX_CAS_ATTEMPTS: usize = 8;

/// Append/lookup of reservation records, and the only writer of
/// (reservation, seat) pairs.
pub struct ReservationLedger {
    registry: Arc<SeatRegistry>,
    reservations: Arc<dyn ReservationStore>,
    notifier: Arc<dyn NotificationChannel>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
    retry: RetryPolicy,
}

impl ReservationLedger {
    /// Creates a ledger over the given registry and reservation store.
    #[must_use]
    pub fn new(
        registry: Arc<SeatRegistry>,
        reservations: Arc<dyn ReservationStore>,
        notifier: Arc<dyn NotificationChannel>,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
    ) -> Self {
        let retry = config.retry_policy();
        Self {
            registry,
            reservations,
            notifier,
            clock,
            config,
            retry,
        }
    }

    /// The registry this ledger claims seats through.
    #[must_use]
    pub fn registry(&self) -> &Arc<SeatRegistry> {
        &self.registry
    }

    /// Fetch a reservation, mapping absence to
    /// [`HoldError::ReservationNotFound`].
    ///
    /// # Errors
    ///
    /// Returns [`HoldError::ReservationNotFound`] or a surfaced store
    /// failure.
    pub async fn get(&self, reservation_id: ReservationId) -> Result<Reservation, HoldError> {
        retry_transient(&self.retry, || self.reservations.get(reservation_id))
            .await?
            .ok_or(HoldError::ReservationNotFound(reservation_id))
    }

    /// All active reservations owned by `claimant`.
    ///
    /// # Errors
    ///
    /// Returns a surfaced store failure.
    pub async fn active_for_claimant(
        &self,
        claimant: &ClaimantId,
    ) -> Result<Vec<Reservation>, HoldError> {
        Ok(retry_transient(&self.retry, || {
            self.reservations.active_by_claimant(claimant)
        })
        .await?)
    }

    /// Claim a seat and record the hold as one logical transaction.
    ///
    /// The seat claim happens first (it is the mutual-exclusion gate);
    /// if recording the reservation then fails, the claim is rolled
    /// back before the error surfaces. Price is frozen from the seat's
    /// `effective_price` at claim time.
    ///
    /// Re-claiming a seat the claimant already holds refreshes the
    /// existing reservation's lease instead of creating a duplicate,
    /// preserving the at-most-one-active-per-seat invariant.
    ///
    /// # Errors
    ///
    /// - [`HoldError::SeatNotFound`] / [`HoldError::SeatUnavailable`] -
    ///   from the claim
    /// - [`HoldError::Store`] - store failure after bounded retry
    pub async fn create(
        &self,
        seat_id: SeatId,
        claimant: &ClaimantId,
        kind: ReservationKind,
        ttl: Option<Duration>,
        group_ref: Option<GroupRequestId>,
    ) -> Result<Reservation, HoldError> {
        let ttl = ttl.unwrap_or_else(|| self.config.hold_ttl(kind));
        let checkout = kind == ReservationKind::Checkout;

        let seat = self
            .registry
            .try_claim(seat_id, claimant, ttl, checkout)
            .await?;
        let Some(expires_at) = seat.held_until else {
            return Err(StoreError::Corrupted(format!(
                "seat {seat_id} has no lease expiry after claim"
            ))
            .into());
        };

        // A successful claim can be a refresh of our own hold, or (after
        // a crash) the seat can carry a stale active record from another
        // claimant. Handle both before inserting.
        let existing =
            retry_transient(&self.retry, || self.reservations.active_by_seat(seat_id)).await?;
        if let Some(stale) = existing {
            if stale.claimant == *claimant {
                return self.refresh_existing(stale, expires_at).await;
            }
            tracing::warn!(
                seat_id = %seat_id,
                stale_reservation = %stale.id,
                "expiring stale active reservation found on claimable seat"
            );
            let mut expired = stale.clone();
            expired.status = ReservationStatus::Expired;
            expired.updated_at = self.clock.now();
            if let Err(err) = self.write(expired, stale.version).await {
                tracing::error!(reservation_id = %stale.id, error = %err, "stale reservation cleanup failed");
            }
        }

        let now = self.clock.now();
        let reservation = Reservation {
            id: ReservationId::new(),
            seat_id,
            venue_id: seat.venue_id,
            claimant: claimant.clone(),
            status: ReservationStatus::Active,
            kind,
            expires_at,
            reserved_price: seat.effective_price,
            extension_count: 0,
            completion_ref: None,
            group_ref,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
            version: 0,
        };

        let insert = retry_transient(&self.retry, || {
            self.reservations.insert(reservation.clone())
        })
        .await;
        if let Err(err) = insert {
            // Reservation creation and seat claim are one logical
            // transaction: undo the claim before surfacing.
            tracing::error!(seat_id = %seat_id, error = %err, "reservation insert failed, rolling back claim");
            if let Err(rollback) = self.registry.release(seat_id, Some(claimant)).await {
                tracing::error!(seat_id = %seat_id, error = %rollback, "claim rollback failed");
            }
            return Err(err.into());
        }

        tracing::info!(
            reservation_id = %reservation.id,
            seat_id = %seat_id,
            claimant = %claimant,
            kind = ?kind,
            expires_at = %expires_at,
            "reservation created"
        );
        Ok(reservation)
    }

    /// Extend an active reservation's lease by `extra`.
    ///
    /// On success the reservation's `expires_at` and the seat's
    /// `held_until` move together; the extension count is capped so one
    /// claimant cannot keep a seat out of inventory indefinitely.
    ///
    /// # Errors
    ///
    /// - [`HoldError::ReservationNotFound`] - no such reservation
    /// - [`HoldError::NotOwner`] - caller does not own the hold
    /// - [`HoldError::ReservationExpired`] - TTL already passed
    /// - [`HoldError::ReservationNotActive`] - cancelled or completed
    /// - [`HoldError::ExtensionLimit`] - cap (default 3) reached
    /// - [`HoldError::Store`] - store failure after bounded retry
    pub async fn extend(
        &self,
        reservation_id: ReservationId,
        claimant: &ClaimantId,
        extra: Duration,
    ) -> Result<Reservation, HoldError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let reservation = self.get(reservation_id).await?;
            if reservation.claimant != *claimant {
                return Err(HoldError::NotOwner { reservation_id });
            }
            match reservation.status {
                ReservationStatus::Active => {}
                ReservationStatus::Expired => {
                    return Err(HoldError::ReservationExpired {
                        reservation_id,
                        expired_at: reservation.expires_at,
                    });
                }
                status => {
                    return Err(HoldError::ReservationNotActive {
                        reservation_id,
                        status,
                    });
                }
            }
            let now = self.clock.now();
            if now >= reservation.expires_at {
                // Lapsed but not yet swept; only the sweep may act on it.
                return Err(HoldError::ReservationExpired {
                    reservation_id,
                    expired_at: reservation.expires_at,
                });
            }
            if reservation.extension_count >= self.config.max_extensions {
                return Err(HoldError::ExtensionLimit {
                    reservation_id,
                    max: self.config.max_extensions,
                });
            }

            let new_expires = reservation.expires_at + extra;

            // Seat first (see module docs), then the reservation.
            self.registry
                .refresh_hold(reservation.seat_id, claimant, new_expires)
                .await?;

            let mut updated = reservation.clone();
            updated.expires_at = new_expires;
            updated.extension_count += 1;
            updated.updated_at = now;

            match self.write(updated, reservation.version).await {
                Ok(Some(stored)) => {
                    tracing::info!(
                        reservation_id = %reservation_id,
                        expires_at = %new_expires,
                        extension = stored.extension_count,
                        "reservation extended"
                    );
                    return Ok(stored);
                }
                Ok(None) => {
                    // Lost the reservation race; put the seat back on the
                    // lease we read before re-evaluating.
                    self.unwind_hold(&reservation).await;
                }
                Err(err) => {
                    self.unwind_hold(&reservation).await;
                    return Err(err);
                }
            }
        }

        Err(StoreError::Transient(format!(
            "reservation {reservation_id} version churn"
        ))
        .into())
    }

    /// Cancel an active reservation and free its seat.
    ///
    /// Idempotent: cancelling a reservation that is no longer active
    /// returns the current record unchanged, not an error.
    ///
    /// # Errors
    ///
    /// - [`HoldError::ReservationNotFound`] - no such reservation
    /// - [`HoldError::Store`] - store failure after bounded retry
    pub async fn cancel(
        &self,
        reservation_id: ReservationId,
        reason: &str,
    ) -> Result<Reservation, HoldError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let reservation = self.get(reservation_id).await?;
            if reservation.status != ReservationStatus::Active {
                return Ok(reservation); // already released; no-op
            }

            self.registry
                .release(reservation.seat_id, Some(&reservation.claimant))
                .await?;

            let mut updated = reservation.clone();
            updated.status = ReservationStatus::Cancelled;
            updated.cancel_reason = Some(reason.to_string());
            updated.updated_at = self.clock.now();

            if let Some(stored) = self.write(updated, reservation.version).await? {
                tracing::info!(
                    reservation_id = %reservation_id,
                    seat_id = %reservation.seat_id,
                    reason,
                    "reservation cancelled"
                );
                return Ok(stored);
            }
            // Lost to a racing transition; re-read (most likely the
            // record is no longer active and we no-op out).
        }

        Err(StoreError::Transient(format!(
            "reservation {reservation_id} version churn"
        ))
        .into())
    }

    /// Convert an active reservation into a sale.
    ///
    /// The seat becomes `Sold` and the reservation `Completed`, with
    /// `completion_ref` recorded for the payment/ticketing collaborator.
    /// Retrying a completion with the same reference is idempotent.
    ///
    /// # Errors
    ///
    /// - [`HoldError::ReservationNotFound`] - no such reservation
    /// - [`HoldError::ReservationExpired`] - TTL already passed
    /// - [`HoldError::ReservationNotActive`] - cancelled, or completed
    ///   with a different reference
    /// - [`HoldError::Store`] - store failure after bounded retry
    pub async fn complete(
        &self,
        reservation_id: ReservationId,
        completion_ref: &str,
    ) -> Result<Reservation, HoldError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let reservation = self.get(reservation_id).await?;
            match reservation.status {
                ReservationStatus::Active => {}
                ReservationStatus::Completed
                    if reservation.completion_ref.as_deref() == Some(completion_ref) =>
                {
                    return Ok(reservation); // idempotent re-completion
                }
                ReservationStatus::Expired => {
                    return Err(HoldError::ReservationExpired {
                        reservation_id,
                        expired_at: reservation.expires_at,
                    });
                }
                status => {
                    return Err(HoldError::ReservationNotActive {
                        reservation_id,
                        status,
                    });
                }
            }
            let now = self.clock.now();
            if now >= reservation.expires_at {
                return Err(HoldError::ReservationExpired {
                    reservation_id,
                    expired_at: reservation.expires_at,
                });
            }

            self.registry
                .finalize(reservation.seat_id, &reservation.claimant)
                .await?;

            let mut updated = reservation.clone();
            updated.status = ReservationStatus::Completed;
            updated.completion_ref = Some(completion_ref.to_string());
            updated.updated_at = now;

            if let Some(stored) = self.write(updated, reservation.version).await? {
                tracing::info!(
                    reservation_id = %reservation_id,
                    seat_id = %reservation.seat_id,
                    completion_ref,
                    "reservation completed"
                );
                return Ok(stored);
            }
        }

        Err(StoreError::Transient(format!(
            "reservation {reservation_id} version churn"
        ))
        .into())
    }

    /// Sweep path: expire one overdue reservation and free its seat.
    ///
    /// Returns `Ok(None)` when there is nothing to do - the record is
    /// no longer active (a racing release won), it is an administrative
    /// hold (operator must release), or its TTL has not actually passed.
    /// An overdue record whose seat is no longer held by its claimant
    /// is still expired, so an orphan left by a crash mid pair-update
    /// cannot sit in the sweep queue forever.
    /// Safe to run twice on the same input.
    ///
    /// # Errors
    ///
    /// - [`HoldError::ReservationNotFound`] - no such reservation
    /// - [`HoldError::Store`] - store failure after bounded retry
    pub async fn expire(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>, HoldError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let reservation = self.get(reservation_id).await?;
            if reservation.status != ReservationStatus::Active {
                return Ok(None);
            }
            if reservation.kind == ReservationKind::AdministrativeHold {
                tracing::debug!(
                    reservation_id = %reservation_id,
                    "administrative hold past expiry left for operator"
                );
                return Ok(None);
            }
            let now = self.clock.now();
            if reservation.expires_at >= now {
                return Ok(None);
            }

            match self
                .registry
                .release(reservation.seat_id, Some(&reservation.claimant))
                .await
            {
                Ok(_) => {}
                Err(HoldError::SeatUnavailable { status, .. }) => {
                    // The seat moved on without this record (finalized
                    // to sold before the reservation write landed, or
                    // re-claimed after a crash). The record can never
                    // become consistent again; close it out so it stops
                    // occupying sweep batches.
                    tracing::warn!(
                        reservation_id = %reservation_id,
                        seat_status = %status,
                        "expiring orphaned reservation whose seat moved on"
                    );
                }
                Err(err) => return Err(err),
            }

            let mut updated = reservation.clone();
            updated.status = ReservationStatus::Expired;
            updated.updated_at = now;

            if let Some(stored) = self.write(updated, reservation.version).await? {
                let event = SeatEvent::ReservationExpired {
                    reservation_id,
                    seat_id: stored.seat_id,
                };
                if let Err(err) = self.notifier.publish(stored.venue_id, event).await {
                    tracing::warn!(reservation_id = %reservation_id, error = %err, "expiry publish failed");
                }
                tracing::info!(
                    reservation_id = %reservation_id,
                    seat_id = %stored.seat_id,
                    "reservation expired"
                );
                return Ok(Some(stored));
            }
        }

        Err(StoreError::Transient(format!(
            "reservation {reservation_id} version churn"
        ))
        .into())
    }

    /// Best-effort rollback of a seat lease after a failed pair update.
    async fn unwind_hold(&self, reservation: &Reservation) {
        if let Err(err) = self
            .registry
            .refresh_hold(
                reservation.seat_id,
                &reservation.claimant,
                reservation.expires_at,
            )
            .await
        {
            tracing::error!(
                seat_id = %reservation.seat_id,
                error = %err,
                "lease rollback failed; sweep will reconcile"
            );
        }
    }

    /// Refresh the lease of an existing active reservation (idempotent
    /// re-claim by the same claimant).
    async fn refresh_existing(
        &self,
        reservation: Reservation,
        expires_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Reservation, HoldError> {
        let mut updated = reservation.clone();
        updated.expires_at = expires_at;
        updated.updated_at = self.clock.now();
        match self.write(updated, reservation.version).await? {
            Some(stored) => {
                tracing::debug!(
                    reservation_id = %stored.id,
                    expires_at = %expires_at,
                    "reservation lease refreshed"
                );
                Ok(stored)
            }
            // Racing transition; hand back the current record.
            None => self.get(reservation.id).await,
        }
    }

    /// Version-checked reservation write with transient retry.
    async fn write(
        &self,
        reservation: Reservation,
        expected_version: u64,
    ) -> Result<Option<Reservation>, HoldError> {
        let id = reservation.id;
        let outcome = retry_transient(&self.retry, || {
            self.reservations.update(reservation.clone(), expected_version)
        })
        .await?;
        match outcome {
            UpdateOutcome::Applied(stored) => Ok(Some(stored)),
            UpdateOutcome::VersionMismatch => Ok(None),
            UpdateOutcome::Missing => Err(HoldError::ReservationNotFound(id)),
        }
    }
}
