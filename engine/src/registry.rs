//! Seat registry: canonical seat state and the single point of mutual
//! exclusion.
//!
//! Every status transition of a seat goes through this component, and
//! exactly one operation guards the transition from `Available` to a
//! hold status: [`SeatRegistry::try_claim`]. All other components
//! (ledger, coordinator, scheduler) compose on top of it and do not
//! re-implement locking.
//!
//! # Concurrency
//!
//! The registry uses the store's version-checked update as a
//! compare-and-swap: read the seat, decide on the copy, write back
//! conditioned on the version read. A lost race re-reads and
//! re-evaluates; if the competing writer took the seat, the caller gets
//! a [`HoldError::SeatUnavailable`] conflict immediately, never a
//! blocking wait and never a silent overwrite.

use crate::retry::{retry_transient, RetryPolicy};
use chrono::{DateTime, Duration, Utc};
use seathold_core::environment::Clock;
use seathold_core::error::HoldError;
use seathold_core::notify::{NotificationChannel, SeatEvent};
use seathold_core::store::{SeatStore, UpdateOutcome};
use seathold_core::types::{
    AvailabilitySnapshot, ClaimantId, Seat, SeatId, SeatStatus, VenueId,
};
use std::sync::Arc;

/// Upper bound on CAS re-read cycles for one operation.
///
/// A mismatch normally resolves in one re-read (the seat is gone and we
/// report a conflict); the bound only guards against pathological churn.
const MAX_CAS_ATTEMPTS: usize = 8;

/// Canonical state of every seat in a venue; all seat mutation funnels
/// through here.
pub struct SeatRegistry {
    seats: Arc<dyn SeatStore>,
    notifier: Arc<dyn NotificationChannel>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl SeatRegistry {
    /// Creates a registry over the given store and collaborators.
    #[must_use]
    pub fn new(
        seats: Arc<dyn SeatStore>,
        notifier: Arc<dyn NotificationChannel>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            seats,
            notifier,
            clock,
            retry,
        }
    }

    /// Fetch a seat, mapping absence to [`HoldError::SeatNotFound`].
    ///
    /// # Errors
    ///
    /// Returns [`HoldError::SeatNotFound`] or a surfaced store failure.
    pub async fn get(&self, seat_id: SeatId) -> Result<Seat, HoldError> {
        retry_transient(&self.retry, || self.seats.get(seat_id))
            .await?
            .ok_or(HoldError::SeatNotFound(seat_id))
    }

    /// Atomically claim a seat for `claimant` with the given lease.
    ///
    /// Succeeds only when the seat is `Available`, or already held by
    /// the *same* claimant - the latter is idempotent and simply
    /// refreshes the lease. Any other state is a conflict returned
    /// immediately so the caller can offer an alternative seat.
    ///
    /// A first-time claim bumps `selection_count` and the popularity
    /// score; a refresh does not.
    ///
    /// # Errors
    ///
    /// - [`HoldError::SeatNotFound`] - no such seat
    /// - [`HoldError::SeatUnavailable`] - seat not claimable (or lost
    ///   the race to a competing claimant)
    /// - [`HoldError::Store`] - store failure after bounded retry
    pub async fn try_claim(
        &self,
        seat_id: SeatId,
        claimant: &ClaimantId,
        lease: Duration,
        checkout: bool,
    ) -> Result<Seat, HoldError> {
        let target = if checkout {
            SeatStatus::ReservedForCheckout
        } else {
            SeatStatus::Held
        };

        for _ in 0..MAX_CAS_ATTEMPTS {
            let seat = self.get(seat_id).await?;
            let refresh = match seat.status {
                SeatStatus::Available => false,
                _ if seat.held_by(claimant) => true,
                status => {
                    return Err(HoldError::SeatUnavailable { seat_id, status });
                }
            };

            let mut updated = seat.clone();
            updated.status = target;
            updated.held_until = Some(self.clock.now() + lease);
            updated.hold_ref = Some(claimant.clone());
            if !refresh {
                updated.selection_count += 1;
                updated.popularity_score += 1.0;
            }
            debug_assert!(updated.hold_state_consistent());

            match self.write(updated, seat.version).await? {
                Some(stored) => {
                    if !refresh {
                        self.publish_status(&stored).await;
                    }
                    tracing::debug!(
                        seat_id = %seat_id,
                        claimant = %claimant,
                        status = %stored.status,
                        held_until = ?stored.held_until,
                        refresh,
                        "seat claimed"
                    );
                    return Ok(stored);
                }
                None => continue, // lost the race; re-read and re-evaluate
            }
        }

        // Version churn without resolution; report as contention.
        let status = self.get(seat_id).await?.status;
        Err(HoldError::SeatUnavailable { seat_id, status })
    }

    /// Revert a held seat to `Available`, clearing the hold bookkeeping.
    ///
    /// Idempotent: releasing a seat that is already `Available` is a
    /// no-op success. When `expected_claimant` is given, a hold owned by
    /// someone else is a conflict and is left untouched.
    ///
    /// # Errors
    ///
    /// - [`HoldError::SeatNotFound`] - no such seat
    /// - [`HoldError::SeatUnavailable`] - seat is sold/blocked, or held
    ///   by a different claimant than expected
    /// - [`HoldError::Store`] - store failure after bounded retry
    pub async fn release(
        &self,
        seat_id: SeatId,
        expected_claimant: Option<&ClaimantId>,
    ) -> Result<Seat, HoldError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let seat = self.get(seat_id).await?;
            match seat.status {
                SeatStatus::Available => return Ok(seat), // already released
                s if s.is_held() => {}
                status => return Err(HoldError::SeatUnavailable { seat_id, status }),
            }
            if let Some(expected) = expected_claimant {
                if seat.hold_ref.as_ref() != Some(expected) {
                    return Err(HoldError::SeatUnavailable {
                        seat_id,
                        status: seat.status,
                    });
                }
            }

            let mut updated = seat.clone();
            updated.status = SeatStatus::Available;
            updated.held_until = None;
            updated.hold_ref = None;
            debug_assert!(updated.hold_state_consistent());

            if let Some(stored) = self.write(updated, seat.version).await? {
                self.publish_status(&stored).await;
                tracing::debug!(seat_id = %seat_id, "seat released");
                return Ok(stored);
            }
        }

        let status = self.get(seat_id).await?.status;
        Err(HoldError::SeatUnavailable { seat_id, status })
    }

    /// Convert a hold into a sale: held seat becomes `Sold`.
    ///
    /// The seat must currently be held by `claimant`.
    ///
    /// # Errors
    ///
    /// - [`HoldError::SeatNotFound`] - no such seat
    /// - [`HoldError::SeatUnavailable`] - seat is not held by `claimant`
    /// - [`HoldError::Store`] - store failure after bounded retry
    pub async fn finalize(
        &self,
        seat_id: SeatId,
        claimant: &ClaimantId,
    ) -> Result<Seat, HoldError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let seat = self.get(seat_id).await?;
            if !seat.held_by(claimant) {
                return Err(HoldError::SeatUnavailable {
                    seat_id,
                    status: seat.status,
                });
            }

            let mut updated = seat.clone();
            updated.status = SeatStatus::Sold;
            updated.held_until = None;
            updated.hold_ref = None;
            debug_assert!(updated.hold_state_consistent());

            if let Some(stored) = self.write(updated, seat.version).await? {
                self.publish_status(&stored).await;
                tracing::info!(seat_id = %seat_id, claimant = %claimant, "seat sold");
                return Ok(stored);
            }
        }

        let status = self.get(seat_id).await?.status;
        Err(HoldError::SeatUnavailable { seat_id, status })
    }

    /// Re-anchor the lease expiry of a hold owned by `claimant`.
    ///
    /// Used by the ledger's extend path so the seat's `held_until` and
    /// the reservation's `expires_at` never diverge. Does not publish a
    /// status event (the status does not change).
    ///
    /// # Errors
    ///
    /// - [`HoldError::SeatNotFound`] - no such seat
    /// - [`HoldError::SeatUnavailable`] - seat is not held by `claimant`
    /// - [`HoldError::Store`] - store failure after bounded retry
    pub async fn refresh_hold(
        &self,
        seat_id: SeatId,
        claimant: &ClaimantId,
        new_until: DateTime<Utc>,
    ) -> Result<Seat, HoldError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let seat = self.get(seat_id).await?;
            if !seat.held_by(claimant) {
                return Err(HoldError::SeatUnavailable {
                    seat_id,
                    status: seat.status,
                });
            }

            let mut updated = seat.clone();
            updated.held_until = Some(new_until);

            if let Some(stored) = self.write(updated, seat.version).await? {
                tracing::debug!(seat_id = %seat_id, held_until = %new_until, "hold re-anchored");
                return Ok(stored);
            }
        }

        let status = self.get(seat_id).await?.status;
        Err(HoldError::SeatUnavailable { seat_id, status })
    }

    /// Administrative batch transition (block, maintenance, reopen).
    ///
    /// Seats that are currently held or sold are skipped, not stomped;
    /// the returned list contains the ids that actually changed. Each
    /// seat moves in its own atomic step, so a failure partway leaves
    /// previously processed seats valid.
    ///
    /// # Errors
    ///
    /// Returns [`HoldError::Store`] if a store failure survives the
    /// bounded retry; seats processed before the failure stay changed.
    pub async fn bulk_set_status(
        &self,
        seat_ids: &[SeatId],
        status: SeatStatus,
    ) -> Result<Vec<SeatId>, HoldError> {
        let mut changed = Vec::new();
        for &seat_id in seat_ids {
            let Some(seat) = retry_transient(&self.retry, || self.seats.get(seat_id)).await? else {
                tracing::warn!(seat_id = %seat_id, "bulk status change skipped missing seat");
                continue;
            };
            if seat.status.is_held() || seat.status == SeatStatus::Sold || seat.status == status {
                continue;
            }

            let mut updated = seat.clone();
            updated.status = status;
            debug_assert!(updated.hold_state_consistent());

            if let Some(stored) = self.write(updated, seat.version).await? {
                self.publish_status(&stored).await;
                changed.push(seat_id);
            }
            // A mismatch here means an operator or claimant got there
            // first; skip rather than loop.
        }
        tracing::info!(
            requested = seat_ids.len(),
            changed = changed.len(),
            status = %status,
            "bulk status change applied"
        );
        Ok(changed)
    }

    /// Recompute the denormalized availability counts for a venue.
    ///
    /// # Errors
    ///
    /// - [`HoldError::VenueNotFound`] - the venue has no seats
    /// - [`HoldError::Store`] - store failure after bounded retry
    pub async fn availability_snapshot(
        &self,
        venue_id: VenueId,
    ) -> Result<AvailabilitySnapshot, HoldError> {
        let counts = retry_transient(&self.retry, || self.seats.count_by_status(venue_id)).await?;
        if counts.total() == 0 {
            return Err(HoldError::VenueNotFound(venue_id));
        }
        Ok(AvailabilitySnapshot {
            venue_id,
            counts,
            taken_at: self.clock.now(),
        })
    }

    /// Version-checked write with transient retry.
    ///
    /// `Ok(None)` means the version no longer matched and the caller
    /// should re-read; a vanished record surfaces as `SeatNotFound`.
    async fn write(&self, seat: Seat, expected_version: u64) -> Result<Option<Seat>, HoldError> {
        let seat_id = seat.id;
        let outcome = retry_transient(&self.retry, || {
            self.seats.update(seat.clone(), expected_version)
        })
        .await?;
        match outcome {
            UpdateOutcome::Applied(stored) => Ok(Some(stored)),
            UpdateOutcome::VersionMismatch => Ok(None),
            UpdateOutcome::Missing => Err(HoldError::SeatNotFound(seat_id)),
        }
    }

    /// Fire-and-forget status broadcast; failures are logged, never
    /// propagated into the claim path.
    async fn publish_status(&self, seat: &Seat) {
        let event = SeatEvent::SeatStatusChanged {
            seat_id: seat.id,
            status: seat.status,
        };
        if let Err(err) = self.notifier.publish(seat.venue_id, event).await {
            tracing::warn!(seat_id = %seat.id, error = %err, "seat status publish failed");
        }
    }
}
