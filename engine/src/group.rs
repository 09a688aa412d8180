//! Group booking coordination: multi-seat requests fulfilled
//! incrementally.
//!
//! A group request owns nothing directly; every confirmed seat is an
//! ordinary reservation carrying a `group_ref` back to the request, so
//! the sweep and the release paths treat group holds like any other.
//! Requests live in memory behind a `tokio::sync::Mutex`, created at
//! engine startup with the rest of the components.

use crate::config::EngineConfig;
use crate::finder::SeatFinder;
use crate::ledger::ReservationLedger;
use chrono::{DateTime, Duration, Utc};
use seathold_core::environment::Clock;
use seathold_core::error::HoldError;
use seathold_core::notify::{NotificationChannel, SeatEvent};
use seathold_core::types::{
    ClaimantId, GroupBookingRequest, GroupPolicy, GroupRequestId, GroupStatus, Money,
    ReservationKind, SeatId, SeatPreferences, VenueId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Discount applied to a group, as a percentage of the gross total.
#[must_use]
pub const fn discount_percent(confirmed: usize) -> u64 {
    match confirmed {
        n if n >= 20 => 15,
        n if n >= 10 => 10,
        n if n >= 5 => 5,
        _ => 0,
    }
}

/// Caller-facing snapshot of a group request after an operation.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupBookingOutcome {
    /// The request this outcome describes
    pub request_id: GroupRequestId,
    /// Fulfillment state after the operation
    pub status: GroupStatus,
    /// Seats confirmed so far, with the reservation holding each
    pub confirmed: Vec<(SeatId, seathold_core::types::ReservationId)>,
    /// Confirmed as a percentage of requested
    pub fulfillment_rate: u32,
    /// Sum of reserved prices after discount
    pub total_price: Money,
    /// Discount currently applied
    pub discount: Money,
}

impl From<&GroupBookingRequest> for GroupBookingOutcome {
    fn from(request: &GroupBookingRequest) -> Self {
        Self {
            request_id: request.id,
            status: request.status,
            confirmed: request.confirmed.clone(),
            fulfillment_rate: request.fulfillment_rate(),
            total_price: request.total_price,
            discount: request.discount,
        }
    }
}

/// Coordinates multi-seat requests over the finder and the ledger.
pub struct GroupBookingCoordinator {
    finder: Arc<SeatFinder>,
    ledger: Arc<ReservationLedger>,
    notifier: Arc<dyn NotificationChannel>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
    requests: Mutex<HashMap<GroupRequestId, GroupBookingRequest>>,
}

impl GroupBookingCoordinator {
    /// Creates a coordinator with no open requests.
    #[must_use]
    pub fn new(
        finder: Arc<SeatFinder>,
        ledger: Arc<ReservationLedger>,
        notifier: Arc<dyn NotificationChannel>,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            finder,
            ledger,
            notifier,
            clock,
            config,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Open a request and claim as many matching seats as possible.
    ///
    /// Each candidate seat is claimed independently: losing a race on
    /// one seat never fails the request, it just lowers the tally. The
    /// outcome's status reflects what was actually confirmed
    /// (Pending / Partial / Confirmed).
    ///
    /// # Errors
    ///
    /// Returns a surfaced store failure from the candidate search.
    pub async fn create_request(
        &self,
        venue_id: VenueId,
        claimant: &ClaimantId,
        quantity: u32,
        policy: GroupPolicy,
        prefs: SeatPreferences,
        ttl: Option<Duration>,
    ) -> Result<GroupBookingOutcome, HoldError> {
        let ttl = ttl.unwrap_or_else(|| self.config.group_request_ttl());
        let now = self.clock.now();

        let mut request = GroupBookingRequest {
            id: GroupRequestId::new(),
            venue_id,
            claimant: claimant.clone(),
            requested: quantity,
            policy,
            prefs,
            status: GroupStatus::Pending,
            confirmed: Vec::new(),
            expires_at: now + ttl,
            total_price: Money::default(),
            discount: Money::default(),
            created_at: now,
        };

        let candidates = self
            .finder
            .find_best_group(venue_id, quantity, policy, &request.prefs)
            .await?;
        self.claim_candidates(&mut request, candidates).await;
        self.refresh_pricing(&mut request).await;
        self.refresh_status(&mut request);

        tracing::info!(
            request_id = %request.id,
            venue_id = %venue_id,
            requested = quantity,
            confirmed = request.confirmed.len(),
            status = ?request.status,
            "group request created"
        );
        self.publish_update(&request).await;

        let outcome = GroupBookingOutcome::from(&request);
        self.requests.lock().await.insert(request.id, request);
        Ok(outcome)
    }

    /// Claim up to `quantity` more seats for an open request.
    ///
    /// A partial request becomes Confirmed once the tally reaches the
    /// requested count; pricing is recomputed either way. The claim is
    /// capped at the remaining `requested - confirmed` count, so a
    /// request never holds more seats than it asked for.
    ///
    /// # Errors
    ///
    /// - [`HoldError::GroupNotFound`] - no such request
    /// - [`HoldError::GroupClosed`] - request cancelled, lapsed, or
    ///   already fully confirmed
    /// - [`HoldError::Store`] - store failure from the candidate search
    pub async fn add_seats(
        &self,
        request_id: GroupRequestId,
        quantity: u32,
    ) -> Result<GroupBookingOutcome, HoldError> {
        let mut requests = self.requests.lock().await;
        let request = requests
            .get_mut(&request_id)
            .ok_or(HoldError::GroupNotFound(request_id))?;
        self.ensure_open(request)?;
        if request.status == GroupStatus::Confirmed {
            return Err(HoldError::GroupClosed {
                request_id,
                status: request.status,
            });
        }

        let confirmed = u32::try_from(request.confirmed.len()).unwrap_or(u32::MAX);
        let wanted = quantity.min(request.requested.saturating_sub(confirmed));

        let candidates = self
            .finder
            .find_best_group(request.venue_id, wanted, request.policy, &request.prefs)
            .await?;
        let mut request_copy = request.clone();
        self.claim_candidates(&mut request_copy, candidates).await;
        self.refresh_pricing(&mut request_copy).await;
        self.refresh_status(&mut request_copy);
        *request = request_copy;

        tracing::info!(
            request_id = %request_id,
            confirmed = request.confirmed.len(),
            requested = request.requested,
            status = ?request.status,
            "group request grew"
        );
        self.publish_update(request).await;
        Ok(GroupBookingOutcome::from(&*request))
    }

    /// Drop one confirmed seat from a request, cancelling its hold.
    ///
    /// May regress a Confirmed request back to Partial; pricing is
    /// recomputed.
    ///
    /// # Errors
    ///
    /// - [`HoldError::GroupNotFound`] - no such request
    /// - [`HoldError::GroupClosed`] - request cancelled or lapsed
    /// - [`HoldError::SeatNotFound`] - seat is not part of the request
    pub async fn remove_seat(
        &self,
        request_id: GroupRequestId,
        seat_id: SeatId,
    ) -> Result<GroupBookingOutcome, HoldError> {
        let mut requests = self.requests.lock().await;
        let request = requests
            .get_mut(&request_id)
            .ok_or(HoldError::GroupNotFound(request_id))?;
        self.ensure_open(request)?;

        let index = request
            .confirmed
            .iter()
            .position(|(s, _)| *s == seat_id)
            .ok_or(HoldError::SeatNotFound(seat_id))?;
        let (_, reservation_id) = request.confirmed.remove(index);

        if let Err(err) = self
            .ledger
            .cancel(reservation_id, "removed from group request")
            .await
        {
            tracing::warn!(
                request_id = %request_id,
                reservation_id = %reservation_id,
                error = %err,
                "group seat removal could not cancel reservation"
            );
        }

        let mut request_copy = request.clone();
        self.refresh_pricing(&mut request_copy).await;
        self.refresh_status(&mut request_copy);
        *request = request_copy;

        self.publish_update(request).await;
        Ok(GroupBookingOutcome::from(&*request))
    }

    /// Cancel a request and release every hold it produced.
    ///
    /// Idempotent: cancelling an already-cancelled request returns its
    /// final state unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`HoldError::GroupNotFound`] for an unknown request.
    pub async fn cancel(
        &self,
        request_id: GroupRequestId,
    ) -> Result<GroupBookingOutcome, HoldError> {
        let mut requests = self.requests.lock().await;
        let request = requests
            .get_mut(&request_id)
            .ok_or(HoldError::GroupNotFound(request_id))?;
        if request.status == GroupStatus::Cancelled {
            return Ok(GroupBookingOutcome::from(&*request));
        }

        let mut request_copy = request.clone();
        self.close_request(&mut request_copy, "group request cancelled")
            .await;
        *request = request_copy;

        self.publish_update(request).await;
        Ok(GroupBookingOutcome::from(&*request))
    }

    /// Current state of a request.
    ///
    /// # Errors
    ///
    /// Returns [`HoldError::GroupNotFound`] for an unknown request.
    pub async fn get(&self, request_id: GroupRequestId) -> Result<GroupBookingOutcome, HoldError> {
        let requests = self.requests.lock().await;
        requests
            .get(&request_id)
            .map(GroupBookingOutcome::from)
            .ok_or(HoldError::GroupNotFound(request_id))
    }

    /// Sweep hook: cancel every open request whose `expires_at` has
    /// passed. Returns the number of requests closed.
    pub async fn expire_requests(&self, now: DateTime<Utc>) -> usize {
        let mut requests = self.requests.lock().await;
        let lapsed: Vec<GroupRequestId> = requests
            .values()
            .filter(|r| r.status != GroupStatus::Cancelled && r.expires_at <= now)
            .map(|r| r.id)
            .collect();

        for id in &lapsed {
            if let Some(request) = requests.get_mut(id) {
                let mut request_copy = request.clone();
                self.close_request(&mut request_copy, "group request expired")
                    .await;
                *request = request_copy;
                tracing::info!(request_id = %id, "group request expired");
                self.publish_update(request).await;
            }
        }
        lapsed.len()
    }

    fn ensure_open(&self, request: &GroupBookingRequest) -> Result<(), HoldError> {
        if request.status == GroupStatus::Cancelled {
            return Err(HoldError::GroupClosed {
                request_id: request.id,
                status: request.status,
            });
        }
        if self.clock.now() >= request.expires_at {
            return Err(HoldError::GroupClosed {
                request_id: request.id,
                status: request.status,
            });
        }
        Ok(())
    }

    /// Claim each candidate independently; conflicts are logged, not
    /// surfaced.
    async fn claim_candidates(
        &self,
        request: &mut GroupBookingRequest,
        candidates: Vec<seathold_core::types::Seat>,
    ) {
        for seat in candidates {
            if (request.confirmed.len() as u64) >= u64::from(request.requested) {
                break;
            }
            if request.confirmed.iter().any(|(s, _)| *s == seat.id) {
                continue;
            }
            match self
                .ledger
                .create(
                    seat.id,
                    &request.claimant,
                    ReservationKind::Group,
                    None,
                    Some(request.id),
                )
                .await
            {
                Ok(reservation) => request.confirmed.push((seat.id, reservation.id)),
                Err(err) if err.is_conflict() => {
                    tracing::debug!(
                        request_id = %request.id,
                        seat_id = %seat.id,
                        "group candidate lost race, continuing"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        request_id = %request.id,
                        seat_id = %seat.id,
                        error = %err,
                        "group candidate claim failed"
                    );
                }
            }
        }
    }

    /// Recompute gross / discount / total from the confirmed holds.
    async fn refresh_pricing(&self, request: &mut GroupBookingRequest) {
        let mut gross = Money::default();
        for (_, reservation_id) in &request.confirmed {
            match self.ledger.get(*reservation_id).await {
                Ok(reservation) => gross = gross.saturating_add(reservation.reserved_price),
                Err(err) => {
                    tracing::warn!(
                        request_id = %request.id,
                        reservation_id = %reservation_id,
                        error = %err,
                        "group pricing could not read reservation"
                    );
                }
            }
        }
        let discount = gross.percent(discount_percent(request.confirmed.len()));
        request.discount = discount;
        request.total_price = gross.saturating_sub(discount);
    }

    fn refresh_status(&self, request: &mut GroupBookingRequest) {
        request.status = if request.confirmed.is_empty() {
            GroupStatus::Pending
        } else if (request.confirmed.len() as u64) < u64::from(request.requested) {
            GroupStatus::Partial
        } else {
            GroupStatus::Confirmed
        };
    }

    /// Cancel every remaining hold and mark the request Cancelled.
    async fn close_request(&self, request: &mut GroupBookingRequest, reason: &str) {
        for (seat_id, reservation_id) in &request.confirmed {
            if let Err(err) = self.ledger.cancel(*reservation_id, reason).await {
                tracing::warn!(
                    request_id = %request.id,
                    seat_id = %seat_id,
                    reservation_id = %reservation_id,
                    error = %err,
                    "group close could not cancel reservation"
                );
            }
        }
        request.status = GroupStatus::Cancelled;
    }

    async fn publish_update(&self, request: &GroupBookingRequest) {
        #[allow(clippy::cast_possible_truncation)]
        let event = SeatEvent::GroupBookingUpdated {
            request_id: request.id,
            status: request.status,
            confirmed: request.confirmed.len() as u32,
            requested: request.requested,
        };
        if let Err(err) = self.notifier.publish(request.venue_id, event).await {
            tracing::warn!(request_id = %request.id, error = %err, "group update publish failed");
        }
    }
}
