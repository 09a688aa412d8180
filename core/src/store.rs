//! Persistence traits for seats and reservations.
//!
//! # Design
//!
//! The engine guards every seat-status transition with optimistic
//! concurrency: a caller reads a record, mutates a copy, and writes it
//! back conditioned on the version it read. The store applies the write
//! only if the stored version still matches, bumping the version as part
//! of the same atomic operation. A stale write reports
//! [`UpdateOutcome::VersionMismatch`] and the caller re-reads.
//!
//! This is the compare-and-swap half of the contract in the deployment
//! notes; a `SELECT ... FOR UPDATE` implementation is equally valid as
//! long as check-and-update is atomic, but the trait is expressed in CAS
//! terms because both the in-memory and the `PostgreSQL` store implement
//! it that way (single conditional `UPDATE`).
//!
//! # Dyn compatibility
//!
//! Methods return [`BoxFuture`] instead of `async fn` so the traits can
//! be used as `Arc<dyn SeatStore>` trait objects across the engine.

use crate::error::StoreError;
use crate::types::{
    ClaimantId, Reservation, ReservationId, Seat, SeatId, StatusCounts, VenueId,
};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

/// Result of a conditional (version-checked) update.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateOutcome<T> {
    /// The write was applied; carries the stored record with its new version
    Applied(T),
    /// The stored version no longer matches; caller must re-read
    VersionMismatch,
    /// The record does not exist
    Missing,
}

/// Storage for canonical seat state.
///
/// Implementations must be `Send + Sync`; the engine shares one store
/// across many concurrent claim paths and multiple server instances may
/// point at the same backing store.
pub trait SeatStore: Send + Sync {
    /// Fetch one seat by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    fn get(&self, seat_id: SeatId) -> BoxFuture<'_, Result<Option<Seat>, StoreError>>;

    /// All seats of a venue, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    fn seats_in_venue(&self, venue_id: VenueId)
        -> BoxFuture<'_, Result<Vec<Seat>, StoreError>>;

    /// Insert a new seat. The stored version starts at the seat's
    /// `version` field (0 for freshly created seats).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn insert(&self, seat: Seat) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Conditionally replace a seat.
    ///
    /// Applies `seat` (with its version bumped by one) only if the
    /// stored version equals `expected_version`. The check and the
    /// write are one atomic step.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails; version mismatches
    /// are reported through the outcome, not as errors.
    fn update(
        &self,
        seat: Seat,
        expected_version: u64,
    ) -> BoxFuture<'_, Result<UpdateOutcome<Seat>, StoreError>>;

    /// Seat counts by status for one venue (availability read-model).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    fn count_by_status(
        &self,
        venue_id: VenueId,
    ) -> BoxFuture<'_, Result<StatusCounts, StoreError>>;
}

/// Storage for reservation (hold) records.
///
/// Records are never deleted; status transitions are version-checked so
/// racing writers (manual release vs sweep) commute.
pub trait ReservationStore: Send + Sync {
    /// Fetch one reservation by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    fn get(
        &self,
        reservation_id: ReservationId,
    ) -> BoxFuture<'_, Result<Option<Reservation>, StoreError>>;

    /// Append a new reservation record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn insert(&self, reservation: Reservation) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Conditionally replace a reservation, semantics as
    /// [`SeatStore::update`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn update(
        &self,
        reservation: Reservation,
        expected_version: u64,
    ) -> BoxFuture<'_, Result<UpdateOutcome<Reservation>, StoreError>>;

    /// Active reservations whose `expires_at` is strictly before `now`,
    /// oldest first, at most `limit` records. The sweep's work queue.
    ///
    /// Administrative holds are excluded: the sweep never reclaims
    /// them, so listing them would let a lapsed operator hold occupy a
    /// batch slot on every cycle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    fn expired_active(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Reservation>, StoreError>>;

    /// All active reservations owned by `claimant`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    fn active_by_claimant(
        &self,
        claimant: &ClaimantId,
    ) -> BoxFuture<'_, Result<Vec<Reservation>, StoreError>>;

    /// The active reservation holding `seat_id`, if any. The engine
    /// guarantees at most one exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    fn active_by_seat(
        &self,
        seat_id: SeatId,
    ) -> BoxFuture<'_, Result<Option<Reservation>, StoreError>>;

    /// Active reservations expiring in `[from, to)`, used for expiry
    /// warnings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    fn expiring_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<Reservation>, StoreError>>;
}
