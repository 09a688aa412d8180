//! Error taxonomy for the reservation engine.
//!
//! Two layers:
//!
//! - [`StoreError`] - what a persistence implementation can report.
//!   Transient failures (lock timeouts, deadlocks) are retried by the
//!   engine a bounded number of times before surfacing.
//! - [`HoldError`] - the engine's caller-facing taxonomy. Conflicts are
//!   returned immediately (no blocking wait) so a UI can offer an
//!   alternative seat; expiry is a distinct variant so a UI can prompt
//!   re-selection instead of a generic retry.

use crate::types::{
    GroupRequestId, GroupStatus, ReservationId, ReservationStatus, SeatId, SeatStatus, VenueId,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors reported by store implementations.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Lock timeout, deadlock, serialization failure - worth retrying
    #[error("Transient store failure: {0}")]
    Transient(String),

    /// Connection-level failure
    #[error("Store connection failed: {0}")]
    Connection(String),

    /// The store returned data the engine cannot interpret
    #[error("Corrupted store state: {0}")]
    Corrupted(String),
}

impl StoreError {
    /// Whether the engine's retry policy should retry this failure.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Caller-facing errors for claim / release / extend / complete paths.
#[derive(Error, Debug, Clone)]
pub enum HoldError {
    /// Seat does not exist
    #[error("Seat not found: {0}")]
    SeatNotFound(SeatId),

    /// Reservation does not exist
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// Venue does not exist or has no seats
    #[error("Venue not found: {0}")]
    VenueNotFound(VenueId),

    /// Seat is not in a claimable state; caller may retry with a
    /// different seat
    #[error("Seat {seat_id} is not claimable (status: {status})")]
    SeatUnavailable {
        /// The contested seat
        seat_id: SeatId,
        /// Status observed at the point of conflict
        status: SeatStatus,
    },

    /// Extension cap reached; the hold cannot be prolonged further
    #[error("Reservation {reservation_id} has reached the extension limit ({max})")]
    ExtensionLimit {
        /// The capped reservation
        reservation_id: ReservationId,
        /// Maximum number of extensions allowed
        max: u32,
    },

    /// The reservation's TTL has passed; distinct from a generic
    /// conflict so callers can prompt re-selection
    #[error("Reservation {reservation_id} expired at {expired_at}")]
    ReservationExpired {
        /// The lapsed reservation
        reservation_id: ReservationId,
        /// When the lease ran out
        expired_at: DateTime<Utc>,
    },

    /// The reservation has already been cancelled or completed
    #[error("Reservation {reservation_id} is not active (status: {status})")]
    ReservationNotActive {
        /// The contested reservation
        reservation_id: ReservationId,
        /// Its terminal status
        status: ReservationStatus,
    },

    /// The reservation is owned by a different claimant
    #[error("Reservation {reservation_id} is not owned by the caller")]
    NotOwner {
        /// The contested reservation
        reservation_id: ReservationId,
    },

    /// Group request not found
    #[error("Group request not found: {0}")]
    GroupNotFound(GroupRequestId),

    /// Group request is no longer open for changes
    #[error("Group request {request_id} is closed (status: {status:?})")]
    GroupClosed {
        /// The closed request
        request_id: GroupRequestId,
        /// Status that makes it closed
        status: GroupStatus,
    },

    /// The release queue is shut down
    #[error("Release queue is closed")]
    ReleaseQueueClosed,

    /// Store failure that survived the bounded internal retry
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HoldError {
    /// Whether this error is a conflict the caller can resolve by
    /// picking a different seat or backing off.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::SeatUnavailable { .. }
                | Self::ExtensionLimit { .. }
                | Self::ReservationNotActive { .. }
        )
    }
}
