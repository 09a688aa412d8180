//! Notification channel abstraction.
//!
//! Seat-status changes are pushed to connected viewers through a
//! broadcast channel the engine does not own. Delivery is fire-and-forget
//! with at-most-once semantics: viewers poll and reconcile state
//! independently, so a dropped event is tolerable and publish failures
//! are logged by callers, never propagated into claim paths.

use crate::types::{
    GroupRequestId, GroupStatus, ReservationId, SeatId, SeatStatus, VenueId,
};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from a notification channel implementation.
#[derive(Error, Debug, Clone)]
pub enum NotifyError {
    /// The channel rejected or dropped the event
    #[error("Publish failed for venue {venue_id}: {reason}")]
    PublishFailed {
        /// Venue topic that failed
        venue_id: VenueId,
        /// Why the publish failed
        reason: String,
    },
}

/// Events broadcast to viewers of a venue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SeatEvent {
    /// A seat moved between statuses
    SeatStatusChanged {
        /// The seat that changed
        seat_id: SeatId,
        /// Its new status
        status: SeatStatus,
    },
    /// A hold is close to its TTL (warning, hold still live)
    ReservationExpiring {
        /// The hold about to lapse
        reservation_id: ReservationId,
        /// Seat kept out of inventory by the hold
        seat_id: SeatId,
        /// When the lease runs out
        expires_at: DateTime<Utc>,
    },
    /// A hold lapsed and its seat returned to inventory
    ReservationExpired {
        /// The reclaimed hold
        reservation_id: ReservationId,
        /// Seat returned to the pool
        seat_id: SeatId,
    },
    /// A group booking request changed state
    GroupBookingUpdated {
        /// The request that changed
        request_id: GroupRequestId,
        /// Its new status
        status: GroupStatus,
        /// Seats confirmed so far
        confirmed: u32,
        /// Seats originally requested
        requested: u32,
    },
}

/// Fire-and-forget broadcast of [`SeatEvent`]s, keyed by venue.
///
/// Implementations must be `Send + Sync`. The engine treats publishing
/// as best-effort: an error is logged at the call site and the
/// triggering operation still succeeds.
pub trait NotificationChannel: Send + Sync {
    /// Publish one event on the venue's topic.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the event could not be handed to the
    /// transport. Callers log and continue.
    fn publish(
        &self,
        venue_id: VenueId,
        event: SeatEvent,
    ) -> BoxFuture<'_, Result<(), NotifyError>>;
}
