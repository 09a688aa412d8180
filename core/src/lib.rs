//! # Seathold Core
//!
//! Domain types and collaborator traits for the seathold reservation
//! engine: the vocabulary (seats, reservations, group requests), the
//! error taxonomy, and the trait seams behind which persistence, time,
//! and notification transports live.
//!
//! This crate performs no I/O. Implementations of the traits are
//! provided by `seathold-postgres` (production) and `seathold-testing`
//! (in-memory, deterministic).
//!
//! ## Central invariant
//!
//! At most one active reservation exists per seat at any time. The
//! engine enforces it through a single point of mutual exclusion - the
//! seat registry's claim operation - built on the version-checked
//! updates of [`store::SeatStore`].

pub mod error;
pub mod notify;
pub mod store;
pub mod types;

/// Environment abstractions for dependency injection.
///
/// External dependencies that vary between production and tests are
/// abstracted behind traits and handed to the engine as `Arc<dyn _>`.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Production code uses [`SystemClock`]; tests use a fixed or
    /// manually advanced clock so lease expiry is deterministic.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// [`Clock`] backed by the system clock.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

pub use chrono::{DateTime, Utc};
pub use error::{HoldError, StoreError};
pub use notify::{NotificationChannel, NotifyError, SeatEvent};
pub use store::{ReservationStore, SeatStore, UpdateOutcome};
pub use types::{
    AvailabilitySnapshot, ClaimantId, GroupBookingRequest, GroupPolicy, GroupRequestId,
    GroupStatus, Money, Reservation, ReservationId, ReservationKind, ReservationStatus, Seat,
    SeatId, SeatPosition, SeatPreferences, SeatStatus, StatusCounts, VenueId,
};
