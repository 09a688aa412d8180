//! Seat hold/reservation engine for a ticketing backend.
//!
//! The engine keeps seat state and time-bounded holds consistent under
//! concurrent claim attempts. It is a library, not a service: the
//! embedding process supplies storage, a notification transport, and a
//! clock through the `seathold-core` trait seams and drives the
//! components directly.
//!
//! # Components
//!
//! - [`registry::SeatRegistry`] - the single point of mutual exclusion;
//!   every seat transition is an optimistic version-checked write.
//! - [`ledger::ReservationLedger`] - paired (reservation, seat)
//!   transitions: create, extend, cancel, complete, expire.
//! - [`finder::SeatFinder`] - preference filtering and adjacent-block
//!   search, read-only.
//! - [`scheduler::LeaseScheduler`] - the periodic sweep reclaiming
//!   overdue holds, plus the batch release queue.
//! - [`group::GroupBookingCoordinator`] - multi-seat requests fulfilled
//!   incrementally over the finder and the ledger.
//! - [`lifecycle::Engine`] - wires the above and owns the background
//!   tasks.
//!
//! # Concurrency model
//!
//! One technique throughout: optimistic concurrency on a per-record
//! `version`, with bounded compare-and-swap loops in the components and
//! bounded retry of transient store failures underneath. Conflicts are
//! returned to the caller immediately as [`HoldError::SeatUnavailable`]
//! rather than queued or waited out.
//!
//! [`HoldError::SeatUnavailable`]: seathold_core::error::HoldError::SeatUnavailable

pub mod config;
pub mod finder;
pub mod group;
pub mod ledger;
pub mod lifecycle;
pub mod registry;
pub mod retry;
pub mod scheduler;

pub use config::{EngineConfig, PostgresConfig};
pub use finder::SeatFinder;
pub use group::{GroupBookingCoordinator, GroupBookingOutcome};
pub use ledger::ReservationLedger;
pub use lifecycle::Engine;
pub use registry::SeatRegistry;
pub use retry::{retry_transient, RetryPolicy};
pub use scheduler::{LeaseScheduler, ReleaseQueue, SweepReport};
