//! # Seathold Testing
//!
//! Testing utilities for the seathold reservation engine:
//!
//! - In-memory implementations of the store traits with *real*
//!   version checking, so concurrency tests exercise the same CAS
//!   semantics as the production store
//! - Deterministic clocks
//! - A recording notification channel
//! - Venue seeding helpers

pub mod mocks {
    //! Mock implementations of the engine's collaborator traits.

    use chrono::{DateTime, Duration, Utc};
    use futures::future::BoxFuture;
    use seathold_core::environment::Clock;
    use seathold_core::error::StoreError;
    use seathold_core::notify::{NotificationChannel, NotifyError, SeatEvent};
    use seathold_core::store::{ReservationStore, SeatStore, UpdateOutcome};
    use seathold_core::types::{
        ClaimantId, Reservation, ReservationId, ReservationKind, ReservationStatus, Seat, SeatId,
        StatusCounts, VenueId,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, MutexGuard, PoisonError};

    fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
        m.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fixed clock for deterministic tests.
    ///
    /// Starts at a given instant and only moves when a test calls
    /// [`FixedClock::advance`], making lease expiry reproducible.
    #[derive(Debug)]
    pub struct FixedClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl FixedClock {
        /// Create a clock pinned to `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: Duration) {
            let mut t = lock(&self.time);
            *t += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *lock(&self.time)
        }
    }

    /// Create a fixed clock at 2025-01-01 00:00:00 UTC.
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which should
    /// never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// In-memory [`SeatStore`] with version-checked updates.
    ///
    /// The mutex makes check-and-write atomic, so N tasks racing on
    /// `update` observe exactly the lost-update protection the engine
    /// relies on. `fail_next_updates` injects transient failures to
    /// exercise the retry path.
    #[derive(Default)]
    pub struct MemorySeatStore {
        seats: Mutex<HashMap<SeatId, Seat>>,
        transient_failures: AtomicUsize,
    }

    impl MemorySeatStore {
        /// Create an empty store
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `n` update calls fail with
        /// [`StoreError::Transient`] before touching state.
        pub fn fail_next_updates(&self, n: usize) {
            self.transient_failures.store(n, Ordering::SeqCst);
        }

        fn take_injected_failure(&self) -> bool {
            self.transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    impl SeatStore for MemorySeatStore {
        fn get(&self, seat_id: SeatId) -> BoxFuture<'_, Result<Option<Seat>, StoreError>> {
            Box::pin(async move { Ok(lock(&self.seats).get(&seat_id).cloned()) })
        }

        fn seats_in_venue(
            &self,
            venue_id: VenueId,
        ) -> BoxFuture<'_, Result<Vec<Seat>, StoreError>> {
            Box::pin(async move {
                Ok(lock(&self.seats)
                    .values()
                    .filter(|s| s.venue_id == venue_id)
                    .cloned()
                    .collect())
            })
        }

        fn insert(&self, seat: Seat) -> BoxFuture<'_, Result<(), StoreError>> {
            Box::pin(async move {
                lock(&self.seats).insert(seat.id, seat);
                Ok(())
            })
        }

        fn update(
            &self,
            mut seat: Seat,
            expected_version: u64,
        ) -> BoxFuture<'_, Result<UpdateOutcome<Seat>, StoreError>> {
            Box::pin(async move {
                if self.take_injected_failure() {
                    return Err(StoreError::Transient("injected failure".to_string()));
                }
                let mut seats = lock(&self.seats);
                let Some(stored) = seats.get_mut(&seat.id) else {
                    return Ok(UpdateOutcome::Missing);
                };
                if stored.version != expected_version {
                    return Ok(UpdateOutcome::VersionMismatch);
                }
                seat.version = expected_version + 1;
                *stored = seat.clone();
                Ok(UpdateOutcome::Applied(seat))
            })
        }

        fn count_by_status(
            &self,
            venue_id: VenueId,
        ) -> BoxFuture<'_, Result<StatusCounts, StoreError>> {
            Box::pin(async move {
                let mut counts = StatusCounts::default();
                for seat in lock(&self.seats).values() {
                    if seat.venue_id == venue_id {
                        counts.record(seat.status);
                    }
                }
                Ok(counts)
            })
        }
    }

    /// In-memory [`ReservationStore`] with version-checked updates.
    #[derive(Default)]
    pub struct MemoryReservationStore {
        reservations: Mutex<HashMap<ReservationId, Reservation>>,
    }

    impl MemoryReservationStore {
        /// Create an empty store
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of records ever written (audit trail length)
        #[must_use]
        pub fn len(&self) -> usize {
            lock(&self.reservations).len()
        }

        /// Whether the ledger holds no records
        #[must_use]
        pub fn is_empty(&self) -> bool {
            lock(&self.reservations).is_empty()
        }
    }

    impl ReservationStore for MemoryReservationStore {
        fn get(
            &self,
            reservation_id: ReservationId,
        ) -> BoxFuture<'_, Result<Option<Reservation>, StoreError>> {
            Box::pin(async move { Ok(lock(&self.reservations).get(&reservation_id).cloned()) })
        }

        fn insert(&self, reservation: Reservation) -> BoxFuture<'_, Result<(), StoreError>> {
            Box::pin(async move {
                lock(&self.reservations).insert(reservation.id, reservation);
                Ok(())
            })
        }

        fn update(
            &self,
            mut reservation: Reservation,
            expected_version: u64,
        ) -> BoxFuture<'_, Result<UpdateOutcome<Reservation>, StoreError>> {
            Box::pin(async move {
                let mut map = lock(&self.reservations);
                let Some(stored) = map.get_mut(&reservation.id) else {
                    return Ok(UpdateOutcome::Missing);
                };
                if stored.version != expected_version {
                    return Ok(UpdateOutcome::VersionMismatch);
                }
                reservation.version = expected_version + 1;
                *stored = reservation.clone();
                Ok(UpdateOutcome::Applied(reservation))
            })
        }

        fn expired_active(
            &self,
            now: DateTime<Utc>,
            limit: usize,
        ) -> BoxFuture<'_, Result<Vec<Reservation>, StoreError>> {
            Box::pin(async move {
                let mut expired: Vec<Reservation> = lock(&self.reservations)
                    .values()
                    .filter(|r| {
                        r.status == ReservationStatus::Active
                            && r.kind != ReservationKind::AdministrativeHold
                            && r.expires_at < now
                    })
                    .cloned()
                    .collect();
                expired.sort_by_key(|r| r.expires_at);
                expired.truncate(limit);
                Ok(expired)
            })
        }

        fn active_by_claimant(
            &self,
            claimant: &ClaimantId,
        ) -> BoxFuture<'_, Result<Vec<Reservation>, StoreError>> {
            let claimant = claimant.clone();
            Box::pin(async move {
                Ok(lock(&self.reservations)
                    .values()
                    .filter(|r| r.status == ReservationStatus::Active && r.claimant == claimant)
                    .cloned()
                    .collect())
            })
        }

        fn active_by_seat(
            &self,
            seat_id: SeatId,
        ) -> BoxFuture<'_, Result<Option<Reservation>, StoreError>> {
            Box::pin(async move {
                Ok(lock(&self.reservations)
                    .values()
                    .find(|r| r.status == ReservationStatus::Active && r.seat_id == seat_id)
                    .cloned())
            })
        }

        fn expiring_between(
            &self,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> BoxFuture<'_, Result<Vec<Reservation>, StoreError>> {
            Box::pin(async move {
                Ok(lock(&self.reservations)
                    .values()
                    .filter(|r| {
                        r.status == ReservationStatus::Active
                            && r.expires_at >= from
                            && r.expires_at < to
                    })
                    .cloned()
                    .collect())
            })
        }
    }

    /// [`NotificationChannel`] that records every published event.
    #[derive(Default)]
    pub struct RecordingChannel {
        events: Mutex<Vec<(VenueId, SeatEvent)>>,
    }

    impl RecordingChannel {
        /// Create an empty channel
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Snapshot of everything published so far
        #[must_use]
        pub fn events(&self) -> Vec<(VenueId, SeatEvent)> {
            lock(&self.events).clone()
        }

        /// Events matching a predicate
        #[must_use]
        pub fn events_where<F>(&self, mut pred: F) -> Vec<SeatEvent>
        where
            F: FnMut(&SeatEvent) -> bool,
        {
            lock(&self.events)
                .iter()
                .filter(|(_, e)| pred(e))
                .map(|(_, e)| e.clone())
                .collect()
        }
    }

    impl NotificationChannel for RecordingChannel {
        fn publish(
            &self,
            venue_id: VenueId,
            event: SeatEvent,
        ) -> BoxFuture<'_, Result<(), NotifyError>> {
            Box::pin(async move {
                lock(&self.events).push((venue_id, event));
                Ok(())
            })
        }
    }
}

pub mod helpers {
    //! Venue seeding helpers for tests.

    use seathold_core::store::SeatStore;
    use seathold_core::types::{Money, Seat, SeatId, SeatPosition, VenueId};

    /// Seed one row of seats with consecutive numbers.
    ///
    /// Returns the created seat ids in seat-number order.
    ///
    /// # Panics
    ///
    /// Panics if the store rejects an insert (never happens with the
    /// in-memory store).
    #[allow(clippy::expect_used)]
    pub async fn seed_row(
        store: &dyn SeatStore,
        venue_id: VenueId,
        section: &str,
        row: &str,
        numbers: std::ops::RangeInclusive<u32>,
        price: Money,
    ) -> Vec<SeatId> {
        let mut ids = Vec::new();
        for number in numbers {
            let seat = Seat::new(
                venue_id,
                SeatPosition {
                    section: section.to_string(),
                    row: row.to_string(),
                    number,
                },
                price,
            );
            ids.push(seat.id);
            store
                .insert(seat)
                .await
                .expect("in-memory insert cannot fail");
        }
        ids
    }
}

pub use mocks::{
    test_clock, FixedClock, MemoryReservationStore, MemorySeatStore, RecordingChannel,
};
