//! Shared wiring for the engine integration tests: in-memory stores,
//! a fixed clock, and the full component graph.

#![allow(dead_code)]

use seathold_core::environment::Clock;
use seathold_core::notify::NotificationChannel;
use seathold_core::store::{ReservationStore, SeatStore};
use seathold_core::types::{Money, SeatId, VenueId};
use seathold_engine::{
    EngineConfig, GroupBookingCoordinator, LeaseScheduler, ReservationLedger, SeatFinder,
    SeatRegistry,
};
use seathold_testing::helpers::seed_row;
use seathold_testing::{test_clock, FixedClock, MemoryReservationStore, MemorySeatStore, RecordingChannel};
use std::sync::Arc;

pub struct Harness {
    pub venue: VenueId,
    pub seats: Arc<MemorySeatStore>,
    pub reservations: Arc<MemoryReservationStore>,
    pub channel: Arc<RecordingChannel>,
    pub clock: Arc<FixedClock>,
    pub config: Arc<EngineConfig>,
    pub registry: Arc<SeatRegistry>,
    pub ledger: Arc<ReservationLedger>,
    pub finder: Arc<SeatFinder>,
    pub groups: Arc<GroupBookingCoordinator>,
    pub scheduler: LeaseScheduler,
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn harness() -> Harness {
    harness_with(EngineConfig::default())
}

pub fn harness_with(config: EngineConfig) -> Harness {
    init_tracing();
    let seats = Arc::new(MemorySeatStore::new());
    let reservations = Arc::new(MemoryReservationStore::new());
    let channel = Arc::new(RecordingChannel::new());
    let clock = Arc::new(test_clock());
    let config = Arc::new(config);

    let seats_dyn: Arc<dyn SeatStore> = seats.clone();
    let reservations_dyn: Arc<dyn ReservationStore> = reservations.clone();
    let channel_dyn: Arc<dyn NotificationChannel> = channel.clone();
    let clock_dyn: Arc<dyn Clock> = clock.clone();

    let registry = Arc::new(SeatRegistry::new(
        seats_dyn.clone(),
        channel_dyn.clone(),
        clock_dyn.clone(),
        config.retry_policy(),
    ));
    let ledger = Arc::new(ReservationLedger::new(
        registry.clone(),
        reservations_dyn.clone(),
        channel_dyn.clone(),
        clock_dyn.clone(),
        config.clone(),
    ));
    let finder = Arc::new(SeatFinder::new(seats_dyn, config.retry_policy()));
    let groups = Arc::new(GroupBookingCoordinator::new(
        finder.clone(),
        ledger.clone(),
        channel_dyn.clone(),
        clock_dyn.clone(),
        config.clone(),
    ));
    let scheduler = LeaseScheduler::new(
        ledger.clone(),
        reservations_dyn,
        channel_dyn,
        clock_dyn,
        config.clone(),
    )
    .with_groups(groups.clone());

    Harness {
        venue: VenueId::new(),
        seats,
        reservations,
        channel,
        clock,
        config,
        registry,
        ledger,
        finder,
        groups,
        scheduler,
    }
}

impl Harness {
    /// Seed one row of available seats, returning ids in number order.
    pub async fn seed(
        &self,
        section: &str,
        row: &str,
        numbers: std::ops::RangeInclusive<u32>,
        cents: u64,
    ) -> Vec<SeatId> {
        seed_row(
            self.seats.as_ref(),
            self.venue,
            section,
            row,
            numbers,
            Money::from_cents(cents),
        )
        .await
    }
}
