//! Contention tests over the in-memory stores, which enforce the same
//! version CAS as the production store.

#![allow(clippy::unwrap_used)]

mod common;

use chrono::Duration;
use seathold_core::environment::Clock;
use seathold_core::error::HoldError;
use seathold_core::types::{ClaimantId, ReservationKind, ReservationStatus, SeatStatus};

#[tokio::test]
async fn concurrent_claims_admit_exactly_one_winner() {
    let h = common::harness();
    let seats = h.seed("Orchestra", "A", 1..=1, 4_000).await;
    let seat_id = seats[0];

    let mut handles = Vec::new();
    for i in 0..8 {
        let ledger = h.ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .create(
                    seat_id,
                    &ClaimantId::new(format!("session-{i}")),
                    ReservationKind::Temporary,
                    None,
                    None,
                )
                .await
        }));
    }

    let mut wins = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => wins += 1,
            Err(HoldError::SeatUnavailable { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(wins, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(h.reservations.len(), 1);
    assert_eq!(
        h.registry.get(seat_id).await.unwrap().status,
        SeatStatus::Held
    );
}

#[tokio::test]
async fn concurrent_registry_claims_admit_exactly_one_winner() {
    let h = common::harness();
    let seats = h.seed("Orchestra", "A", 1..=1, 4_000).await;
    let seat_id = seats[0];

    let mut handles = Vec::new();
    for i in 0..16 {
        let registry = h.registry.clone();
        handles.push(tokio::spawn(async move {
            registry
                .try_claim(
                    seat_id,
                    &ClaimantId::new(format!("session-{i}")),
                    Duration::minutes(15),
                    false,
                )
                .await
        }));
    }

    let mut wins = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);
}

#[tokio::test]
async fn sweep_reclaims_overdue_holds_once() {
    let h = common::harness();
    let seats = h.seed("Orchestra", "A", 1..=2, 4_000).await;
    let claimant = ClaimantId::new("session-1");

    let overdue = h
        .ledger
        .create(seats[0], &claimant, ReservationKind::Temporary, None, None)
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(10));
    // This one is younger and still live at sweep time.
    let live = h
        .ledger
        .create(seats[1], &claimant, ReservationKind::Temporary, None, None)
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(6));
    let report = h.scheduler.sweep_once().await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.expired, 1);
    assert_eq!(report.failed, 0);

    assert_eq!(
        h.ledger.get(overdue.id).await.unwrap().status,
        ReservationStatus::Expired
    );
    assert_eq!(
        h.registry.get(seats[0]).await.unwrap().status,
        SeatStatus::Available
    );
    assert!(h.ledger.get(live.id).await.unwrap().is_live(h.clock.now()));

    // A second sweep over the same state is a no-op.
    let report = h.scheduler.sweep_once().await.unwrap();
    assert_eq!(report.scanned, 0);
    assert_eq!(report.expired, 0);
}

#[tokio::test]
async fn administrative_holds_stay_out_of_the_sweep_queue() {
    let h = common::harness();
    let seats = h.seed("Orchestra", "A", 1..=1, 4_000).await;
    let operator = ClaimantId::new("box-office");

    let hold = h
        .ledger
        .create(
            seats[0],
            &operator,
            ReservationKind::AdministrativeHold,
            Some(Duration::minutes(1)),
            None,
        )
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(5));
    let report = h.scheduler.sweep_once().await.unwrap();
    assert_eq!(report.scanned, 0);
    assert_eq!(report.expired, 0);

    // A direct expiry attempt is a no-op too; only an operator
    // release frees the seat.
    assert!(h.ledger.expire(hold.id).await.unwrap().is_none());
    assert_eq!(
        h.registry.get(seats[0]).await.unwrap().status,
        SeatStatus::Held
    );
}

#[tokio::test]
async fn lapsed_admin_hold_does_not_starve_the_sweep_batch() {
    let h = common::harness_with(seathold_engine::EngineConfig {
        sweep_batch_size: 1,
        ..seathold_engine::EngineConfig::default()
    });
    let seats = h.seed("Orchestra", "A", 1..=2, 4_000).await;
    let operator = ClaimantId::new("box-office");
    let claimant = ClaimantId::new("session-1");

    // The admin hold lapses first, so it would sort ahead of the
    // temporary hold in a one-slot batch if it were listed at all.
    h.ledger
        .create(
            seats[0],
            &operator,
            ReservationKind::AdministrativeHold,
            Some(Duration::minutes(1)),
            None,
        )
        .await
        .unwrap();
    let overdue = h
        .ledger
        .create(
            seats[1],
            &claimant,
            ReservationKind::Temporary,
            Some(Duration::minutes(2)),
            None,
        )
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(10));
    let report = h.scheduler.sweep_once().await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.expired, 1);
    assert_eq!(
        h.ledger.get(overdue.id).await.unwrap().status,
        ReservationStatus::Expired
    );
    assert_eq!(
        h.registry.get(seats[1]).await.unwrap().status,
        SeatStatus::Available
    );
}

#[tokio::test]
async fn sweep_closes_out_reservation_whose_seat_was_sold() {
    let h = common::harness();
    let seats = h.seed("Orchestra", "A", 1..=1, 4_000).await;
    let claimant = ClaimantId::new("session-1");
    let reservation = h
        .ledger
        .create(seats[0], &claimant, ReservationKind::Temporary, None, None)
        .await
        .unwrap();

    // Seat finalized but the reservation write never landed, as after
    // a crash mid pair-update.
    h.registry.finalize(seats[0], &claimant).await.unwrap();

    h.clock.advance(Duration::minutes(16));
    let report = h.scheduler.sweep_once().await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(
        h.ledger.get(reservation.id).await.unwrap().status,
        ReservationStatus::Expired
    );
    // The sale stands.
    assert_eq!(
        h.registry.get(seats[0]).await.unwrap().status,
        SeatStatus::Sold
    );

    // Nothing left for the next cycle.
    let report = h.scheduler.sweep_once().await.unwrap();
    assert_eq!(report.scanned, 0);
}

#[tokio::test]
async fn manual_release_and_sweep_commute() {
    // Order 1: cancel, then sweep.
    let h = common::harness();
    let seats = h.seed("Orchestra", "A", 1..=1, 4_000).await;
    let claimant = ClaimantId::new("session-1");
    let reservation = h
        .ledger
        .create(seats[0], &claimant, ReservationKind::Temporary, None, None)
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(16));

    let cancelled = h.ledger.cancel(reservation.id, "user left").await.unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    let report = h.scheduler.sweep_once().await.unwrap();
    assert_eq!(report.expired, 0);
    assert_eq!(
        h.ledger.get(reservation.id).await.unwrap().status,
        ReservationStatus::Cancelled
    );

    // Order 2: sweep, then cancel.
    let h = common::harness();
    let seats = h.seed("Orchestra", "A", 1..=1, 4_000).await;
    let reservation = h
        .ledger
        .create(seats[0], &claimant, ReservationKind::Temporary, None, None)
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(16));

    let report = h.scheduler.sweep_once().await.unwrap();
    assert_eq!(report.expired, 1);
    let after = h.ledger.cancel(reservation.id, "user left").await.unwrap();
    assert_eq!(after.status, ReservationStatus::Expired);

    // Either order ends with the seat back in inventory.
    assert_eq!(
        h.registry.get(seats[0]).await.unwrap().status,
        SeatStatus::Available
    );
}

#[tokio::test]
async fn expiry_warning_is_published_once() {
    let h = common::harness();
    let seats = h.seed("Orchestra", "A", 1..=1, 4_000).await;
    let claimant = ClaimantId::new("session-1");

    let reservation = h
        .ledger
        .create(seats[0], &claimant, ReservationKind::Temporary, None, None)
        .await
        .unwrap();

    // 90 seconds to expiry, inside the 120 second warn window.
    h.clock.advance(Duration::minutes(15) - Duration::seconds(90));
    let report = h.scheduler.sweep_once().await.unwrap();
    assert_eq!(report.warned, 1);

    let warnings = h.channel.events_where(|e| {
        matches!(
            e,
            seathold_core::notify::SeatEvent::ReservationExpiring { reservation_id, .. }
                if *reservation_id == reservation.id
        )
    });
    assert_eq!(warnings.len(), 1);

    // Still in the window on the next cycle; no duplicate warning.
    let report = h.scheduler.sweep_once().await.unwrap();
    assert_eq!(report.warned, 0);
}

#[tokio::test]
async fn batch_release_drops_only_the_claimants_holds() {
    let h = common::harness();
    let seats = h.seed("Orchestra", "A", 1..=3, 4_000).await;
    let leaver = ClaimantId::new("session-leaver");
    let stayer = ClaimantId::new("session-stayer");

    let r1 = h
        .ledger
        .create(seats[0], &leaver, ReservationKind::Temporary, None, None)
        .await
        .unwrap();
    let r2 = h
        .ledger
        .create(seats[1], &leaver, ReservationKind::Temporary, None, None)
        .await
        .unwrap();
    let r3 = h
        .ledger
        .create(seats[2], &stayer, ReservationKind::Temporary, None, None)
        .await
        .unwrap();

    let (queue, worker) = seathold_engine::ReleaseQueue::spawn(h.ledger.clone(), 16);
    queue.enqueue_release(leaver, None).await.unwrap();

    // Closing the queue lets the worker drain and stop.
    drop(queue);
    worker.await.unwrap();

    for id in [r1.id, r2.id] {
        assert_eq!(
            h.ledger.get(id).await.unwrap().status,
            ReservationStatus::Cancelled
        );
    }
    assert_eq!(
        h.ledger.get(r3.id).await.unwrap().status,
        ReservationStatus::Active
    );
    assert_eq!(
        h.registry.get(seats[0]).await.unwrap().status,
        SeatStatus::Available
    );
}

#[tokio::test]
async fn enqueue_on_closed_queue_errors() {
    let h = common::harness();
    let (queue, worker) = seathold_engine::ReleaseQueue::spawn(h.ledger.clone(), 1);

    worker.abort();
    let _ = worker.await;

    let err = queue
        .enqueue_release(ClaimantId::new("session-1"), None)
        .await;
    assert!(matches!(err, Err(HoldError::ReleaseQueueClosed)));
}
