//! End-to-end hold lifecycle: claim, extend, complete, cancel.

#![allow(clippy::unwrap_used)]

mod common;

use chrono::Duration;
use seathold_core::environment::Clock;
use seathold_core::error::HoldError;
use seathold_core::types::{
    ClaimantId, ReservationKind, ReservationStatus, SeatStatus,
};

#[tokio::test]
async fn claim_extend_complete_scenario() {
    let h = common::harness();
    let seats = h.seed("Orchestra", "C", 1..=1, 5_000).await;
    let claimant = ClaimantId::new("session-42");
    let t0 = h.clock.now();

    let reservation = h
        .ledger
        .create(seats[0], &claimant, ReservationKind::Temporary, None, None)
        .await
        .unwrap();
    assert_eq!(reservation.status, ReservationStatus::Active);
    assert_eq!(reservation.expires_at, t0 + Duration::minutes(15));
    assert_eq!(reservation.reserved_price.cents(), 5_000);

    let seat = h.registry.get(seats[0]).await.unwrap();
    assert_eq!(seat.status, SeatStatus::Held);
    assert_eq!(seat.held_until, Some(reservation.expires_at));
    assert!(seat.hold_state_consistent());

    let extended = h
        .ledger
        .extend(reservation.id, &claimant, Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(extended.expires_at, t0 + Duration::minutes(25));
    assert_eq!(extended.extension_count, 1);

    // Seat lease and reservation expiry move together.
    let seat = h.registry.get(seats[0]).await.unwrap();
    assert_eq!(seat.held_until, Some(extended.expires_at));

    let completed = h.ledger.complete(reservation.id, "ORDER-1").await.unwrap();
    assert_eq!(completed.status, ReservationStatus::Completed);
    assert_eq!(completed.completion_ref.as_deref(), Some("ORDER-1"));

    let seat = h.registry.get(seats[0]).await.unwrap();
    assert_eq!(seat.status, SeatStatus::Sold);
    assert!(seat.hold_state_consistent());
}

#[tokio::test]
async fn extension_cap_is_enforced() {
    let h = common::harness();
    let seats = h.seed("Orchestra", "C", 1..=1, 5_000).await;
    let claimant = ClaimantId::new("session-1");

    let reservation = h
        .ledger
        .create(seats[0], &claimant, ReservationKind::Temporary, None, None)
        .await
        .unwrap();

    for _ in 0..3 {
        h.ledger
            .extend(reservation.id, &claimant, Duration::minutes(5))
            .await
            .unwrap();
    }

    let before = h.ledger.get(reservation.id).await.unwrap();
    let err = h
        .ledger
        .extend(reservation.id, &claimant, Duration::minutes(5))
        .await
        .unwrap_err();
    assert!(matches!(err, HoldError::ExtensionLimit { max: 3, .. }));
    assert!(err.is_conflict());

    // Rejected extension leaves the pair untouched.
    let after = h.ledger.get(reservation.id).await.unwrap();
    assert_eq!(after, before);
    let seat = h.registry.get(seats[0]).await.unwrap();
    assert_eq!(seat.held_until, Some(after.expires_at));
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let h = common::harness();
    let seats = h.seed("Orchestra", "C", 1..=1, 5_000).await;
    let claimant = ClaimantId::new("session-1");

    let reservation = h
        .ledger
        .create(seats[0], &claimant, ReservationKind::Temporary, None, None)
        .await
        .unwrap();

    let first = h.ledger.cancel(reservation.id, "changed my mind").await.unwrap();
    assert_eq!(first.status, ReservationStatus::Cancelled);
    assert_eq!(first.cancel_reason.as_deref(), Some("changed my mind"));
    assert_eq!(
        h.registry.get(seats[0]).await.unwrap().status,
        SeatStatus::Available
    );

    let second = h.ledger.cancel(reservation.id, "again").await.unwrap();
    assert_eq!(second, first);

    // Records transition, never disappear.
    assert_eq!(h.reservations.len(), 1);
}

#[tokio::test]
async fn reclaim_by_same_claimant_refreshes_lease() {
    let h = common::harness();
    let seats = h.seed("Orchestra", "C", 1..=1, 5_000).await;
    let claimant = ClaimantId::new("session-1");

    let first = h
        .ledger
        .create(seats[0], &claimant, ReservationKind::Temporary, None, None)
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(5));
    let second = h
        .ledger
        .create(seats[0], &claimant, ReservationKind::Temporary, None, None)
        .await
        .unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.expires_at, first.expires_at + Duration::minutes(5));
    assert_eq!(h.reservations.len(), 1);

    // The refresh did not inflate demand tracking.
    let seat = h.registry.get(seats[0]).await.unwrap();
    assert_eq!(seat.selection_count, 1);
}

#[tokio::test]
async fn lapsed_reservation_rejects_extend_and_complete() {
    let h = common::harness();
    let seats = h.seed("Orchestra", "C", 1..=1, 5_000).await;
    let claimant = ClaimantId::new("session-1");

    let reservation = h
        .ledger
        .create(seats[0], &claimant, ReservationKind::Temporary, None, None)
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(16));

    let err = h
        .ledger
        .extend(reservation.id, &claimant, Duration::minutes(5))
        .await
        .unwrap_err();
    assert!(matches!(err, HoldError::ReservationExpired { .. }));

    let err = h.ledger.complete(reservation.id, "ORDER-2").await.unwrap_err();
    assert!(matches!(err, HoldError::ReservationExpired { .. }));
}

#[tokio::test]
async fn completion_retry_is_idempotent_per_reference() {
    let h = common::harness();
    let seats = h.seed("Orchestra", "C", 1..=1, 5_000).await;
    let claimant = ClaimantId::new("session-1");

    let reservation = h
        .ledger
        .create(seats[0], &claimant, ReservationKind::Checkout, None, None)
        .await
        .unwrap();

    let first = h.ledger.complete(reservation.id, "ORDER-9").await.unwrap();
    let retry = h.ledger.complete(reservation.id, "ORDER-9").await.unwrap();
    assert_eq!(retry, first);

    let err = h.ledger.complete(reservation.id, "ORDER-10").await.unwrap_err();
    assert!(matches!(err, HoldError::ReservationNotActive { .. }));
}

#[tokio::test]
async fn checkout_kind_uses_short_lease_and_checkout_status() {
    let h = common::harness();
    let seats = h.seed("Orchestra", "C", 1..=1, 5_000).await;
    let claimant = ClaimantId::new("session-1");
    let t0 = h.clock.now();

    let reservation = h
        .ledger
        .create(seats[0], &claimant, ReservationKind::Checkout, None, None)
        .await
        .unwrap();
    assert_eq!(reservation.expires_at, t0 + Duration::minutes(5));

    let seat = h.registry.get(seats[0]).await.unwrap();
    assert_eq!(seat.status, SeatStatus::ReservedForCheckout);
}

#[tokio::test]
async fn only_the_owner_may_extend() {
    let h = common::harness();
    let seats = h.seed("Orchestra", "C", 1..=1, 5_000).await;
    let owner = ClaimantId::new("session-1");
    let intruder = ClaimantId::new("session-2");

    let reservation = h
        .ledger
        .create(seats[0], &owner, ReservationKind::Temporary, None, None)
        .await
        .unwrap();

    let err = h
        .ledger
        .extend(reservation.id, &intruder, Duration::minutes(5))
        .await
        .unwrap_err();
    assert!(matches!(err, HoldError::NotOwner { .. }));
}

#[tokio::test]
async fn transient_store_failures_are_retried() {
    let h = common::harness();
    let seats = h.seed("Orchestra", "C", 1..=1, 5_000).await;
    let claimant = ClaimantId::new("session-1");

    h.seats.fail_next_updates(2);
    let reservation = h
        .ledger
        .create(seats[0], &claimant, ReservationKind::Temporary, None, None)
        .await
        .unwrap();
    assert_eq!(reservation.status, ReservationStatus::Active);
}
