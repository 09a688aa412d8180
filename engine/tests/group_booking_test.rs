//! Group booking flows and the adjacency search.

#![allow(clippy::unwrap_used)]

mod common;

use chrono::Duration;
use proptest::prelude::*;
use seathold_core::types::{
    ClaimantId, GroupPolicy, GroupStatus, ReservationStatus, SeatPreferences, SeatStatus,
};

#[tokio::test]
async fn adjacency_search_finds_the_only_free_block() {
    let h = common::harness();
    let ids = h.seed("Orchestra", "F", 1..=10, 4_000).await;

    // Leave only seats 3, 4, 5 claimable.
    let blocked: Vec<_> = ids
        .iter()
        .enumerate()
        .filter(|(i, _)| !(2..=4).contains(i))
        .map(|(_, id)| *id)
        .collect();
    h.registry
        .bulk_set_status(&blocked, SeatStatus::Blocked)
        .await
        .unwrap();

    let block = h
        .finder
        .find_best_group(h.venue, 3, GroupPolicy::SameRow, &SeatPreferences::default())
        .await
        .unwrap();
    let numbers: Vec<u32> = block.iter().map(|s| s.position.number).collect();
    assert_eq!(numbers, vec![3, 4, 5]);
}

#[tokio::test]
async fn partial_fulfillment_when_inventory_is_short() {
    let h = common::harness();
    h.seed("Balcony", "B", 1..=3, 3_000).await;
    let claimant = ClaimantId::new("group-lead");

    let outcome = h
        .groups
        .create_request(
            h.venue,
            &claimant,
            5,
            GroupPolicy::Flexible,
            SeatPreferences::default(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, GroupStatus::Partial);
    assert_eq!(outcome.confirmed.len(), 3);
    assert_eq!(outcome.fulfillment_rate, 60);

    // Every confirmed seat is held and its reservation points back.
    for (seat_id, reservation_id) in &outcome.confirmed {
        let seat = h.registry.get(*seat_id).await.unwrap();
        assert_eq!(seat.status, SeatStatus::Held);
        let reservation = h.ledger.get(*reservation_id).await.unwrap();
        assert_eq!(reservation.group_ref, Some(outcome.request_id));
    }
}

#[tokio::test]
async fn group_discount_tracks_confirmed_count() {
    let h = common::harness();
    h.seed("Orchestra", "D", 1..=6, 1_000).await;
    let claimant = ClaimantId::new("group-lead");

    let outcome = h
        .groups
        .create_request(
            h.venue,
            &claimant,
            6,
            GroupPolicy::Adjacent,
            SeatPreferences::default(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, GroupStatus::Confirmed);
    assert_eq!(outcome.discount.cents(), 300); // 5% of 6000
    assert_eq!(outcome.total_price.cents(), 5_700);

    // Dropping below the 5-seat tier removes the discount.
    let (seat_id, reservation_id) = outcome.confirmed[0];
    let outcome = h
        .groups
        .remove_seat(outcome.request_id, seat_id)
        .await
        .unwrap();
    assert_eq!(outcome.status, GroupStatus::Partial);
    assert_eq!(outcome.discount.cents(), 250); // still 5 confirmed
    assert_eq!(outcome.total_price.cents(), 4_750);
    assert_eq!(
        h.ledger.get(reservation_id).await.unwrap().status,
        ReservationStatus::Cancelled
    );
    assert_eq!(
        h.registry.get(seat_id).await.unwrap().status,
        SeatStatus::Available
    );
}

#[tokio::test]
async fn add_seats_completes_a_partial_request() {
    let h = common::harness();
    h.seed("Orchestra", "A", 1..=2, 2_000).await;
    let claimant = ClaimantId::new("group-lead");

    let outcome = h
        .groups
        .create_request(
            h.venue,
            &claimant,
            4,
            GroupPolicy::Flexible,
            SeatPreferences::default(),
            None,
        )
        .await
        .unwrap();
    assert_eq!(outcome.status, GroupStatus::Partial);
    assert_eq!(outcome.confirmed.len(), 2);

    // Inventory frees up later (new row goes on sale).
    h.seed("Orchestra", "B", 1..=2, 2_000).await;
    let outcome = h.groups.add_seats(outcome.request_id, 2).await.unwrap();
    assert_eq!(outcome.status, GroupStatus::Confirmed);
    assert_eq!(outcome.confirmed.len(), 4);
    assert_eq!(outcome.fulfillment_rate, 100);
}

#[tokio::test]
async fn add_seats_never_exceeds_the_requested_count() {
    let h = common::harness();
    h.seed("Orchestra", "A", 1..=2, 2_000).await;
    let claimant = ClaimantId::new("group-lead");

    let outcome = h
        .groups
        .create_request(
            h.venue,
            &claimant,
            4,
            GroupPolicy::Flexible,
            SeatPreferences::default(),
            None,
        )
        .await
        .unwrap();
    assert_eq!(outcome.status, GroupStatus::Partial);
    assert_eq!(outcome.confirmed.len(), 2);

    // Plenty of new inventory and an oversized ask: the claim is
    // capped at the two seats still missing.
    h.seed("Orchestra", "B", 1..=10, 2_000).await;
    let outcome = h.groups.add_seats(outcome.request_id, 10).await.unwrap();
    assert_eq!(outcome.status, GroupStatus::Confirmed);
    assert_eq!(outcome.confirmed.len(), 4);
    assert_eq!(outcome.fulfillment_rate, 100);

    // A confirmed request cannot be grown past its size either.
    let err = h.groups.add_seats(outcome.request_id, 1).await;
    assert!(matches!(
        err,
        Err(seathold_core::error::HoldError::GroupClosed { .. })
    ));
}

#[tokio::test]
async fn cancel_releases_every_hold_and_is_idempotent() {
    let h = common::harness();
    h.seed("Orchestra", "A", 1..=4, 2_000).await;
    let claimant = ClaimantId::new("group-lead");

    let outcome = h
        .groups
        .create_request(
            h.venue,
            &claimant,
            4,
            GroupPolicy::SameRow,
            SeatPreferences::default(),
            None,
        )
        .await
        .unwrap();
    let confirmed = outcome.confirmed.clone();

    let cancelled = h.groups.cancel(outcome.request_id).await.unwrap();
    assert_eq!(cancelled.status, GroupStatus::Cancelled);
    for (seat_id, reservation_id) in &confirmed {
        assert_eq!(
            h.registry.get(*seat_id).await.unwrap().status,
            SeatStatus::Available
        );
        assert_eq!(
            h.ledger.get(*reservation_id).await.unwrap().status,
            ReservationStatus::Cancelled
        );
    }

    let again = h.groups.cancel(outcome.request_id).await.unwrap();
    assert_eq!(again, cancelled);
}

#[tokio::test]
async fn sweep_closes_lapsed_group_requests() {
    let h = common::harness();
    h.seed("Orchestra", "A", 1..=3, 2_000).await;
    let claimant = ClaimantId::new("group-lead");

    let outcome = h
        .groups
        .create_request(
            h.venue,
            &claimant,
            3,
            GroupPolicy::SameRow,
            SeatPreferences::default(),
            Some(Duration::minutes(5)),
        )
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(6));
    let report = h.scheduler.sweep_once().await.unwrap();
    assert_eq!(report.groups_closed, 1);

    let closed = h.groups.get(outcome.request_id).await.unwrap();
    assert_eq!(closed.status, GroupStatus::Cancelled);
    for (seat_id, _) in &outcome.confirmed {
        assert_eq!(
            h.registry.get(*seat_id).await.unwrap().status,
            SeatStatus::Available
        );
    }
}

#[tokio::test]
async fn preferences_constrain_group_candidates() {
    let h = common::harness();
    h.seed("Orchestra", "A", 1..=4, 9_000).await;
    h.seed("Balcony", "A", 1..=4, 2_000).await;
    let claimant = ClaimantId::new("group-lead");

    let prefs = SeatPreferences {
        max_price: Some(seathold_core::types::Money::from_cents(5_000)),
        ..SeatPreferences::default()
    };
    let outcome = h
        .groups
        .create_request(h.venue, &claimant, 4, GroupPolicy::SameRow, prefs, None)
        .await
        .unwrap();

    assert_eq!(outcome.status, GroupStatus::Confirmed);
    for (seat_id, _) in &outcome.confirmed {
        let seat = h.registry.get(*seat_id).await.unwrap();
        assert_eq!(seat.position.section, "Balcony");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    // Any full-size same-row block is consecutive, available, and in
    // one row, whatever the availability pattern.
    #[test]
    fn same_row_blocks_are_consecutive(
        mask in proptest::collection::vec(any::<bool>(), 1..24),
        quantity in 1u32..6,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let block = rt.block_on(async {
            let h = common::harness();
            for (i, present) in mask.iter().enumerate() {
                if *present {
                    let number = u32::try_from(i).unwrap() + 1;
                    h.seed("Orchestra", "K", number..=number, 3_000).await;
                }
            }
            h.finder
                .find_best_group(
                    h.venue,
                    quantity,
                    GroupPolicy::SameRow,
                    &SeatPreferences::default(),
                )
                .await
                .unwrap()
        });

        prop_assert!(block.len() <= quantity as usize);
        if block.len() == quantity as usize {
            prop_assert!(block
                .windows(2)
                .all(|w| w[1].position.number == w[0].position.number + 1));
            prop_assert!(block.iter().all(|s| s.status == SeatStatus::Available));
            prop_assert!(block.iter().all(|s| s.position.row == block[0].position.row));
        }
    }
}
