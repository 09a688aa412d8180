//! Seat search: preference filtering and adjacent-block matching.
//!
//! Read-only over the seat store. The adjacency matcher takes the
//! *first* sufficient run of consecutive seat numbers in a row rather
//! than searching for an optimal (centered, cheapest) block; that
//! heuristic is deliberate and callers should not rely on which block
//! of several candidates comes back.

use crate::retry::{retry_transient, RetryPolicy};
use seathold_core::error::HoldError;
use seathold_core::store::SeatStore;
use seathold_core::types::{GroupPolicy, Seat, SeatPreferences, SeatStatus, VenueId};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Read-only seat search over a [`SeatStore`].
pub struct SeatFinder {
    seats: Arc<dyn SeatStore>,
    retry: RetryPolicy,
}

impl SeatFinder {
    /// Creates a finder over the given store.
    #[must_use]
    pub fn new(seats: Arc<dyn SeatStore>, retry: RetryPolicy) -> Self {
        Self { seats, retry }
    }

    /// Available seats in `venue_id` passing `prefs`, most popular
    /// first, cheaper first among equals.
    ///
    /// # Errors
    ///
    /// Returns a surfaced store failure.
    pub async fn find_available(
        &self,
        venue_id: VenueId,
        prefs: &SeatPreferences,
    ) -> Result<Vec<Seat>, HoldError> {
        let mut seats = self.claimable(venue_id, prefs).await?;
        seats.sort_by(|a, b| {
            b.popularity_score
                .total_cmp(&a.popularity_score)
                .then_with(|| a.effective_price.cmp(&b.effective_price))
                .then_with(|| a.position.number.cmp(&b.position.number))
        });
        Ok(seats)
    }

    /// Best-effort block of up to `quantity` seats satisfying `policy`.
    ///
    /// First pass scans rows in (section, row) order and returns the
    /// first run of `quantity` consecutive seat numbers. When no row
    /// has a full run and the policy permits a spread greater than one,
    /// a greedy second pass fills across up to `max_row_spread` rows
    /// (quantity satisfaction only). A short result means the venue
    /// cannot currently satisfy the request in full; it is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns a surfaced store failure.
    pub async fn find_best_group(
        &self,
        venue_id: VenueId,
        quantity: u32,
        policy: GroupPolicy,
        prefs: &SeatPreferences,
    ) -> Result<Vec<Seat>, HoldError> {
        if quantity == 0 {
            return Ok(Vec::new());
        }
        let quantity = quantity as usize;

        let seats = self.claimable(venue_id, prefs).await?;
        let rows = group_by_row(seats);

        // First full run of consecutive numbers wins, whatever the policy.
        for row in rows.values() {
            if let Some(block) = first_consecutive_run(row, quantity) {
                return Ok(block);
            }
        }

        let spread = policy.effective_row_spread(prefs.max_row_spread) as usize;
        if spread > 1 {
            let block = greedy_cross_row(&rows, quantity, spread, policy);
            if block.len() >= quantity {
                return Ok(block);
            }
            if policy == GroupPolicy::Flexible {
                // Quantity over shape: fall back to availability order.
                let mut any = self.find_available(venue_id, prefs).await?;
                any.truncate(quantity);
                return Ok(any);
            }
            return Ok(block);
        }

        // Single-row policies: hand back the longest run we saw.
        Ok(longest_run(&rows, quantity))
    }

    async fn claimable(
        &self,
        venue_id: VenueId,
        prefs: &SeatPreferences,
    ) -> Result<Vec<Seat>, HoldError> {
        let seats =
            retry_transient(&self.retry, || self.seats.seats_in_venue(venue_id)).await?;
        Ok(seats
            .into_iter()
            .filter(|s| s.status == SeatStatus::Available && prefs.admits(s))
            .collect())
    }
}

/// Seats bucketed by (section, row), each bucket sorted by number.
fn group_by_row(seats: Vec<Seat>) -> BTreeMap<(String, String), Vec<Seat>> {
    let mut rows: BTreeMap<(String, String), Vec<Seat>> = BTreeMap::new();
    for seat in seats {
        let key = (seat.position.section.clone(), seat.position.row.clone());
        rows.entry(key).or_default().push(seat);
    }
    for row in rows.values_mut() {
        row.sort_by_key(|s| s.position.number);
    }
    rows
}

/// First run of `quantity` consecutive seat numbers in a sorted row.
fn first_consecutive_run(row: &[Seat], quantity: usize) -> Option<Vec<Seat>> {
    let mut start = 0;
    for i in 1..=row.len() {
        let broken = i == row.len()
            || row[i].position.number != row[i - 1].position.number + 1;
        if broken {
            if i - start >= quantity {
                return Some(row[start..start + quantity].to_vec());
            }
            start = i;
        }
    }
    None
}

/// Longest consecutive run across all rows, capped at `quantity`.
fn longest_run(rows: &BTreeMap<(String, String), Vec<Seat>>, quantity: usize) -> Vec<Seat> {
    let mut best: Vec<Seat> = Vec::new();
    for row in rows.values() {
        let mut start = 0;
        for i in 1..=row.len() {
            let broken = i == row.len()
                || row[i].position.number != row[i - 1].position.number + 1;
            if broken {
                if i - start > best.len() {
                    best = row[start..i].to_vec();
                }
                start = i;
            }
        }
    }
    best.truncate(quantity);
    best
}

/// Greedy fill across adjacent rows of one section, up to `spread`
/// rows, taking the densest section window first.
fn greedy_cross_row(
    rows: &BTreeMap<(String, String), Vec<Seat>>,
    quantity: usize,
    spread: usize,
    policy: GroupPolicy,
) -> Vec<Seat> {
    let mut by_section: BTreeMap<&str, Vec<&Vec<Seat>>> = BTreeMap::new();
    for ((section, _row), seats) in rows {
        by_section.entry(section.as_str()).or_default().push(seats);
    }

    let mut best: Vec<Seat> = Vec::new();
    for section_rows in by_section.values() {
        for window in section_rows.windows(spread.min(section_rows.len()).max(1)) {
            let mut picked: Vec<Seat> = Vec::with_capacity(quantity);
            for row in window {
                for seat in row.iter() {
                    if picked.len() == quantity {
                        break;
                    }
                    picked.push(seat.clone());
                }
            }
            if picked.len() > best.len() {
                best = picked;
            }
            if best.len() >= quantity {
                return best;
            }
        }
    }

    if policy == GroupPolicy::SameSection || best.len() >= quantity {
        return best;
    }
    // Flexible: rows from anywhere, capped at `spread` distinct rows.
    let mut picked: Vec<Seat> = Vec::new();
    let mut rows_used = 0;
    for row in rows.values() {
        if rows_used == spread || picked.len() >= quantity {
            break;
        }
        let before = picked.len();
        for seat in row {
            if picked.len() == quantity {
                break;
            }
            picked.push(seat.clone());
        }
        if picked.len() > before {
            rows_used += 1;
        }
    }
    if picked.len() > best.len() {
        best = picked;
    }
    best
}
