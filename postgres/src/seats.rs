//! `PostgreSQL` seat store.

use crate::rows::{seat_status_str, to_i64, SeatRow, SEAT_COLUMNS};
use crate::{map_sqlx_err, rows};
use futures::future::BoxFuture;
use seathold_core::error::StoreError;
use seathold_core::store::{SeatStore, UpdateOutcome};
use seathold_core::types::{Seat, SeatId, StatusCounts, VenueId};
use sqlx::PgPool;
use std::sync::Arc;

/// [`SeatStore`] over a `PostgreSQL` pool.
///
/// The conditional `UPDATE ... WHERE id = $1 AND version = $2` makes
/// check-and-write a single atomic statement; zero affected rows means
/// the caller's version was stale (or the row vanished) and is reported
/// through [`UpdateOutcome`], never as an error.
#[derive(Clone)]
pub struct PostgresSeatStore {
    pool: Arc<PgPool>,
}

impl PostgresSeatStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// The underlying pool, for health checks.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        self.pool.as_ref()
    }
}

impl SeatStore for PostgresSeatStore {
    fn get(&self, seat_id: SeatId) -> BoxFuture<'_, Result<Option<Seat>, StoreError>> {
        Box::pin(async move {
            let row: Option<SeatRow> =
                sqlx::query_as(&format!("SELECT {SEAT_COLUMNS} FROM seats WHERE id = $1"))
                    .bind(seat_id.as_uuid())
                    .fetch_optional(self.pool.as_ref())
                    .await
                    .map_err(map_sqlx_err)?;
            row.map(Seat::try_from).transpose()
        })
    }

    fn seats_in_venue(
        &self,
        venue_id: VenueId,
    ) -> BoxFuture<'_, Result<Vec<Seat>, StoreError>> {
        Box::pin(async move {
            let rows: Vec<SeatRow> = sqlx::query_as(&format!(
                "SELECT {SEAT_COLUMNS} FROM seats WHERE venue_id = $1"
            ))
            .bind(venue_id.as_uuid())
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(map_sqlx_err)?;
            rows.into_iter().map(Seat::try_from).collect()
        })
    }

    fn insert(&self, seat: Seat) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO seats (id, venue_id, section, row_label, seat_number, status, \
                 base_price_cents, effective_price_cents, held_until, hold_ref, \
                 selection_count, popularity_score, accessible, version) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            )
            .bind(seat.id.as_uuid())
            .bind(seat.venue_id.as_uuid())
            .bind(&seat.position.section)
            .bind(&seat.position.row)
            .bind(rows::to_i32(seat.position.number, "seat_number")?)
            .bind(seat_status_str(seat.status))
            .bind(to_i64(seat.base_price.cents(), "base_price_cents")?)
            .bind(to_i64(seat.effective_price.cents(), "effective_price_cents")?)
            .bind(seat.held_until)
            .bind(seat.hold_ref.as_ref().map(|c| c.as_str().to_string()))
            .bind(to_i64(seat.selection_count, "selection_count")?)
            .bind(seat.popularity_score)
            .bind(seat.accessible)
            .bind(to_i64(seat.version, "version")?)
            .execute(self.pool.as_ref())
            .await
            .map_err(map_sqlx_err)?;
            Ok(())
        })
    }

    fn update(
        &self,
        seat: Seat,
        expected_version: u64,
    ) -> BoxFuture<'_, Result<UpdateOutcome<Seat>, StoreError>> {
        Box::pin(async move {
            let updated: Option<SeatRow> = sqlx::query_as(&format!(
                "UPDATE seats SET status = $1, base_price_cents = $2, \
                 effective_price_cents = $3, held_until = $4, hold_ref = $5, \
                 selection_count = $6, popularity_score = $7, accessible = $8, \
                 version = version + 1 \
                 WHERE id = $9 AND version = $10 \
                 RETURNING {SEAT_COLUMNS}"
            ))
            .bind(seat_status_str(seat.status))
            .bind(to_i64(seat.base_price.cents(), "base_price_cents")?)
            .bind(to_i64(seat.effective_price.cents(), "effective_price_cents")?)
            .bind(seat.held_until)
            .bind(seat.hold_ref.as_ref().map(|c| c.as_str().to_string()))
            .bind(to_i64(seat.selection_count, "selection_count")?)
            .bind(seat.popularity_score)
            .bind(seat.accessible)
            .bind(seat.id.as_uuid())
            .bind(to_i64(expected_version, "version")?)
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(map_sqlx_err)?;

            match updated {
                Some(row) => Ok(UpdateOutcome::Applied(Seat::try_from(row)?)),
                None => {
                    let exists: (bool,) =
                        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM seats WHERE id = $1)")
                            .bind(seat.id.as_uuid())
                            .fetch_one(self.pool.as_ref())
                            .await
                            .map_err(map_sqlx_err)?;
                    if exists.0 {
                        Ok(UpdateOutcome::VersionMismatch)
                    } else {
                        Ok(UpdateOutcome::Missing)
                    }
                }
            }
        })
    }

    fn count_by_status(
        &self,
        venue_id: VenueId,
    ) -> BoxFuture<'_, Result<StatusCounts, StoreError>> {
        Box::pin(async move {
            let grouped: Vec<(String, i64)> = sqlx::query_as(
                "SELECT status, COUNT(*) FROM seats WHERE venue_id = $1 GROUP BY status",
            )
            .bind(venue_id.as_uuid())
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(map_sqlx_err)?;

            let mut counts = StatusCounts::default();
            for (status, count) in grouped {
                let count = rows::to_u64(count, "count")?;
                match rows::parse_seat_status(&status)? {
                    seathold_core::types::SeatStatus::Available => counts.available += count,
                    seathold_core::types::SeatStatus::Held => counts.held += count,
                    seathold_core::types::SeatStatus::ReservedForCheckout => {
                        counts.reserved_for_checkout += count;
                    }
                    seathold_core::types::SeatStatus::Sold => counts.sold += count,
                    seathold_core::types::SeatStatus::Blocked => counts.blocked += count,
                    seathold_core::types::SeatStatus::Maintenance => counts.maintenance += count,
                }
            }
            Ok(counts)
        })
    }
}
