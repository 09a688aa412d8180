//! `PostgreSQL` reservation store.

use crate::rows::{
    reservation_kind_str, reservation_status_str, to_i32, to_i64, ReservationRow,
    RESERVATION_COLUMNS,
};
use crate::map_sqlx_err;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use seathold_core::error::StoreError;
use seathold_core::store::{ReservationStore, UpdateOutcome};
use seathold_core::types::{ClaimantId, Reservation, ReservationId, SeatId};
use sqlx::PgPool;
use std::sync::Arc;

/// [`ReservationStore`] over a `PostgreSQL` pool.
///
/// Records are append-plus-transition: rows are inserted once and then
/// only updated through the version-checked conditional `UPDATE`, never
/// deleted, so the table doubles as the hold audit trail.
#[derive(Clone)]
pub struct PostgresReservationStore {
    pool: Arc<PgPool>,
}

impl PostgresReservationStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

impl ReservationStore for PostgresReservationStore {
    fn get(
        &self,
        reservation_id: ReservationId,
    ) -> BoxFuture<'_, Result<Option<Reservation>, StoreError>> {
        Box::pin(async move {
            let row: Option<ReservationRow> = sqlx::query_as(&format!(
                "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
            ))
            .bind(reservation_id.as_uuid())
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(map_sqlx_err)?;
            row.map(Reservation::try_from).transpose()
        })
    }

    fn insert(&self, reservation: Reservation) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO reservations (id, seat_id, venue_id, claimant, status, kind, \
                 expires_at, reserved_price_cents, extension_count, completion_ref, \
                 group_ref, cancel_reason, created_at, updated_at, version) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
            )
            .bind(reservation.id.as_uuid())
            .bind(reservation.seat_id.as_uuid())
            .bind(reservation.venue_id.as_uuid())
            .bind(reservation.claimant.as_str().to_string())
            .bind(reservation_status_str(reservation.status))
            .bind(reservation_kind_str(reservation.kind))
            .bind(reservation.expires_at)
            .bind(to_i64(
                reservation.reserved_price.cents(),
                "reserved_price_cents",
            )?)
            .bind(to_i32(reservation.extension_count, "extension_count")?)
            .bind(&reservation.completion_ref)
            .bind(reservation.group_ref.map(|g| *g.as_uuid()))
            .bind(&reservation.cancel_reason)
            .bind(reservation.created_at)
            .bind(reservation.updated_at)
            .bind(to_i64(reservation.version, "version")?)
            .execute(self.pool.as_ref())
            .await
            .map_err(map_sqlx_err)?;
            Ok(())
        })
    }

    fn update(
        &self,
        reservation: Reservation,
        expected_version: u64,
    ) -> BoxFuture<'_, Result<UpdateOutcome<Reservation>, StoreError>> {
        Box::pin(async move {
            let updated: Option<ReservationRow> = sqlx::query_as(&format!(
                "UPDATE reservations SET status = $1, expires_at = $2, \
                 extension_count = $3, completion_ref = $4, cancel_reason = $5, \
                 updated_at = $6, version = version + 1 \
                 WHERE id = $7 AND version = $8 \
                 RETURNING {RESERVATION_COLUMNS}"
            ))
            .bind(reservation_status_str(reservation.status))
            .bind(reservation.expires_at)
            .bind(to_i32(reservation.extension_count, "extension_count")?)
            .bind(&reservation.completion_ref)
            .bind(&reservation.cancel_reason)
            .bind(reservation.updated_at)
            .bind(reservation.id.as_uuid())
            .bind(to_i64(expected_version, "version")?)
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(map_sqlx_err)?;

            match updated {
                Some(row) => Ok(UpdateOutcome::Applied(Reservation::try_from(row)?)),
                None => {
                    let exists: (bool,) =
                        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM reservations WHERE id = $1)")
                            .bind(reservation.id.as_uuid())
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

    fn expired_active(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Reservation>, StoreError>> {
        Box::pin(async move {
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
                "SELECT {RESERVATION_COLUMNS} FROM reservations \
                 WHERE status = 'active' AND kind <> 'administrative-hold' \
                 AND expires_at < $1 \
                 ORDER BY expires_at ASC LIMIT $2"
            ))
            .bind(now)
            .bind(limit)
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(map_sqlx_err)?;
            rows.into_iter().map(Reservation::try_from).collect()
        })
    }

    fn active_by_claimant(
        &self,
        claimant: &ClaimantId,
    ) -> BoxFuture<'_, Result<Vec<Reservation>, StoreError>> {
        let claimant = claimant.as_str().to_string();
        Box::pin(async move {
            let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
                "SELECT {RESERVATION_COLUMNS} FROM reservations \
                 WHERE status = 'active' AND claimant = $1"
            ))
            .bind(claimant)
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(map_sqlx_err)?;
            rows.into_iter().map(Reservation::try_from).collect()
        })
    }

    fn active_by_seat(
        &self,
        seat_id: SeatId,
    ) -> BoxFuture<'_, Result<Option<Reservation>, StoreError>> {
        Box::pin(async move {
            let row: Option<ReservationRow> = sqlx::query_as(&format!(
                "SELECT {RESERVATION_COLUMNS} FROM reservations \
                 WHERE status = 'active' AND seat_id = $1 \
                 ORDER BY created_at DESC LIMIT 1"
            ))
            .bind(seat_id.as_uuid())
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(map_sqlx_err)?;
            row.map(Reservation::try_from).transpose()
        })
    }

    fn expiring_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<Reservation>, StoreError>> {
        Box::pin(async move {
            let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
                "SELECT {RESERVATION_COLUMNS} FROM reservations \
                 WHERE status = 'active' AND expires_at >= $1 AND expires_at < $2"
            ))
            .bind(from)
            .bind(to)
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(map_sqlx_err)?;
            rows.into_iter().map(Reservation::try_from).collect()
        })
    }
}
