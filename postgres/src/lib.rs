//! `PostgreSQL` implementations of the seathold store traits.
//!
//! Both stores implement the optimistic concurrency contract with a
//! single conditional statement:
//!
//! ```sql
//! UPDATE ... SET ..., version = version + 1
//! WHERE id = $1 AND version = $2
//! ```
//!
//! The check and the write are one atomic step, so a stale writer
//! affects zero rows and the engine re-reads. Serialization failures,
//! deadlocks and lock timeouts map to [`StoreError::Transient`] and are
//! retried by the engine's retry policy.
//!
//! [`StoreError::Transient`]: seathold_core::error::StoreError::Transient

mod reservations;
mod rows;
mod seats;

pub use reservations::PostgresReservationStore;
pub use seats::PostgresSeatStore;

use seathold_core::error::StoreError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Schema for both stores; idempotent, applied by [`ensure_schema`].
const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS seats (
    id UUID PRIMARY KEY,
    venue_id UUID NOT NULL,
    section TEXT NOT NULL,
    row_label TEXT NOT NULL,
    seat_number INTEGER NOT NULL,
    status TEXT NOT NULL,
    base_price_cents BIGINT NOT NULL,
    effective_price_cents BIGINT NOT NULL,
    held_until TIMESTAMPTZ,
    hold_ref TEXT,
    selection_count BIGINT NOT NULL DEFAULT 0,
    popularity_score DOUBLE PRECISION NOT NULL DEFAULT 0,
    accessible BOOLEAN NOT NULL DEFAULT FALSE,
    version BIGINT NOT NULL DEFAULT 0,
    UNIQUE (venue_id, section, row_label, seat_number)
);

CREATE INDEX IF NOT EXISTS seats_venue_status_idx
    ON seats (venue_id, status);

CREATE TABLE IF NOT EXISTS reservations (
    id UUID PRIMARY KEY,
    seat_id UUID NOT NULL,
    venue_id UUID NOT NULL,
    claimant TEXT NOT NULL,
    status TEXT NOT NULL,
    kind TEXT NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL,
    reserved_price_cents BIGINT NOT NULL,
    extension_count INTEGER NOT NULL DEFAULT 0,
    completion_ref TEXT,
    group_ref UUID,
    cancel_reason TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    version BIGINT NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS reservations_active_expiry_idx
    ON reservations (expires_at) WHERE status = 'active';
CREATE INDEX IF NOT EXISTS reservations_active_claimant_idx
    ON reservations (claimant) WHERE status = 'active';
CREATE INDEX IF NOT EXISTS reservations_active_seat_idx
    ON reservations (seat_id) WHERE status = 'active';
";

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`StoreError::Connection`] if the pool cannot be opened.
pub async fn connect(
    url: &str,
    max_connections: u32,
    connect_timeout: Duration,
) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(connect_timeout)
        .connect(url)
        .await
        .map_err(map_sqlx_err)
}

/// Apply the schema (idempotent).
///
/// # Errors
///
/// Returns [`StoreError`] if a DDL statement fails.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(map_sqlx_err)?;
    tracing::debug!("seathold schema ensured");
    Ok(())
}

/// Map a sqlx error into the engine's store error taxonomy.
///
/// Serialization failure (40001), deadlock (40P01) and lock-not-available
/// (55P03) are the retryable class.
pub(crate) fn map_sqlx_err(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("40001" | "40P01" | "55P03") => StoreError::Transient(db.message().to_string()),
            _ => StoreError::Connection(err.to_string()),
        },
        sqlx::Error::PoolTimedOut => {
            StoreError::Transient("connection pool acquire timed out".to_string())
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => StoreError::Corrupted(err.to_string()),
        _ => StoreError::Connection(err.to_string()),
    }
}
