//! Row types and conversions between `PostgreSQL` rows and domain types.
//!
//! Statuses and kinds travel as text in the same kebab-case spelling the
//! serde representation uses; an unknown value in either direction is a
//! [`StoreError::Corrupted`].

use chrono::{DateTime, Utc};
use seathold_core::error::StoreError;
use seathold_core::types::{
    ClaimantId, GroupRequestId, Money, Reservation, ReservationId, ReservationKind,
    ReservationStatus, Seat, SeatId, SeatPosition, SeatStatus, VenueId,
};
use uuid::Uuid;

pub(crate) fn seat_status_str(status: SeatStatus) -> &'static str {
    match status {
        SeatStatus::Available => "available",
        SeatStatus::Held => "held",
        SeatStatus::ReservedForCheckout => "reserved-for-checkout",
        SeatStatus::Sold => "sold",
        SeatStatus::Blocked => "blocked",
        SeatStatus::Maintenance => "maintenance",
    }
}

pub(crate) fn parse_seat_status(s: &str) -> Result<SeatStatus, StoreError> {
    match s {
        "available" => Ok(SeatStatus::Available),
        "held" => Ok(SeatStatus::Held),
        "reserved-for-checkout" => Ok(SeatStatus::ReservedForCheckout),
        "sold" => Ok(SeatStatus::Sold),
        "blocked" => Ok(SeatStatus::Blocked),
        "maintenance" => Ok(SeatStatus::Maintenance),
        other => Err(StoreError::Corrupted(format!("unknown seat status: {other}"))),
    }
}

pub(crate) fn reservation_status_str(status: ReservationStatus) -> &'static str {
    match status {
        ReservationStatus::Active => "active",
        ReservationStatus::Expired => "expired",
        ReservationStatus::Cancelled => "cancelled",
        ReservationStatus::Completed => "completed",
    }
}

pub(crate) fn parse_reservation_status(s: &str) -> Result<ReservationStatus, StoreError> {
    match s {
        "active" => Ok(ReservationStatus::Active),
        "expired" => Ok(ReservationStatus::Expired),
        "cancelled" => Ok(ReservationStatus::Cancelled),
        "completed" => Ok(ReservationStatus::Completed),
        other => Err(StoreError::Corrupted(format!(
            "unknown reservation status: {other}"
        ))),
    }
}

pub(crate) fn reservation_kind_str(kind: ReservationKind) -> &'static str {
    match kind {
        ReservationKind::Temporary => "temporary",
        ReservationKind::Checkout => "checkout",
        ReservationKind::AdministrativeHold => "administrative-hold",
        ReservationKind::Group => "group",
    }
}

pub(crate) fn parse_reservation_kind(s: &str) -> Result<ReservationKind, StoreError> {
    match s {
        "temporary" => Ok(ReservationKind::Temporary),
        "checkout" => Ok(ReservationKind::Checkout),
        "administrative-hold" => Ok(ReservationKind::AdministrativeHold),
        "group" => Ok(ReservationKind::Group),
        other => Err(StoreError::Corrupted(format!(
            "unknown reservation kind: {other}"
        ))),
    }
}

pub(crate) fn to_i64(value: u64, field: &str) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::Corrupted(format!("{field} out of range: {value}")))
}

pub(crate) fn to_u64(value: i64, field: &str) -> Result<u64, StoreError> {
    u64::try_from(value)
        .map_err(|_| StoreError::Corrupted(format!("{field} negative in store: {value}")))
}

pub(crate) fn to_i32(value: u32, field: &str) -> Result<i32, StoreError> {
    i32::try_from(value)
        .map_err(|_| StoreError::Corrupted(format!("{field} out of range: {value}")))
}

pub(crate) fn to_u32(value: i32, field: &str) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::Corrupted(format!("{field} negative in store: {value}")))
}

/// Column list shared by the seat queries, in [`SeatRow`] order.
pub(crate) const SEAT_COLUMNS: &str = "id, venue_id, section, row_label, seat_number, status, \
     base_price_cents, effective_price_cents, held_until, hold_ref, \
     selection_count, popularity_score, accessible, version";

#[derive(sqlx::FromRow)]
pub(crate) struct SeatRow {
    id: Uuid,
    venue_id: Uuid,
    section: String,
    row_label: String,
    seat_number: i32,
    status: String,
    base_price_cents: i64,
    effective_price_cents: i64,
    held_until: Option<DateTime<Utc>>,
    hold_ref: Option<String>,
    selection_count: i64,
    popularity_score: f64,
    accessible: bool,
    version: i64,
}

impl TryFrom<SeatRow> for Seat {
    type Error = StoreError;

    fn try_from(row: SeatRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: SeatId::from_uuid(row.id),
            venue_id: VenueId::from_uuid(row.venue_id),
            position: SeatPosition {
                section: row.section,
                row: row.row_label,
                number: to_u32(row.seat_number, "seat_number")?,
            },
            status: parse_seat_status(&row.status)?,
            base_price: Money::from_cents(to_u64(row.base_price_cents, "base_price_cents")?),
            effective_price: Money::from_cents(to_u64(
                row.effective_price_cents,
                "effective_price_cents",
            )?),
            held_until: row.held_until,
            hold_ref: row.hold_ref.map(ClaimantId::new),
            selection_count: to_u64(row.selection_count, "selection_count")?,
            popularity_score: row.popularity_score,
            accessible: row.accessible,
            version: to_u64(row.version, "version")?,
        })
    }
}

/// Column list shared by the reservation queries, in
/// [`ReservationRow`] order.
pub(crate) const RESERVATION_COLUMNS: &str = "id, seat_id, venue_id, claimant, status, kind, expires_at, \
     reserved_price_cents, extension_count, completion_ref, group_ref, \
     cancel_reason, created_at, updated_at, version";

#[derive(sqlx::FromRow)]
pub(crate) struct ReservationRow {
    id: Uuid,
    seat_id: Uuid,
    venue_id: Uuid,
    claimant: String,
    status: String,
    kind: String,
    expires_at: DateTime<Utc>,
    reserved_price_cents: i64,
    extension_count: i32,
    completion_ref: Option<String>,
    group_ref: Option<Uuid>,
    cancel_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = StoreError;

    fn try_from(row: ReservationRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: ReservationId::from_uuid(row.id),
            seat_id: SeatId::from_uuid(row.seat_id),
            venue_id: VenueId::from_uuid(row.venue_id),
            claimant: ClaimantId::new(row.claimant),
            status: parse_reservation_status(&row.status)?,
            kind: parse_reservation_kind(&row.kind)?,
            expires_at: row.expires_at,
            reserved_price: Money::from_cents(to_u64(
                row.reserved_price_cents,
                "reserved_price_cents",
            )?),
            extension_count: to_u32(row.extension_count, "extension_count")?,
            completion_ref: row.completion_ref,
            group_ref: row.group_ref.map(GroupRequestId::from_uuid),
            cancel_reason: row.cancel_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: to_u64(row.version, "version")?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn seat_status_text_round_trips() {
        for status in [
            SeatStatus::Available,
            SeatStatus::Held,
            SeatStatus::ReservedForCheckout,
            SeatStatus::Sold,
            SeatStatus::Blocked,
            SeatStatus::Maintenance,
        ] {
            assert_eq!(parse_seat_status(seat_status_str(status)).unwrap(), status);
        }
        assert!(parse_seat_status("on-fire").is_err());
    }

    #[test]
    fn reservation_kind_text_round_trips() {
        for kind in [
            ReservationKind::Temporary,
            ReservationKind::Checkout,
            ReservationKind::AdministrativeHold,
            ReservationKind::Group,
        ] {
            assert_eq!(
                parse_reservation_kind(reservation_kind_str(kind)).unwrap(),
                kind
            );
        }
    }

    #[test]
    fn negative_counters_are_corruption() {
        assert!(matches!(
            to_u64(-1, "version"),
            Err(StoreError::Corrupted(_))
        ));
    }
}
