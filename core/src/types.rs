//! Domain types for the seat hold/reservation engine.
//!
//! This module contains the value objects and entities the engine operates on:
//! seats, reservations (holds), group booking requests, and the denormalized
//! availability snapshot. All mutation of these types happens through the
//! engine components; callers never write fields directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a venue
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VenueId(Uuid);

impl VenueId {
    /// Creates a new random `VenueId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `VenueId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for VenueId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a seat
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeatId(Uuid);

impl SeatId {
    /// Creates a new random `SeatId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `SeatId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SeatId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a reservation (hold)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(Uuid);

impl ReservationId {
    /// Creates a new random `ReservationId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ReservationId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a group booking request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupRequestId(Uuid);

impl GroupRequestId {
    /// Creates a new random `GroupRequestId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `GroupRequestId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for GroupRequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GroupRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of the session or user that owns a hold.
///
/// Claimants are compared by value; the engine never interprets the
/// content (it may be a session token, a user id, or an operator id).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimantId(String);

impl ClaimantId {
    /// Creates a claimant id from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The claimant id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClaimantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in cents to avoid floating-point arithmetic errors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Saturating addition
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Applies a percentage (0-100), rounding down to whole cents
    #[must_use]
    pub const fn percent(self, pct: u64) -> Self {
        Self(self.0.saturating_mul(pct) / 100)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self(0), Self::saturating_add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Seat
// ============================================================================

/// Lifecycle status of a seat.
///
/// Exactly one variant holds at any instant; transitions go through
/// the seat registry only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeatStatus {
    /// Free to claim
    Available,
    /// Time-bounded exclusive claim by one claimant
    Held,
    /// Held while the claimant is in the checkout flow (shorter lease)
    ReservedForCheckout,
    /// Sale completed; terminal for normal flows
    Sold,
    /// Withheld from sale by an operator
    Blocked,
    /// Out of service (broken, obstructed view, ...)
    Maintenance,
}

impl SeatStatus {
    /// Whether a seat in this status carries hold bookkeeping
    /// (`held_until` / `hold_ref`).
    #[must_use]
    pub const fn is_held(self) -> bool {
        matches!(self, Self::Held | Self::ReservedForCheckout)
    }
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Available => "available",
            Self::Held => "held",
            Self::ReservedForCheckout => "reserved-for-checkout",
            Self::Sold => "sold",
            Self::Blocked => "blocked",
            Self::Maintenance => "maintenance",
        };
        write!(f, "{s}")
    }
}

/// Physical position of a seat within a venue.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeatPosition {
    /// Section identifier ("Orchestra", "Balcony A", ...)
    pub section: String,
    /// Row label within the section
    pub row: String,
    /// Seat number within the row
    pub number: u32,
}

impl fmt::Display for SeatPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.section, self.row, self.number)
    }
}

/// Canonical state of a single seat.
///
/// Owned by the seat registry; all mutation goes through registry
/// operations. The `version` field is the optimistic concurrency token:
/// stores bump it on every applied update and reject writes whose
/// expected version is stale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Seat {
    /// Seat identity
    pub id: SeatId,
    /// Venue the seat belongs to
    pub venue_id: VenueId,
    /// Position within the venue
    pub position: SeatPosition,
    /// Current lifecycle status
    pub status: SeatStatus,
    /// List price before adjustments
    pub base_price: Money,
    /// Price currently charged (dynamic pricing, promos)
    pub effective_price: Money,
    /// Lease expiry while held; `None` unless status is a hold status
    pub held_until: Option<DateTime<Utc>>,
    /// Claimant owning the current hold; `None` unless held
    pub hold_ref: Option<ClaimantId>,
    /// How many times this seat has been selected (any claim attempt that succeeded)
    pub selection_count: u64,
    /// Demand signal used to order search results
    pub popularity_score: f64,
    /// Wheelchair-accessible seat
    pub accessible: bool,
    /// Optimistic concurrency version, managed by the store
    pub version: u64,
}

impl Seat {
    /// Creates an available seat with no hold bookkeeping.
    #[must_use]
    pub fn new(venue_id: VenueId, position: SeatPosition, base_price: Money) -> Self {
        Self {
            id: SeatId::new(),
            venue_id,
            position,
            status: SeatStatus::Available,
            base_price,
            effective_price: base_price,
            held_until: None,
            hold_ref: None,
            selection_count: 0,
            popularity_score: 0.0,
            accessible: false,
            version: 0,
        }
    }

    /// Invariant check: hold bookkeeping is present exactly when the
    /// status is a hold status.
    #[must_use]
    pub const fn hold_state_consistent(&self) -> bool {
        if self.status.is_held() {
            self.held_until.is_some() && self.hold_ref.is_some()
        } else {
            self.held_until.is_none() && self.hold_ref.is_none()
        }
    }

    /// Whether `claimant` currently owns the hold on this seat.
    #[must_use]
    pub fn held_by(&self, claimant: &ClaimantId) -> bool {
        self.status.is_held() && self.hold_ref.as_ref() == Some(claimant)
    }
}

// ============================================================================
// Reservation
// ============================================================================

/// Lifecycle status of a reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReservationStatus {
    /// Hold is live; the seat is kept out of inventory
    Active,
    /// TTL elapsed; reclaimed by the sweep
    Expired,
    /// Explicitly released before expiry
    Cancelled,
    /// Converted to a sale
    Completed,
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// What kind of hold a reservation represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReservationKind {
    /// Ordinary selection hold (default TTL)
    Temporary,
    /// Checkout-flow hold (shorter, operator-configurable TTL)
    Checkout,
    /// Operator hold; not reclaimed by the sweep, expiry is advisory
    AdministrativeHold,
    /// Hold created on behalf of a group booking request
    Group,
}

/// A time-bounded exclusive claim on one seat.
///
/// Reservations are append-only from the caller's point of view: they
/// transition between statuses but are never deleted, so the ledger
/// doubles as an audit trail. The `version` field works like
/// [`Seat::version`] and makes racing transitions (manual release vs
/// sweep) commute: whoever writes first wins, the loser observes a
/// non-active record and no-ops.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation identity
    pub id: ReservationId,
    /// The held seat
    pub seat_id: SeatId,
    /// Venue of the held seat (denormalized for notification routing)
    pub venue_id: VenueId,
    /// Session or user owning the hold
    pub claimant: ClaimantId,
    /// Current lifecycle status
    pub status: ReservationStatus,
    /// What kind of hold this is
    pub kind: ReservationKind,
    /// Hard expiry of the lease
    pub expires_at: DateTime<Utc>,
    /// Price frozen at claim time
    pub reserved_price: Money,
    /// Number of extensions granted so far
    pub extension_count: u32,
    /// Sale reference recorded on completion
    pub completion_ref: Option<String>,
    /// Back-reference to the owning group request, if any (non-owning)
    pub group_ref: Option<GroupRequestId>,
    /// Reason recorded on cancellation
    pub cancel_reason: Option<String>,
    /// When the hold was created
    pub created_at: DateTime<Utc>,
    /// Last transition time
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version, managed by the store
    pub version: u64,
}

impl Reservation {
    /// Whether the reservation is still active at `now`.
    ///
    /// An active record whose `expires_at` has passed is *lapsed*: the
    /// sweep has not reclaimed it yet, but no operation other than the
    /// sweep may act on it.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Active && self.expires_at > now
    }
}

// ============================================================================
// Group booking
// ============================================================================

/// How seats in a group request must relate to each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupPolicy {
    /// Strictly consecutive seat numbers in one row
    Adjacent,
    /// All seats in the same row (consecutive preferred)
    SameRow,
    /// All seats in the same section, spread across rows allowed
    SameSection,
    /// Quantity satisfaction only
    Flexible,
}

impl GroupPolicy {
    /// The row spread this policy permits, given the caller's preference.
    ///
    /// `Adjacent` and `SameRow` always force a spread of 1; the other
    /// policies honor `max_row_spread` (default 3).
    #[must_use]
    pub fn effective_row_spread(self, max_row_spread: Option<u32>) -> u32 {
        match self {
            Self::Adjacent | Self::SameRow => 1,
            Self::SameSection | Self::Flexible => max_row_spread.unwrap_or(3).max(1),
        }
    }
}

/// Preference filters applied when searching for seats.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SeatPreferences {
    /// Lowest acceptable effective price
    pub min_price: Option<Money>,
    /// Highest acceptable effective price
    pub max_price: Option<Money>,
    /// Only wheelchair-accessible seats
    pub accessible_only: bool,
    /// Sections the requester refuses
    pub avoid_sections: Vec<String>,
    /// Maximum number of rows a group may be spread across
    pub max_row_spread: Option<u32>,
}

impl SeatPreferences {
    /// Whether `seat` passes the price / accessibility / section filters.
    #[must_use]
    pub fn admits(&self, seat: &Seat) -> bool {
        if let Some(min) = self.min_price {
            if seat.effective_price < min {
                return false;
            }
        }
        if let Some(max) = self.max_price {
            if seat.effective_price > max {
                return false;
            }
        }
        if self.accessible_only && !seat.accessible {
            return false;
        }
        !self
            .avoid_sections
            .iter()
            .any(|s| s == &seat.position.section)
    }
}

/// Fulfillment state of a group booking request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupStatus {
    /// Created, no seats confirmed yet
    Pending,
    /// Some seats confirmed, request still open
    Partial,
    /// All requested seats confirmed
    Confirmed,
    /// Explicitly cancelled or expired
    Cancelled,
}

/// A request for multiple seats satisfying a grouping policy,
/// fulfilled incrementally.
///
/// 1:N with the reservations it produced; each reservation carries a
/// `group_ref` back to this request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupBookingRequest {
    /// Request identity
    pub id: GroupRequestId,
    /// Venue seats are drawn from
    pub venue_id: VenueId,
    /// Requester owning all produced holds
    pub claimant: ClaimantId,
    /// Seats asked for
    pub requested: u32,
    /// Grouping policy
    pub policy: GroupPolicy,
    /// Preference filters
    pub prefs: SeatPreferences,
    /// Fulfillment state
    pub status: GroupStatus,
    /// Seats confirmed so far, with the reservation holding each
    pub confirmed: Vec<(SeatId, ReservationId)>,
    /// When the whole request lapses
    pub expires_at: DateTime<Utc>,
    /// Sum of reserved prices, after discount
    pub total_price: Money,
    /// Group discount currently applied
    pub discount: Money,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl GroupBookingRequest {
    /// Confirmed seats as a fraction of requested, in percent.
    #[must_use]
    pub fn fulfillment_rate(&self) -> u32 {
        if self.requested == 0 {
            return 100;
        }
        #[allow(clippy::cast_possible_truncation)]
        {
            (self.confirmed.len() as u64 * 100 / u64::from(self.requested)) as u32
        }
    }
}

// ============================================================================
// Availability snapshot
// ============================================================================

/// Denormalized per-venue seat counts by status.
///
/// Purely derived from the registry; recomputed after batch mutations
/// and never authoritative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// Seats free to claim
    pub available: u64,
    /// Seats under an ordinary hold
    pub held: u64,
    /// Seats held in checkout
    pub reserved_for_checkout: u64,
    /// Seats sold
    pub sold: u64,
    /// Seats blocked by an operator
    pub blocked: u64,
    /// Seats out of service
    pub maintenance: u64,
}

impl StatusCounts {
    /// Total seats covered by the snapshot.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.available
            + self.held
            + self.reserved_for_checkout
            + self.sold
            + self.blocked
            + self.maintenance
    }

    /// Bump the count for `status` by one.
    pub fn record(&mut self, status: SeatStatus) {
        match status {
            SeatStatus::Available => self.available += 1,
            SeatStatus::Held => self.held += 1,
            SeatStatus::ReservedForCheckout => self.reserved_for_checkout += 1,
            SeatStatus::Sold => self.sold += 1,
            SeatStatus::Blocked => self.blocked += 1,
            SeatStatus::Maintenance => self.maintenance += 1,
        }
    }
}

/// Point-in-time availability read-model for one venue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AvailabilitySnapshot {
    /// Venue the counts describe
    pub venue_id: VenueId,
    /// Counts by seat status
    pub counts: StatusCounts,
    /// When the snapshot was computed
    pub taken_at: DateTime<Utc>,
}
