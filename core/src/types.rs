//! Domain types for numbered raffles.
//!
//! A [`Raffle`] is a fixed pool of numbers `1..=total_tickets`. A [`Ticket`] is one
//! number held by one buyer and moves through the approval lifecycle described in
//! [`crate::lifecycle`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
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

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a raffle
    RaffleId
);
uuid_id!(
    /// Unique identifier for a ticket row
    TicketId
);
uuid_id!(
    /// Identifier of an authenticated actor (buyer or operator)
    ActorId
);
uuid_id!(
    /// Identifier shared by every ticket created in one purchase or reservation
    PurchaseId
);

/// A ticket number inside a raffle, `1..=total_tickets`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketNumber(u32);

impl TicketNumber {
    /// Creates a ticket number
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw number
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Whether the number lies in `1..=total`
    #[must_use]
    pub const fn in_range(self, total: u32) -> bool {
        self.0 >= 1 && self.0 <= total
    }
}

impl fmt::Display for TicketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money (minor units to avoid floating point errors)
// ============================================================================

/// Money in minor currency units (cents).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

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

    /// Multiplies by a count, `None` on overflow
    #[must_use]
    pub const fn checked_times(self, count: u64) -> Option<Self> {
        match self.0.checked_mul(count) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Adds two amounts, `None` on overflow
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Opaque locator of an uploaded payment proof.
///
/// Tickets bought in one transaction share the same locator; operators decide on
/// them as a group keyed by this value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProofRef(String);

impl ProofRef {
    /// Wraps a locator string
    #[must_use]
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    /// The locator string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProofRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Actor
// ============================================================================

/// The caller of an operation, as asserted by the identity provider.
///
/// The engine trusts `is_operator` without re-verifying credentials.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Actor identifier
    pub id: ActorId,
    /// Whether the actor may administer raffles and decide on tickets
    pub is_operator: bool,
}

impl Actor {
    /// A buyer without operator rights
    #[must_use]
    pub const fn buyer(id: ActorId) -> Self {
        Self {
            id,
            is_operator: false,
        }
    }

    /// An operator
    #[must_use]
    pub const fn operator(id: ActorId) -> Self {
        Self {
            id,
            is_operator: true,
        }
    }
}

// ============================================================================
// Raffle
// ============================================================================

/// Raffle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaffleStatus {
    /// Selling tickets
    Active,
    /// Winner drawn; terminal
    Completed,
    /// Deactivated by an operator; can be reactivated
    Cancelled,
}

impl RaffleStatus {
    /// Storage representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the storage representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for RaffleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raffle definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Raffle {
    /// Raffle ID
    pub id: RaffleId,
    /// Title
    pub title: String,
    /// Optional description (usually the prize)
    pub description: Option<String>,
    /// Price of one ticket
    pub ticket_price: Money,
    /// Capacity: numbers run from 1 to this value
    pub total_tickets: u32,
    /// Optional image locator
    pub image_url: Option<String>,
    /// Current status
    pub status: RaffleStatus,
    /// Winning number, set only when completed
    pub winner_ticket_number: Option<TicketNumber>,
    /// Planned draw date
    pub draw_date: Option<DateTime<Utc>>,
    /// When the raffle was created
    pub created_at: DateTime<Utc>,
    /// Operator who created it
    pub created_by: Option<ActorId>,
}

impl Raffle {
    /// Whether the raffle accepts purchases and draws
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == RaffleStatus::Active
    }
}

/// Input for creating a raffle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRaffle {
    /// Title
    pub title: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// Ticket price in cents
    pub ticket_price: Money,
    /// Capacity
    pub total_tickets: u32,
    /// Optional image locator
    #[serde(default)]
    pub image_url: Option<String>,
    /// Planned draw date
    #[serde(default)]
    pub draw_date: Option<DateTime<Utc>>,
}

/// Partial update of a raffle's editable fields. `None` leaves a field unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaffleUpdate {
    /// New title
    #[serde(default)]
    pub title: Option<String>,
    /// New description
    #[serde(default)]
    pub description: Option<String>,
    /// New price
    #[serde(default)]
    pub ticket_price: Option<Money>,
    /// New capacity; only accepted while the raffle has no tickets
    #[serde(default)]
    pub total_tickets: Option<u32>,
    /// New image locator
    #[serde(default)]
    pub image_url: Option<String>,
    /// New draw date
    #[serde(default)]
    pub draw_date: Option<DateTime<Utc>>,
}

// ============================================================================
// Ticket
// ============================================================================

/// Ticket status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Held until `reserved_until`, waiting for a payment proof
    Reserved,
    /// Payment proof submitted, waiting for an operator decision
    Pending,
    /// Accepted; a binding entry in the draw
    Approved,
    /// Refused; the number returns to the pool
    Rejected,
}

impl TicketStatus {
    /// Storage representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Reserved => "reserved",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parse the storage representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reserved" => Some(Self::Reserved),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One numbered entry of a raffle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket ID
    pub id: TicketId,
    /// Owning raffle
    pub raffle_id: RaffleId,
    /// Purchase or reservation this ticket was created by
    pub purchase_id: PurchaseId,
    /// Buyer
    pub owner_id: Option<ActorId>,
    /// Buyer's full name
    pub full_name: String,
    /// Buyer's identity document
    pub rg: String,
    /// Payment proof; absent only while reserved
    pub payment_proof: Option<ProofRef>,
    /// Assigned number
    pub ticket_number: Option<TicketNumber>,
    /// Current status
    pub status: TicketStatus,
    /// When the ticket was created
    pub created_at: DateTime<Utc>,
    /// When an operator decided on the ticket
    pub approved_at: Option<DateTime<Utc>>,
    /// Operator who decided
    pub approved_by: Option<ActorId>,
    /// Hold expiry for reserved tickets
    pub reserved_until: Option<DateTime<Utc>>,
    /// Soft-delete marker; `None` means live
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Whether the ticket is not tombstoned
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Whether a reservation hold has lapsed at `now`
    #[must_use]
    pub fn hold_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == TicketStatus::Reserved
            && self.reserved_until.is_none_or(|until| until <= now)
    }

    /// The used-number rule.
    ///
    /// A ticket consumes its number iff it is live and either pending, approved, or
    /// reserved with an unexpired hold. Rejected tickets keep their number on the row
    /// but never consume it, so the number is eligible for re-allocation.
    #[must_use]
    pub fn holds_number(&self, now: DateTime<Utc>) -> bool {
        if !self.is_live() || self.ticket_number.is_none() {
            return false;
        }
        match self.status {
            TicketStatus::Pending | TicketStatus::Approved => true,
            TicketStatus::Reserved => !self.hold_lapsed(now),
            TicketStatus::Rejected => false,
        }
    }

    /// The number this ticket currently consumes, if any
    #[must_use]
    pub fn held_number(&self, now: DateTime<Utc>) -> Option<TicketNumber> {
        if self.holds_number(now) {
            self.ticket_number
        } else {
            None
        }
    }

    /// Approved and live: eligible to win
    #[must_use]
    pub fn is_entry(&self) -> bool {
        self.is_live() && self.status == TicketStatus::Approved && self.ticket_number.is_some()
    }
}

/// Result of a purchase or reservation.
///
/// `tickets.len()` may be smaller than `requested` when the raffle had fewer free
/// numbers left; that is a success, and callers must check [`Purchase::is_short`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    /// Shared purchase identifier
    pub purchase_id: PurchaseId,
    /// Quantity asked for
    pub requested: u32,
    /// Created tickets, ordered by number
    pub tickets: Vec<Ticket>,
}

impl Purchase {
    /// Whether fewer numbers than requested were allocated
    #[must_use]
    pub fn is_short(&self) -> bool {
        self.allocated() < self.requested
    }

    /// Number of tickets actually created
    #[must_use]
    pub fn allocated(&self) -> u32 {
        u32::try_from(self.tickets.len()).unwrap_or(u32::MAX)
    }

    /// Allocated numbers in ascending order
    #[must_use]
    pub fn numbers(&self) -> Vec<TicketNumber> {
        self.tickets.iter().filter_map(|t| t.ticket_number).collect()
    }
}

/// Request to buy `quantity` random numbers with a submitted payment proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    /// Raffle to buy from
    pub raffle_id: RaffleId,
    /// Buyer's full name
    pub full_name: String,
    /// Buyer's identity document
    pub rg: String,
    /// Uploaded payment proof
    pub payment_proof: ProofRef,
    /// Numbers requested
    pub quantity: u32,
}

/// Request to hold `quantity` random numbers before paying.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveRequest {
    /// Raffle to reserve from
    pub raffle_id: RaffleId,
    /// Buyer's full name
    pub full_name: String,
    /// Buyer's identity document
    pub rg: String,
    /// Numbers requested
    pub quantity: u32,
}

/// Operator decision on a pending ticket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Accept the payment
    Approve,
    /// Refuse the payment
    Reject,
}

impl Decision {
    /// Label used in logs and metrics
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ticket(status: TicketStatus) -> Ticket {
        Ticket {
            id: TicketId::new(),
            raffle_id: RaffleId::new(),
            purchase_id: PurchaseId::new(),
            owner_id: None,
            full_name: "Ana".to_string(),
            rg: "1".to_string(),
            payment_proof: Some(ProofRef::new("proof")),
            ticket_number: Some(TicketNumber::new(7)),
            status,
            created_at: Utc::now(),
            approved_at: None,
            approved_by: None,
            reserved_until: None,
            deleted_at: None,
        }
    }

    #[test]
    fn pending_and_approved_hold_their_number() {
        let now = Utc::now();
        assert!(ticket(TicketStatus::Pending).holds_number(now));
        assert!(ticket(TicketStatus::Approved).holds_number(now));
    }

    #[test]
    fn rejected_keeps_number_but_does_not_hold_it() {
        let rejected = ticket(TicketStatus::Rejected);
        assert_eq!(rejected.ticket_number, Some(TicketNumber::new(7)));
        assert!(!rejected.holds_number(Utc::now()));
    }

    #[test]
    fn tombstoned_ticket_does_not_hold_number() {
        let mut approved = ticket(TicketStatus::Approved);
        approved.deleted_at = Some(Utc::now());
        assert!(!approved.holds_number(Utc::now()));
        assert!(!approved.is_entry());
    }

    #[test]
    fn reservation_holds_until_expiry() {
        let now = Utc::now();
        let mut reserved = ticket(TicketStatus::Reserved);
        reserved.reserved_until = Some(now + Duration::minutes(5));
        assert!(reserved.holds_number(now));
        assert!(!reserved.holds_number(now + Duration::minutes(5)));
        assert!(reserved.hold_lapsed(now + Duration::minutes(6)));
    }

    #[test]
    fn money_display_and_overflow() {
        assert_eq!(Money::from_cents(1050).to_string(), "10.50");
        assert_eq!(Money::from_cents(u64::MAX).checked_times(2), None);
        assert_eq!(
            Money::from_cents(250).checked_times(4),
            Some(Money::from_cents(1000))
        );
    }

    #[test]
    fn status_round_trips_through_storage_strings() {
        for status in [
            TicketStatus::Reserved,
            TicketStatus::Pending,
            TicketStatus::Approved,
            TicketStatus::Rejected,
        ] {
            assert_eq!(TicketStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RaffleStatus::parse("bogus"), None);
    }
}
