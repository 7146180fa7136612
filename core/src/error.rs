//! Error taxonomy for raffle operations.
//!
//! Every variant is recoverable: callers get enough context (raffle, ticket, number)
//! to decide whether to retry or to tell the end user. Side-channel failures
//! (notifications) are never reported through these types; see
//! [`crate::outcome::Warning`].

use crate::types::{
    ActorId, PurchaseId, RaffleId, RaffleStatus, TicketId, TicketNumber, TicketStatus,
};
use thiserror::Error;

/// Flat classification of [`RaffleError`], stable across variants' payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Raffle or ticket absent
    NotFound,
    /// Operation not permitted in the current raffle or ticket status
    InvalidState,
    /// No numbers left, or no approved tickets to draw from
    NoCapacity,
    /// Ticket is not in the expected pre-transition status
    AlreadyDecided,
    /// Number reoccupied since it was read
    Conflict,
    /// Atomic retry budget exhausted
    Contention,
    /// Malformed input
    Validation,
    /// Operator-only operation attempted by a buyer
    Forbidden,
    /// Storage or blob infrastructure failure
    Infrastructure,
}

/// Errors returned by raffle operations.
#[derive(Error, Debug)]
pub enum RaffleError {
    /// Raffle not found
    #[error("Raffle not found: {0}")]
    RaffleNotFound(RaffleId),

    /// Ticket not found
    #[error("Ticket not found: {0}")]
    TicketNotFound(TicketId),

    /// No tickets belong to the purchase
    #[error("Purchase not found: {0}")]
    PurchaseNotFound(PurchaseId),

    /// A number that is not an approved, live ticket of the raffle
    #[error("Number {number} is not an approved ticket of raffle {raffle_id}")]
    EntryNotFound {
        /// Raffle searched
        raffle_id: RaffleId,
        /// Requested number
        number: TicketNumber,
    },

    /// No live tickets share the given payment proof
    #[error("No tickets of raffle {raffle_id} match payment proof {proof}")]
    GroupNotFound {
        /// Raffle searched
        raffle_id: RaffleId,
        /// Proof locator used as group key
        proof: String,
    },

    /// Raffle status forbids the operation
    #[error("Raffle {raffle_id} is {status}: cannot {operation}")]
    RaffleNotOpen {
        /// Raffle
        raffle_id: RaffleId,
        /// Its current status
        status: RaffleStatus,
        /// Operation attempted
        operation: &'static str,
    },

    /// Ticket state forbids the operation
    #[error("Ticket {ticket_id} cannot {operation}: {reason}")]
    TicketState {
        /// Ticket
        ticket_id: TicketId,
        /// Operation attempted
        operation: &'static str,
        /// Why it was refused
        reason: String,
    },

    /// Capacity can no longer change
    #[error("Raffle {raffle_id} already has tickets: capacity is fixed")]
    CapacityLocked {
        /// Raffle
        raffle_id: RaffleId,
    },

    /// No free numbers left, or nothing to draw from
    #[error("Raffle {raffle_id} has no capacity: {reason}")]
    NoCapacity {
        /// Raffle
        raffle_id: RaffleId,
        /// Explanation
        reason: String,
    },

    /// Ticket already left the pending status
    #[error("Ticket {ticket_id} already decided: status is {status}")]
    AlreadyDecided {
        /// Ticket
        ticket_id: TicketId,
        /// Its current status
        status: TicketStatus,
    },

    /// Number reoccupied by another ticket
    #[error("Number {number} of raffle {raffle_id} is held by another ticket")]
    Conflict {
        /// Raffle
        raffle_id: RaffleId,
        /// Contested number
        number: TicketNumber,
        /// Ticket that could not take the number, when known
        ticket_id: Option<TicketId>,
    },

    /// Allocation kept colliding with concurrent writers
    #[error("Allocation on raffle {raffle_id} gave up after {attempts} attempts")]
    Contention {
        /// Raffle
        raffle_id: RaffleId,
        /// Attempts made
        attempts: usize,
    },

    /// Malformed input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Operator-only operation attempted by a buyer
    #[error("Actor {actor_id} is not allowed to {operation}")]
    Forbidden {
        /// Caller
        actor_id: ActorId,
        /// Operation attempted
        operation: &'static str,
    },

    /// Storage failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Blob store failure
    #[error("Blob store error: {0}")]
    Blob(#[from] BlobError),
}

impl RaffleError {
    /// Taxonomy of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::RaffleNotFound(_)
            | Self::TicketNotFound(_)
            | Self::PurchaseNotFound(_)
            | Self::EntryNotFound { .. }
            | Self::GroupNotFound { .. } => ErrorKind::NotFound,
            Self::RaffleNotOpen { .. } | Self::TicketState { .. } | Self::CapacityLocked { .. } => {
                ErrorKind::InvalidState
            },
            Self::NoCapacity { .. } => ErrorKind::NoCapacity,
            Self::AlreadyDecided { .. } => ErrorKind::AlreadyDecided,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Contention { .. } => ErrorKind::Contention,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::Store(_) | Self::Blob(_) => ErrorKind::Infrastructure,
        }
    }

    /// Shorthand for a validation failure
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Errors from the raffle/ticket store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Writing would give a number to two live pending/approved tickets
    #[error("Number {number} of raffle {raffle_id} is already taken")]
    NumberTaken {
        /// Raffle
        raffle_id: RaffleId,
        /// Number
        number: TicketNumber,
    },

    /// Compare-and-set failed: the row changed since it was read
    #[error("Stale write on {entity} {id}")]
    StaleWrite {
        /// "raffle" or "ticket"
        entity: &'static str,
        /// Row identifier
        id: String,
    },

    /// Database connection or query failure
    #[error("Database error: {0}")]
    Database(String),

    /// Stored data could not be decoded
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Errors from the payment-proof blob store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlobError {
    /// Empty or otherwise unacceptable payload
    #[error("Rejected upload: {0}")]
    Rejected(String),

    /// Underlying storage failure
    #[error("Storage failure: {0}")]
    Storage(String),
}

/// Result type used across raffle operations
pub type Result<T> = std::result::Result<T, RaffleError>;
