//! Outbound notification events.
//!
//! Delivery is best-effort and asynchronous. A sink failure is logged by the
//! dispatcher and never changes the result of the operation that produced the
//! event.

use crate::types::{Money, TicketNumber};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Structured payload handed to a [`NotificationSink`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A raffle was created
    RaffleCreated {
        /// Title
        title: String,
        /// Description
        description: Option<String>,
        /// Ticket price
        price: Money,
        /// Capacity
        total_tickets: u32,
        /// Image locator
        image_url: Option<String>,
    },

    /// A raffle was deleted
    RaffleDeleted {
        /// Title of the deleted raffle
        title: String,
    },

    /// One or more tickets of a buyer were approved
    PaymentApproved {
        /// Raffle title
        raffle_title: String,
        /// Buyer's name
        participant_name: String,
        /// Approved numbers
        ticket_numbers: Vec<TicketNumber>,
        /// `price × numbers`
        total_amount: Money,
    },

    /// A winner was drawn
    WinnerSelected {
        /// Raffle title
        raffle_title: String,
        /// Winner's name
        winner_name: String,
        /// Winning number
        winner_number: TicketNumber,
        /// Prize (the raffle description)
        prize: Option<String>,
        /// Distinct buyers with approved tickets
        total_participants: u32,
        /// Revenue from approved tickets
        total_revenue: Money,
    },
}

impl NotificationEvent {
    /// Event type label
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::RaffleCreated { .. } => "raffle_created",
            Self::RaffleDeleted { .. } => "raffle_deleted",
            Self::PaymentApproved { .. } => "payment_approved",
            Self::WinnerSelected { .. } => "winner_selected",
        }
    }
}

/// Delivery failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Receiver of notification events (chat webhook, mail, log).
pub trait NotificationSink: Send + Sync {
    /// Deliver one event
    ///
    /// # Errors
    ///
    /// Returns error if delivery fails; the dispatcher only logs it.
    fn deliver(
        &self,
        event: NotificationEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>>;
}
