//! Successful results with attached warnings.

use crate::error::RaffleError;
use crate::types::{Ticket, TicketId};
use serde::{Deserialize, Serialize};

/// A degraded-success note attached to a committed result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// The notification queue refused the event; it will not be delivered
    NotificationDropped {
        /// Event type that was dropped
        event_type: String,
        /// Why
        reason: String,
    },
}

/// A committed result plus any side-channel warnings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome<T> {
    /// The result
    pub value: T,
    /// Warnings, empty on a clean run
    pub warnings: Vec<Warning>,
}

impl<T> Outcome<T> {
    /// Result without warnings
    #[must_use]
    pub const fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    /// Attach a warning if present
    #[must_use]
    pub fn with_warning(mut self, warning: Option<Warning>) -> Self {
        self.warnings.extend(warning);
        self
    }

    /// Whether any side effect degraded
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Map the value, keeping warnings
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}

/// A ticket of a group that could not transition.
#[derive(Debug)]
pub struct GroupFailure {
    /// Ticket left unchanged
    pub ticket_id: TicketId,
    /// Why
    pub error: RaffleError,
}

/// Result of a decision applied to every ticket sharing a payment proof.
#[derive(Debug, Default)]
pub struct GroupOutcome {
    /// Tickets after the transition
    pub applied: Vec<Ticket>,
    /// Tickets that kept their previous state
    pub failures: Vec<GroupFailure>,
}

impl GroupOutcome {
    /// Whether every ticket of the group transitioned
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
