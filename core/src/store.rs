//! Persistence contract for raffles and tickets.
//!
//! # Implementations
//!
//! - `PostgresRaffleStore` (in `raffle-postgres`): production storage
//! - `InMemoryRaffleStore` (in `raffle-testing`): fast, deterministic tests
//!
//! # Atomic units
//!
//! Every check-then-write sequence (allocate + insert, restore, confirm, draw) runs
//! inside a [`RaffleTransaction`] obtained from [`RaffleStore::begin`]. A
//! transaction excludes every other transaction on the same raffle until it is
//! committed or dropped. On top of that, the store enforces the uniqueness of
//! `(raffle_id, ticket_number)` among live pending/approved rows and reports a
//! violation as [`StoreError::NumberTaken`].
//!
//! Do not call other store methods on the same raffle while holding its
//! transaction: the in-memory implementation would wait on itself.

use crate::error::StoreError;
use crate::types::{ActorId, PurchaseId, Raffle, RaffleId, RaffleStatus, Ticket, TicketId};
use async_trait::async_trait;

/// Durable record of raffles and their tickets.
#[async_trait]
pub trait RaffleStore: Send + Sync {
    /// Insert a new raffle.
    ///
    /// # Errors
    ///
    /// `Database` if the write fails.
    async fn insert_raffle(&self, raffle: &Raffle) -> Result<(), StoreError>;

    /// Load one raffle.
    ///
    /// # Errors
    ///
    /// `Database` or `Corrupt` on read failure.
    async fn load_raffle(&self, id: RaffleId) -> Result<Option<Raffle>, StoreError>;

    /// All raffles, newest first.
    ///
    /// # Errors
    ///
    /// `Database` or `Corrupt` on read failure.
    async fn list_raffles(&self) -> Result<Vec<Raffle>, StoreError>;

    /// Physically delete a raffle and its tickets. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// `Database` if the write fails.
    async fn delete_raffle(&self, id: RaffleId) -> Result<bool, StoreError>;

    /// Every ticket of the raffle, tombstoned rows included.
    ///
    /// # Errors
    ///
    /// `Database` or `Corrupt` on read failure.
    async fn load_tickets(&self, raffle_id: RaffleId) -> Result<Vec<Ticket>, StoreError>;

    /// Every ticket of every raffle, tombstoned rows included.
    ///
    /// # Errors
    ///
    /// `Database` or `Corrupt` on read failure.
    async fn load_all_tickets(&self) -> Result<Vec<Ticket>, StoreError>;

    /// Load one ticket.
    ///
    /// # Errors
    ///
    /// `Database` or `Corrupt` on read failure.
    async fn load_ticket(&self, id: TicketId) -> Result<Option<Ticket>, StoreError>;

    /// Tickets bought by an actor, newest first, tombstoned rows included.
    ///
    /// # Errors
    ///
    /// `Database` or `Corrupt` on read failure.
    async fn tickets_for_owner(&self, owner: ActorId) -> Result<Vec<Ticket>, StoreError>;

    /// Tickets created by one purchase or reservation, ordered by number.
    ///
    /// # Errors
    ///
    /// `Database` or `Corrupt` on read failure.
    async fn tickets_for_purchase(&self, purchase_id: PurchaseId) -> Result<Vec<Ticket>, StoreError>;

    /// Open the atomic unit for one raffle, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// `Database` if the transaction cannot be started.
    async fn begin(
        &self,
        raffle_id: RaffleId,
    ) -> Result<Option<Box<dyn RaffleTransaction>>, StoreError>;
}

/// Exclusive, all-or-nothing unit of work on one raffle.
///
/// Dropping a transaction without calling [`commit`](Self::commit) discards every
/// staged write.
#[async_trait]
pub trait RaffleTransaction: Send {
    /// The raffle row as read when the unit was opened (or as last staged).
    fn raffle(&self) -> &Raffle;

    /// Every ticket of the raffle inside this unit, staged writes included.
    ///
    /// # Errors
    ///
    /// `Database` or `Corrupt` on read failure.
    async fn tickets(&mut self) -> Result<Vec<Ticket>, StoreError>;

    /// Insert new tickets, all or none.
    ///
    /// # Errors
    ///
    /// `NumberTaken` if any ticket would share a number with a live
    /// pending/approved row.
    async fn insert_tickets(&mut self, tickets: &[Ticket]) -> Result<(), StoreError>;

    /// Replace `previous` with `next` if its status and tombstone are unchanged.
    ///
    /// # Errors
    ///
    /// `StaleWrite` if the stored row no longer matches `previous`, `NumberTaken`
    /// if `next` would re-occupy a held number.
    async fn update_ticket(&mut self, previous: &Ticket, next: &Ticket) -> Result<(), StoreError>;

    /// Replace the raffle row if its status is still `expected`.
    ///
    /// # Errors
    ///
    /// `StaleWrite` if the status changed.
    async fn update_raffle(
        &mut self,
        next: &Raffle,
        expected: RaffleStatus,
    ) -> Result<(), StoreError>;

    /// Make every staged write durable.
    ///
    /// # Errors
    ///
    /// `Database` if the commit fails, `NumberTaken` if a deferred uniqueness
    /// check fails.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
