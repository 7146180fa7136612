//! In-memory `RaffleStore` for fast, deterministic tests.
//!
//! Committed state lives behind a `std::sync::RwLock`. Each raffle has its own
//! `tokio::sync::Mutex`; a transaction holds it for its whole lifetime, works on a
//! private copy of the raffle's rows and swaps them in on commit. Reads outside a
//! transaction never wait for one, like readers under MVCC.

use async_trait::async_trait;
use raffle_core::error::StoreError;
use raffle_core::store::{RaffleStore, RaffleTransaction};
use raffle_core::types::{
    ActorId, PurchaseId, Raffle, RaffleId, RaffleStatus, Ticket, TicketId, TicketNumber,
    TicketStatus,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Default)]
struct State {
    raffles: HashMap<RaffleId, Raffle>,
    tickets: HashMap<RaffleId, Vec<Ticket>>,
}

/// HashMap-backed raffle store with per-raffle exclusive transactions.
///
/// Enforces the same uniqueness rule as the database: at most one live
/// pending/approved ticket per `(raffle, number)`.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRaffleStore {
    state: Arc<RwLock<State>>,
    locks: Arc<Mutex<HashMap<RaffleId, Arc<tokio::sync::Mutex<()>>>>>,
    injected_conflicts: Arc<AtomicUsize>,
}

impl InMemoryRaffleStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` ticket inserts fail with `NumberTaken`, as if a
    /// concurrent writer had won the race.
    pub fn inject_conflicts(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Number of committed tickets across all raffles, tombstones included
    #[must_use]
    pub fn ticket_count(&self) -> usize {
        self.read().tickets.values().map(Vec::len).sum()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn raffle_lock(&self, raffle_id: RaffleId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(raffle_id).or_default())
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn occupies_index(ticket: &Ticket) -> bool {
    ticket.is_live()
        && ticket.ticket_number.is_some()
        && matches!(ticket.status, TicketStatus::Pending | TicketStatus::Approved)
}

fn sort_newest_first(tickets: &mut [Ticket]) {
    tickets.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.ticket_number.cmp(&b.ticket_number))
    });
}

#[async_trait]
impl RaffleStore for InMemoryRaffleStore {
    async fn insert_raffle(&self, raffle: &Raffle) -> Result<(), StoreError> {
        let mut state = self.write();
        if state.raffles.contains_key(&raffle.id) {
            return Err(StoreError::Database(format!("duplicate raffle id {}", raffle.id)));
        }
        state.raffles.insert(raffle.id, raffle.clone());
        state.tickets.insert(raffle.id, Vec::new());
        Ok(())
    }

    async fn load_raffle(&self, id: RaffleId) -> Result<Option<Raffle>, StoreError> {
        Ok(self.read().raffles.get(&id).cloned())
    }

    async fn list_raffles(&self) -> Result<Vec<Raffle>, StoreError> {
        let mut raffles: Vec<Raffle> = self.read().raffles.values().cloned().collect();
        raffles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(raffles)
    }

    async fn delete_raffle(&self, id: RaffleId) -> Result<bool, StoreError> {
        let lock = self.raffle_lock(id);
        let existed = {
            let _guard = lock.lock().await;
            let mut state = self.write();
            state.tickets.remove(&id);
            state.raffles.remove(&id).is_some()
        };
        // Ids are never reused, so waiters still holding the old mutex find no raffle.
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        Ok(existed)
    }

    async fn load_tickets(&self, raffle_id: RaffleId) -> Result<Vec<Ticket>, StoreError> {
        Ok(self.read().tickets.get(&raffle_id).cloned().unwrap_or_default())
    }

    async fn load_all_tickets(&self) -> Result<Vec<Ticket>, StoreError> {
        Ok(self.read().tickets.values().flatten().cloned().collect())
    }

    async fn load_ticket(&self, id: TicketId) -> Result<Option<Ticket>, StoreError> {
        Ok(self
            .read()
            .tickets
            .values()
            .flatten()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn tickets_for_owner(&self, owner: ActorId) -> Result<Vec<Ticket>, StoreError> {
        let mut tickets: Vec<Ticket> = self
            .read()
            .tickets
            .values()
            .flatten()
            .filter(|t| t.owner_id == Some(owner))
            .cloned()
            .collect();
        sort_newest_first(&mut tickets);
        Ok(tickets)
    }

    async fn tickets_for_purchase(
        &self,
        purchase_id: PurchaseId,
    ) -> Result<Vec<Ticket>, StoreError> {
        let mut tickets: Vec<Ticket> = self
            .read()
            .tickets
            .values()
            .flatten()
            .filter(|t| t.purchase_id == purchase_id)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.ticket_number);
        Ok(tickets)
    }

    async fn begin(
        &self,
        raffle_id: RaffleId,
    ) -> Result<Option<Box<dyn RaffleTransaction>>, StoreError> {
        let guard = self.raffle_lock(raffle_id).lock_owned().await;
        let (raffle, tickets) = {
            let state = self.read();
            let Some(raffle) = state.raffles.get(&raffle_id).cloned() else {
                return Ok(None);
            };
            let tickets = state.tickets.get(&raffle_id).cloned().unwrap_or_default();
            (raffle, tickets)
        };
        Ok(Some(Box::new(InMemoryTransaction {
            store: self.clone(),
            _guard: guard,
            raffle,
            raffle_changed: false,
            tickets,
        })))
    }
}

struct InMemoryTransaction {
    store: InMemoryRaffleStore,
    _guard: OwnedMutexGuard<()>,
    raffle: Raffle,
    raffle_changed: bool,
    tickets: Vec<Ticket>,
}

impl InMemoryTransaction {
    fn number_taken_by_other(&self, ticket: &Ticket) -> bool {
        occupies_index(ticket)
            && self.tickets.iter().any(|other| {
                other.id != ticket.id
                    && occupies_index(other)
                    && other.ticket_number == ticket.ticket_number
            })
    }

    fn number_taken(&self, ticket: &Ticket) -> StoreError {
        StoreError::NumberTaken {
            raffle_id: self.raffle.id,
            number: ticket.ticket_number.unwrap_or(TicketNumber::new(0)),
        }
    }
}

#[async_trait]
impl RaffleTransaction for InMemoryTransaction {
    fn raffle(&self) -> &Raffle {
        &self.raffle
    }

    async fn tickets(&mut self) -> Result<Vec<Ticket>, StoreError> {
        Ok(self.tickets.clone())
    }

    async fn insert_tickets(&mut self, tickets: &[Ticket]) -> Result<(), StoreError> {
        if let Some(first) = tickets.first() {
            if self.store.take_injected_conflict() {
                return Err(self.number_taken(first));
            }
        }

        let before = self.tickets.len();
        for ticket in tickets {
            if self.number_taken_by_other(ticket) {
                let err = self.number_taken(ticket);
                self.tickets.truncate(before);
                return Err(err);
            }
            self.tickets.push(ticket.clone());
        }
        Ok(())
    }

    async fn update_ticket(&mut self, previous: &Ticket, next: &Ticket) -> Result<(), StoreError> {
        let stale = || StoreError::StaleWrite {
            entity: "ticket",
            id: previous.id.to_string(),
        };
        let index = self
            .tickets
            .iter()
            .position(|t| t.id == previous.id)
            .ok_or_else(stale)?;
        let current = &self.tickets[index];
        if current.status != previous.status || current.deleted_at != previous.deleted_at {
            return Err(stale());
        }
        if self.number_taken_by_other(next) {
            return Err(self.number_taken(next));
        }
        self.tickets[index] = next.clone();
        Ok(())
    }

    async fn update_raffle(
        &mut self,
        next: &Raffle,
        expected: RaffleStatus,
    ) -> Result<(), StoreError> {
        if self.raffle.status != expected || next.id != self.raffle.id {
            return Err(StoreError::StaleWrite {
                entity: "raffle",
                id: self.raffle.id.to_string(),
            });
        }
        self.raffle = next.clone();
        self.raffle_changed = true;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        let mut state = this.store.write();
        if !state.raffles.contains_key(&this.raffle.id) {
            return Err(StoreError::StaleWrite {
                entity: "raffle",
                id: this.raffle.id.to_string(),
            });
        }
        if this.raffle_changed {
            state.raffles.insert(this.raffle.id, this.raffle.clone());
        }
        state.tickets.insert(this.raffle.id, this.tickets);
        Ok(())
    }
}
