//! The raffle engine: every operation as one atomic unit against the store.
//!
//! The pure components in `raffle-core` decide; this module sequences them
//! inside a [`RaffleTransaction`], commits, records metrics and hands
//! notifications to the [`Notifier`]. No store method is called for a raffle
//! while that raffle's transaction is open.

use crate::metrics::{AllocationMetrics, LifecycleMetrics};
use crate::notifier::Notifier;
use crate::retry::{RetryFailure, RetryPolicy, retry_with_predicate};
use chrono::{DateTime, Duration, Utc};
use raffle_core::allocator::{self, NumberAllocator};
use raffle_core::blob::BlobStore;
use raffle_core::draw::{self, DrawResult};
use raffle_core::environment::{Clock, RandomSource};
use raffle_core::error::{BlobError, RaffleError, Result, StoreError};
use raffle_core::lifecycle::{self, Holder};
use raffle_core::notification::NotificationEvent;
use raffle_core::outcome::{GroupFailure, GroupOutcome, Outcome, Warning};
use raffle_core::revenue::{self, GlobalStats, RaffleStats};
use raffle_core::store::{RaffleStore, RaffleTransaction};
use raffle_core::types::{
    Actor, Decision, Money, NewRaffle, ProofRef, Purchase, PurchaseId, PurchaseRequest, Raffle,
    RaffleId, RaffleStatus, RaffleUpdate, ReserveRequest, Ticket, TicketId, TicketNumber,
};
use std::sync::Arc;
use std::time::Instant;

/// Tunables of the engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Allocation attempts before giving up with `Contention`
    pub allocation_attempts: usize,
    /// Largest quantity one purchase may ask for
    pub max_tickets_per_purchase: u32,
    /// How long a reservation holds its numbers
    pub reservation_hold: Duration,
    /// Backoff before the first allocation retry
    pub retry_delay: std::time::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            allocation_attempts: 3,
            max_tickets_per_purchase: 100,
            reservation_hold: Duration::minutes(15),
            retry_delay: std::time::Duration::from_millis(5),
        }
    }
}

/// Injected collaborators.
#[derive(Clone)]
pub struct EngineEnvironment {
    /// Raffle and ticket storage
    pub store: Arc<dyn RaffleStore>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Randomness for allocation and draws
    pub random: Arc<dyn RandomSource>,
    /// Payment-proof storage
    pub blobs: Arc<dyn BlobStore>,
    /// Notification queue
    pub notifier: Notifier,
}

/// Raffle ticket allocation and lifecycle engine.
///
/// Cheap to clone; clones share every collaborator.
#[derive(Clone)]
pub struct RaffleEngine {
    env: EngineEnvironment,
    allocator: NumberAllocator,
    retry: RetryPolicy,
    config: EngineConfig,
}

impl std::fmt::Debug for RaffleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaffleEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn require_operator(actor: &Actor, operation: &'static str) -> Result<()> {
    if actor.is_operator {
        Ok(())
    } else {
        Err(RaffleError::Forbidden {
            actor_id: actor.id,
            operation,
        })
    }
}

fn non_blank(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RaffleError::validation(format!("{field} must not be blank")));
    }
    Ok(trimmed.to_string())
}

fn positive_price(price: Money) -> Result<Money> {
    if price.is_zero() {
        return Err(RaffleError::validation("ticket price must be greater than zero"));
    }
    Ok(price)
}

fn positive_capacity(total: u32) -> Result<u32> {
    if total == 0 {
        return Err(RaffleError::validation("total tickets must be greater than zero"));
    }
    Ok(total)
}

fn find_ticket(tickets: &[Ticket], id: TicketId) -> Result<Ticket> {
    tickets
        .iter()
        .find(|t| t.id == id)
        .cloned()
        .ok_or(RaffleError::TicketNotFound(id))
}

/// Maps a failed compare-and-set to the domain error, passing other store errors through.
fn on_stale(err: StoreError, stale: impl FnOnce() -> RaffleError) -> RaffleError {
    match err {
        StoreError::StaleWrite { .. } => stale(),
        other => other.into(),
    }
}

fn is_number_taken(err: &RaffleError) -> bool {
    matches!(err, RaffleError::Store(StoreError::NumberTaken { .. }))
}

impl RaffleEngine {
    /// Create an engine over the given collaborators.
    #[must_use]
    pub fn new(env: EngineEnvironment, config: EngineConfig) -> Self {
        let allocator = NumberAllocator::new(Arc::clone(&env.random));
        let retry = RetryPolicy::builder()
            .max_attempts(config.allocation_attempts)
            .initial_delay(config.retry_delay)
            .build();
        Self {
            env,
            allocator,
            retry,
            config,
        }
    }

    /// Engine configuration
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn now(&self) -> DateTime<Utc> {
        self.env.clock.now()
    }

    async fn begin(&self, raffle_id: RaffleId) -> Result<Box<dyn RaffleTransaction>> {
        self.env
            .store
            .begin(raffle_id)
            .await?
            .ok_or(RaffleError::RaffleNotFound(raffle_id))
    }

    async fn load_raffle(&self, raffle_id: RaffleId) -> Result<Raffle> {
        self.env
            .store
            .load_raffle(raffle_id)
            .await?
            .ok_or(RaffleError::RaffleNotFound(raffle_id))
    }

    async fn load_ticket(&self, ticket_id: TicketId) -> Result<Ticket> {
        self.env
            .store
            .load_ticket(ticket_id)
            .await?
            .ok_or(RaffleError::TicketNotFound(ticket_id))
    }

    /// Opens the unit of the raffle owning `ticket_id` and reads the ticket inside it.
    async fn begin_for_ticket(
        &self,
        ticket_id: TicketId,
    ) -> Result<(Box<dyn RaffleTransaction>, Ticket)> {
        let raffle_id = self.load_ticket(ticket_id).await?.raffle_id;
        let mut tx = self
            .env
            .store
            .begin(raffle_id)
            .await?
            .ok_or(RaffleError::TicketNotFound(ticket_id))?;
        let tickets = tx.tickets().await?;
        let ticket = find_ticket(&tickets, ticket_id)?;
        Ok((tx, ticket))
    }

    // ========================================================================
    // Raffle administration
    // ========================================================================

    /// Create an active raffle.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-operators, `Validation` for a blank title, zero price
    /// or zero capacity, `Store` on persistence failure.
    pub async fn create_raffle(&self, actor: &Actor, input: NewRaffle) -> Result<Outcome<Raffle>> {
        require_operator(actor, "create raffle")?;
        let raffle = Raffle {
            id: RaffleId::new(),
            title: non_blank(&input.title, "title")?,
            description: input.description,
            ticket_price: positive_price(input.ticket_price)?,
            total_tickets: positive_capacity(input.total_tickets)?,
            image_url: input.image_url,
            status: RaffleStatus::Active,
            winner_ticket_number: None,
            draw_date: input.draw_date,
            created_at: self.now(),
            created_by: Some(actor.id),
        };
        self.env.store.insert_raffle(&raffle).await?;
        tracing::info!(
            raffle_id = %raffle.id,
            actor_id = %actor.id,
            total_tickets = raffle.total_tickets,
            "Raffle created"
        );

        let warning = self.env.notifier.notify(NotificationEvent::RaffleCreated {
            title: raffle.title.clone(),
            description: raffle.description.clone(),
            price: raffle.ticket_price,
            total_tickets: raffle.total_tickets,
            image_url: raffle.image_url.clone(),
        });
        Ok(Outcome::clean(raffle).with_warning(warning))
    }

    /// Edit a raffle's details.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `RaffleNotFound`, `RaffleNotOpen` once completed,
    /// `CapacityLocked` when changing capacity of a raffle that has tickets,
    /// `Validation` for blank or zero values.
    pub async fn update_raffle(
        &self,
        actor: &Actor,
        raffle_id: RaffleId,
        update: RaffleUpdate,
    ) -> Result<Raffle> {
        require_operator(actor, "edit raffle")?;
        let mut tx = self.begin(raffle_id).await?;
        let current = tx.raffle().clone();
        lifecycle::ensure_not_drawn(&current, "edit")?;

        let mut next = current.clone();
        if let Some(title) = update.title {
            next.title = non_blank(&title, "title")?;
        }
        if let Some(description) = update.description {
            next.description = Some(description);
        }
        if let Some(price) = update.ticket_price {
            next.ticket_price = positive_price(price)?;
        }
        if let Some(image_url) = update.image_url {
            next.image_url = Some(image_url);
        }
        if let Some(draw_date) = update.draw_date {
            next.draw_date = Some(draw_date);
        }
        if let Some(total) = update.total_tickets {
            if total != current.total_tickets {
                if !tx.tickets().await?.is_empty() {
                    return Err(RaffleError::CapacityLocked { raffle_id });
                }
                next.total_tickets = positive_capacity(total)?;
            }
        }

        tx.update_raffle(&next, current.status)
            .await
            .map_err(|e| on_stale(e, || RaffleError::RaffleNotFound(raffle_id)))?;
        tx.commit().await?;
        tracing::info!(raffle_id = %raffle_id, actor_id = %actor.id, "Raffle updated");
        Ok(next)
    }

    async fn transition_raffle(
        &self,
        actor: &Actor,
        raffle_id: RaffleId,
        from: RaffleStatus,
        to: RaffleStatus,
        operation: &'static str,
    ) -> Result<Raffle> {
        require_operator(actor, operation)?;
        let mut tx = self.begin(raffle_id).await?;
        let current = tx.raffle().clone();
        if current.status != from {
            return Err(RaffleError::RaffleNotOpen {
                raffle_id,
                status: current.status,
                operation,
            });
        }
        let mut next = current;
        next.status = to;
        tx.update_raffle(&next, from).await.map_err(|e| {
            on_stale(e, || RaffleError::RaffleNotOpen {
                raffle_id,
                status: from,
                operation,
            })
        })?;
        tx.commit().await?;
        tracing::info!(raffle_id = %raffle_id, actor_id = %actor.id, status = %to, "Raffle status changed");
        Ok(next)
    }

    /// `active → cancelled`.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `RaffleNotFound`, `RaffleNotOpen` unless active.
    pub async fn cancel_raffle(&self, actor: &Actor, raffle_id: RaffleId) -> Result<Raffle> {
        self.transition_raffle(
            actor,
            raffle_id,
            RaffleStatus::Active,
            RaffleStatus::Cancelled,
            "cancel",
        )
        .await
    }

    /// `cancelled → active`.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `RaffleNotFound`, `RaffleNotOpen` unless cancelled.
    pub async fn reactivate_raffle(&self, actor: &Actor, raffle_id: RaffleId) -> Result<Raffle> {
        self.transition_raffle(
            actor,
            raffle_id,
            RaffleStatus::Cancelled,
            RaffleStatus::Active,
            "reactivate",
        )
        .await
    }

    /// Physically delete a raffle and all its tickets.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `RaffleNotFound`.
    pub async fn delete_raffle(&self, actor: &Actor, raffle_id: RaffleId) -> Result<Outcome<()>> {
        require_operator(actor, "delete raffle")?;
        let raffle = self.load_raffle(raffle_id).await?;
        if !self.env.store.delete_raffle(raffle_id).await? {
            return Err(RaffleError::RaffleNotFound(raffle_id));
        }
        tracing::info!(raffle_id = %raffle_id, actor_id = %actor.id, "Raffle deleted");
        let warning = self
            .env
            .notifier
            .notify(NotificationEvent::RaffleDeleted { title: raffle.title });
        Ok(Outcome::clean(()).with_warning(warning))
    }

    /// One raffle.
    ///
    /// # Errors
    ///
    /// `RaffleNotFound`.
    pub async fn get_raffle(&self, raffle_id: RaffleId) -> Result<Raffle> {
        self.load_raffle(raffle_id).await
    }

    /// Every raffle, newest first.
    ///
    /// # Errors
    ///
    /// `Store` on read failure.
    pub async fn list_raffles(&self) -> Result<Vec<Raffle>> {
        Ok(self.env.store.list_raffles().await?)
    }

    // ========================================================================
    // Buying
    // ========================================================================

    /// Store an uploaded payment proof and return its locator.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty payload or an unusable extension, `Blob` when
    /// storage fails.
    pub async fn upload_payment_proof(
        &self,
        actor: &Actor,
        bytes: Vec<u8>,
        extension: &str,
    ) -> Result<ProofRef> {
        if bytes.is_empty() {
            return Err(RaffleError::validation("payment proof is empty"));
        }
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        if extension.is_empty()
            || extension.len() > 8
            || !extension.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(RaffleError::validation(format!(
                "unsupported payment proof extension {extension:?}"
            )));
        }

        let size = bytes.len();
        let proof = self
            .env
            .blobs
            .put(actor.id, bytes, extension)
            .await
            .map_err(|e| match e {
                BlobError::Rejected(reason) => RaffleError::Validation(reason),
                storage @ BlobError::Storage(_) => storage.into(),
            })?;
        tracing::info!(actor_id = %actor.id, size, proof = %proof, "Payment proof stored");
        Ok(proof)
    }

    /// Free numbers of a raffle in ascending order.
    ///
    /// # Errors
    ///
    /// `RaffleNotFound`, `Store`.
    pub async fn available_numbers(&self, raffle_id: RaffleId) -> Result<Vec<TicketNumber>> {
        let raffle = self.load_raffle(raffle_id).await?;
        let tickets = self.env.store.load_tickets(raffle_id).await?;
        let available = allocator::available_numbers(raffle.total_tickets, &tickets, self.now());
        tracing::debug!(raffle_id = %raffle_id, available = available.len(), "Available numbers read");
        Ok(available)
    }

    /// Number of free numbers.
    ///
    /// # Errors
    ///
    /// `RaffleNotFound`, `Store`.
    pub async fn available_count(&self, raffle_id: RaffleId) -> Result<u32> {
        let available = self.available_numbers(raffle_id).await?;
        Ok(u32::try_from(available.len()).unwrap_or(u32::MAX))
    }

    fn validate_quantity(&self, quantity: u32) -> Result<()> {
        if quantity > self.config.max_tickets_per_purchase {
            return Err(RaffleError::validation(format!(
                "quantity {quantity} exceeds the limit of {} per purchase",
                self.config.max_tickets_per_purchase
            )));
        }
        Ok(())
    }

    /// One allocation attempt: read, draw, insert, commit.
    async fn try_allocate<F>(
        &self,
        raffle_id: RaffleId,
        quantity: u32,
        operation: &'static str,
        build: &F,
    ) -> Result<Vec<Ticket>>
    where
        F: Fn(&[TicketNumber], DateTime<Utc>) -> Vec<Ticket> + Sync,
    {
        let mut tx = self.begin(raffle_id).await?;
        let raffle = tx.raffle().clone();
        if !raffle.is_active() {
            return Err(RaffleError::RaffleNotOpen {
                raffle_id,
                status: raffle.status,
                operation,
            });
        }
        let tickets = tx.tickets().await?;
        let now = self.now();
        let numbers = self.allocator.allocate(&raffle, &tickets, quantity, now)?;
        let created = build(&numbers, now);
        tx.insert_tickets(&created).await?;
        tx.commit().await?;
        Ok(created)
    }

    /// Allocation with bounded retry on uniqueness violations.
    async fn allocate<F>(
        &self,
        raffle_id: RaffleId,
        quantity: u32,
        operation: &'static str,
        build: F,
    ) -> Result<Vec<Ticket>>
    where
        F: Fn(&[TicketNumber], DateTime<Utc>) -> Vec<Ticket> + Sync,
    {
        let started = Instant::now();
        let build = &build;
        let result = retry_with_predicate(
            &self.retry,
            move |attempt| {
                if attempt > 0 {
                    AllocationMetrics::record_retry();
                }
                self.try_allocate(raffle_id, quantity, operation, build)
            },
            is_number_taken,
        )
        .await;

        match result {
            Ok(created) => {
                AllocationMetrics::record_allocated(created.len(), started.elapsed());
                Ok(created)
            },
            Err(RetryFailure::Fatal(err)) => Err(err),
            Err(RetryFailure::Exhausted { attempts, .. }) => {
                AllocationMetrics::record_contention();
                tracing::warn!(raffle_id = %raffle_id, attempts, "Allocation contention");
                Err(RaffleError::Contention {
                    raffle_id,
                    attempts,
                })
            },
        }
    }

    /// Buy `quantity` random free numbers as pending tickets.
    ///
    /// Receives `min(quantity, available)` numbers; check
    /// [`Purchase::is_short`].
    ///
    /// # Errors
    ///
    /// `Validation` for blank buyer data or an excessive quantity, `RaffleNotFound`,
    /// `RaffleNotOpen` unless active, `NoCapacity` for a zero quantity or a sold-out
    /// raffle, `Contention` when the retry budget runs out.
    pub async fn purchase(&self, actor: &Actor, request: PurchaseRequest) -> Result<Purchase> {
        let full_name = non_blank(&request.full_name, "full name")?;
        let rg = non_blank(&request.rg, "rg")?;
        if request.payment_proof.as_str().trim().is_empty() {
            return Err(RaffleError::validation("payment proof is required"));
        }
        self.validate_quantity(request.quantity)?;

        let purchase_id = PurchaseId::new();
        let holder = Holder {
            owner_id: Some(actor.id),
            full_name: &full_name,
            rg: &rg,
        };
        let proof = &request.payment_proof;
        let raffle_id = request.raffle_id;
        let tickets = self
            .allocate(raffle_id, request.quantity, "purchase", |numbers, now| {
                lifecycle::new_pending(raffle_id, purchase_id, &holder, proof, numbers, now)
            })
            .await?;

        let purchase = Purchase {
            purchase_id,
            requested: request.quantity,
            tickets,
        };
        tracing::info!(
            raffle_id = %raffle_id,
            actor_id = %actor.id,
            purchase_id = %purchase_id,
            requested = purchase.requested,
            allocated = purchase.allocated(),
            "Tickets purchased"
        );
        Ok(purchase)
    }

    /// Hold `quantity` random free numbers until the reservation expires.
    ///
    /// # Errors
    ///
    /// Same as [`purchase`](Self::purchase).
    pub async fn reserve(&self, actor: &Actor, request: ReserveRequest) -> Result<Purchase> {
        let full_name = non_blank(&request.full_name, "full name")?;
        let rg = non_blank(&request.rg, "rg")?;
        self.validate_quantity(request.quantity)?;

        let purchase_id = PurchaseId::new();
        let holder = Holder {
            owner_id: Some(actor.id),
            full_name: &full_name,
            rg: &rg,
        };
        let hold = self.config.reservation_hold;
        let raffle_id = request.raffle_id;
        let tickets = self
            .allocate(raffle_id, request.quantity, "reserve", |numbers, now| {
                lifecycle::new_reserved(raffle_id, purchase_id, &holder, numbers, now, now + hold)
            })
            .await?;

        let purchase = Purchase {
            purchase_id,
            requested: request.quantity,
            tickets,
        };
        tracing::info!(
            raffle_id = %raffle_id,
            actor_id = %actor.id,
            purchase_id = %purchase_id,
            allocated = purchase.allocated(),
            "Tickets reserved"
        );
        Ok(purchase)
    }

    /// Attach a payment proof to every ticket of a reservation: `reserved → pending`.
    ///
    /// # Errors
    ///
    /// `PurchaseNotFound`, `Forbidden` unless owner or operator, `RaffleNotOpen`
    /// unless active, `Conflict` if a number was re-taken after the hold lapsed,
    /// `TicketState` for a lapsed or already confirmed reservation.
    pub async fn confirm_reservation(
        &self,
        actor: &Actor,
        purchase_id: PurchaseId,
        payment_proof: ProofRef,
    ) -> Result<Vec<Ticket>> {
        let reserved = self.env.store.tickets_for_purchase(purchase_id).await?;
        let Some(first) = reserved.first() else {
            return Err(RaffleError::PurchaseNotFound(purchase_id));
        };
        if !actor.is_operator && reserved.iter().any(|t| t.owner_id != Some(actor.id)) {
            return Err(RaffleError::Forbidden {
                actor_id: actor.id,
                operation: "confirm reservation",
            });
        }
        if payment_proof.as_str().trim().is_empty() {
            return Err(RaffleError::validation("payment proof is required"));
        }

        let raffle_id = first.raffle_id;
        let mut tx = self.begin(raffle_id).await?;
        let raffle = tx.raffle().clone();
        if !raffle.is_active() {
            return Err(RaffleError::RaffleNotOpen {
                raffle_id,
                status: raffle.status,
                operation: "confirm reservation",
            });
        }

        let now = self.now();
        let tickets = tx.tickets().await?;
        let (own, others): (Vec<Ticket>, Vec<Ticket>) = tickets
            .into_iter()
            .partition(|t| t.purchase_id == purchase_id);
        let held_by_others = allocator::used_numbers(&others, now);

        let mut confirmed = Vec::with_capacity(own.len());
        for ticket in own.iter().filter(|t| t.is_live()) {
            if let Some(number) = ticket.ticket_number {
                if held_by_others.contains(&number) {
                    tracing::warn!(
                        raffle_id = %raffle_id,
                        ticket_id = %ticket.id,
                        ticket_number = %number,
                        "Reserved number taken after hold lapsed"
                    );
                    return Err(RaffleError::Conflict {
                        raffle_id,
                        number,
                        ticket_id: Some(ticket.id),
                    });
                }
            }
            let next = lifecycle::confirm(ticket, &payment_proof, now)?;
            tx.update_ticket(ticket, &next).await.map_err(|e| match e {
                StoreError::NumberTaken { number, .. } => RaffleError::Conflict {
                    raffle_id,
                    number,
                    ticket_id: Some(ticket.id),
                },
                other => on_stale(other, || RaffleError::TicketState {
                    ticket_id: ticket.id,
                    operation: "confirm",
                    reason: "ticket changed concurrently".to_string(),
                }),
            })?;
            confirmed.push(next);
        }
        if confirmed.is_empty() {
            return Err(RaffleError::PurchaseNotFound(purchase_id));
        }
        tx.commit().await?;

        tracing::info!(
            raffle_id = %raffle_id,
            actor_id = %actor.id,
            purchase_id = %purchase_id,
            count = confirmed.len(),
            "Reservation confirmed"
        );
        Ok(confirmed)
    }

    /// The actor's live tickets across all raffles, newest first.
    ///
    /// # Errors
    ///
    /// `Store` on read failure.
    pub async fn tickets_for_actor(&self, actor: &Actor) -> Result<Vec<Ticket>> {
        let mut tickets = self.env.store.tickets_for_owner(actor.id).await?;
        tickets.retain(Ticket::is_live);
        tracing::debug!(actor_id = %actor.id, count = tickets.len(), "Tickets read");
        Ok(tickets)
    }

    /// Every ticket row of a raffle, tombstones included, for the operator dashboard.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `RaffleNotFound`, `Store`.
    pub async fn raffle_tickets(&self, actor: &Actor, raffle_id: RaffleId) -> Result<Vec<Ticket>> {
        require_operator(actor, "list tickets")?;
        self.load_raffle(raffle_id).await?;
        let mut tickets = self.env.store.load_tickets(raffle_id).await?;
        tickets.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.ticket_number.cmp(&b.ticket_number))
        });
        Ok(tickets)
    }

    // ========================================================================
    // Operator decisions
    // ========================================================================

    fn payment_approved(&self, raffle: &Raffle, approved: &[Ticket]) -> Option<Warning> {
        let first = approved.first()?;
        let mut numbers: Vec<TicketNumber> = approved.iter().filter_map(|t| t.ticket_number).collect();
        numbers.sort_unstable();
        let total_amount = raffle
            .ticket_price
            .checked_times(numbers.len() as u64)
            .unwrap_or(Money::from_cents(u64::MAX));
        self.env.notifier.notify(NotificationEvent::PaymentApproved {
            raffle_title: raffle.title.clone(),
            participant_name: first.full_name.clone(),
            ticket_numbers: numbers,
            total_amount,
        })
    }

    async fn decide_one(
        &self,
        actor: &Actor,
        ticket_id: TicketId,
        decision: Decision,
    ) -> Result<(Raffle, Ticket)> {
        require_operator(actor, decision.as_str())?;
        let (mut tx, current) = self.begin_for_ticket(ticket_id).await?;
        let raffle = tx.raffle().clone();
        lifecycle::ensure_not_drawn(&raffle, decision.as_str())?;

        let next = lifecycle::decide(&current, decision, actor.id, self.now())?;
        tx.update_ticket(&current, &next).await.map_err(|e| {
            on_stale(e, || RaffleError::AlreadyDecided {
                ticket_id,
                status: current.status,
            })
        })?;
        tx.commit().await?;

        LifecycleMetrics::record_decided(decision.as_str(), 1);
        tracing::info!(
            raffle_id = %raffle.id,
            ticket_id = %ticket_id,
            ticket_number = ?next.ticket_number,
            actor_id = %actor.id,
            decision = decision.as_str(),
            "Ticket decided"
        );
        Ok((raffle, next))
    }

    /// `pending → approved`.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `TicketNotFound`, `RaffleNotOpen` once drawn, `AlreadyDecided`
    /// unless pending.
    pub async fn approve_ticket(&self, actor: &Actor, ticket_id: TicketId) -> Result<Outcome<Ticket>> {
        let (raffle, ticket) = self.decide_one(actor, ticket_id, Decision::Approve).await?;
        let warning = self.payment_approved(&raffle, std::slice::from_ref(&ticket));
        Ok(Outcome::clean(ticket).with_warning(warning))
    }

    /// `pending → rejected`; the number returns to the pool.
    ///
    /// # Errors
    ///
    /// Same as [`approve_ticket`](Self::approve_ticket).
    pub async fn reject_ticket(&self, actor: &Actor, ticket_id: TicketId) -> Result<Ticket> {
        let (_, ticket) = self.decide_one(actor, ticket_id, Decision::Reject).await?;
        Ok(ticket)
    }

    /// Apply `decision` to every live ticket of the raffle sharing `payment_proof`.
    ///
    /// Tickets that cannot transition are reported in
    /// [`GroupOutcome::failures`]; the others are committed together.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `RaffleNotFound`, `RaffleNotOpen` once drawn, `GroupNotFound`
    /// when no live ticket carries the proof, `Store` when a ticket update fails
    /// for any reason other than a stale row; nothing is committed then.
    pub async fn decide_group(
        &self,
        actor: &Actor,
        raffle_id: RaffleId,
        payment_proof: &ProofRef,
        decision: Decision,
    ) -> Result<Outcome<GroupOutcome>> {
        require_operator(actor, decision.as_str())?;
        let mut tx = self.begin(raffle_id).await?;
        let raffle = tx.raffle().clone();
        lifecycle::ensure_not_drawn(&raffle, decision.as_str())?;

        let group: Vec<Ticket> = tx
            .tickets()
            .await?
            .into_iter()
            .filter(|t| t.is_live() && t.payment_proof.as_ref() == Some(payment_proof))
            .collect();
        if group.is_empty() {
            return Err(RaffleError::GroupNotFound {
                raffle_id,
                proof: payment_proof.to_string(),
            });
        }

        let now = self.now();
        let mut outcome = GroupOutcome::default();
        for ticket in &group {
            // Only refusals are per ticket; any other store error aborts the unit.
            let applied = match lifecycle::decide(ticket, decision, actor.id, now) {
                Ok(next) => match tx.update_ticket(ticket, &next).await {
                    Ok(()) => Ok(next),
                    Err(StoreError::StaleWrite { .. }) => Err(RaffleError::AlreadyDecided {
                        ticket_id: ticket.id,
                        status: ticket.status,
                    }),
                    Err(other) => return Err(other.into()),
                },
                Err(err) => Err(err),
            };
            match applied {
                Ok(next) => outcome.applied.push(next),
                Err(error) => outcome.failures.push(GroupFailure {
                    ticket_id: ticket.id,
                    error,
                }),
            }
        }
        if !outcome.applied.is_empty() {
            tx.commit().await?;
        }

        LifecycleMetrics::record_decided(decision.as_str(), outcome.applied.len());
        tracing::info!(
            raffle_id = %raffle_id,
            actor_id = %actor.id,
            decision = decision.as_str(),
            applied = outcome.applied.len(),
            failed = outcome.failures.len(),
            "Ticket group decided"
        );

        let warning = match decision {
            Decision::Approve => self.payment_approved(&raffle, &outcome.applied),
            Decision::Reject => None,
        };
        Ok(Outcome::clean(outcome).with_warning(warning))
    }

    /// Tombstone an approved ticket, freeing its number.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `TicketNotFound`, `RaffleNotOpen` once drawn, `TicketState`
    /// unless approved and live.
    pub async fn soft_delete_ticket(&self, actor: &Actor, ticket_id: TicketId) -> Result<Ticket> {
        require_operator(actor, "delete ticket")?;
        let (mut tx, current) = self.begin_for_ticket(ticket_id).await?;
        let raffle = tx.raffle().clone();
        lifecycle::ensure_not_drawn(&raffle, "delete ticket")?;

        let next = lifecycle::soft_delete(&current, self.now())?;
        tx.update_ticket(&current, &next).await.map_err(|e| {
            on_stale(e, || RaffleError::TicketState {
                ticket_id,
                operation: "delete",
                reason: "ticket changed concurrently".to_string(),
            })
        })?;
        tx.commit().await?;

        tracing::info!(
            raffle_id = %raffle.id,
            ticket_id = %ticket_id,
            ticket_number = ?next.ticket_number,
            actor_id = %actor.id,
            "Ticket soft-deleted"
        );
        Ok(next)
    }

    /// Clear a ticket's tombstone, re-occupying its number.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `TicketNotFound`, `RaffleNotOpen` once drawn, `TicketState`
    /// if not deleted, `Conflict` if the number was claimed meanwhile.
    pub async fn restore_ticket(&self, actor: &Actor, ticket_id: TicketId) -> Result<Ticket> {
        require_operator(actor, "restore ticket")?;
        let (mut tx, current) = self.begin_for_ticket(ticket_id).await?;
        let raffle = tx.raffle().clone();
        lifecycle::ensure_not_drawn(&raffle, "restore ticket")?;

        let now = self.now();
        let others: Vec<Ticket> = tx
            .tickets()
            .await?
            .into_iter()
            .filter(|t| t.id != ticket_id)
            .collect();
        let held = allocator::used_numbers(&others, now);
        let next = match lifecycle::restore(&current, &held) {
            Ok(next) => next,
            Err(err @ RaffleError::Conflict { .. }) => {
                tracing::warn!(
                    raffle_id = %raffle.id,
                    ticket_id = %ticket_id,
                    ticket_number = ?current.ticket_number,
                    "Restore refused: number taken"
                );
                return Err(err);
            },
            Err(err) => return Err(err),
        };

        let conflict = || RaffleError::Conflict {
            raffle_id: raffle.id,
            number: current.ticket_number.unwrap_or(TicketNumber::new(0)),
            ticket_id: Some(ticket_id),
        };
        tx.update_ticket(&current, &next).await.map_err(|e| match e {
            StoreError::NumberTaken { .. } | StoreError::StaleWrite { .. } => conflict(),
            other => other.into(),
        })?;
        tx.commit().await?;

        tracing::info!(
            raffle_id = %raffle.id,
            ticket_id = %ticket_id,
            ticket_number = ?next.ticket_number,
            actor_id = %actor.id,
            "Ticket restored"
        );
        Ok(next)
    }

    // ========================================================================
    // Draw
    // ========================================================================

    async fn draw<F>(&self, actor: &Actor, raffle_id: RaffleId, select: F) -> Result<Outcome<DrawResult>>
    where
        F: FnOnce(&Raffle, &[Ticket]) -> Result<DrawResult> + Send,
    {
        require_operator(actor, "draw")?;
        let mut tx = self.begin(raffle_id).await?;
        let raffle = tx.raffle().clone();
        let tickets = tx.tickets().await?;
        let result = select(&raffle, &tickets)?;

        tx.update_raffle(&result.raffle, RaffleStatus::Active)
            .await
            .map_err(|e| {
                on_stale(e, || RaffleError::RaffleNotOpen {
                    raffle_id,
                    status: RaffleStatus::Completed,
                    operation: "draw",
                })
            })?;
        tx.commit().await?;

        LifecycleMetrics::record_draw(result.mode.as_str());
        tracing::info!(
            raffle_id = %raffle_id,
            actor_id = %actor.id,
            ticket_id = %result.winner.id,
            ticket_number = %result.number,
            mode = result.mode.as_str(),
            "Winner drawn"
        );

        let warning = self.env.notifier.notify(NotificationEvent::WinnerSelected {
            raffle_title: raffle.title.clone(),
            winner_name: result.winner.full_name.clone(),
            winner_number: result.number,
            prize: raffle.description.clone(),
            total_participants: revenue::participants(&tickets, raffle_id),
            total_revenue: revenue::revenue(&raffle, &tickets),
        });
        Ok(Outcome::clean(result).with_warning(warning))
    }

    /// Complete the raffle with an operator-chosen winning number.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `RaffleNotFound`, `RaffleNotOpen` unless active,
    /// `EntryNotFound` when no approved live ticket holds the number.
    pub async fn draw_manual(
        &self,
        actor: &Actor,
        raffle_id: RaffleId,
        number: TicketNumber,
    ) -> Result<Outcome<DrawResult>> {
        self.draw(actor, raffle_id, |raffle, tickets| {
            draw::select_manual(raffle, tickets, number)
        })
        .await
    }

    /// Complete the raffle with a uniformly random approved ticket.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `RaffleNotFound`, `RaffleNotOpen` unless active, `NoCapacity`
    /// without approved tickets.
    pub async fn draw_random(&self, actor: &Actor, raffle_id: RaffleId) -> Result<Outcome<DrawResult>> {
        let random = Arc::clone(&self.env.random);
        self.draw(actor, raffle_id, move |raffle, tickets| {
            draw::select_random(raffle, tickets, random.as_ref())
        })
        .await
    }

    // ========================================================================
    // Reporting
    // ========================================================================

    /// Statistics of one raffle.
    ///
    /// # Errors
    ///
    /// `RaffleNotFound`, `Store`.
    pub async fn raffle_stats(&self, raffle_id: RaffleId) -> Result<RaffleStats> {
        let raffle = self.load_raffle(raffle_id).await?;
        let tickets = self.env.store.load_tickets(raffle_id).await?;
        Ok(revenue::raffle_stats(&raffle, &tickets, self.now()))
    }

    /// Totals across every raffle.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `Store`.
    pub async fn global_stats(&self, actor: &Actor) -> Result<GlobalStats> {
        require_operator(actor, "read global stats")?;
        let raffles = self.env.store.list_raffles().await?;
        let tickets = self.env.store.load_all_tickets().await?;
        Ok(revenue::global_stats(&raffles, &tickets))
    }

    /// Approved live tickets ordered by number, for export.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `RaffleNotFound`, `Store`.
    pub async fn approved_entries(&self, actor: &Actor, raffle_id: RaffleId) -> Result<Vec<Ticket>> {
        require_operator(actor, "export entries")?;
        self.load_raffle(raffle_id).await?;
        let tickets = self.env.store.load_tickets(raffle_id).await?;
        Ok(revenue::approved_entries(&tickets, raffle_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.allocation_attempts, 3);
        assert_eq!(config.max_tickets_per_purchase, 100);
        assert_eq!(config.reservation_hold, Duration::seconds(900));
    }

    #[test]
    fn blank_values_are_rejected() {
        assert!(non_blank("  ", "title").is_err());
        assert_eq!(non_blank(" Bike ", "title").unwrap_or_default(), "Bike");
        assert!(positive_price(Money::ZERO).is_err());
        assert!(positive_capacity(0).is_err());
    }

    #[test]
    fn stale_writes_map_to_domain_errors() {
        let stale = StoreError::StaleWrite {
            entity: "raffle",
            id: "x".to_string(),
        };
        let mapped = on_stale(stale, || RaffleError::validation("stale"));
        assert!(matches!(mapped, RaffleError::Validation(_)));

        let db = on_stale(StoreError::Database("down".to_string()), || {
            RaffleError::validation("stale")
        });
        assert!(matches!(db, RaffleError::Store(StoreError::Database(_))));
    }
}
