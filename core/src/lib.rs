//! # Raffle Core
//!
//! Domain types and pure logic for numbered raffles.
//!
//! A raffle sells a fixed pool of numbers `1..=total_tickets`. Buyers receive
//! random free numbers as pending tickets, operators approve or reject them, and
//! a winner is finally drawn from the approved ones.
//!
//! ## Modules
//!
//! - [`types`]: identifiers, money, raffles, tickets
//! - [`allocator`]: the used-number rule and random allocation
//! - [`lifecycle`]: ticket state transitions
//! - [`draw`]: manual and random winner selection
//! - [`revenue`]: read-side statistics
//! - [`store`], [`blob`], [`notification`]: collaborator traits
//!
//! Everything in this crate is synchronous and side-effect free except the traits,
//! which the runtime drives.

#![forbid(unsafe_code)]

pub mod allocator;
pub mod blob;
pub mod draw;
pub mod environment;
pub mod error;
pub mod lifecycle;
pub mod notification;
pub mod outcome;
pub mod revenue;
pub mod store;
pub mod types;

pub use chrono::{DateTime, Utc};

pub use allocator::NumberAllocator;
pub use draw::{DrawMode, DrawResult};
pub use environment::{Clock, RandomSource, SeededRandom, SystemClock, ThreadRandom};
pub use error::{BlobError, ErrorKind, RaffleError, Result, StoreError};
pub use notification::{NotificationEvent, NotificationSink, NotifyError};
pub use outcome::{GroupFailure, GroupOutcome, Outcome, Warning};
pub use revenue::{GlobalStats, RaffleStats};
pub use store::{RaffleStore, RaffleTransaction};
pub use types::{
    Actor, ActorId, Decision, Money, NewRaffle, ProofRef, Purchase, PurchaseId, PurchaseRequest,
    Raffle, RaffleId, RaffleStatus, RaffleUpdate, ReserveRequest, Ticket, TicketId, TicketNumber,
    TicketStatus,
};
pub use blob::BlobStore;
