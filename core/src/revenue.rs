//! Read-side aggregates over the current ticket set.
//!
//! Nothing here is cached or persisted: every figure is recomputed from the rows
//! it is given, and tombstoned rows are excluded explicitly. Lifecycle decisions
//! never consult these views.

use crate::allocator::available_numbers;
use crate::types::{ActorId, Money, Raffle, RaffleId, RaffleStatus, Ticket, TicketStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Per-raffle statistics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaffleStats {
    /// Raffle
    pub raffle_id: RaffleId,
    /// Live approved tickets
    pub approved: u32,
    /// Live pending tickets
    pub pending: u32,
    /// Live reservations with an unexpired hold
    pub reserved: u32,
    /// Live rejected tickets
    pub rejected: u32,
    /// Tombstoned tickets
    pub deleted: u32,
    /// Free numbers
    pub available: u32,
    /// Distinct buyers among approved tickets
    pub participants: u32,
    /// `approved × ticket_price`
    pub revenue: Money,
}

/// Statistics across every raffle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalStats {
    /// Number of raffles
    pub raffles: u32,
    /// Raffles currently selling
    pub active_raffles: u32,
    /// Live approved tickets
    pub approved: u32,
    /// Live pending tickets
    pub pending: u32,
    /// Sum of per-raffle revenue
    pub revenue: Money,
}

fn count(tickets: &[Ticket], raffle_id: RaffleId, status: TicketStatus) -> u32 {
    let n = tickets
        .iter()
        .filter(|t| t.raffle_id == raffle_id && t.is_live() && t.status == status)
        .count();
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Live approved tickets of the raffle.
#[must_use]
pub fn approved_count(tickets: &[Ticket], raffle_id: RaffleId) -> u32 {
    count(tickets, raffle_id, TicketStatus::Approved)
}

/// Live pending tickets of the raffle.
#[must_use]
pub fn pending_count(tickets: &[Ticket], raffle_id: RaffleId) -> u32 {
    count(tickets, raffle_id, TicketStatus::Pending)
}

/// `approved_count × ticket_price`, saturating on overflow.
#[must_use]
pub fn revenue(raffle: &Raffle, tickets: &[Ticket]) -> Money {
    raffle
        .ticket_price
        .checked_times(u64::from(approved_count(tickets, raffle.id)))
        .unwrap_or(Money::from_cents(u64::MAX))
}

/// Distinct owners of live approved tickets. Anonymous tickets count once each.
#[must_use]
pub fn participants(tickets: &[Ticket], raffle_id: RaffleId) -> u32 {
    let mut owners: HashSet<ActorId> = HashSet::new();
    let mut anonymous = 0usize;
    for ticket in tickets
        .iter()
        .filter(|t| t.raffle_id == raffle_id && t.is_entry())
    {
        match ticket.owner_id {
            Some(owner) => {
                owners.insert(owner);
            },
            None => anonymous += 1,
        }
    }
    u32::try_from(owners.len() + anonymous).unwrap_or(u32::MAX)
}

/// Full statistics of one raffle at `now`.
#[must_use]
pub fn raffle_stats(raffle: &Raffle, tickets: &[Ticket], now: DateTime<Utc>) -> RaffleStats {
    let reserved = tickets
        .iter()
        .filter(|t| {
            t.raffle_id == raffle.id && t.status == TicketStatus::Reserved && t.holds_number(now)
        })
        .count();
    let deleted = tickets
        .iter()
        .filter(|t| t.raffle_id == raffle.id && !t.is_live())
        .count();
    let own: Vec<Ticket> = tickets
        .iter()
        .filter(|t| t.raffle_id == raffle.id)
        .cloned()
        .collect();

    RaffleStats {
        raffle_id: raffle.id,
        approved: approved_count(tickets, raffle.id),
        pending: pending_count(tickets, raffle.id),
        reserved: u32::try_from(reserved).unwrap_or(u32::MAX),
        rejected: count(tickets, raffle.id, TicketStatus::Rejected),
        deleted: u32::try_from(deleted).unwrap_or(u32::MAX),
        available: u32::try_from(available_numbers(raffle.total_tickets, &own, now).len())
            .unwrap_or(u32::MAX),
        participants: participants(tickets, raffle.id),
        revenue: revenue(raffle, tickets),
    }
}

/// Totals across all raffles. Tickets of unknown raffles are ignored.
#[must_use]
pub fn global_stats(raffles: &[Raffle], tickets: &[Ticket]) -> GlobalStats {
    let mut by_raffle: HashMap<RaffleId, Vec<Ticket>> = HashMap::new();
    for ticket in tickets {
        by_raffle.entry(ticket.raffle_id).or_default().push(ticket.clone());
    }

    let mut stats = GlobalStats {
        raffles: u32::try_from(raffles.len()).unwrap_or(u32::MAX),
        ..GlobalStats::default()
    };
    for raffle in raffles {
        if raffle.status == RaffleStatus::Active {
            stats.active_raffles += 1;
        }
        let own = by_raffle.get(&raffle.id).map_or(&[][..], Vec::as_slice);
        stats.approved += approved_count(own, raffle.id);
        stats.pending += pending_count(own, raffle.id);
        stats.revenue = stats
            .revenue
            .checked_add(revenue(raffle, own))
            .unwrap_or(Money::from_cents(u64::MAX));
    }
    stats
}

/// Approved live tickets ordered by number, for export collaborators.
#[must_use]
pub fn approved_entries(tickets: &[Ticket], raffle_id: RaffleId) -> Vec<Ticket> {
    let mut entries: Vec<Ticket> = tickets
        .iter()
        .filter(|t| t.raffle_id == raffle_id && t.is_entry())
        .cloned()
        .collect();
    entries.sort_by_key(|t| t.ticket_number);
    entries
}
