//! Number allocation.
//!
//! Pure over a snapshot of the raffle's tickets: it computes the free numbers and
//! draws a uniformly random subset. Running allocation and ticket insertion as one
//! atomic unit is the caller's job (see the runtime engine); two purchases computing
//! against the same snapshot would otherwise pick the same number.

use crate::environment::RandomSource;
use crate::error::{RaffleError, Result};
use crate::types::{Raffle, Ticket, TicketNumber};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Numbers currently consumed by live pending/approved tickets (and unexpired holds).
///
/// Uses [`Ticket::holds_number`] as the single definition of "used".
#[must_use]
pub fn used_numbers(tickets: &[Ticket], now: DateTime<Utc>) -> BTreeSet<TicketNumber> {
    tickets.iter().filter_map(|t| t.held_number(now)).collect()
}

/// Free numbers of a raffle in ascending order: `[1..=total] \ used`.
#[must_use]
pub fn available_numbers(
    total_tickets: u32,
    tickets: &[Ticket],
    now: DateTime<Utc>,
) -> Vec<TicketNumber> {
    let used = used_numbers(tickets, now);
    (1..=total_tickets)
        .map(TicketNumber::new)
        .filter(|n| !used.contains(n))
        .collect()
}

/// Draws distinct free numbers for a purchase.
#[derive(Clone)]
pub struct NumberAllocator {
    random: Arc<dyn RandomSource>,
}

impl NumberAllocator {
    /// Creates an allocator drawing from `random`
    #[must_use]
    pub fn new(random: Arc<dyn RandomSource>) -> Self {
        Self { random }
    }

    /// Picks `min(quantity, available)` distinct free numbers, sorted ascending.
    ///
    /// Every subset of that size is equally likely: a partial Fisher-Yates shuffle
    /// of the free numbers, truncated to the requested size.
    ///
    /// # Errors
    ///
    /// [`RaffleError::NoCapacity`] if `quantity` is zero or no number is free.
    pub fn allocate(
        &self,
        raffle: &Raffle,
        tickets: &[Ticket],
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<TicketNumber>> {
        if quantity == 0 {
            return Err(RaffleError::NoCapacity {
                raffle_id: raffle.id,
                reason: "requested quantity is zero".to_string(),
            });
        }

        let mut pool = available_numbers(raffle.total_tickets, tickets, now);
        if pool.is_empty() {
            return Err(RaffleError::NoCapacity {
                raffle_id: raffle.id,
                reason: format!("all {} numbers are taken", raffle.total_tickets),
            });
        }

        let take = pool.len().min(usize::try_from(quantity).unwrap_or(usize::MAX));
        for i in 0..take {
            let j = i + self.random.index_below(pool.len() - i);
            pool.swap(i, j);
        }
        pool.truncate(take);
        pool.sort_unstable();
        Ok(pool)
    }
}

impl std::fmt::Debug for NumberAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NumberAllocator").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::environment::SeededRandom;
    use crate::types::{
        Money, ProofRef, PurchaseId, RaffleId, RaffleStatus, TicketId, TicketStatus,
    };
    use proptest::prelude::*;

    fn raffle(total: u32) -> Raffle {
        Raffle {
            id: RaffleId::new(),
            title: "Test".to_string(),
            description: None,
            ticket_price: Money::from_cents(500),
            total_tickets: total,
            image_url: None,
            status: RaffleStatus::Active,
            winner_ticket_number: None,
            draw_date: None,
            created_at: Utc::now(),
            created_by: None,
        }
    }

    fn ticket(raffle: &Raffle, number: u32, status: TicketStatus) -> Ticket {
        Ticket {
            id: TicketId::new(),
            raffle_id: raffle.id,
            purchase_id: PurchaseId::new(),
            owner_id: None,
            full_name: "Buyer".to_string(),
            rg: "123".to_string(),
            payment_proof: Some(ProofRef::new("proof")),
            ticket_number: Some(TicketNumber::new(number)),
            status,
            created_at: Utc::now(),
            approved_at: None,
            approved_by: None,
            reserved_until: None,
            deleted_at: None,
        }
    }

    fn allocator(seed: u64) -> NumberAllocator {
        NumberAllocator::new(Arc::new(SeededRandom::new(seed)))
    }

    #[test]
    fn allocates_then_clips_to_remaining() {
        let raffle = raffle(10);
        let now = Utc::now();
        let alloc = allocator(1);

        let first = alloc.allocate(&raffle, &[], 3, now).unwrap();
        assert_eq!(first.len(), 3);
        assert!(first.iter().all(|n| n.in_range(10)));

        let tickets: Vec<Ticket> = first
            .iter()
            .map(|n| ticket(&raffle, n.value(), TicketStatus::Pending))
            .collect();
        let rest = alloc.allocate(&raffle, &tickets, 10, now).unwrap();
        assert_eq!(rest.len(), 7);
        assert!(rest.iter().all(|n| !first.contains(n)));
    }

    #[test]
    fn zero_quantity_is_no_capacity() {
        let err = allocator(2).allocate(&raffle(5), &[], 0, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NoCapacity);
    }

    #[test]
    fn full_raffle_is_no_capacity() {
        let raffle = raffle(2);
        let tickets = vec![
            ticket(&raffle, 1, TicketStatus::Approved),
            ticket(&raffle, 2, TicketStatus::Pending),
        ];
        let err = allocator(3).allocate(&raffle, &tickets, 1, Utc::now()).unwrap_err();
        assert!(matches!(err, RaffleError::NoCapacity { .. }));
    }

    #[test]
    fn rejected_and_tombstoned_numbers_are_free_again() {
        let raffle = raffle(3);
        let mut deleted = ticket(&raffle, 2, TicketStatus::Approved);
        deleted.deleted_at = Some(Utc::now());
        let tickets = vec![
            ticket(&raffle, 1, TicketStatus::Rejected),
            deleted,
            ticket(&raffle, 3, TicketStatus::Approved),
        ];
        let numbers = allocator(4).allocate(&raffle, &tickets, 5, Utc::now()).unwrap();
        assert_eq!(numbers, vec![TicketNumber::new(1), TicketNumber::new(2)]);
    }

    #[test]
    fn results_are_sorted() {
        let numbers = allocator(5).allocate(&raffle(100), &[], 40, Utc::now()).unwrap();
        assert!(numbers.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn single_pick_is_roughly_uniform() {
        let raffle = raffle(4);
        let alloc = allocator(6);
        let mut counts = [0u32; 4];
        for _ in 0..4000 {
            let n = alloc.allocate(&raffle, &[], 1, Utc::now()).unwrap()[0];
            counts[(n.value() - 1) as usize] += 1;
        }
        assert!(counts.iter().all(|&c| (800..1200).contains(&c)), "{counts:?}");
    }

    proptest! {
        #[test]
        fn allocation_is_distinct_in_range_and_free(
            total in 1u32..200,
            taken in proptest::collection::btree_set(1u32..200, 0..60),
            quantity in 1u32..250,
            seed in any::<u64>(),
        ) {
            let raffle = raffle(total);
            let tickets: Vec<Ticket> = taken
                .iter()
                .filter(|n| **n <= total)
                .map(|n| ticket(&raffle, *n, TicketStatus::Approved))
                .collect();
            let free = total as usize - tickets.len();
            let result = allocator(seed).allocate(&raffle, &tickets, quantity, Utc::now());

            if free == 0 {
                prop_assert!(result.is_err());
            } else {
                let numbers = result.unwrap();
                prop_assert_eq!(numbers.len(), free.min(quantity as usize));
                let unique: BTreeSet<_> = numbers.iter().copied().collect();
                prop_assert_eq!(unique.len(), numbers.len());
                for n in &numbers {
                    prop_assert!(n.in_range(total));
                    prop_assert!(!taken.contains(&n.value()));
                }
            }
        }
    }
}
