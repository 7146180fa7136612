//! Winner selection.
//!
//! Both entry points validate against the raffle's approved, live tickets and
//! produce the completed raffle row. Persisting it with a compare-and-set on
//! `active` (so two concurrent draws cannot both win) is the caller's job.

use crate::environment::RandomSource;
use crate::error::{RaffleError, Result};
use crate::types::{Raffle, RaffleStatus, Ticket, TicketNumber};
use serde::{Deserialize, Serialize};

/// How the winner was chosen
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawMode {
    /// Operator named the number
    Manual,
    /// Uniform random draw over approved tickets
    Random,
}

impl DrawMode {
    /// Label used in logs and metrics
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Random => "random",
        }
    }
}

/// The winning entry and the raffle row to persist.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawResult {
    /// Raffle after the draw: completed, with the winner set
    pub raffle: Raffle,
    /// Winning ticket
    pub winner: Ticket,
    /// Winning number
    pub number: TicketNumber,
    /// How it was chosen
    pub mode: DrawMode,
}

fn ensure_drawable(raffle: &Raffle) -> Result<()> {
    if raffle.is_active() {
        Ok(())
    } else {
        Err(RaffleError::RaffleNotOpen {
            raffle_id: raffle.id,
            status: raffle.status,
            operation: "draw",
        })
    }
}

fn complete(raffle: &Raffle, winner: &Ticket, mode: DrawMode) -> Result<DrawResult> {
    let number = winner.ticket_number.ok_or_else(|| RaffleError::TicketState {
        ticket_id: winner.id,
        operation: "win",
        reason: "ticket has no number".to_string(),
    })?;
    let mut completed = raffle.clone();
    completed.status = RaffleStatus::Completed;
    completed.winner_ticket_number = Some(number);
    Ok(DrawResult {
        raffle: completed,
        winner: winner.clone(),
        number,
        mode,
    })
}

/// Approved, live tickets of `raffle`: the draw's entries.
pub fn entries<'a>(raffle: &'a Raffle, tickets: &'a [Ticket]) -> impl Iterator<Item = &'a Ticket> {
    tickets
        .iter()
        .filter(move |t| t.raffle_id == raffle.id && t.is_entry())
}

/// Validates an operator-chosen winning number.
///
/// # Errors
///
/// [`RaffleError::RaffleNotOpen`] unless active, [`RaffleError::EntryNotFound`]
/// when no approved live ticket holds the number, including numbers out of range.
pub fn select_manual(raffle: &Raffle, tickets: &[Ticket], number: TicketNumber) -> Result<DrawResult> {
    ensure_drawable(raffle)?;
    let winner = entries(raffle, tickets)
        .find(|t| t.ticket_number == Some(number))
        .ok_or(RaffleError::EntryNotFound {
            raffle_id: raffle.id,
            number,
        })?;
    complete(raffle, winner, DrawMode::Manual)
}

/// Draws one approved live ticket uniformly at random.
///
/// Each ticket is equally likely; since live approved numbers are unique this is
/// the same as each number being equally likely.
///
/// # Errors
///
/// [`RaffleError::RaffleNotOpen`] unless active, [`RaffleError::NoCapacity`] when
/// there is no approved ticket.
pub fn select_random(
    raffle: &Raffle,
    tickets: &[Ticket],
    random: &dyn RandomSource,
) -> Result<DrawResult> {
    ensure_drawable(raffle)?;
    let pool: Vec<&Ticket> = entries(raffle, tickets).collect();
    if pool.is_empty() {
        return Err(RaffleError::NoCapacity {
            raffle_id: raffle.id,
            reason: "no approved tickets to draw from".to_string(),
        });
    }
    let winner = pool[random.index_below(pool.len())];
    complete(raffle, winner, DrawMode::Random)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use crate::environment::SeededRandom;
    use crate::error::ErrorKind;
    use crate::types::{Money, ProofRef, PurchaseId, RaffleId, TicketId, TicketStatus};
    use chrono::Utc;

    fn raffle() -> Raffle {
        Raffle {
            id: RaffleId::new(),
            title: "Moto".to_string(),
            description: Some("A motorcycle".to_string()),
            ticket_price: Money::from_cents(1000),
            total_tickets: 10,
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
            full_name: format!("Buyer {number}"),
            rg: "1".to_string(),
            payment_proof: Some(ProofRef::new("p")),
            ticket_number: Some(TicketNumber::new(number)),
            status,
            created_at: Utc::now(),
            approved_at: None,
            approved_by: None,
            reserved_until: None,
            deleted_at: None,
        }
    }

    fn approved_evens(raffle: &Raffle) -> Vec<Ticket> {
        [2, 4, 6, 8, 10]
            .into_iter()
            .map(|n| ticket(raffle, n, TicketStatus::Approved))
            .collect()
    }

    #[test]
    fn manual_draw_completes_raffle() {
        let raffle = raffle();
        let tickets = approved_evens(&raffle);
        let result = select_manual(&raffle, &tickets, TicketNumber::new(6)).unwrap();
        assert_eq!(result.raffle.status, RaffleStatus::Completed);
        assert_eq!(result.raffle.winner_ticket_number, Some(TicketNumber::new(6)));
        assert_eq!(result.winner.full_name, "Buyer 6");
    }

    #[test]
    fn manual_draw_rejects_unapproved_or_deleted_numbers() {
        let raffle = raffle();
        let mut tickets = approved_evens(&raffle);
        tickets.push(ticket(&raffle, 3, TicketStatus::Pending));
        tickets[0].deleted_at = Some(Utc::now());

        for number in [3, 2, 5] {
            let err = select_manual(&raffle, &tickets, TicketNumber::new(number)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound);
        }
        for number in [0, 11] {
            let err = select_manual(&raffle, &tickets, TicketNumber::new(number)).unwrap_err();
            assert!(matches!(err, RaffleError::EntryNotFound { .. }));
        }
    }

    #[test]
    fn draw_requires_active_raffle() {
        let mut raffle = raffle();
        let tickets = approved_evens(&raffle);
        raffle.status = RaffleStatus::Completed;
        let random = SeededRandom::new(1);
        assert_eq!(
            select_random(&raffle, &tickets, &random).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        raffle.status = RaffleStatus::Cancelled;
        assert_eq!(
            select_manual(&raffle, &tickets, TicketNumber::new(2)).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn random_draw_without_entries_is_no_capacity() {
        let raffle = raffle();
        let tickets = vec![ticket(&raffle, 1, TicketStatus::Pending)];
        let err = select_random(&raffle, &tickets, &SeededRandom::new(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoCapacity);
    }

    #[test]
    fn random_draw_is_uniform_over_entries() {
        let raffle = raffle();
        let tickets = approved_evens(&raffle);
        let random = SeededRandom::new(2024);
        let draws = 10_000;
        let mut counts = std::collections::HashMap::new();
        for _ in 0..draws {
            let result = select_random(&raffle, &tickets, &random).unwrap();
            *counts.entry(result.number.value()).or_insert(0u32) += 1;
        }

        assert_eq!(counts.len(), 5);
        assert!(counts.keys().all(|n| [2, 4, 6, 8, 10].contains(n)));

        let expected = f64::from(draws) / 5.0;
        let chi_square: f64 = counts
            .values()
            .map(|&observed| {
                let diff = f64::from(observed) - expected;
                diff * diff / expected
            })
            .sum();
        // 4 degrees of freedom, p = 0.001
        assert!(chi_square < 18.47, "chi-square {chi_square} with counts {counts:?}");
    }
}
