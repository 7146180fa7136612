//! Ticket lifecycle state machine.
//!
//! ```text
//! reserved ──confirm──▶ pending ──approve──▶ approved ──soft delete──▶ (tombstoned)
//!                          │                      ▲                        │
//!                          └──reject──▶ rejected  └────────restore─────────┘
//! ```
//!
//! Transitions here are pure: each takes the current row and returns the next one,
//! or the reason it is refused. Checks that need the rest of the raffle (number
//! re-occupancy on restore) take the used-number set computed inside the same
//! atomic unit that will write the result.

use crate::error::{RaffleError, Result};
use crate::types::{
    ActorId, Decision, ProofRef, PurchaseId, Raffle, RaffleId, RaffleStatus, Ticket, TicketId,
    TicketNumber, TicketStatus,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Buyer details copied onto every ticket of a purchase.
#[derive(Clone, Debug)]
pub struct Holder<'a> {
    /// Buyer, when authenticated
    pub owner_id: Option<ActorId>,
    /// Full name
    pub full_name: &'a str,
    /// Identity document
    pub rg: &'a str,
}

/// Builds pending tickets for freshly allocated numbers.
#[must_use]
pub fn new_pending(
    raffle_id: RaffleId,
    purchase_id: PurchaseId,
    holder: &Holder<'_>,
    proof: &ProofRef,
    numbers: &[TicketNumber],
    now: DateTime<Utc>,
) -> Vec<Ticket> {
    numbers
        .iter()
        .map(|&number| Ticket {
            id: TicketId::new(),
            raffle_id,
            purchase_id,
            owner_id: holder.owner_id,
            full_name: holder.full_name.to_string(),
            rg: holder.rg.to_string(),
            payment_proof: Some(proof.clone()),
            ticket_number: Some(number),
            status: TicketStatus::Pending,
            created_at: now,
            approved_at: None,
            approved_by: None,
            reserved_until: None,
            deleted_at: None,
        })
        .collect()
}

/// Builds reserved tickets held until `until`.
#[must_use]
pub fn new_reserved(
    raffle_id: RaffleId,
    purchase_id: PurchaseId,
    holder: &Holder<'_>,
    numbers: &[TicketNumber],
    now: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Vec<Ticket> {
    numbers
        .iter()
        .map(|&number| Ticket {
            id: TicketId::new(),
            raffle_id,
            purchase_id,
            owner_id: holder.owner_id,
            full_name: holder.full_name.to_string(),
            rg: holder.rg.to_string(),
            payment_proof: None,
            ticket_number: Some(number),
            status: TicketStatus::Reserved,
            created_at: now,
            approved_at: None,
            approved_by: None,
            reserved_until: Some(until),
            deleted_at: None,
        })
        .collect()
}

/// Refuses ticket mutations once the raffle is drawn.
///
/// After completion the winner must stay an approved live ticket, so nothing about
/// the ticket set may change.
///
/// # Errors
///
/// [`RaffleError::RaffleNotOpen`] when the raffle is completed.
pub fn ensure_not_drawn(raffle: &Raffle, operation: &'static str) -> Result<()> {
    if raffle.status == RaffleStatus::Completed {
        return Err(RaffleError::RaffleNotOpen {
            raffle_id: raffle.id,
            status: raffle.status,
            operation,
        });
    }
    Ok(())
}

fn ensure_live(ticket: &Ticket, operation: &'static str) -> Result<()> {
    if ticket.is_live() {
        Ok(())
    } else {
        Err(RaffleError::TicketState {
            ticket_id: ticket.id,
            operation,
            reason: "ticket is deleted".to_string(),
        })
    }
}

/// `reserved → pending`: attaches the payment proof to a live, unexpired hold.
///
/// # Errors
///
/// [`RaffleError::TicketState`] if the ticket is deleted, not reserved, or its
/// hold lapsed.
pub fn confirm(ticket: &Ticket, proof: &ProofRef, now: DateTime<Utc>) -> Result<Ticket> {
    ensure_live(ticket, "confirm")?;
    if ticket.status != TicketStatus::Reserved {
        return Err(RaffleError::TicketState {
            ticket_id: ticket.id,
            operation: "confirm",
            reason: format!("status is {}", ticket.status),
        });
    }
    if ticket.hold_lapsed(now) {
        return Err(RaffleError::TicketState {
            ticket_id: ticket.id,
            operation: "confirm",
            reason: "reservation expired".to_string(),
        });
    }
    let mut next = ticket.clone();
    next.status = TicketStatus::Pending;
    next.payment_proof = Some(proof.clone());
    next.reserved_until = None;
    Ok(next)
}

/// `pending → approved | rejected`, stamping the operator and time.
///
/// Rejection leaves `ticket_number` on the row; the used-number rule stops counting
/// it, which is what returns the number to the pool.
///
/// # Errors
///
/// [`RaffleError::AlreadyDecided`] unless the ticket is pending, and
/// [`RaffleError::TicketState`] if it is deleted.
pub fn decide(
    ticket: &Ticket,
    decision: Decision,
    operator: ActorId,
    now: DateTime<Utc>,
) -> Result<Ticket> {
    ensure_live(ticket, decision.as_str())?;
    if ticket.status != TicketStatus::Pending {
        return Err(RaffleError::AlreadyDecided {
            ticket_id: ticket.id,
            status: ticket.status,
        });
    }
    let mut next = ticket.clone();
    next.status = match decision {
        Decision::Approve => TicketStatus::Approved,
        Decision::Reject => TicketStatus::Rejected,
    };
    next.approved_at = Some(now);
    next.approved_by = Some(operator);
    Ok(next)
}

/// Tombstones an approved ticket, freeing its number. Status is kept.
///
/// # Errors
///
/// [`RaffleError::TicketState`] if the ticket is already deleted or not approved.
pub fn soft_delete(ticket: &Ticket, now: DateTime<Utc>) -> Result<Ticket> {
    ensure_live(ticket, "delete")?;
    if ticket.status != TicketStatus::Approved {
        return Err(RaffleError::TicketState {
            ticket_id: ticket.id,
            operation: "delete",
            reason: format!("only approved tickets can be deleted, status is {}", ticket.status),
        });
    }
    let mut next = ticket.clone();
    next.deleted_at = Some(now);
    Ok(next)
}

/// Clears the tombstone, re-occupying the ticket's number.
///
/// `held` must be the numbers in use by the raffle's other tickets, read inside
/// the same atomic unit that writes the restored row.
///
/// # Errors
///
/// [`RaffleError::TicketState`] if the ticket is not deleted, and
/// [`RaffleError::Conflict`] if another ticket claimed the number meanwhile.
pub fn restore(ticket: &Ticket, held: &BTreeSet<TicketNumber>) -> Result<Ticket> {
    if ticket.is_live() {
        return Err(RaffleError::TicketState {
            ticket_id: ticket.id,
            operation: "restore",
            reason: "ticket is not deleted".to_string(),
        });
    }
    if let Some(number) = ticket.ticket_number {
        if held.contains(&number) {
            return Err(RaffleError::Conflict {
                raffle_id: ticket.raffle_id,
                number,
                ticket_id: Some(ticket.id),
            });
        }
    }
    let mut next = ticket.clone();
    next.deleted_at = None;
    Ok(next)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::Duration;

    fn pending(number: u32) -> Ticket {
        let holder = Holder {
            owner_id: Some(ActorId::new()),
            full_name: "Maria Silva",
            rg: "12.345.678-9",
        };
        new_pending(
            RaffleId::new(),
            PurchaseId::new(),
            &holder,
            &ProofRef::new("proofs/a.png"),
            &[TicketNumber::new(number)],
            Utc::now(),
        )
        .remove(0)
    }

    #[test]
    fn approve_stamps_operator_and_keeps_number() {
        let operator = ActorId::new();
        let now = Utc::now();
        let approved = decide(&pending(3), Decision::Approve, operator, now).unwrap();
        assert_eq!(approved.status, TicketStatus::Approved);
        assert_eq!(approved.approved_by, Some(operator));
        assert_eq!(approved.approved_at, Some(now));
        assert_eq!(approved.ticket_number, Some(TicketNumber::new(3)));
    }

    #[test]
    fn approving_twice_is_already_decided() {
        let operator = ActorId::new();
        let approved = decide(&pending(3), Decision::Approve, operator, Utc::now()).unwrap();
        let err = decide(&approved, Decision::Approve, operator, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyDecided);
    }

    #[test]
    fn reject_frees_number_without_clearing_it() {
        let rejected = decide(&pending(5), Decision::Reject, ActorId::new(), Utc::now()).unwrap();
        assert_eq!(rejected.ticket_number, Some(TicketNumber::new(5)));
        assert!(!rejected.holds_number(Utc::now()));
    }

    #[test]
    fn only_approved_tickets_can_be_soft_deleted() {
        let err = soft_delete(&pending(1), Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let approved = decide(&pending(1), Decision::Approve, ActorId::new(), Utc::now()).unwrap();
        let deleted = soft_delete(&approved, Utc::now()).unwrap();
        assert_eq!(deleted.status, TicketStatus::Approved);
        assert!(!deleted.holds_number(Utc::now()));
        assert_eq!(soft_delete(&deleted, Utc::now()).unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn restore_conflicts_when_number_retaken() {
        let approved = decide(&pending(8), Decision::Approve, ActorId::new(), Utc::now()).unwrap();
        let deleted = soft_delete(&approved, Utc::now()).unwrap();

        let taken: BTreeSet<_> = [TicketNumber::new(8)].into_iter().collect();
        assert_eq!(restore(&deleted, &taken).unwrap_err().kind(), ErrorKind::Conflict);

        let restored = restore(&deleted, &BTreeSet::new()).unwrap();
        assert!(restored.is_live());
        assert_eq!(restored.status, TicketStatus::Approved);
        assert_eq!(restore(&restored, &BTreeSet::new()).unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn confirm_moves_live_hold_to_pending() {
        let now = Utc::now();
        let holder = Holder {
            owner_id: None,
            full_name: "João",
            rg: "1",
        };
        let reserved = new_reserved(
            RaffleId::new(),
            PurchaseId::new(),
            &holder,
            &[TicketNumber::new(2)],
            now,
            now + Duration::minutes(10),
        )
        .remove(0);

        let proof = ProofRef::new("proofs/b.png");
        let confirmed = confirm(&reserved, &proof, now + Duration::minutes(1)).unwrap();
        assert_eq!(confirmed.status, TicketStatus::Pending);
        assert_eq!(confirmed.payment_proof, Some(proof.clone()));
        assert_eq!(confirmed.reserved_until, None);

        let err = confirm(&reserved, &proof, now + Duration::minutes(11)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
}
