//! Row decoding and parameter encoding.

use raffle_core::error::StoreError;
use raffle_core::types::{
    ActorId, Money, ProofRef, PurchaseId, Raffle, RaffleId, RaffleStatus, Ticket, TicketId,
    TicketNumber, TicketStatus,
};
use sqlx::postgres::PgRow;
use sqlx::{Decode, Postgres, Row, Type};
use uuid::Uuid;

/// `SELECT` over every raffle column, followed by the given clause.
macro_rules! select_raffles {
    ($tail:literal) => {
        concat!(
            "SELECT id, title, description, ticket_price_cents, total_tickets, image_url, \
             status, winner_ticket_number, draw_date, created_at, created_by \
             FROM raffles ",
            $tail
        )
    };
}

/// `SELECT` over every ticket column, followed by the given clause.
macro_rules! select_tickets {
    ($tail:literal) => {
        concat!(
            "SELECT id, raffle_id, purchase_id, owner_id, full_name, rg, payment_proof, \
             ticket_number, status, created_at, approved_at, approved_by, reserved_until, \
             deleted_at \
             FROM tickets ",
            $tail
        )
    };
}

pub(crate) use {select_raffles, select_tickets};

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Corrupt(format!("column {name}: {e}")))
}

fn unsigned(value: i64, name: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{name} out of range: {value}")))
}

fn number(value: Option<i64>, name: &str) -> Result<Option<TicketNumber>, StoreError> {
    value
        .map(|n| unsigned(n, name).map(TicketNumber::new))
        .transpose()
}

pub(crate) fn raffle_from_row(row: &PgRow) -> Result<Raffle, StoreError> {
    let status: String = column(row, "status")?;
    let status = RaffleStatus::parse(&status)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown raffle status {status:?}")))?;
    let price: i64 = column(row, "ticket_price_cents")?;
    let price = u64::try_from(price)
        .map_err(|_| StoreError::Corrupt(format!("negative ticket price {price}")))?;

    Ok(Raffle {
        id: RaffleId::from_uuid(column(row, "id")?),
        title: column(row, "title")?,
        description: column(row, "description")?,
        ticket_price: Money::from_cents(price),
        total_tickets: unsigned(column(row, "total_tickets")?, "total_tickets")?,
        image_url: column(row, "image_url")?,
        status,
        winner_ticket_number: number(column(row, "winner_ticket_number")?, "winner_ticket_number")?,
        draw_date: column(row, "draw_date")?,
        created_at: column(row, "created_at")?,
        created_by: column::<Option<Uuid>>(row, "created_by")?.map(ActorId::from_uuid),
    })
}

pub(crate) fn ticket_from_row(row: &PgRow) -> Result<Ticket, StoreError> {
    let status: String = column(row, "status")?;
    let status = TicketStatus::parse(&status)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown ticket status {status:?}")))?;

    Ok(Ticket {
        id: TicketId::from_uuid(column(row, "id")?),
        raffle_id: RaffleId::from_uuid(column(row, "raffle_id")?),
        purchase_id: PurchaseId::from_uuid(column(row, "purchase_id")?),
        owner_id: column::<Option<Uuid>>(row, "owner_id")?.map(ActorId::from_uuid),
        full_name: column(row, "full_name")?,
        rg: column(row, "rg")?,
        payment_proof: column::<Option<String>>(row, "payment_proof")?.map(ProofRef::new),
        ticket_number: number(column(row, "ticket_number")?, "ticket_number")?,
        status,
        created_at: column(row, "created_at")?,
        approved_at: column(row, "approved_at")?,
        approved_by: column::<Option<Uuid>>(row, "approved_by")?.map(ActorId::from_uuid),
        reserved_until: column(row, "reserved_until")?,
        deleted_at: column(row, "deleted_at")?,
    })
}

pub(crate) fn cents(amount: Money) -> Result<i64, StoreError> {
    i64::try_from(amount.cents())
        .map_err(|_| StoreError::Database(format!("amount {} does not fit BIGINT", amount.cents())))
}

pub(crate) fn number_param(number: Option<TicketNumber>) -> Option<i64> {
    number.map(|n| i64::from(n.value()))
}

pub(crate) fn proof_param(proof: Option<&ProofRef>) -> Option<String> {
    proof.map(|p| p.as_str().to_string())
}

pub(crate) fn actor_param(actor: Option<ActorId>) -> Option<Uuid> {
    actor.map(|a| *a.as_uuid())
}

/// Whether the row takes part in the live-number unique index
pub(crate) fn occupies_index(ticket: &Ticket) -> bool {
    ticket.is_live()
        && ticket.ticket_number.is_some()
        && matches!(ticket.status, TicketStatus::Pending | TicketStatus::Approved)
}
