//! `PostgreSQL` implementation of [`RaffleStore`].
//!
//! A [`RaffleTransaction`] is a database transaction that starts by taking
//! `SELECT ... FOR UPDATE` on the raffle row, so every atomic unit on one raffle
//! runs strictly after the previous one. The partial unique index
//! `uq_tickets_live_number` backs the number rule even for writers that bypass
//! the engine.

use crate::rows::{
    actor_param, cents, number_param, occupies_index, proof_param, raffle_from_row,
    select_raffles, select_tickets, ticket_from_row,
};
use async_trait::async_trait;
use raffle_core::error::StoreError;
use raffle_core::store::{RaffleStore, RaffleTransaction};
use raffle_core::types::{
    ActorId, PurchaseId, Raffle, RaffleId, RaffleStatus, Ticket, TicketId, TicketNumber,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Transaction};

fn database(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn number_taken(raffle_id: RaffleId, number: TicketNumber) -> StoreError {
    metrics::counter!("raffle_store_number_conflicts_total").increment(1);
    tracing::debug!(raffle_id = %raffle_id, ticket_number = %number, "Number already taken");
    StoreError::NumberTaken { raffle_id, number }
}

/// `PostgreSQL`-backed raffle store.
///
/// # Example
///
/// ```no_run
/// use raffle_postgres::PostgresRaffleStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresRaffleStore::new("postgres://localhost/raffles").await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresRaffleStore {
    pool: PgPool,
}

impl PostgresRaffleStore {
    /// Connect with a pool of 10 connections.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        Self::connect(database_url, 10).await
    }

    /// Connect with an explicit pool size.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create or upgrade the `raffles` and `tickets` tables.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        tracing::info!("Raffle schema migrated");
        Ok(())
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_tickets(
        &self,
        sql: &'static str,
        key: uuid::Uuid,
    ) -> Result<Vec<Ticket>, StoreError> {
        let rows = sqlx::query(sql)
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(database)?;
        rows.iter().map(ticket_from_row).collect()
    }
}

#[async_trait]
impl RaffleStore for PostgresRaffleStore {
    async fn insert_raffle(&self, raffle: &Raffle) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO raffles (
                id, title, description, ticket_price_cents, total_tickets, image_url,
                status, winner_ticket_number, draw_date, created_at, created_by
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(*raffle.id.as_uuid())
        .bind(&raffle.title)
        .bind(&raffle.description)
        .bind(cents(raffle.ticket_price)?)
        .bind(i64::from(raffle.total_tickets))
        .bind(&raffle.image_url)
        .bind(raffle.status.as_str())
        .bind(number_param(raffle.winner_ticket_number))
        .bind(raffle.draw_date)
        .bind(raffle.created_at)
        .bind(actor_param(raffle.created_by))
        .execute(&self.pool)
        .await
        .map_err(database)?;
        Ok(())
    }

    async fn load_raffle(&self, id: RaffleId) -> Result<Option<Raffle>, StoreError> {
        let row = sqlx::query(select_raffles!("WHERE id = $1"))
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(database)?;
        row.as_ref().map(raffle_from_row).transpose()
    }

    async fn list_raffles(&self) -> Result<Vec<Raffle>, StoreError> {
        let rows = sqlx::query(select_raffles!("ORDER BY created_at DESC"))
            .fetch_all(&self.pool)
            .await
            .map_err(database)?;
        rows.iter().map(raffle_from_row).collect()
    }

    async fn delete_raffle(&self, id: RaffleId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM raffles WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn load_tickets(&self, raffle_id: RaffleId) -> Result<Vec<Ticket>, StoreError> {
        self.fetch_tickets(
            select_tickets!("WHERE raffle_id = $1 ORDER BY created_at, ticket_number"),
            *raffle_id.as_uuid(),
        )
        .await
    }

    async fn load_all_tickets(&self) -> Result<Vec<Ticket>, StoreError> {
        let rows = sqlx::query(select_tickets!("ORDER BY created_at, ticket_number"))
            .fetch_all(&self.pool)
            .await
            .map_err(database)?;
        rows.iter().map(ticket_from_row).collect()
    }

    async fn load_ticket(&self, id: TicketId) -> Result<Option<Ticket>, StoreError> {
        let row = sqlx::query(select_tickets!("WHERE id = $1"))
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(database)?;
        row.as_ref().map(ticket_from_row).transpose()
    }

    async fn tickets_for_owner(&self, owner: ActorId) -> Result<Vec<Ticket>, StoreError> {
        self.fetch_tickets(
            select_tickets!("WHERE owner_id = $1 ORDER BY created_at DESC, ticket_number"),
            *owner.as_uuid(),
        )
        .await
    }

    async fn tickets_for_purchase(&self, purchase_id: PurchaseId) -> Result<Vec<Ticket>, StoreError> {
        self.fetch_tickets(
            select_tickets!("WHERE purchase_id = $1 ORDER BY ticket_number"),
            *purchase_id.as_uuid(),
        )
        .await
    }

    async fn begin(
        &self,
        raffle_id: RaffleId,
    ) -> Result<Option<Box<dyn RaffleTransaction>>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(database)?;
        let row = sqlx::query(select_raffles!("WHERE id = $1 FOR UPDATE"))
            .bind(*raffle_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(database)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let raffle = raffle_from_row(&row)?;
        tracing::trace!(raffle_id = %raffle_id, "Raffle row locked");
        Ok(Some(Box::new(PostgresTransaction { tx, raffle })))
    }
}

/// One database transaction holding the raffle row lock.
struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
    raffle: Raffle,
}

impl PostgresTransaction {
    /// First of `candidates` held by a live pending/approved row other than `except`.
    async fn first_taken(
        &mut self,
        candidates: &[i64],
        except: Option<TicketId>,
    ) -> Result<Option<TicketNumber>, StoreError> {
        if candidates.is_empty() {
            return Ok(None);
        }
        let taken: Option<(i64,)> = sqlx::query_as(
            r"
            SELECT ticket_number
            FROM tickets
            WHERE raffle_id = $1
              AND deleted_at IS NULL
              AND status IN ('pending', 'approved')
              AND ticket_number = ANY($2)
              AND ($3::uuid IS NULL OR id <> $3)
            ORDER BY ticket_number
            LIMIT 1
            ",
        )
        .bind(*self.raffle.id.as_uuid())
        .bind(candidates)
        .bind(except.map(|id| *id.as_uuid()))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(database)?;

        Ok(taken.and_then(|(n,)| u32::try_from(n).ok().map(TicketNumber::new)))
    }
}

#[async_trait]
impl RaffleTransaction for PostgresTransaction {
    fn raffle(&self) -> &Raffle {
        &self.raffle
    }

    async fn tickets(&mut self) -> Result<Vec<Ticket>, StoreError> {
        let rows = sqlx::query(select_tickets!(
            "WHERE raffle_id = $1 ORDER BY created_at, ticket_number"
        ))
        .bind(*self.raffle.id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(database)?;
        rows.iter().map(ticket_from_row).collect()
    }

    async fn insert_tickets(&mut self, tickets: &[Ticket]) -> Result<(), StoreError> {
        let Some(first) = tickets.first() else {
            return Ok(());
        };
        let raffle_id = self.raffle.id;
        let candidates: Vec<i64> = tickets
            .iter()
            .filter(|t| occupies_index(t))
            .filter_map(|t| number_param(t.ticket_number))
            .collect();
        if let Some(number) = self.first_taken(&candidates, None).await? {
            return Err(number_taken(raffle_id, number));
        }

        let mut insert = QueryBuilder::<Postgres>::new(
            "INSERT INTO tickets (id, raffle_id, purchase_id, owner_id, full_name, rg, \
             payment_proof, ticket_number, status, created_at, approved_at, approved_by, \
             reserved_until, deleted_at) ",
        );
        insert.push_values(tickets, |mut row, t| {
            row.push_bind(*t.id.as_uuid())
                .push_bind(*t.raffle_id.as_uuid())
                .push_bind(*t.purchase_id.as_uuid())
                .push_bind(actor_param(t.owner_id))
                .push_bind(t.full_name.clone())
                .push_bind(t.rg.clone())
                .push_bind(proof_param(t.payment_proof.as_ref()))
                .push_bind(number_param(t.ticket_number))
                .push_bind(t.status.as_str())
                .push_bind(t.created_at)
                .push_bind(t.approved_at)
                .push_bind(actor_param(t.approved_by))
                .push_bind(t.reserved_until)
                .push_bind(t.deleted_at);
        });
        insert
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    number_taken(
                        raffle_id,
                        first.ticket_number.unwrap_or(TicketNumber::new(0)),
                    )
                } else {
                    database(e)
                }
            })?;
        Ok(())
    }

    async fn update_ticket(&mut self, previous: &Ticket, next: &Ticket) -> Result<(), StoreError> {
        let raffle_id = self.raffle.id;
        if occupies_index(next) && !occupies_index(previous) {
            let candidates: Vec<i64> = number_param(next.ticket_number).into_iter().collect();
            if let Some(number) = self.first_taken(&candidates, Some(next.id)).await? {
                return Err(number_taken(raffle_id, number));
            }
        }

        let result = sqlx::query(
            r"
            UPDATE tickets
            SET owner_id = $3,
                full_name = $4,
                rg = $5,
                payment_proof = $6,
                ticket_number = $7,
                status = $8,
                approved_at = $9,
                approved_by = $10,
                reserved_until = $11,
                deleted_at = $12
            WHERE id = $1
              AND raffle_id = $2
              AND status = $13
              AND deleted_at IS NOT DISTINCT FROM $14
            ",
        )
        .bind(*next.id.as_uuid())
        .bind(*raffle_id.as_uuid())
        .bind(actor_param(next.owner_id))
        .bind(&next.full_name)
        .bind(&next.rg)
        .bind(proof_param(next.payment_proof.as_ref()))
        .bind(number_param(next.ticket_number))
        .bind(next.status.as_str())
        .bind(next.approved_at)
        .bind(actor_param(next.approved_by))
        .bind(next.reserved_until)
        .bind(next.deleted_at)
        .bind(previous.status.as_str())
        .bind(previous.deleted_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                number_taken(raffle_id, next.ticket_number.unwrap_or(TicketNumber::new(0)))
            } else {
                database(e)
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::StaleWrite {
                entity: "ticket",
                id: next.id.to_string(),
            });
        }
        Ok(())
    }

    async fn update_raffle(
        &mut self,
        next: &Raffle,
        expected: RaffleStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE raffles
            SET title = $2,
                description = $3,
                ticket_price_cents = $4,
                total_tickets = $5,
                image_url = $6,
                status = $7,
                winner_ticket_number = $8,
                draw_date = $9
            WHERE id = $1 AND status = $10
            ",
        )
        .bind(*next.id.as_uuid())
        .bind(&next.title)
        .bind(&next.description)
        .bind(cents(next.ticket_price)?)
        .bind(i64::from(next.total_tickets))
        .bind(&next.image_url)
        .bind(next.status.as_str())
        .bind(number_param(next.winner_ticket_number))
        .bind(next.draw_date)
        .bind(expected.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(database)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::StaleWrite {
                entity: "raffle",
                id: next.id.to_string(),
            });
        }
        self.raffle = next.clone();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let Self { tx, raffle } = *self;
        let raffle_id = raffle.id;
        tx.commit().await.map_err(|e| {
            if is_unique_violation(&e) {
                number_taken(raffle_id, TicketNumber::new(0))
            } else {
                database(e)
            }
        })?;
        tracing::trace!(raffle_id = %raffle_id, "Raffle transaction committed");
        Ok(())
    }
}
