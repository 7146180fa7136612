//! `PostgreSQL` storage for the raffle engine.
//!
//! [`PostgresRaffleStore`] implements `RaffleStore` from `raffle-core` on two
//! tables, `raffles` and `tickets`, created by [`PostgresRaffleStore::migrate`].
//!
//! - Each atomic unit is one transaction holding the raffle row lock
//! - A partial unique index keeps live pending/approved numbers unique
//! - Soft-deleted and rejected rows keep their number for history
//!
//! # Example
//!
//! ```ignore
//! use raffle_postgres::PostgresRaffleStore;
//!
//! let store = PostgresRaffleStore::new(&database_url).await?;
//! store.migrate().await?;
//! let env = EngineEnvironment { store: Arc::new(store), /* ... */ };
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod rows;
mod store;

pub use store::PostgresRaffleStore;
