//! HTTP surface for the raffle engine.
//!
//! Handlers are thin: they read the [`Caller`] from trusted identity headers,
//! turn path and JSON input into engine requests, and map
//! [`RaffleError`](raffle_core::RaffleError) kinds to status codes through
//! [`AppError`].
//!
//! # Request Flow
//!
//! 1. **HTTP Request** arrives at an Axum handler
//! 2. **Extract** the caller, path ids and body
//! 3. **Call** the matching [`RaffleEngine`](raffle_runtime::RaffleEngine) operation
//! 4. **Map** the result or error to a JSON response
//!
//! # Example
//!
//! ```ignore
//! use raffle_web::{build_router, AppState};
//!
//! let app = build_router(AppState::new(engine));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod collaborators;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod routes;
pub mod state;

pub use collaborators::{FsBlobStore, LogSink};
pub use config::Config;
pub use error::AppError;
pub use extractors::{ACTOR_ID_HEADER, ACTOR_OPERATOR_HEADER, Caller};
pub use routes::build_router;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
