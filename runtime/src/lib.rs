//! # Raffle Runtime
//!
//! The imperative shell around `raffle-core`.
//!
//! ## Core Components
//!
//! - **[`RaffleEngine`]**: runs every raffle operation as one atomic unit against
//!   the store, with bounded retry for allocation
//! - **[`Notifier`]**: bounded, non-blocking notification queue drained by a
//!   worker task
//! - **[`metrics`]**: business counters and the Prometheus recorder
//!
//! ## Example
//!
//! ```ignore
//! use raffle_runtime::{EngineConfig, EngineEnvironment, Notifier, RaffleEngine};
//!
//! let (notifier, worker) = Notifier::spawn(sink, 256);
//! let engine = RaffleEngine::new(
//!     EngineEnvironment { store, clock, random, blobs, notifier },
//!     EngineConfig::default(),
//! );
//!
//! let purchase = engine.purchase(&buyer, request).await?;
//! if purchase.is_short() {
//!     // fewer numbers were left than requested
//! }
//! ```

#![forbid(unsafe_code)]

/// Raffle operations
pub mod engine;

/// Prometheus metrics for observability
pub mod metrics;

/// Notification dispatcher
pub mod notifier;

/// Retry logic with exponential backoff
pub mod retry;

pub use engine::{EngineConfig, EngineEnvironment, RaffleEngine};
pub use notifier::Notifier;
