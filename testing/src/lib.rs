//! # Raffle Testing
//!
//! Testing utilities for the raffle engine.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - [`InMemoryRaffleStore`]: a `RaffleStore` with the same atomicity guarantees as
//!   the Postgres store
//! - Recording and failing notification sinks, an in-memory blob store
//! - Fixtures for raffles and actors
//!
//! ## Example
//!
//! ```ignore
//! use raffle_testing::{InMemoryRaffleStore, test_clock, fixtures};
//!
//! #[tokio::test]
//! async fn buys_three_numbers() {
//!     let store = Arc::new(InMemoryRaffleStore::new());
//!     let engine = RaffleEngine::new(store, env, EngineConfig::default());
//!     let raffle = engine.create_raffle(&fixtures::operator(), fixtures::new_raffle(10)).await?;
//!     // ...
//! }
//! ```

#![forbid(unsafe_code)]

mod memory_store;

pub use memory_store::InMemoryRaffleStore;

use chrono::{DateTime, Duration, Utc};
use raffle_core::environment::Clock;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Duration, Utc};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use raffle_testing::mocks::FixedClock;
    /// use raffle_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which cannot happen.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Clock that only moves when told to, for reservation expiry tests.
    ///
    /// Clones share the same time.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Starts at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Starts at the same instant as [`test_clock`]
        #[must_use]
        pub fn starting_at_test_time() -> Self {
            Self::new(test_clock().now())
        }

        /// Moves time forward
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}

/// Recording, failing and in-memory collaborators.
pub mod collaborators {
    use raffle_core::blob::BlobStore;
    use raffle_core::error::BlobError;
    use raffle_core::notification::{NotificationEvent, NotificationSink, NotifyError};
    use raffle_core::types::{ActorId, ProofRef};
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex, PoisonError};

    /// Sink that keeps every delivered event.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingSink {
        events: Arc<Mutex<Vec<NotificationEvent>>>,
    }

    impl RecordingSink {
        /// Create an empty sink
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Events delivered so far, in order
        #[must_use]
        pub fn events(&self) -> Vec<NotificationEvent> {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Event type labels delivered so far
        #[must_use]
        pub fn event_types(&self) -> Vec<&'static str> {
            self.events().iter().map(NotificationEvent::event_type).collect()
        }
    }

    impl NotificationSink for RecordingSink {
        fn deliver(
            &self,
            event: NotificationEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
            Box::pin(async move {
                self.events
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(event);
                Ok(())
            })
        }
    }

    /// Sink whose deliveries always fail.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct FailingSink;

    impl NotificationSink for FailingSink {
        fn deliver(
            &self,
            event: NotificationEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
            Box::pin(async move {
                Err(NotifyError(format!(
                    "webhook unreachable for {}",
                    event.event_type()
                )))
            })
        }
    }

    /// Blob store keeping uploads in memory under `mem://` locators.
    #[derive(Debug, Clone, Default)]
    pub struct InMemoryBlobStore {
        blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl InMemoryBlobStore {
        /// Create an empty store
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Bytes stored under a locator
        #[must_use]
        pub fn get(&self, proof: &ProofRef) -> Option<Vec<u8>> {
            self.blobs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(proof.as_str())
                .cloned()
        }

        /// Number of stored blobs
        #[must_use]
        pub fn len(&self) -> usize {
            self.blobs.lock().unwrap_or_else(PoisonError::into_inner).len()
        }

        /// Whether nothing was stored
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    impl BlobStore for InMemoryBlobStore {
        fn put(
            &self,
            owner: ActorId,
            bytes: Vec<u8>,
            extension: String,
        ) -> Pin<Box<dyn Future<Output = Result<ProofRef, BlobError>> + Send + '_>> {
            Box::pin(async move {
                if bytes.is_empty() {
                    return Err(BlobError::Rejected("empty upload".to_string()));
                }
                let mut blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
                let locator = format!("mem://{owner}/{}.{extension}", blobs.len() + 1);
                blobs.insert(locator.clone(), bytes);
                Ok(ProofRef::new(locator))
            })
        }
    }
}

/// Builders for common test inputs.
pub mod fixtures {
    use raffle_core::types::{
        Actor, ActorId, Money, NewRaffle, ProofRef, PurchaseRequest, RaffleId, ReserveRequest,
    };

    /// A fresh operator
    #[must_use]
    pub fn operator() -> Actor {
        Actor::operator(ActorId::new())
    }

    /// A fresh buyer
    #[must_use]
    pub fn buyer() -> Actor {
        Actor::buyer(ActorId::new())
    }

    /// A raffle of `total` numbers at 10.00 each
    #[must_use]
    pub fn new_raffle(total: u32) -> NewRaffle {
        NewRaffle {
            title: "Mountain bike".to_string(),
            description: Some("A brand new mountain bike".to_string()),
            ticket_price: Money::from_cents(1_000),
            total_tickets: total,
            image_url: None,
            draw_date: None,
        }
    }

    /// A purchase of `quantity` numbers with the given proof
    #[must_use]
    pub fn purchase(raffle_id: RaffleId, proof: &str, quantity: u32) -> PurchaseRequest {
        PurchaseRequest {
            raffle_id,
            full_name: "Maria Silva".to_string(),
            rg: "12.345.678-9".to_string(),
            payment_proof: ProofRef::new(proof),
            quantity,
        }
    }

    /// A reservation of `quantity` numbers
    #[must_use]
    pub fn reservation(raffle_id: RaffleId, quantity: u32) -> ReserveRequest {
        ReserveRequest {
            raffle_id,
            full_name: "Joao Souza".to_string(),
            rg: "98.765.432-1".to_string(),
            quantity,
        }
    }
}

/// Install a test-friendly tracing subscriber once; later calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Shorthand for a duration in seconds
#[must_use]
pub fn seconds(secs: i64) -> Duration {
    Duration::seconds(secs)
}

// Re-export commonly used items
pub use collaborators::{FailingSink, InMemoryBlobStore, RecordingSink};
pub use mocks::{FixedClock, ManualClock, test_clock};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use raffle_core::blob::BlobStore;
    use raffle_core::types::ActorId;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn manual_clock_advances_for_every_clone() {
        let clock = ManualClock::starting_at_test_time();
        let other = clock.clone();
        clock.advance(seconds(90));
        assert_eq!(other.now(), test_clock().now() + seconds(90));
    }

    #[test]
    fn blob_store_rejects_empty_uploads() {
        let blobs = InMemoryBlobStore::new();
        let owner = ActorId::new();
        let empty = tokio_test::block_on(blobs.put(owner, Vec::new(), "png".to_string()));
        assert!(empty.is_err());

        let proof = tokio_test::block_on(blobs.put(owner, vec![1, 2, 3], "png".to_string())).unwrap();
        assert_eq!(blobs.get(&proof), Some(vec![1, 2, 3]));
    }
}
