//! Injected dependencies: time and randomness.
//!
//! Both allocation and the random draw take their randomness from a
//! [`RandomSource`], so tests reproduce a run by seeding it instead of swapping the
//! algorithm.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};

/// Clock trait - abstracts time operations for testability
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Uniform source of indices.
///
/// Statistical uniformity is required; cryptographic strength is not.
pub trait RandomSource: Send + Sync {
    /// Returns an index uniformly distributed in `0..upper`.
    ///
    /// Callers never pass `upper == 0`; implementations return 0 in that case.
    fn index_below(&self, upper: usize) -> usize;
}

/// Thread-local RNG, the production source
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn index_below(&self, upper: usize) -> usize {
        if upper == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..upper)
    }
}

/// Deterministic source seeded once, shared behind a mutex
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    /// Creates a source that replays the same sequence for the same seed
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn index_below(&self, upper: usize) -> usize {
        if upper == 0 {
            return 0;
        }
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen_range(0..upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_sources_replay() {
        let a = SeededRandom::new(42);
        let b = SeededRandom::new(42);
        let first: Vec<usize> = (0..20).map(|_| a.index_below(1000)).collect();
        let second: Vec<usize> = (0..20).map(|_| b.index_below(1000)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn indices_stay_in_bounds() {
        let source = ThreadRandom;
        for upper in 1..50 {
            assert!(source.index_below(upper) < upper);
        }
        assert_eq!(source.index_below(0), 0);
    }
}
