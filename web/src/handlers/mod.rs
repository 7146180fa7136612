//! HTTP request handlers, grouped by resource.

pub mod health;
pub mod raffles;
pub mod reports;
pub mod tickets;

pub use health::{health_check, readiness_check};
