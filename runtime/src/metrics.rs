//! Prometheus metrics for the raffle engine.
//!
//! Business counters are recorded through the `metrics` facade, so they are no-ops
//! until a recorder is installed. The server installs one with
//! [`MetricsServer::start`] and serves [`MetricsServer::render`] on its metrics
//! port.
//!
//! # Example
//!
//! ```rust,no_run
//! use raffle_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! let body = server.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder plus the address its scrape endpoint is served on.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server for `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Scrape address
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Describe every metric and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed. An already
    /// installed recorder (tests) is tolerated with a warning.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if the recorder was not installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "raffle_tickets_allocated_total",
        "Numbers handed out by purchases and reservations"
    );
    describe_counter!(
        "raffle_allocation_retries_total",
        "Allocations retried after a uniqueness violation"
    );
    describe_counter!(
        "raffle_allocation_contention_total",
        "Allocations that exhausted their retry budget"
    );
    describe_histogram!(
        "raffle_allocation_duration_seconds",
        "Time to allocate and insert the tickets of one purchase"
    );
    describe_counter!(
        "raffle_tickets_decided_total",
        "Operator decisions on pending tickets, by decision"
    );
    describe_counter!("raffle_draws_total", "Completed draws, by mode");
    describe_counter!(
        "raffle_notifications_total",
        "Notification events, by outcome (queued, dropped, delivered, failed)"
    );
}

/// Allocation metrics recorder.
pub struct AllocationMetrics;

impl AllocationMetrics {
    /// Record a committed allocation.
    pub fn record_allocated(count: usize, duration: Duration) {
        counter!("raffle_tickets_allocated_total").increment(count as u64);
        histogram!("raffle_allocation_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a retry after `NumberTaken`.
    pub fn record_retry() {
        counter!("raffle_allocation_retries_total").increment(1);
    }

    /// Record an exhausted retry budget.
    pub fn record_contention() {
        counter!("raffle_allocation_contention_total").increment(1);
    }
}

/// Decision and draw metrics recorder.
pub struct LifecycleMetrics;

impl LifecycleMetrics {
    /// Record `count` tickets decided the same way.
    pub fn record_decided(decision: &'static str, count: usize) {
        counter!("raffle_tickets_decided_total", "decision" => decision).increment(count as u64);
    }

    /// Record a completed draw.
    pub fn record_draw(mode: &'static str) {
        counter!("raffle_draws_total", "mode" => mode).increment(1);
    }
}

/// Notification metrics recorder.
pub struct NotificationMetrics;

impl NotificationMetrics {
    /// Record a notification outcome.
    pub fn record(outcome: &'static str) {
        counter!("raffle_notifications_total", "outcome" => outcome).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_a_noop() {
        AllocationMetrics::record_allocated(3, Duration::from_millis(4));
        AllocationMetrics::record_retry();
        LifecycleMetrics::record_decided("approve", 2);
        LifecycleMetrics::record_draw("random");
        NotificationMetrics::record("queued");
    }

    #[test]
    fn render_is_none_before_start() {
        let server = MetricsServer::new(([127, 0, 0, 1], 9090).into());
        assert!(server.render().is_none());
        assert_eq!(server.addr().port(), 9090);
    }
}
