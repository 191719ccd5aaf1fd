//! Request metrics: in-process atomic counters plus Prometheus export.
//!
//! Two layers of observability share the same measurements:
//!
//! - [`RequestMetrics`] holds process-local counters in independent atomic
//!   cells (no compound lock), snapshotted by `GET /debug/vars`.
//! - The `metrics` facade mirrors the same events to the Prometheus
//!   exporter started on `METRICS_PORT`.
//!
//! Both are updated by the metrics middleware; neither alters response
//! bytes or headers.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUESTS_RECEIVED_TOTAL: &str = "marquee_requests_received_total";
    pub const RESPONSES_SENT_TOTAL: &str = "marquee_responses_sent_total";
    pub const REQUEST_DURATION_SECONDS: &str = "marquee_request_duration_seconds";
}

/// Process-local request counters.
///
/// Each cell is updated independently with relaxed atomics; the per-status
/// map is sharded (`DashMap`), so no single lock serializes the hot path.
#[derive(Debug, Default)]
pub struct RequestMetrics {
    requests_received: AtomicU64,
    responses_sent: AtomicU64,
    processing_time_micros: AtomicU64,
    responses_by_status: DashMap<u16, u64>,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response(&self, status: u16, duration_micros: u64) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
        self.processing_time_micros
            .fetch_add(duration_micros, Ordering::Relaxed);
        *self.responses_by_status.entry(status).or_insert(0) += 1;
    }

    pub fn requests_received(&self) -> u64 {
        self.requests_received.load(Ordering::Relaxed)
    }

    pub fn responses_sent(&self) -> u64 {
        self.responses_sent.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let responses_by_status = self
            .responses_by_status
            .iter()
            .map(|entry| (entry.key().to_string(), *entry.value()))
            .collect();

        MetricsSnapshot {
            total_requests_received: self.requests_received.load(Ordering::Relaxed),
            total_responses_sent: self.responses_sent.load(Ordering::Relaxed),
            total_processing_time_micros: self.processing_time_micros.load(Ordering::Relaxed),
            total_responses_sent_by_status: responses_by_status,
        }
    }
}

/// Serializable snapshot served by `/debug/vars`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests_received: u64,
    pub total_responses_sent: u64,
    pub total_processing_time_micros: u64,
    pub total_responses_sent_by_status: BTreeMap<String, u64>,
}

/// Initialize the Prometheus metrics exporter.
///
/// Starts the Prometheus HTTP listener on the given address and registers
/// metric descriptions.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::REQUESTS_RECEIVED_TOTAL,
        "Total number of HTTP requests received"
    );
    describe_counter!(
        names::RESPONSES_SENT_TOTAL,
        "Total number of HTTP responses sent, labeled by status code"
    );
    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "HTTP request processing time in seconds"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "failed to initialize metrics, continuing without metrics");
    }
}

/// Mirror a received request to the metrics facade.
pub fn record_request_received() {
    counter!(names::REQUESTS_RECEIVED_TOTAL).increment(1);
}

/// Mirror a completed response to the metrics facade.
pub fn record_response(status: u16, duration_secs: f64) {
    counter!(names::RESPONSES_SENT_TOTAL, "status" => status.to_string()).increment(1);
    histogram!(names::REQUEST_DURATION_SECONDS).record(duration_secs);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = RequestMetrics::new();
        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.total_requests_received, 0);
        assert_eq!(snapshot.total_responses_sent, 0);
        assert_eq!(snapshot.total_processing_time_micros, 0);
        assert!(snapshot.total_responses_sent_by_status.is_empty());
    }

    #[test]
    fn test_record_response_updates_all_cells() {
        let metrics = RequestMetrics::new();

        metrics.record_request_received();
        metrics.record_response(200, 1_500);
        metrics.record_request_received();
        metrics.record_response(404, 300);
        metrics.record_request_received();
        metrics.record_response(200, 700);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests_received, 3);
        assert_eq!(snapshot.total_responses_sent, 3);
        assert_eq!(snapshot.total_processing_time_micros, 2_500);
        assert_eq!(snapshot.total_responses_sent_by_status.get("200"), Some(&2));
        assert_eq!(snapshot.total_responses_sent_by_status.get("404"), Some(&1));
    }

    #[test]
    fn test_concurrent_updates_do_not_lose_counts() {
        use std::sync::Arc;

        let metrics = Arc::new(RequestMetrics::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let metrics = metrics.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..1_000 {
                    metrics.record_request_received();
                    metrics.record_response(200, 1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests_received, 8_000);
        assert_eq!(snapshot.total_responses_sent, 8_000);
        assert_eq!(
            snapshot.total_responses_sent_by_status.get("200"),
            Some(&8_000)
        );
    }

    #[test]
    fn test_facade_recording_does_not_panic_uninitialized() {
        // The metrics facade is a no-op until an exporter is installed.
        record_request_received();
        record_response(200, 0.1);
    }
}
