//! Prometheus export and the audit chain's service-level metrics.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

use crate::config::MetricsConfig;
use crate::error::ServiceError;

/// Why an event never reached the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Queue stayed full for the whole enqueue timeout.
    QueueTimeout,
    /// Queue was full and the caller would not wait.
    QueueFull,
    /// Writer task has stopped.
    WriterClosed,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::QueueTimeout => "queue_timeout",
            DropReason::QueueFull => "queue_full",
            DropReason::WriterClosed => "writer_closed",
        }
    }
}

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within the tokio runtime, once, before any metrics are recorded.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), ServiceError> {
    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .map_err(|e| ServiceError::Metrics(format!("invalid listen address: {}", e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(&[0.001, 0.005, 0.01, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0])
        .map_err(|e| ServiceError::Metrics(e.to_string()))?
        .install()
        .map_err(|e| ServiceError::Metrics(e.to_string()))
}

pub fn record_event_dropped(reason: DropReason) {
    counter!("audit_events_dropped_total", "reason" => reason.as_str()).increment(1);
}

/// `outcome` is `success` or `failure`.
pub fn record_append(outcome: &'static str) {
    counter!("audit_append_total", "outcome" => outcome).increment(1);
}

/// Event stored despite failing the producer format checks.
pub fn record_nonconforming_event() {
    counter!("audit_events_nonconforming_total").increment(1);
}

pub fn record_verification(result: &'static str, total: u64, tampered: usize) {
    counter!("audit_verification_total", "result" => result).increment(1);
    if result != "failed" {
        gauge!("audit_chain_length").set(total as f64);
        gauge!("audit_chain_tampered_entries").set(tampered as f64);
    }
}

pub fn record_immutability(fully_protected: bool) {
    gauge!("audit_immutability_enforced").set(if fully_protected { 1.0 } else { 0.0 });
}
