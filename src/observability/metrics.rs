//! Metrics collection and exposition.
//!
//! # Metrics
//! - `perimeter_requests_blocked_total` (counter): edge rejections by reason
//! - `perimeter_rate_limited_total` (counter): denied checks by scope
//! - `perimeter_threats_detected_total` (counter): gate findings by severity
//! - `perimeter_otp_verifications_total` (counter): verification outcomes
//! - `perimeter_blocked_addresses` (gauge): size of the blocked set
//! - `perimeter_rate_windows` (gauge): live rate windows after a sweep
//!
//! Every recorder is a no-op until `init_metrics` installs the exporter.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::security::scanner::Severity;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_blocked(reason: &'static str) {
    counter!("perimeter_requests_blocked_total", "reason" => reason).increment(1);
}

pub fn record_rate_limited(scope: &'static str) {
    counter!("perimeter_rate_limited_total", "scope" => scope).increment(1);
}

pub fn record_threat(severity: Severity) {
    counter!("perimeter_threats_detected_total", "severity" => severity.as_str()).increment(1);
}

pub fn record_otp_verification(outcome: &'static str) {
    counter!("perimeter_otp_verifications_total", "outcome" => outcome).increment(1);
}

pub fn record_blocked_addresses(count: usize) {
    gauge!("perimeter_blocked_addresses").set(count as f64);
}

pub fn record_rate_windows(count: usize) {
    gauge!("perimeter_rate_windows").set(count as f64);
}
