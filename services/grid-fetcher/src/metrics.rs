//! Prometheus metrics for grid fetch runs.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// Install the Prometheus exporter, serving `/metrics` on `port` for the
/// lifetime of the process.
///
/// The listener goes away when the run exits, so it is only useful for
/// watching long fetches in progress. Final counts are in the completion
/// log line.
pub fn install_exporter(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    describe();
    info!(port = port, "Prometheus metrics exporter initialized");
    Ok(())
}

fn describe() {
    describe_counter!(
        "heatgrid_requests_total",
        "Weather requests sent, including retries"
    );
    describe_counter!(
        "heatgrid_request_failures_total",
        "Failed weather requests by failure kind"
    );
    describe_counter!(
        "heatgrid_request_retries_total",
        "Weather requests retried after a retryable failure"
    );
    describe_counter!("heatgrid_batches_total", "Grid fetches by outcome");
    describe_histogram!(
        "heatgrid_request_duration_ms",
        Unit::Milliseconds,
        "Latency of successful weather requests"
    );
    describe_histogram!(
        "heatgrid_batch_duration_ms",
        Unit::Milliseconds,
        "Wall-clock time to fetch a whole grid"
    );
}
