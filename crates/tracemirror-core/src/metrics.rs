//! Prometheus metrics helpers for tracemirror.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tracemirror_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     start_metrics_server(9090, handle).await.unwrap();
//!
//!     metrics::counter!("sync_batches_committed_total").increment(1);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component (`sync_`)
//! - Suffix: unit or type (`_total`, `_block`)
//! - Labels: only low-cardinality values such as an outcome name

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// This must be called once at startup before any metrics are recorded.
///
/// # Panics
///
/// Panics if called more than once (the recorder can only be installed once).
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_sync_metrics();

    handle
}

/// Like [`init_metrics`] but returns `None` if a recorder is already installed.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    register_sync_metrics();
    Some(handle)
}

/// Serve `/metrics` on `port` from a background task.
///
/// Binding happens before this returns so a port conflict is reported to the
/// caller instead of being lost inside the task.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Metrics server stopped: {}", e);
        }
    });

    Ok(())
}

/// Register descriptions for the sync engine's metrics.
fn register_sync_metrics() {
    // =========================================================================
    // Poll loop
    // =========================================================================

    describe_gauge!(
        "sync_running",
        "Whether the poll loop is running (1=yes, 0=no)"
    );
    describe_gauge!(
        "sync_cursor_block",
        "Last block whose log entries were committed to the store"
    );
    describe_counter!(
        "sync_fetch_failures_total",
        "Fetches that failed because the origin was unavailable"
    );

    // =========================================================================
    // Batches and entries
    // =========================================================================

    describe_counter!(
        "sync_batches_committed_total",
        "Batches whose transaction committed"
    );
    describe_counter!(
        "sync_batches_failed_total",
        "Batches rolled back and left for the next interval"
    );
    describe_counter!(
        "sync_entries_total",
        "Log entries processed (label: outcome)"
    );
    describe_counter!(
        "sync_decode_failures_total",
        "Log entries skipped because they did not match their schema"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_init_metrics_idempotent() {
        // First call may or may not succeed (depends on test order)
        let handle1 = try_init_metrics();
        let handle2 = try_init_metrics();

        // At most one should succeed
        assert!(handle1.is_none() || handle2.is_none());
    }

    #[test]
    fn test_register_sync_metrics_does_not_panic() {
        let _ = try_init_metrics();
        register_sync_metrics();
        register_sync_metrics();
    }
}
