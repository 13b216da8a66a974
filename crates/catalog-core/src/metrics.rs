//! Prometheus metrics helpers for the catalog import pipeline.
//!
//! # Usage
//!
//! ```rust,ignore
//! use catalog_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     start_metrics_server(9091, handle).await.unwrap();
//!
//!     metrics::counter!("import_lines_total").increment(1);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component name (`import_`, `search_`)
//! - Suffix: unit or type (`_total`, `_seconds`)
//! - Labels: only `result` on file counters

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// Must be called once at startup before any metrics are recorded.
///
/// # Panics
///
/// Panics if called more than once (the recorder can only be installed once).
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_import_metrics();

    handle
}

/// Like [`init_metrics`] but returns `None` if a recorder is already installed.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    register_import_metrics();
    Some(handle)
}

/// Start the Prometheus metrics HTTP server.
///
/// Binds `/metrics` on the given port, then serves it from a background task.
/// Returns once the listener is bound.
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

/// Register descriptions for the import pipeline metrics.
fn register_import_metrics() {
    // =========================================================================
    // Import run
    // =========================================================================

    describe_gauge!(
        "import_running",
        "Whether an import run is in progress (1=yes, 0=no)"
    );
    describe_counter!(
        "import_files_total",
        "Feed files attempted (label: result=success|failure)"
    );
    describe_counter!("import_lines_total", "Feed lines read");
    describe_counter!(
        "import_decode_failures_total",
        "Lines skipped because they did not decode to a product record"
    );
    describe_counter!(
        "import_records_stored_total",
        "Product records inserted or updated"
    );
    describe_counter!(
        "import_records_failed_total",
        "Product records rejected by validation or the store"
    );
    describe_histogram!(
        "import_batch_duration_seconds",
        "Time spent storing one batch"
    );

    // =========================================================================
    // Search indexing
    // =========================================================================

    describe_counter!(
        "search_batches_indexed_total",
        "Stored batches submitted to the search index"
    );
    describe_counter!(
        "search_records_indexed_total",
        "Records submitted to the search index"
    );
    describe_counter!(
        "search_index_errors_total",
        "Batches the search index rejected or could not be reached for"
    );
}

/// Increment a counter.
#[inline]
pub fn increment(name: &'static str, count: u64) {
    metrics::counter!(name).increment(count);
}

/// Set a gauge value.
#[inline]
pub fn set_gauge(name: &'static str, value: f64) {
    metrics::gauge!(name).set(value);
}
