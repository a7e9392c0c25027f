use crate::http::metrics::HttpMetricsSnapshot;
use crate::processor::stats::StatsCounters;
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Emits one event per stats category under `scope` (e.g. "batch" or "run").
pub fn log_stats(scope: &str, stats: &StatsCounters) {
    for (category, count) in stats.report() {
        tracing::info!(
            target: "profetch::stats",
            scope,
            category = %category,
            count,
            "outcome tally"
        );
    }
}

pub fn log_http_metrics(metrics: &HttpMetricsSnapshot, elapsed: Duration) {
    let seconds = elapsed.as_secs_f64();
    let throughput = if seconds <= f64::EPSILON {
        0.0
    } else {
        metrics.total_requests as f64 / seconds
    };

    tracing::info!(
        target: "profetch::metrics",
        requests = metrics.total_requests,
        errors = metrics.total_errors,
        timeouts = metrics.total_timeouts,
        bytes = metrics.bytes_received,
        avg_latency_ms = format!("{:.2}", metrics.average_latency_ms),
        throughput = format!("{throughput:.2}"),
        "http metrics snapshot"
    );
}
