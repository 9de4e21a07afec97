//! Prometheus metrics exposition
//!
//! - `playlist_actions_requests_total` (counter): labels `route`, `status`
//! - `playlist_actions_request_duration_seconds` (histogram): label `route`
//! - `upstream_errors_total` (counter): label `error_type`
//! - `token_refresh_total` (counter): label `outcome`, emitted by the token broker

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "playlist_actions_request_duration_seconds";

/// Bucket boundaries from 5ms to 30s; handlers make at most a handful of
/// sequential upstream calls, each bounded by the configured timeout.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
}

/// Install the global Prometheus recorder and return a handle for `/metrics`.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a completed request against its matched route.
pub fn record_request(route: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "playlist_actions_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(DURATION_METRIC, "route" => route.to_string()).record(duration_secs);
}

/// Record a failed call to Spotify or the store.
pub fn record_upstream_error(error_type: &str) {
    metrics::counter!("upstream_errors_total", "error_type" => error_type.to_string())
        .increment(1);
}

/// In-process counters for the `/health` response.
#[derive(Clone)]
pub struct ServiceMetrics {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}
