use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::Request,
    middleware::Next,
    response::IntoResponse,
};
use metrics::Recorder;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusRecorder};

/// A recorder shared between the components that emit metrics. It is never
/// installed globally: callers scope it with [`metrics::with_local_recorder`].
pub type SharedRecorder = Arc<dyn Recorder + Send + Sync>;

/// Build a prometheus recorder, its handle renders the `/metrics` payload.
pub fn setup_metrics_recorder() -> Result<PrometheusRecorder, BuildError> {
    const BUCKETS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 50.0, 100.0, 250.0,
    ];

    Ok(PrometheusBuilder::new().set_buckets(BUCKETS)?.build_recorder())
}

/// Middleware to record some common HTTP metrics into the shared recorder.
/// Use with `axum::middleware::from_fn_with_state(recorder, track_metrics)`.
pub async fn track_metrics(
    State(recorder): State<SharedRecorder>,
    req: Request<Body>,
    next: Next,
) -> impl IntoResponse {
    let start = Instant::now();

    let path = if let Some(matched_path) = req.extensions().get::<MatchedPath>() {
        matched_path.as_str().to_owned()
    } else {
        req.uri().path().to_owned()
    };

    let method = req.method().clone();

    // Run the rest of the request handling first, so we can measure it and get response
    // codes.
    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let labels = [
        ("method", method.to_string()),
        ("path", path),
        ("status", status),
    ];

    metrics::with_local_recorder(recorder.as_ref(), || {
        metrics::counter!("http_requests_total", &labels).increment(1);
        metrics::histogram!("http_requests_duration_seconds", &labels).record(latency);
    });

    response
}
