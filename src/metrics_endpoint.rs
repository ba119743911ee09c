//! Metrics HTTP endpoint
//!
//! Serves the collector's counters in Prometheus exposition format on a
//! dedicated port, next to a trivial health check. Kept off the
//! composition port so that operational scrapes never mix with page
//! traffic.

use crate::metrics::{MetricsSnapshot, StitchMetrics};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Metrics endpoint server
pub struct MetricsEndpoint {
    metrics: Arc<StitchMetrics>,
    addr: SocketAddr,
}

impl MetricsEndpoint {
    pub fn new(metrics: Arc<StitchMetrics>, addr: SocketAddr) -> Self {
        Self { metrics, addr }
    }

    /// Start serving `/metrics` and `/health`; runs until the process ends
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Metrics endpoint listening on http://{}/metrics", self.addr);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let metrics = Arc::clone(&self.metrics);

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let metrics = Arc::clone(&metrics);
                    async move { handle_request(req, metrics).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving metrics connection: {:?}", err);
                }
            });
        }
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<StitchMetrics>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    match req.uri().path() {
        "/metrics" => Ok(metrics_response(metrics)),
        "/health" => Ok(health_response()),
        _ => Ok(not_found_response()),
    }
}

fn metrics_response(metrics: Arc<StitchMetrics>) -> Response<Full<Bytes>> {
    let snapshot = metrics.get_stats();
    let body = format_prometheus_metrics(&snapshot);

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Format the snapshot in Prometheus text exposition format
fn format_prometheus_metrics(snapshot: &MetricsSnapshot) -> String {
    let mut output = String::new();

    output.push_str("# HELP pagestitch_requests_total Total number of composition requests\n");
    output.push_str("# TYPE pagestitch_requests_total counter\n");
    output.push_str(&format!("pagestitch_requests_total {}\n", snapshot.total_requests));
    output.push('\n');

    output.push_str("# HELP pagestitch_primary_responses_total Responses whose status came from a primary fragment\n");
    output.push_str("# TYPE pagestitch_primary_responses_total counter\n");
    output.push_str(&format!(
        "pagestitch_primary_responses_total {}\n",
        snapshot.primary_responses
    ));
    output.push('\n');

    output.push_str("# HELP pagestitch_failed_requests_total Requests answered with a 500\n");
    output.push_str("# TYPE pagestitch_failed_requests_total counter\n");
    output.push_str(&format!(
        "pagestitch_failed_requests_total {}\n",
        snapshot.failed_requests
    ));
    output.push('\n');

    output.push_str("# HELP pagestitch_fragments_total Total number of fragment fetches\n");
    output.push_str("# TYPE pagestitch_fragments_total counter\n");
    output.push_str(&format!("pagestitch_fragments_total {}\n", snapshot.total_fragments));
    output.push('\n');

    output.push_str("# HELP pagestitch_failed_fragments_total Fragment fetches with no usable response\n");
    output.push_str("# TYPE pagestitch_failed_fragments_total counter\n");
    output.push_str(&format!(
        "pagestitch_failed_fragments_total {}\n",
        snapshot.failed_fragments
    ));
    output.push('\n');

    output.push_str("# HELP pagestitch_fragment_fallbacks_total Fallback fetch attempts\n");
    output.push_str("# TYPE pagestitch_fragment_fallbacks_total counter\n");
    output.push_str(&format!(
        "pagestitch_fragment_fallbacks_total {}\n",
        snapshot.fragment_fallbacks
    ));
    output.push('\n');

    output.push_str("# HELP pagestitch_fragment_timeouts_total Fragment head timeouts\n");
    output.push_str("# TYPE pagestitch_fragment_timeouts_total counter\n");
    output.push_str(&format!(
        "pagestitch_fragment_timeouts_total {}\n",
        snapshot.fragment_timeouts
    ));
    output.push('\n');

    output.push_str("# HELP pagestitch_fragment_failure_rate Fragment failure rate percentage\n");
    output.push_str("# TYPE pagestitch_fragment_failure_rate gauge\n");
    output.push_str(&format!(
        "pagestitch_fragment_failure_rate {:.2}\n",
        snapshot.fragment_failure_rate()
    ));
    output.push('\n');

    output.push_str("# HELP pagestitch_bytes_to_client_total Total bytes streamed to clients\n");
    output.push_str("# TYPE pagestitch_bytes_to_client_total counter\n");
    output.push_str(&format!(
        "pagestitch_bytes_to_client_total {}\n",
        snapshot.bytes_to_client
    ));

    output
}

fn health_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(r#"{"status":"healthy"}"#)))
        .unwrap()
}

fn not_found_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "text/plain")
        .body(Full::new(Bytes::from("404 Not Found")))
        .unwrap()
}
