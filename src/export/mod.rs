//! Prometheus exposition endpoint.
//!
//! One registry backs both metric families: the instrumented process's
//! metrics under the "runtime" namespace and the agent's own ingest
//! health under "runtimoor".

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, IntGauge, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::ingest::stats::IngestStats;
use crate::producers::MetricProducer;

const SELF_NAMESPACE: &str = "runtimoor";

/// Agent self-metrics, refreshed from the ingest counters on every
/// scrape.
struct SelfMetrics {
    active_connections: IntGauge,
    frames_received: IntGauge,
    events_dispatched: IntGauge,
    events_unrecognized: IntGauge,
    decode_errors: IntGauge,
    malformed_events: IntGauge,
}

impl SelfMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_connections = IntGauge::with_opts(
            Opts::new(
                "active_connections",
                "Number of instrumented processes currently connected.",
            )
            .namespace(SELF_NAMESPACE),
        )?;
        let frames_received = IntGauge::with_opts(
            Opts::new("frames_received", "Total frames read off ingest connections.")
                .namespace(SELF_NAMESPACE),
        )?;
        let events_dispatched = IntGauge::with_opts(
            Opts::new(
                "events_dispatched",
                "Total events consumed by at least one parser.",
            )
            .namespace(SELF_NAMESPACE),
        )?;
        let events_unrecognized = IntGauge::with_opts(
            Opts::new(
                "events_unrecognized",
                "Total events no parser was registered for.",
            )
            .namespace(SELF_NAMESPACE),
        )?;
        let decode_errors = IntGauge::with_opts(
            Opts::new("decode_errors", "Total frames that failed to decode.")
                .namespace(SELF_NAMESPACE),
        )?;
        let malformed_events = IntGauge::with_opts(
            Opts::new(
                "malformed_events",
                "Total recognized events with too few payload slots.",
            )
            .namespace(SELF_NAMESPACE),
        )?;

        registry.register(Box::new(active_connections.clone()))?;
        registry.register(Box::new(frames_received.clone()))?;
        registry.register(Box::new(events_dispatched.clone()))?;
        registry.register(Box::new(events_unrecognized.clone()))?;
        registry.register(Box::new(decode_errors.clone()))?;
        registry.register(Box::new(malformed_events.clone()))?;

        Ok(Self {
            active_connections,
            frames_received,
            events_dispatched,
            events_unrecognized,
            decode_errors,
            malformed_events,
        })
    }

    fn refresh(&self, stats: &IngestStats) {
        let snap = stats.snapshot();
        self.active_connections.set(snap.active_connections() as i64);
        self.frames_received.set(snap.frames_received as i64);
        self.events_dispatched.set(snap.events_dispatched as i64);
        self.events_unrecognized.set(snap.events_unrecognized as i64);
        self.decode_errors.set(snap.decode_errors as i64);
        self.malformed_events.set(snap.malformed_events as i64);
    }
}

/// Serves /metrics and /healthz.
pub struct MetricsServer {
    addr: String,
    state: Arc<AppState>,
    shutdown: parking_lot::Mutex<Option<CancellationToken>>,
    bound: parking_lot::Mutex<Option<SocketAddr>>,
}

impl MetricsServer {
    pub fn new(
        addr: &str,
        registry: Registry,
        producers: Vec<Box<dyn MetricProducer>>,
        stats: Arc<IngestStats>,
    ) -> Result<Self> {
        let self_metrics =
            SelfMetrics::new(&registry).context("registering self metrics")?;

        Ok(Self {
            addr: addr.to_string(),
            state: Arc::new(AppState {
                registry,
                producers,
                stats,
                self_metrics,
            }),
            shutdown: parking_lot::Mutex::new(None),
            bound: parking_lot::Mutex::new(None),
        })
    }

    /// Starts the HTTP server.
    pub async fn start(&self) -> Result<()> {
        // Handle ":port" shorthand.
        let bind_addr = if self.addr.starts_with(':') {
            format!("0.0.0.0{}", self.addr)
        } else {
            self.addr.clone()
        };

        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/healthz", get(healthz_handler))
            .with_state(Arc::clone(&self.state));

        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("listening on {bind_addr}"))?;
        let local_addr = listener.local_addr().context("getting local address")?;
        *self.bound.lock() = Some(local_addr);

        let cancel = CancellationToken::new();
        *self.shutdown.lock() = Some(cancel.clone());

        tokio::spawn(async move {
            tracing::info!(addr = %local_addr, "metrics server started");

            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    cancel.cancelled().await;
                })
                .await;

            if let Err(e) = result {
                tracing::error!(error = %e, "metrics server error");
            }
        });

        Ok(())
    }

    /// The address the server actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound.lock()
    }

    /// Gracefully shuts down the server.
    pub async fn stop(&self) {
        if let Some(cancel) = self.shutdown.lock().take() {
            cancel.cancel();
        }
    }
}

/// Shared state for axum handlers.
struct AppState {
    registry: Registry,
    producers: Vec<Box<dyn MetricProducer>>,
    stats: Arc<IngestStats>,
    self_metrics: SelfMetrics,
}

/// Refresh derived metrics and encode the registry as Prometheus text.
fn render_metrics(state: &AppState) -> Result<String> {
    for producer in &state.producers {
        producer.update();
    }
    state.self_metrics.refresh(&state.stats);

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&state.registry.gather(), &mut buffer)
        .context("encoding metrics")?;
    String::from_utf8(buffer).context("metrics are not valid utf-8")
}

/// GET /metrics - Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match render_metrics(&state) {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => {
            tracing::error!(error = %e, "rendering metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "encoding error".to_string(),
            )
        }
    }
}

/// GET /healthz - Simple health check.
async fn healthz_handler() -> &'static str {
    "ok"
}
