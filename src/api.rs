use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::store::KvStore;

/// Health/metrics surface (spec.md §6 "Metrics endpoint" / "Health probe").
/// Deliberately not the dashboard/REST API named out of scope in spec.md
/// §1 — only liveness, readiness, and the Prometheus scrape target.
struct ApiState {
    kv: Arc<dyn KvStore>,
    prometheus: PrometheusHandle,
}

pub fn router(kv: Arc<dyn KvStore>, prometheus: PrometheusHandle) -> Router {
    let state = Arc::new(ApiState { kv, prometheus });
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Liveness: the process is up and scheduling tasks. Always 200 once the
/// router is serving — actual task health is readiness's job.
async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Readiness: the KV store actually answers. A failed round-trip degrades
/// the probe to 503 without tearing anything down (spec.md §5 "Breaker
/// open ⇒ degraded mode", read here for the narrower KV-reachability case).
async fn readyz(State(state): State<Arc<ApiState>>) -> StatusCode {
    match state.kv.exists("__wikisurge_readyz_probe__").await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn metrics(State(state): State<Arc<ApiState>>) -> String {
    state.prometheus.render()
}

/// Binds and serves the router until `cancel` fires (spec.md §5 "A context
/// cancellation MUST unwind").
pub async fn serve(router: Router, addr: &str, cancel: CancellationToken) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "health/metrics server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await?;
    Ok(())
}

/// Shutdown flush deadline referenced by `main.rs` when winding down tasks
/// after cancellation (spec.md §5 "flush in-flight batches best-effort
/// within a shutdown deadline").
pub const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);
