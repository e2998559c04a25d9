//! HTTP status endpoints: latest observation, upload history and gauges

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::metrics::GaugeRegistry;
use crate::state::StateHandle;

const METRICS_CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

#[derive(Clone)]
pub struct StatusState {
    pub state: StateHandle,
    pub gauges: Arc<GaugeRegistry>,
}

/// Build the status axum router
pub fn build_router(state: StateHandle, gauges: Arc<GaugeRegistry>) -> Router {
    Router::new()
        .route("/", get(status_handler))
        .route("/api/status", get(status_handler))
        .route("/api/history", get(history_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(StatusState { state, gauges })
}

async fn status_handler(State(status): State<StatusState>) -> impl IntoResponse {
    let state = status.state.read().await;

    let last_report = state.history.back().map(|r| {
        serde_json::json!({
            "sink": r.sink,
            "success": r.success,
            "timestamp": r.timestamp,
        })
    });

    axum::Json(serde_json::json!({
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "latest": state.latest,
        "last_report": last_report,
    }))
}

async fn history_handler(State(status): State<StatusState>) -> impl IntoResponse {
    let state = status.state.read().await;
    let history: Vec<_> = state.history.iter().cloned().collect();
    axum::Json(history)
}

async fn metrics_handler(State(status): State<StatusState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
        status.gauges.render(),
    )
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}
