//! Monitor: small HTTP status API next to the record listener.

use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the monitor router
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, REQUEST_TIMEOUT))
        .with_state(state)
}

/// Serve the monitor API until `shutdown` flips to `true`.
pub async fn serve_monitor(
    listener: TcpListener,
    state: SharedState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}

/// Root handler - shows API info
async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "name": "Log Router",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "metrics": "/metrics"
        }
    }))
}

async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let uptime = chrono::Utc::now() - state.started_at;
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "uptime_secs": uptime.num_seconds(),
            "listener": state.config.bind_address,
            "sink": {
                "name": state.sink.name(),
                "destination": state.sink.destination(),
            },
            "connections": {
                "active": state.metrics.active_connections(),
                "max": state.config.max_connections,
            }
        })),
    )
}

async fn metrics_handler(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}
