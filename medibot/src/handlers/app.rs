use crate::services::metrics::get_metrics;
use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Liveness probe.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "medibot",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness probe: the execution backend must be reachable.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.provider.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ready", "provider": state.provider.name() })),
        ),
        Err(e) => {
            tracing::warn!(provider = state.provider.name(), error = %e, "Provider not ready");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unavailable",
                    "provider": state.provider.name(),
                    "error": e.to_string()
                })),
            )
        }
    }
}

pub async fn metrics() -> impl IntoResponse {
    get_metrics()
}
