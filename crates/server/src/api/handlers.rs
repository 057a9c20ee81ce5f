use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::error;

use super::{error_response, ErrorResponse};
use crate::metrics::encode_metrics;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Serve the browser client's configuration document.
pub async fn client_config(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<ErrorResponse>)> {
    let path = state.client_config_path();

    let bytes = tokio::fs::read(path).await.map_err(|e| {
        error!(path = %path.display(), error = %e, "Failed to read client config");
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "config_unavailable",
            "Client configuration unavailable",
        )
    })?;

    let value = serde_json::from_slice(&bytes).map_err(|e| {
        error!(path = %path.display(), error = %e, "Client config is not valid JSON");
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "config_unavailable",
            "Client configuration unavailable",
        )
    })?;

    Ok(Json(value))
}

/// Prometheus text exposition.
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
