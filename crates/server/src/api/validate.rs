//! Validation API handler.

use axum::{
    extract::{FromRequest, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use std::sync::Arc;
use tracing::debug;

use idswidget_core::{ValidationError, ValidationRequest};

use super::{error_response, ErrorResponse};
use crate::state::AppState;

/// Header telling the caller whether the report came from the cache.
pub const CACHE_HEADER: &str = "x-cache";

// ============================================================================
// Handlers
// ============================================================================

/// Validate a remotely hosted model and return its report.
///
/// Accepts a JSON body or an urlencoded form with the same fields.
pub async fn validate(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let request = parse_request(request).await?;
    debug!(project_id = %request.project_id, filename = %request.filename, "Validation requested");

    match state.validation().validate(request).await {
        Ok(outcome) => {
            let cache = if outcome.cache_hit { "hit" } else { "miss" };
            let mut response = Json(outcome.report).into_response();
            response
                .headers_mut()
                .insert(CACHE_HEADER, HeaderValue::from_static(cache));
            Ok(response)
        }
        Err(e) => Err(error_response(status_for(&e), e.kind(), e.to_string())),
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn parse_request(
    request: Request,
) -> Result<ValidationRequest, (StatusCode, Json<ErrorResponse>)> {
    let is_form = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));

    let parsed = if is_form {
        Form::<ValidationRequest>::from_request(request, &())
            .await
            .map(|Form(body)| body)
            .map_err(|e| e.body_text())
    } else {
        Json::<ValidationRequest>::from_request(request, &())
            .await
            .map(|Json(body)| body)
            .map_err(|e| e.body_text())
    };

    parsed.map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            format!("Invalid request body: {}", e),
        )
    })
}

fn status_for(error: &ValidationError) -> StatusCode {
    if error.is_caller_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
