//! Download proxy and local wheel handlers.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use idswidget_core::{FetchedPayload, PackageError, ProxyError};

use super::{error_response, ErrorResponse};
use crate::state::AppState;

/// Content type used when the upstream does not send one.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type of locally served wheels.
const WHEEL_CONTENT_TYPE: &str = "application/zip";

// ============================================================================
// Request Types
// ============================================================================

/// Query parameters for proxy endpoints
#[derive(Debug, Deserialize)]
pub struct ProxyParams {
    /// Remote URL to fetch
    pub url: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Relay a download, forwarding the caller's cookie and user agent.
pub async fn download(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProxyParams>,
    headers: HeaderMap,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let url = required_url(params)?;
    let cookie = header_string(&headers, header::COOKIE);
    let user_agent = header_string(&headers, header::USER_AGENT);

    match state.proxy().download(&url, cookie, user_agent).await {
        Ok(payload) => Ok(payload_response(payload)),
        Err(e) => Err(proxy_error(e)),
    }
}

/// Fetch a wheel archive and check it is a zip before relaying it.
pub async fn wheel(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProxyParams>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let url = required_url(params)?;

    match state.proxy().package(&url).await {
        Ok(payload) => Ok(payload_response(payload)),
        Err(e) => Err(proxy_error(e)),
    }
}

/// Serve a pre-fetched wheel from the local package directories.
pub async fn local_wheel(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    match state.packages().read(&filename).await {
        Ok(bytes) => Ok(bytes_response(bytes, HeaderValue::from_static(WHEEL_CONTENT_TYPE))),
        Err(e) => {
            let status = match &e {
                PackageError::InvalidName(_) => StatusCode::BAD_REQUEST,
                PackageError::NotFound(_) => StatusCode::NOT_FOUND,
            };
            Err(error_response(status, e.kind(), e.to_string()))
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn required_url(params: ProxyParams) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    match params.url {
        Some(url) if !url.trim().is_empty() => Ok(url),
        _ => Err(error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "Missing url parameter",
        )),
    }
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn payload_response(payload: FetchedPayload) -> Response {
    let content_type = payload
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    bytes_response(payload.bytes, content_type)
}

fn bytes_response(bytes: Vec<u8>, content_type: HeaderValue) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            ),
        ],
        bytes,
    )
        .into_response()
}

fn proxy_error(error: ProxyError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &error {
        ProxyError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
        ProxyError::HostNotAllowed(_) => StatusCode::FORBIDDEN,
        ProxyError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ProxyError::Integrity { .. } => StatusCode::BAD_GATEWAY,
    };
    error_response(status, error.kind(), error.to_string())
}
