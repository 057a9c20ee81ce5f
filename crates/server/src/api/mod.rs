pub mod handlers;
pub mod middleware;
pub mod proxy;
pub mod routes;
pub mod validate;

use axum::{http::StatusCode, Json};
use serde::Serialize;

pub use routes::create_router;

/// Error body shared by all endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub kind: String,
}

/// Build an error response with `status`.
pub fn error_response(
    status: StatusCode,
    kind: &str,
    error: impl Into<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: error.into(),
            kind: kind.to_string(),
        }),
    )
}
