//! Types for the validation engine client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::report::{Report, ReportFormat};

/// Longest slice of an engine error body kept in [`EngineError::Status`].
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Request body sent to the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineRequest {
    /// Model path, e.g. `uploads/{project}/{key}.ifc`.
    pub ifc_filename: String,
    /// Specification path or bare filename resolved inside the namespace.
    pub ids_filename: String,
    /// Where the engine writes its own copy of the report.
    pub output_filename: String,
    pub report_type: ReportFormat,
    #[serde(rename = "projectID")]
    pub project_id: String,
}

/// Errors that can occur while invoking the engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Engine could not be reached.
    #[error("Validation engine unreachable: {0}")]
    Unreachable(String),

    /// Engine did not answer in time.
    #[error("Validation engine timed out after {0}s")]
    Timeout(u64),

    /// Engine answered with a non-success status.
    #[error("Validation engine returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Engine answered 2xx with a body that is not a report.
    #[error("Malformed validation engine response: {0}")]
    MalformedResponse(String),

    /// Engine answered 2xx but reported a failed validation run.
    #[error("Validation failed: {0}")]
    Rejected(String),
}

impl EngineError {
    /// Label used in metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "unreachable",
            Self::Timeout(_) => "timeout",
            Self::Status { .. } => "status",
            Self::MalformedResponse(_) => "malformed",
            Self::Rejected(_) => "rejected",
        }
    }
}

/// Validates a model against a specification.
#[async_trait]
pub trait ValidationEngine: Send + Sync {
    /// Returns the name of this engine implementation.
    fn name(&self) -> &str;

    /// Run one validation. No retries are attempted.
    async fn validate(&self, request: &EngineRequest) -> Result<Report, EngineError>;
}

/// Interpret a successful (2xx) engine body.
pub fn parse_engine_success(body: &str) -> Result<Report, EngineError> {
    let value = decode_body(body)
        .ok_or_else(|| EngineError::MalformedResponse("body is not JSON".to_string()))?;

    if value.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(EngineError::Rejected(
            error_message(&value).unwrap_or_else(|| "engine reported failure".to_string()),
        ));
    }

    serde_json::from_value(value).map_err(|e| EngineError::MalformedResponse(e.to_string()))
}

/// Build the error for a non-2xx engine answer.
pub fn engine_status_error(status: u16, body: &str) -> EngineError {
    let message = decode_body(body)
        .as_ref()
        .and_then(error_message)
        .unwrap_or_else(|| body.chars().take(MAX_ERROR_BODY_CHARS).collect());

    EngineError::Status { status, message }
}

// Error payloads sometimes arrive as a JSON string holding a JSON document.
fn decode_body(body: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(body).ok()? {
        Value::String(inner) => serde_json::from_str(&inner).ok(),
        value => Some(value),
    }
}

fn error_message(value: &Value) -> Option<String> {
    ["error", "detail"]
        .iter()
        .find_map(|field| value.get(*field))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}
