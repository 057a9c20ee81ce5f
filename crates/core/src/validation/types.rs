//! Types for the validation orchestrator.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::cache_key::{CacheKey, KeyInputs, KeyScheme};
use crate::engine::EngineError;
use crate::fetcher::FetchError;
use crate::report::{Report, ReportFormat};
use crate::storage::StorageError;

/// Extension used for the model file when the declared filename has none.
pub const DEFAULT_MODEL_EXTENSION: &str = "ifc";

/// Extension used for the specification file when its name has none.
pub const DEFAULT_SPEC_EXTENSION: &str = "ids";

/// A request to validate one remotely hosted model.
///
/// Field names accept the camelCase forms the widget front-end sends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationRequest {
    #[serde(alias = "projectID", alias = "projectId")]
    pub project_id: String,
    /// URL of the model file.
    #[serde(alias = "downloadlink", alias = "downloadLink")]
    pub download_link: String,
    /// Declared name of the model file.
    pub filename: String,
    #[serde(alias = "uploadDate", deserialize_with = "string_or_number")]
    pub upload_date: String,
    #[serde(alias = "fileSize", deserialize_with = "string_or_number")]
    pub file_size: String,
    /// URL of a specification file to validate against.
    #[serde(
        default,
        alias = "idsdownloadlink",
        alias = "idsDownloadLink",
        skip_serializing_if = "Option::is_none"
    )]
    pub ids_download_link: Option<String>,
    /// Declared name of the specification file.
    #[serde(default, alias = "idsFilename", skip_serializing_if = "Option::is_none")]
    pub ids_filename: Option<String>,
    #[serde(default, alias = "reportType")]
    pub report_type: ReportFormat,
}

impl ValidationRequest {
    /// Reject requests with missing required fields.
    pub fn check(&self) -> Result<(), ValidationError> {
        let required = [
            ("project_id", &self.project_id),
            ("download_link", &self.download_link),
            ("filename", &self.filename),
            ("upload_date", &self.upload_date),
            ("file_size", &self.file_size),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ValidationError::InvalidRequest(format!(
                    "Missing required field: {}",
                    name
                )));
            }
        }
        if let Some(link) = &self.ids_download_link {
            if link.trim().is_empty() {
                return Err(ValidationError::InvalidRequest(
                    "ids_download_link must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Name the specification contributes to the cache key.
    ///
    /// `None` when the engine's default specification is used. Otherwise
    /// the declared name, or the last path segment of the link.
    pub fn spec_name(&self) -> Option<&str> {
        let link = self.ids_download_link.as_deref()?;
        if let Some(name) = self.ids_filename.as_deref().filter(|n| !n.is_empty()) {
            return Some(name);
        }
        let path = link.split(['?', '#']).next().unwrap_or(link);
        Some(
            path.rsplit('/')
                .find(|segment| !segment.is_empty())
                .unwrap_or(path),
        )
    }

    /// Derive the cache key for this request.
    pub fn cache_key(&self, scheme: KeyScheme) -> CacheKey {
        CacheKey::derive(
            scheme,
            &KeyInputs {
                filename: &self.filename,
                spec_filename: self.spec_name(),
                upload_date: &self.upload_date,
                file_size: &self.file_size,
            },
        )
    }

    /// Extension the stored model file gets.
    pub fn model_extension(&self) -> String {
        extension_of(&self.filename).unwrap_or_else(|| DEFAULT_MODEL_EXTENSION.to_string())
    }

    /// Extension the stored specification file gets.
    ///
    /// Never equal to the model extension, so both inputs can coexist.
    pub fn spec_extension(&self) -> String {
        let ext = self
            .spec_name()
            .and_then(extension_of)
            .unwrap_or_else(|| DEFAULT_SPEC_EXTENSION.to_string());
        if ext == self.model_extension() {
            format!("spec.{}", ext)
        } else {
            ext
        }
    }
}

/// Lowercased alphanumeric extension of `name`, if any.
///
/// Report extensions are refused so an input never lands on the report path.
fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    let ext = ext.to_ascii_lowercase();
    if ext == ReportFormat::Json.as_str() || ext == ReportFormat::Html.as_str() {
        return None;
    }
    Some(ext)
}

// The front-end sends sizes and dates as numbers or strings depending on the host.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// Result of a successful validation request.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub key: CacheKey,
    pub report: Report,
    /// The report was served from the cache without calling the engine.
    pub cache_hit: bool,
}

/// Which input a fetch failure concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Model,
    Specification,
}

impl InputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Specification => "specification",
        }
    }

    fn failure_message(&self) -> &'static str {
        match self {
            Self::Model => "Failed to download the file",
            Self::Specification => "Failed to download the specification file",
        }
    }
}

/// Errors that can occur while handling a validation request.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Request is missing data or carries unusable values.
    #[error("{0}")]
    InvalidRequest(String),

    /// A source file could not be downloaded.
    #[error("{}", input.failure_message())]
    Fetch {
        input: InputKind,
        #[source]
        source: FetchError,
    },

    /// The engine failed or rejected the validation run.
    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("{0}")]
    Storage(#[from] StorageError),
}

impl ValidationError {
    /// Stable tag for JSON error bodies and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::Storage(StorageError::InvalidProjectId(_)) => {
                "invalid_request"
            }
            Self::Fetch { .. } => "fetch_failed",
            Self::Engine(_) => "engine_error",
            Self::Storage(_) => "storage_error",
        }
    }

    /// Whether the caller's input caused the failure.
    ///
    /// Source download failures count as caller errors: the link came from
    /// the caller.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_)
                | Self::Fetch { .. }
                | Self::Storage(StorageError::InvalidProjectId(_))
        )
    }
}
