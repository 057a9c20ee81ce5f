//! Validation report as returned by the engine and persisted in the cache.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Output format requested from the validation engine.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Html,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Html => "html",
        }
    }

    /// Extension of the cache record holding a report in this format.
    ///
    /// JSON records keep the plain `{key}.json` layout.
    pub fn record_extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Html => "html.json",
        }
    }

    /// Extension of the file the engine writes its own output to.
    pub fn engine_output_extension(&self) -> &'static str {
        match self {
            Self::Json => "engine.json",
            Self::Html => "engine.html",
        }
    }
}

/// A validation report.
///
/// Counts are only present for JSON reports. Fields the engine adds beyond
/// the known ones are kept in `extra` so a cached report is returned exactly
/// as it was received.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_specifications: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed_specifications: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_specifications: Option<u32>,
    /// Raw report body (JSON document or HTML page, as text).
    pub report: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Report {
    /// A successful JSON-mode report.
    pub fn with_counts(total: u32, passed: u32, body: impl Into<String>) -> Self {
        Self {
            success: true,
            total_specifications: Some(total),
            passed_specifications: Some(passed),
            failed_specifications: Some(total.saturating_sub(passed)),
            report: body.into(),
            extra: Map::new(),
        }
    }

    /// A successful report without specification counts (HTML mode).
    pub fn body_only(body: impl Into<String>) -> Self {
        Self {
            success: true,
            total_specifications: None,
            passed_specifications: None,
            failed_specifications: None,
            report: body.into(),
            extra: Map::new(),
        }
    }
}
