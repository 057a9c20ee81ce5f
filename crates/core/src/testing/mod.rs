//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the external service traits,
//! allowing validation and proxy flows to be exercised without a network or
//! a running validation engine.
//!
//! # Example
//!
//! ```rust,ignore
//! use idswidget_core::testing::{fixtures, MockEngine, MockFetcher};
//!
//! let fetcher = MockFetcher::new();
//! let engine = MockEngine::new();
//!
//! // Configure mock responses
//! fetcher.set_response("https://host/a.ifc", fixtures::ifc_payload()).await;
//! engine.set_report(fixtures::json_report(10, 7)).await;
//!
//! // Use in ValidationService...
//! ```

mod mock_engine;
mod mock_fetcher;

pub use mock_engine::MockEngine;
pub use mock_fetcher::MockFetcher;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::fetcher::FetchedPayload;
    use crate::report::Report;
    use crate::validation::ValidationRequest;

    /// Minimal STEP header standing in for an IFC model.
    pub fn ifc_payload() -> FetchedPayload {
        FetchedPayload::new(b"ISO-10303-21;\nHEADER;\nENDSEC;\n".to_vec())
            .with_content_type("application/octet-stream")
    }

    /// Minimal IDS document.
    pub fn ids_payload() -> FetchedPayload {
        FetchedPayload::new(
            br#"<?xml version="1.0"?><ids xmlns="http://standards.buildingsmart.org/IDS"/>"#
                .to_vec(),
        )
        .with_content_type("application/xml")
    }

    /// A JSON-mode report with `passed` of `total` specifications passing.
    pub fn json_report(total: u32, passed: u32) -> Report {
        Report::with_counts(
            total,
            passed,
            format!(r#"{{"title":"Test","total_specifications":{}}}"#, total),
        )
    }

    /// A validation request for `filename` uploaded on 2024-01-01 with size 100.
    pub fn validation_request(project_id: &str, download_link: &str, filename: &str) -> ValidationRequest {
        ValidationRequest {
            project_id: project_id.to_string(),
            download_link: download_link.to_string(),
            filename: filename.to_string(),
            upload_date: "2024-01-01".to_string(),
            file_size: "100".to_string(),
            ids_download_link: None,
            ids_filename: None,
            report_type: Default::default(),
        }
    }
}
