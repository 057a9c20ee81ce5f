//! Mock validation engine for testing.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::engine::{EngineError, EngineRequest, ValidationEngine};
use crate::report::Report;

/// Mock implementation of the ValidationEngine trait.
///
/// Returns a configurable report, can fail the next call, and records every
/// request so tests can assert how often the engine was invoked.
pub struct MockEngine {
    report: Arc<RwLock<Report>>,
    next_error: Arc<RwLock<Option<EngineError>>>,
    requests: Arc<RwLock<Vec<EngineRequest>>>,
    delay: Arc<RwLock<Option<Duration>>>,
    write_output: Arc<RwLock<bool>>,
}

impl std::fmt::Debug for MockEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEngine")
            .field("report", &"<report>")
            .field("next_error", &"<next_error>")
            .field("requests", &"<requests>")
            .finish()
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Create a mock engine answering with a 3-of-4 passing JSON report.
    pub fn new() -> Self {
        Self::with_report(super::fixtures::json_report(4, 3))
    }

    /// Create a mock engine answering with `report`.
    pub fn with_report(report: Report) -> Self {
        Self {
            report: Arc::new(RwLock::new(report)),
            next_error: Arc::new(RwLock::new(None)),
            requests: Arc::new(RwLock::new(Vec::new())),
            delay: Arc::new(RwLock::new(None)),
            write_output: Arc::new(RwLock::new(false)),
        }
    }

    /// Change the report returned by subsequent calls.
    pub async fn set_report(&self, report: Report) {
        *self.report.write().await = report;
    }

    /// Fail the next call with `error`.
    pub async fn fail_next(&self, error: EngineError) {
        *self.next_error.write().await = Some(error);
    }

    /// Delay every call by `delay`.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Write the report body to `output_filename` on every call, before
    /// any configured failure, like the real engine's reporter does.
    pub async fn set_write_output(&self, enabled: bool) {
        *self.write_output.write().await = enabled;
    }

    /// All requests received so far.
    pub async fn recorded_requests(&self) -> Vec<EngineRequest> {
        self.requests.read().await.clone()
    }

    /// Number of calls received so far.
    pub async fn call_count(&self) -> usize {
        self.requests.read().await.len()
    }
}

#[async_trait]
impl ValidationEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn validate(&self, request: &EngineRequest) -> Result<Report, EngineError> {
        self.requests.write().await.push(request.clone());

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.write_output.read().await {
            let body = self.report.read().await.report.clone();
            tokio::fs::write(&request.output_filename, body)
                .await
                .map_err(|e| EngineError::Unreachable(e.to_string()))?;
        }

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        Ok(self.report.read().await.clone())
    }
}
