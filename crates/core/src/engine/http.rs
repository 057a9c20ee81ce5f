//! HTTP client for the validation engine service.

use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{engine_status_error, parse_engine_success, EngineError, EngineRequest, ValidationEngine};
use crate::config::EngineConfig;
use crate::metrics::{ENGINE_DURATION, ENGINE_REQUESTS};
use crate::report::Report;

/// Posts validation requests to the engine and waits for the report.
pub struct HttpValidationEngine {
    client: Client,
    url: String,
    timeout_secs: u64,
}

impl HttpValidationEngine {
    /// Create a new engine client with the given configuration.
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| EngineError::Unreachable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    async fn call(&self, request: &EngineRequest) -> Result<Report, EngineError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !status.is_success() {
            return Err(engine_status_error(status.as_u16(), &body));
        }

        parse_engine_success(&body)
    }

    fn map_transport_error(&self, e: reqwest::Error) -> EngineError {
        if e.is_timeout() {
            EngineError::Timeout(self.timeout_secs)
        } else {
            EngineError::Unreachable(e.to_string())
        }
    }
}

#[async_trait]
impl ValidationEngine for HttpValidationEngine {
    fn name(&self) -> &str {
        "http"
    }

    async fn validate(&self, request: &EngineRequest) -> Result<Report, EngineError> {
        let start = Instant::now();
        debug!(
            url = %self.url,
            ifc = %request.ifc_filename,
            ids = %request.ids_filename,
            report_type = request.report_type.as_str(),
            "Invoking validation engine"
        );

        let result = self.call(request).await;
        ENGINE_DURATION.observe(start.elapsed().as_secs_f64());

        match &result {
            Ok(_) => ENGINE_REQUESTS.with_label_values(&["ok"]).inc(),
            Err(e) => {
                ENGINE_REQUESTS.with_label_values(&[e.label()]).inc();
                warn!(error = %e, "Validation engine call failed");
            }
        }

        result
    }
}
