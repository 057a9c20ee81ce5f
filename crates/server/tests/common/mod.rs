//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock dependencies injected, enabling endpoint testing without a
//! network or a running validation engine.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use idswidget_core::{
    testing::{MockEngine, MockFetcher},
    ClientConfig, Config, ProxyConfig, RemoteFetcher, StorageConfig, ValidationEngine,
};

/// Re-export fixtures for test convenience
pub use idswidget_core::testing::fixtures;

/// Test fixture for E2E testing with mock dependencies.
///
/// Provides an in-process server with fully controllable mocks for:
/// - Remote downloads (MockFetcher)
/// - The validation engine (MockEngine)
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_validate() {
///     let fixture = TestFixture::new().await;
///     fixture.fetcher.set_response(url, fixtures::ifc_payload()).await;
///
///     let response = fixture.post("/validate", json!({ ... })).await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock fetcher - configure remote payloads
    pub fetcher: Arc<MockFetcher>,
    /// Mock engine - configure reports and failures
    pub engine: Arc<MockEngine>,
    /// Temporary directory holding uploads, wheels and the client config
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub bytes: Vec<u8>,
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let fetcher = Arc::new(MockFetcher::new());
        let engine = Arc::new(MockEngine::new());

        let config = Config {
            storage: StorageConfig {
                uploads_dir: temp_dir.path().join("uploads"),
                ..Default::default()
            },
            proxy: ProxyConfig {
                package_dirs: vec![temp_dir.path().join("wheels")],
                allowed_hosts: test_config.allowed_hosts,
                ..Default::default()
            },
            client: ClientConfig {
                config_path: temp_dir.path().join("config.json"),
            },
            ..Default::default()
        };

        let state = Arc::new(idswidget_server::state::AppState::new(
            config,
            Arc::clone(&fetcher) as Arc<dyn RemoteFetcher>,
            Arc::clone(&engine) as Arc<dyn ValidationEngine>,
        ));

        let router = idswidget_server::api::create_router(state);

        Self {
            router,
            fetcher,
            engine,
            temp_dir,
        }
    }

    /// Uploads root used by the validation service.
    pub fn uploads_dir(&self) -> PathBuf {
        self.temp_dir.path().join("uploads")
    }

    /// Sorted entries of a project namespace (empty when absent).
    pub fn namespace_entries(&self, project_id: &str) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(self.uploads_dir().join(project_id)) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    /// Place a wheel in the local package directory.
    pub fn add_local_wheel(&self, filename: &str, bytes: &[u8]) {
        let dir = self.temp_dir.path().join("wheels");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(filename), bytes).unwrap();
    }

    /// Write the client configuration document.
    pub fn write_client_config(&self, content: &str) {
        std::fs::write(self.temp_dir.path().join("config.json"), content).unwrap();
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.get_with_headers(path, &[]).await
    }

    /// Send a GET request with extra headers.
    pub async fn get_with_headers(&self, path: &str, headers: &[(&str, &str)]) -> TestResponse {
        let mut builder = Request::builder().method("GET").uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request_raw(
            "POST",
            path,
            &serde_json::to_string(&body).unwrap(),
            "application/json",
        )
        .await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        self.request_raw("POST", path, body, "application/json").await
    }

    /// Send a POST request with custom content type.
    pub async fn post_with_content_type(
        &self,
        path: &str,
        body: &str,
        content_type: &str,
    ) -> TestResponse {
        self.request_raw("POST", path, body, content_type).await
    }

    /// Send a request with raw string body and custom content type.
    async fn request_raw(
        &self,
        method: &str,
        path: &str,
        body: &str,
        content_type: &str,
    ) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("Content-Type", content_type)
            .body(Body::from(body.to_string()))
            .unwrap();

        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
            bytes: body_bytes.to_vec(),
        }
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Restrict proxy targets to these hosts
    pub allowed_hosts: Vec<String>,
}

impl TestConfig {
    /// Create config with a proxy host allow-list.
    pub fn with_allowed_hosts(hosts: &[&str]) -> Self {
        Self {
            allowed_hosts: hosts.iter().map(|h| h.to_string()).collect(),
        }
    }
}
