//! Mock fetcher for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::fetcher::{FetchError, FetchRequest, FetchedPayload, RemoteFetcher};

/// Mock implementation of the RemoteFetcher trait.
///
/// Provides controllable behavior for testing:
/// - Return configured payloads per URL
/// - Fail configured URLs with a given error
/// - Record every request for assertions
/// - Simulate slow hosts
///
/// URLs without a configured response answer with HTTP 404.
///
/// # Example
///
/// ```rust,ignore
/// use idswidget_core::testing::MockFetcher;
///
/// let fetcher = MockFetcher::new();
/// fetcher.set_response("https://host/a.ifc", FetchedPayload::new(b"ISO-10303-21;".to_vec())).await;
///
/// let payload = fetcher.fetch(&FetchRequest::interactive("https://host/a.ifc")).await?;
/// assert_eq!(fetcher.fetch_count().await, 1);
/// ```
#[derive(Default)]
pub struct MockFetcher {
    responses: Arc<RwLock<HashMap<String, Result<FetchedPayload, FetchError>>>>,
    requests: Arc<RwLock<Vec<FetchRequest>>>,
    delay: Arc<RwLock<Option<Duration>>>,
}

impl std::fmt::Debug for MockFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockFetcher")
            .field("responses", &"<responses>")
            .field("requests", &"<requests>")
            .finish()
    }
}

impl MockFetcher {
    /// Create a new mock fetcher with no configured URLs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `payload` for `url`.
    pub async fn set_response(&self, url: &str, payload: FetchedPayload) {
        self.responses
            .write()
            .await
            .insert(url.to_string(), Ok(payload));
    }

    /// Fail every fetch of `url` with `error`.
    pub async fn set_error(&self, url: &str, error: FetchError) {
        self.responses
            .write()
            .await
            .insert(url.to_string(), Err(error));
    }

    /// Delay every fetch by `delay`.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// All requests received so far.
    pub async fn recorded_requests(&self) -> Vec<FetchRequest> {
        self.requests.read().await.clone()
    }

    /// Number of fetches received so far.
    pub async fn fetch_count(&self) -> usize {
        self.requests.read().await.len()
    }

    /// Number of fetches received for `url`.
    pub async fn fetch_count_for(&self, url: &str) -> usize {
        self.requests
            .read()
            .await
            .iter()
            .filter(|r| r.url == url)
            .count()
    }
}

#[async_trait]
impl RemoteFetcher for MockFetcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPayload, FetchError> {
        self.requests.write().await.push(request.clone());

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.responses.read().await.get(&request.url) {
            Some(result) => result.clone(),
            None => Err(FetchError::Status {
                status: 404,
                url: request.url.clone(),
            }),
        }
    }
}
