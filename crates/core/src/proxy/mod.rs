//! Same-origin proxy for browser downloads.
//!
//! Browsers cannot fetch model files or package archives from third-party
//! hosts directly because of cross-origin policy. The proxy performs the
//! request server-side, relaying the caller's session where needed.

mod packages;

pub use packages::{PackageError, PackageStore};

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ProxyConfig;
use crate::fetcher::{
    parse_http_url, FetchError, FetchRequest, FetchedPayload, HostAllowList, RemoteFetcher,
};
use crate::metrics::PROXY_REQUESTS;

/// First two bytes of a zip archive (wheels are zip files).
pub const PACKAGE_MAGIC: [u8; 2] = *b"PK";

/// Errors that can occur while proxying a download.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Target URL is malformed or not http(s).
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Target host is not in the allow-list.
    #[error("Host not allowed: {0}")]
    HostNotAllowed(String),

    /// Upstream could not be reached or answered with an error status.
    #[error("Upstream request failed: {0}")]
    Upstream(#[source] FetchError),

    /// Upstream answered 2xx with a payload that is not a package archive.
    #[error("Upstream payload from {url} is not a package archive (starts with {found:?})")]
    Integrity { url: String, found: Vec<u8> },
}

impl ProxyError {
    /// Stable tag for JSON error bodies and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "invalid_request",
            Self::HostNotAllowed(_) => "host_not_allowed",
            Self::Upstream(_) => "proxy_error",
            Self::Integrity { .. } => "integrity_error",
        }
    }
}

impl From<FetchError> for ProxyError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::InvalidUrl { url, reason } => {
                Self::InvalidUrl(format!("{}: {}", url, reason))
            }
            FetchError::RedirectBlocked { host, .. } => Self::HostNotAllowed(host),
            other => Self::Upstream(other),
        }
    }
}

/// Forwards browser download requests to third-party hosts.
pub struct Proxy {
    fetcher: Arc<dyn RemoteFetcher>,
    package_user_agent: String,
    allowed_hosts: HostAllowList,
}

impl Proxy {
    pub fn new(fetcher: Arc<dyn RemoteFetcher>, config: &ProxyConfig) -> Self {
        Self {
            fetcher,
            package_user_agent: config.package_user_agent.clone(),
            allowed_hosts: HostAllowList::new(&config.allowed_hosts),
        }
    }

    /// Relay a download with the caller's cookie and user agent.
    pub async fn download(
        &self,
        url: &str,
        cookie: Option<String>,
        user_agent: Option<String>,
    ) -> Result<FetchedPayload, ProxyError> {
        let result = self.download_inner(url, cookie, user_agent).await;
        record("download", &result);
        result
    }

    /// Fetch a package archive and verify it starts with [`PACKAGE_MAGIC`].
    ///
    /// No cookies are relayed; a fixed browser-like user agent is sent.
    pub async fn package(&self, url: &str) -> Result<FetchedPayload, ProxyError> {
        let result = self.package_inner(url).await;
        record("package", &result);
        result
    }

    async fn download_inner(
        &self,
        url: &str,
        cookie: Option<String>,
        user_agent: Option<String>,
    ) -> Result<FetchedPayload, ProxyError> {
        self.check_url(url)?;
        info!(url, has_cookie = cookie.is_some(), "Proxying download");

        let request = FetchRequest::interactive(url)
            .with_cookie(cookie)
            .with_user_agent(user_agent);

        let payload = self.fetcher.fetch(&request).await?;
        self.check_final_url(&payload)?;
        Ok(payload)
    }

    async fn package_inner(&self, url: &str) -> Result<FetchedPayload, ProxyError> {
        self.check_url(url)?;
        info!(url, "Proxying package");

        let request =
            FetchRequest::package(url).with_user_agent(Some(self.package_user_agent.clone()));
        let payload = self.fetcher.fetch(&request).await?;
        self.check_final_url(&payload)?;

        if !payload.bytes.starts_with(&PACKAGE_MAGIC) {
            let found: Vec<u8> = payload.bytes.iter().take(PACKAGE_MAGIC.len()).copied().collect();
            warn!(url, ?found, "Package payload failed magic-byte check");
            return Err(ProxyError::Integrity {
                url: url.to_string(),
                found,
            });
        }

        Ok(payload)
    }

    fn check_url(&self, raw: &str) -> Result<(), ProxyError> {
        let url = parse_http_url(raw)?;
        let host = url.host_str().unwrap_or_default();
        if self.allowed_hosts.allows(host) {
            Ok(())
        } else {
            Err(ProxyError::HostNotAllowed(host.to_ascii_lowercase()))
        }
    }

    // The fetcher may have followed redirects the allow-list does not cover.
    fn check_final_url(&self, payload: &FetchedPayload) -> Result<(), ProxyError> {
        match &payload.final_url {
            Some(url) if !self.allowed_hosts.is_empty() => {
                let result = self.check_url(url);
                if let Err(e) = &result {
                    warn!(final_url = %url, error = %e, "Proxy target redirected off the allow-list");
                }
                result
            }
            _ => Ok(()),
        }
    }
}

fn record(kind: &str, result: &Result<FetchedPayload, ProxyError>) {
    let label = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    PROXY_REQUESTS.with_label_values(&[kind, label]).inc();
}
