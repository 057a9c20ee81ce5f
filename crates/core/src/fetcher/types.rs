//! Types for the remote fetcher.

use async_trait::async_trait;
use thiserror::Error;

/// Timeout class of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchProfile {
    /// Model and specification files requested on behalf of a user.
    Interactive,
    /// Large package archives.
    Package,
}

impl FetchProfile {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Package => "package",
        }
    }
}

/// A single GET request to a remote host.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub profile: FetchProfile,
    /// Raw `Cookie` header value relayed upstream.
    pub cookie: Option<String>,
    /// `User-Agent` sent upstream.
    pub user_agent: Option<String>,
}

impl FetchRequest {
    /// Plain interactive download without forwarded headers.
    pub fn interactive(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            profile: FetchProfile::Interactive,
            cookie: None,
            user_agent: None,
        }
    }

    /// Package download without forwarded headers.
    pub fn package(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            profile: FetchProfile::Package,
            cookie: None,
            user_agent: None,
        }
    }

    pub fn with_cookie(mut self, cookie: Option<String>) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Body and content type of a successful download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPayload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    /// URL the body was served from, after redirects.
    pub final_url: Option<String>,
}

impl FetchedPayload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: None,
            final_url: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_final_url(mut self, url: impl Into<String>) -> Self {
        self.final_url = Some(url.into());
        self
    }
}

/// Hosts a download may reach, redirects included.
///
/// A listed host also admits its subdomains. An empty list admits any host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostAllowList {
    hosts: Vec<String>,
}

impl HostAllowList {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn allows(&self, host: &str) -> bool {
        if self.hosts.is_empty() {
            return true;
        }
        let host = host.to_ascii_lowercase();
        self.hosts.iter().any(|allowed| {
            host == *allowed
                || host
                    .strip_suffix(allowed.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

/// Errors that can occur while downloading a remote file.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// URL is malformed or not http(s).
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Remote host answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Payload exceeds the configured size limit.
    #[error("Payload of {actual} bytes exceeds limit of {limit} bytes")]
    TooLarge { limit: u64, actual: u64 },

    /// Request timed out.
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    /// Could not connect to the remote host.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Any other transport failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Upstream redirected to a host outside the allow-list.
    #[error("Redirect to disallowed host {host}")]
    RedirectBlocked { url: String, host: String },
}

impl FetchError {
    /// Upstream HTTP status, when the host answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Label used in metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidUrl { .. } => "invalid_url",
            Self::Status { .. } => "status",
            Self::TooLarge { .. } => "too_large",
            Self::Timeout { .. } => "timeout",
            Self::Connection(_) => "connection",
            Self::Transport(_) => "transport",
            Self::RedirectBlocked { .. } => "redirect_blocked",
        }
    }
}

/// Downloads remote files.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Returns the name of this fetcher implementation.
    fn name(&self) -> &str;

    /// Issue a GET for `request.url` and return the body.
    ///
    /// No retries are attempted. Any non-2xx status is an error.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPayload, FetchError>;
}
