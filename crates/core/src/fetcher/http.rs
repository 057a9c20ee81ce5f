//! reqwest-backed fetcher.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE, LOCATION, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::{Client, Response, Url};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{
    FetchError, FetchProfile, FetchRequest, FetchedPayload, HostAllowList, RemoteFetcher,
};
use crate::config::FetcherConfig;
use crate::metrics::{FETCH_DURATION, FETCH_REQUESTS};

/// Redirect hops followed before giving up.
const MAX_REDIRECTS: usize = 10;

/// HTTP fetcher with one client per timeout profile.
pub struct HttpFetcher {
    interactive: Client,
    package: Client,
    max_bytes: u64,
    allowed_hosts: HostAllowList,
}

impl HttpFetcher {
    /// Create a new HttpFetcher with the given configuration.
    pub fn new(config: &FetcherConfig) -> Result<Self, FetchError> {
        Self::with_allowed_hosts(config, HostAllowList::default())
    }

    /// Create a fetcher that never contacts a host outside `allowed_hosts`,
    /// checking every redirect hop before following it.
    pub fn with_allowed_hosts(
        config: &FetcherConfig,
        allowed_hosts: HostAllowList,
    ) -> Result<Self, FetchError> {
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

        let build = |timeout_secs: u64| {
            Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .connect_timeout(connect_timeout)
                .redirect(redirect_policy(allowed_hosts.clone()))
                .build()
                .map_err(|e| FetchError::Transport(format!("Failed to create HTTP client: {}", e)))
        };

        Ok(Self {
            interactive: build(config.download_timeout_secs)?,
            package: build(config.package_timeout_secs)?,
            max_bytes: config.max_download_bytes,
            allowed_hosts,
        })
    }

    fn client(&self, profile: FetchProfile) -> &Client {
        match profile {
            FetchProfile::Interactive => &self.interactive,
            FetchProfile::Package => &self.package,
        }
    }

    async fn fetch_inner(&self, request: &FetchRequest) -> Result<FetchedPayload, FetchError> {
        let url = parse_http_url(&request.url)?;

        let mut builder = self.client(request.profile).get(url);
        if let Some(cookie) = &request.cookie {
            builder = builder.header(COOKIE, cookie);
        }
        if let Some(user_agent) = &request.user_agent {
            builder = builder.header(USER_AGENT, user_agent);
        }

        let mut response = builder
            .send()
            .await
            .map_err(|e| map_transport_error(e, &request.url))?;

        let status = response.status();
        if status.is_redirection() {
            if let Some((url, host)) = self.blocked_redirect(&response) {
                return Err(FetchError::RedirectBlocked { url, host });
            }
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: request.url.clone(),
            });
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                    actual: length,
                });
            }
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // Content-Length may be absent or wrong, so count while reading.
        let mut bytes = Vec::with_capacity(response.content_length().unwrap_or(0) as usize);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| map_transport_error(e, &request.url))?
        {
            let actual = (bytes.len() + chunk.len()) as u64;
            if actual > self.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                    actual,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchedPayload {
            bytes,
            content_type,
            final_url: Some(final_url),
        })
    }

    /// Target of a redirect the policy refused to follow.
    fn blocked_redirect(&self, response: &Response) -> Option<(String, String)> {
        if self.allowed_hosts.is_empty() {
            return None;
        }
        let location = response.headers().get(LOCATION)?.to_str().ok()?;
        let target = response.url().join(location).ok()?;
        let host = target.host_str()?.to_string();
        if self.allowed_hosts.allows(&host) {
            return None;
        }
        Some((target.to_string(), host))
    }
}

/// Follow redirects only toward allowed hosts.
///
/// A refused hop stops redirection; the 3xx response is returned as is.
fn redirect_policy(allowed_hosts: HostAllowList) -> Policy {
    if allowed_hosts.is_empty() {
        return Policy::limited(MAX_REDIRECTS);
    }
    Policy::custom(move |attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        let permitted = attempt
            .url()
            .host_str()
            .is_some_and(|host| allowed_hosts.allows(host));
        if permitted {
            attempt.follow()
        } else {
            attempt.stop()
        }
    })
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPayload, FetchError> {
        let start = Instant::now();
        let profile = request.profile.as_str();
        debug!(url = %request.url, profile, "Fetching remote file");

        let result = self.fetch_inner(request).await;

        FETCH_DURATION
            .with_label_values(&[profile])
            .observe(start.elapsed().as_secs_f64());

        match &result {
            Ok(payload) => {
                FETCH_REQUESTS.with_label_values(&[profile, "ok"]).inc();
                debug!(
                    url = %request.url,
                    bytes = payload.bytes.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Remote file fetched"
                );
            }
            Err(e) => {
                FETCH_REQUESTS.with_label_values(&[profile, e.label()]).inc();
                warn!(url = %request.url, error = %e, "Remote fetch failed");
            }
        }

        result
    }
}

/// Parse `raw` and require an http or https scheme.
pub fn parse_http_url(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw).map_err(|e| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {}", other),
        }),
    }
}

fn map_transport_error(e: reqwest::Error, url: &str) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if e.is_connect() {
        FetchError::Connection(e.to_string())
    } else {
        FetchError::Transport(e.to_string())
    }
}
