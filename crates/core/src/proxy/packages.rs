//! Read-through store for pre-fetched package files.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

use crate::metrics::PROXY_REQUESTS;

static PACKAGE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._+-]{0,254}$").unwrap());

/// Errors that can occur while serving a local package.
#[derive(Debug, Error)]
pub enum PackageError {
    /// Filename could escape the package directories.
    #[error("Invalid package name: {0:?}")]
    InvalidName(String),

    /// No candidate directory holds the file.
    #[error("Package not found: {0}")]
    NotFound(String),
}

impl PackageError {
    /// Stable tag for JSON error bodies and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidName(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
        }
    }
}

/// Serves package files from an ordered list of local directories.
#[derive(Debug, Clone)]
pub struct PackageStore {
    dirs: Vec<PathBuf>,
}

impl PackageStore {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Read `filename` from the first directory that has it.
    pub async fn read(&self, filename: &str) -> Result<Vec<u8>, PackageError> {
        let result = self.read_inner(filename).await;
        let label = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        PROXY_REQUESTS
            .with_label_values(&["local_package", label])
            .inc();
        result
    }

    async fn read_inner(&self, filename: &str) -> Result<Vec<u8>, PackageError> {
        if !PACKAGE_NAME.is_match(filename) || filename.contains("..") {
            return Err(PackageError::InvalidName(filename.to_string()));
        }

        for dir in &self.dirs {
            let candidate = dir.join(filename);
            match fs::read(&candidate).await {
                Ok(bytes) => {
                    debug!(path = %candidate.display(), bytes = bytes.len(), "Serving local package");
                    return Ok(bytes);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(path = %candidate.display(), error = %e, "Skipping unreadable package candidate");
                    continue;
                }
            }
        }

        Err(PackageError::NotFound(filename.to_string()))
    }
}
