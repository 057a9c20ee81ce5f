//! Report cache: one JSON file per cache key and report format.

use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, warn};

use super::{write_atomic, Namespace, StorageError};
use crate::cache_key::CacheKey;
use crate::report::{Report, ReportFormat};

/// Reads and writes persisted reports.
///
/// Presence of a parseable record in the namespace means the request was
/// already validated in that format: `{key}.json` for JSON reports,
/// `{key}.html.json` for HTML reports.
#[derive(Debug, Clone, Default)]
pub struct ReportCache;

impl ReportCache {
    pub fn new() -> Self {
        Self
    }

    /// Look up the report stored for `key` in `format`.
    ///
    /// A report file that exists but does not parse is treated as a miss so
    /// the next successful validation replaces it.
    pub async fn lookup(
        &self,
        namespace: &Namespace,
        key: &CacheKey,
        format: ReportFormat,
    ) -> Result<Option<Report>, StorageError> {
        let path = namespace.report_path(key, format);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key = %key, format = format.as_str(), "Cache miss");
                return Ok(None);
            }
            Err(e) => return Err(StorageError::read(&path, e)),
        };

        match serde_json::from_slice::<Report>(&bytes) {
            Ok(report) => {
                debug!(key = %key, format = format.as_str(), "Cache hit");
                Ok(Some(report))
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Ignoring unreadable cached report"
                );
                Ok(None)
            }
        }
    }

    /// Persist `report` as the `format` cache record for `key`, replacing
    /// any previous record.
    pub async fn write(
        &self,
        namespace: &Namespace,
        key: &CacheKey,
        format: ReportFormat,
        report: &Report,
    ) -> Result<PathBuf, StorageError> {
        let path = namespace.report_path(key, format);
        let bytes = serde_json::to_vec(report)?;
        write_atomic(&path, &bytes).await?;
        debug!(path = %path.display(), "Report persisted");
        Ok(path)
    }
}
