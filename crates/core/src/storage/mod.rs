//! Per-project artifact storage.
//!
//! Every project owns one directory under the uploads root. Inside it, each
//! validation request stores its fetched inputs and its JSON report under
//! the request's [`CacheKey`](crate::cache_key::CacheKey). The report file is
//! the cache record.

mod namespace;
mod report_cache;

pub use namespace::{Namespace, NamespaceStore};
pub use report_cache::ReportCache;

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// Errors raised by the namespace store and the report cache.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Project identifier cannot be used as a directory name.
    #[error("Invalid project id: {0:?}")]
    InvalidProjectId(String),

    /// Failed to create a namespace directory.
    #[error("Failed to create directory: {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to read a stored artifact or list a namespace.
    #[error("Failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a stored artifact.
    #[error("Failed to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Report could not be serialized.
    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StorageError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}

/// Write `bytes` to a unique temporary sibling of `path`, then rename it
/// over `path`. Readers never observe a partially written file.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    if let Err(e) = fs::write(&tmp_path, bytes).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(StorageError::write(path, e));
    }

    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(StorageError::write(path, e));
    }

    Ok(())
}
