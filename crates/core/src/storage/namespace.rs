//! Project namespaces on disk.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::{write_atomic, StorageError};
use crate::cache_key::CacheKey;
use crate::report::ReportFormat;

static PROJECT_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").unwrap());

/// A directory scoped to one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    project_id: String,
    path: PathBuf,
}

impl Namespace {
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of `{key}.{ext}` inside this namespace.
    pub fn artifact_path(&self, key: &CacheKey, ext: &str) -> PathBuf {
        self.path.join(format!("{}.{}", key, ext))
    }

    /// Cache record path for `key` in `format`.
    pub fn report_path(&self, key: &CacheKey, format: ReportFormat) -> PathBuf {
        self.artifact_path(key, format.record_extension())
    }
}

/// Owns the uploads root and the project directories below it.
#[derive(Debug, Clone)]
pub struct NamespaceStore {
    root: PathBuf,
}

impl NamespaceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Namespace for `project_id` without touching the filesystem.
    pub fn resolve(&self, project_id: &str) -> Result<Namespace, StorageError> {
        if !PROJECT_ID.is_match(project_id) {
            return Err(StorageError::InvalidProjectId(project_id.to_string()));
        }
        Ok(Namespace {
            project_id: project_id.to_string(),
            path: self.root.join(project_id),
        })
    }

    /// Create the project directory if absent.
    ///
    /// An existing directory is not an error. On unix the directory is left
    /// with mode `0o755`.
    pub async fn ensure(&self, project_id: &str) -> Result<Namespace, StorageError> {
        let namespace = self.resolve(project_id)?;

        fs::create_dir_all(&namespace.path)
            .await
            .map_err(|e| StorageError::CreateDir {
                path: namespace.path.clone(),
                source: e,
            })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&namespace.path, std::fs::Permissions::from_mode(0o755))
                .await
                .map_err(|e| StorageError::CreateDir {
                    path: namespace.path.clone(),
                    source: e,
                })?;
        }

        debug!(project_id, path = %namespace.path.display(), "Namespace ready");
        Ok(namespace)
    }

    /// Persist a fetched input as `{key}.{ext}` and return its path.
    pub async fn write_artifact(
        &self,
        namespace: &Namespace,
        key: &CacheKey,
        ext: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let path = namespace.artifact_path(key, ext);
        write_atomic(&path, bytes).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "Artifact written");
        Ok(path)
    }

    /// Remove a transient artifact. A file that is already gone is not an error.
    pub async fn remove_artifact(&self, path: &Path) -> Result<(), StorageError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::write(path, e)),
        }
    }

    /// Sorted entry names in the project directory.
    ///
    /// A namespace that was never created lists as empty.
    pub async fn list(&self, project_id: &str) -> Result<Vec<String>, StorageError> {
        let namespace = self.resolve(project_id)?;

        let mut entries = match fs::read_dir(&namespace.path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::read(&namespace.path, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::read(&namespace.path, e))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}
