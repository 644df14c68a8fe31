//! Per-tenant attachment storage on the local filesystem.
//!
//! Every tenant owns one directory under the uploads root. Paths handed to
//! and returned from this module are relative to that directory and always
//! `/`-separated.

use std::path::{Component, Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;
use walkdir::WalkDir;

use crate::errors::{ImportExportError, ImportExportResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub relative_path: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct AttachmentStorage {
    root: PathBuf,
}

impl AttachmentStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tenant_root(&self, tenant_id: &str) -> ImportExportResult<PathBuf> {
        let component = Path::new(tenant_id);
        let mut components = component.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(component)),
            _ => Err(ImportExportError::InvalidPath(format!(
                "Invalid tenant id for storage: {}",
                tenant_id
            ))),
        }
    }

    /// Absolute location of a tenant file, rejecting paths that would
    /// escape the tenant root.
    pub fn resolve(&self, tenant_id: &str, relative_path: &str) -> ImportExportResult<PathBuf> {
        let relative = sanitize_relative_path(relative_path)?;
        Ok(self.tenant_root(tenant_id)?.join(relative))
    }

    /// Every regular file below the tenant root, sorted by relative path.
    /// A tenant without a storage directory has no files.
    pub async fn list_files(&self, tenant_id: &str) -> ImportExportResult<Vec<StoredFile>> {
        let root = self.tenant_root(tenant_id)?;
        if !tokio::fs::try_exists(&root).await? {
            return Ok(Vec::new());
        }

        let files = tokio::task::spawn_blocking(move || -> ImportExportResult<Vec<StoredFile>> {
            let mut files = Vec::new();
            for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    ImportExportError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry.path().strip_prefix(&root).map_err(|e| {
                    ImportExportError::InvalidPath(format!(
                        "Failed to compute relative path for {:?}: {}",
                        entry.path(),
                        e
                    ))
                })?;
                let size = entry
                    .metadata()
                    .map_err(|e| {
                        ImportExportError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
                    })?
                    .len();
                files.push(StoredFile {
                    relative_path: to_slash_path(relative),
                    size,
                });
            }
            Ok(files)
        })
        .await
        .map_err(|e| ImportExportError::ExportFailed(format!("File listing task failed: {}", e)))??;

        Ok(files)
    }

    pub async fn exists(&self, tenant_id: &str, relative_path: &str) -> ImportExportResult<bool> {
        let path = self.resolve(tenant_id, relative_path)?;
        Ok(tokio::fs::try_exists(path).await?)
    }

    pub async fn open(
        &self,
        tenant_id: &str,
        relative_path: &str,
    ) -> ImportExportResult<tokio::fs::File> {
        let path = self.resolve(tenant_id, relative_path)?;
        tokio::fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ImportExportError::FileNotFound(relative_path.to_string())
            } else {
                ImportExportError::Io(e)
            }
        })
    }

    pub async fn read(&self, tenant_id: &str, relative_path: &str) -> ImportExportResult<Vec<u8>> {
        let path = self.resolve(tenant_id, relative_path)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ImportExportError::FileNotFound(relative_path.to_string())
            } else {
                ImportExportError::Io(e)
            }
        })
    }

    /// Writes the file, creating missing parent directories.
    pub async fn write(
        &self,
        tenant_id: &str,
        relative_path: &str,
        bytes: &[u8],
    ) -> ImportExportResult<()> {
        let path = self.resolve(tenant_id, relative_path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        debug!("Wrote {} bytes to {:?}", bytes.len(), path);
        Ok(())
    }

    /// Deletes the tenant's whole storage directory. Missing directories are
    /// not an error.
    pub async fn remove_tenant_root(&self, tenant_id: &str) -> ImportExportResult<()> {
        let root = self.tenant_root(tenant_id)?;
        match tokio::fs::remove_dir_all(&root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

pub fn sanitize_relative_path(path: &str) -> ImportExportResult<PathBuf> {
    let candidate = Path::new(path);
    if path.is_empty()
        || candidate.is_absolute()
        || candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(ImportExportError::InvalidPath(format!(
            "Invalid path component: {}",
            path
        )));
    }
    let sanitized: PathBuf = candidate
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    if sanitized.as_os_str().is_empty() {
        return Err(ImportExportError::InvalidPath(format!(
            "Invalid path component: {}",
            path
        )));
    }
    Ok(sanitized)
}

/// Turns a stored attachment path into a path relative to the tenant root.
/// Records written by older releases carry an `/uploads/` prefix.
pub fn normalize_record_path(path: &str) -> String {
    let trimmed = path.trim().replace('\\', "/");
    let trimmed = trimmed.trim_start_matches('/');
    let trimmed = trimmed.strip_prefix("uploads/").unwrap_or(trimmed);
    trimmed.trim_start_matches('/').to_string()
}

pub fn to_slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(value) => Some(value.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
