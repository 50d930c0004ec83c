//! Filesystem-backed object store
//!
//! [`LocalObjectStore`] keeps every object as a plain file under a single root
//! directory, using the object key as the relative path:
//!
//! ```text
//! <root>/
//! └── patients/<patient_id>/entries/<entry_id>/<filename>
//! ```
//!
//! It backs the local command line and the filesystem tests. Keys are validated by
//! [`ObjectPath`], and the resolved path is checked to stay within the canonical
//! root before any I/O.

use crate::{chunk_progress, FilesError, FilesResult, ObjectPath, ObjectStore, UploadProgress};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Object store rooted at a directory on the local filesystem.
#[derive(Debug)]
pub struct LocalObjectStore {
    /// Canonicalised root directory containing all objects
    root_directory: PathBuf,
}

impl LocalObjectStore {
    /// Creates a store rooted at `root_directory`.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::InvalidRootDirectory` if the directory does not exist,
    /// is not a directory, or cannot be canonicalised.
    pub fn new(root_directory: &Path) -> Result<Self, FilesError> {
        if !root_directory.exists() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Directory does not exist: {}",
                root_directory.display()
            )));
        }

        if !root_directory.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Path is not a directory: {}",
                root_directory.display()
            )));
        }

        let root_directory = root_directory.canonicalize().map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                root_directory.display(),
                e
            ))
        })?;

        Ok(Self { root_directory })
    }

    /// Reads a stored object back.
    pub async fn read(&self, path: &ObjectPath) -> FilesResult<Vec<u8>> {
        let storage_path = self.storage_path(path)?;
        match tokio::fs::read(&storage_path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FilesError::NotFound(path.to_string()))
            }
            Err(e) => Err(FilesError::Io(e)),
        }
    }

    #[must_use]
    pub fn root_directory(&self) -> &Path {
        &self.root_directory
    }

    /// Resolves an object key to its absolute location under the root.
    fn storage_path(&self, path: &ObjectPath) -> FilesResult<PathBuf> {
        let resolved = path
            .segments()
            .fold(self.root_directory.clone(), |acc, segment| acc.join(segment));

        if !resolved.starts_with(&self.root_directory) {
            return Err(FilesError::InvalidPath(format!(
                "object path escapes the store root: {}",
                path
            )));
        }
        Ok(resolved)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(
        &self,
        path: &ObjectPath,
        bytes: &[u8],
        _content_type: &str,
        progress: &mut (dyn FnMut(UploadProgress) + Send),
    ) -> FilesResult<()> {
        let storage_path = self.storage_path(path)?;

        if let Some(parent) = storage_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                FilesError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create directory {}: {}", parent.display(), e),
                ))
            })?;
        }

        let mut file = tokio::fs::File::create(&storage_path).await.map_err(|e| {
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create {}: {}", storage_path.display(), e),
            ))
        })?;

        for (range, step) in chunk_progress(bytes.len()) {
            file.write_all(&bytes[range]).await?;
            progress(step);
        }
        file.flush().await?;

        tracing::debug!("stored {} ({} bytes)", path, bytes.len());
        Ok(())
    }

    async fn download_url(&self, path: &ObjectPath) -> FilesResult<String> {
        let storage_path = self.storage_path(path)?;
        if !tokio::fs::try_exists(&storage_path).await? {
            return Err(FilesError::NotFound(path.to_string()));
        }
        Ok(format!("file://{}", storage_path.display()))
    }

    async fn delete(&self, path: &ObjectPath) -> FilesResult<()> {
        let storage_path = self.storage_path(path)?;
        match tokio::fs::remove_file(&storage_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FilesError::NotFound(path.to_string()))
            }
            Err(e) => Err(FilesError::Io(e)),
        }
    }
}
