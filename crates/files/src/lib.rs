//! Clinic attachment storage
//!
//! Binary attachments live outside the document store. An entry document only
//! carries metadata about its attachments (name, object path, content type, size,
//! download URL); the bytes are kept in an object store under a path derived from
//! the owning patient and entry:
//!
//! ```text
//! patients/
//! └── <patient_id>/
//!     └── entries/
//!         └── <entry_id>/
//!             ├── scan.pdf
//!             └── photo.png
//! ```
//!
//! Two files with the same name in one entry share a path; the later upload
//! overwrites the earlier one.
//!
//! ## Example Usage
//!
//! ```no_run
//! use clinic_files::{LocalObjectStore, ObjectPath, ObjectStore};
//! use clinic_uuid::DocumentId;
//! use std::path::Path;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = LocalObjectStore::new(Path::new("clinic_data/objects"))?;
//! let path = ObjectPath::for_attachment(&DocumentId::new(), &DocumentId::new(), "scan.pdf")?;
//! store
//!     .upload(&path, b"%PDF-1.7", "application/pdf", &mut |p| println!("{}%", p.percent()))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod constants;
mod files;
mod memory;
mod path;
mod policy;

pub use constants::{
    DEFAULT_ALLOWED_TYPES, DEFAULT_MAX_UPLOAD_BYTES, ENTRIES_SEGMENT, PATIENTS_PREFIX,
    UPLOAD_CHUNK_BYTES,
};
pub use files::LocalObjectStore;
pub use memory::{MemoryObjectStore, StoredObject};
pub use path::ObjectPath;
pub use policy::{Rejection, UploadPolicy};

use async_trait::async_trait;

/// Errors that can occur during object storage operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory does not exist or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// Object path validation failed (empty or relative segments, separators)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// No object is stored at the given path
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The store refused or aborted an upload
    #[error("Upload of {path} failed: {reason}")]
    UploadFailed { path: String, reason: String },

    /// The store refused a delete
    #[error("Delete of {path} failed: {reason}")]
    DeleteFailed { path: String, reason: String },

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FilesResult<T> = Result<T, FilesError>;

/// Progress of a single upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

impl UploadProgress {
    /// Completed percentage, rounded to the nearest integer.
    ///
    /// An empty object is reported as complete.
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 100;
        }
        let pct = (self.bytes_transferred as f64 / self.total_bytes as f64 * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    }
}

/// Binary object storage addressed by [`ObjectPath`].
///
/// Uploads report progress through the `progress` callback; within one upload the
/// reported percentage never decreases.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` at `path`, replacing any existing object.
    async fn upload(
        &self,
        path: &ObjectPath,
        bytes: &[u8],
        content_type: &str,
        progress: &mut (dyn FnMut(UploadProgress) + Send),
    ) -> FilesResult<()>;

    /// Returns a URL the stored object can be downloaded from.
    async fn download_url(&self, path: &ObjectPath) -> FilesResult<String>;

    /// Removes the object at `path`.
    async fn delete(&self, path: &ObjectPath) -> FilesResult<()>;
}

/// Splits `len` bytes into chunk boundaries and returns the progress after each.
pub(crate) fn chunk_progress(len: usize) -> Vec<(std::ops::Range<usize>, UploadProgress)> {
    let total = len as u64;
    if len == 0 {
        return vec![(
            0..0,
            UploadProgress {
                bytes_transferred: 0,
                total_bytes: 0,
            },
        )];
    }
    (0..len)
        .step_by(UPLOAD_CHUNK_BYTES)
        .map(|start| {
            let end = (start + UPLOAD_CHUNK_BYTES).min(len);
            (
                start..end,
                UploadProgress {
                    bytes_transferred: end as u64,
                    total_bytes: total,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_rounds_and_handles_empty() {
        let half = UploadProgress {
            bytes_transferred: 1,
            total_bytes: 3,
        };
        assert_eq!(half.percent(), 33);

        let empty = UploadProgress {
            bytes_transferred: 0,
            total_bytes: 0,
        };
        assert_eq!(empty.percent(), 100);
    }

    #[test]
    fn test_chunk_progress_is_non_decreasing_and_complete() {
        let len = UPLOAD_CHUNK_BYTES * 2 + 10;
        let chunks = chunk_progress(len);

        assert_eq!(chunks.len(), 3);
        let percents: Vec<u8> = chunks.iter().map(|(_, p)| p.percent()).collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*percents.last().unwrap(), 100);
        assert_eq!(chunks.last().unwrap().0.end, len);
    }
}
