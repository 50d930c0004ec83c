//! In-memory object store with fault injection, for tests.

use crate::{chunk_progress, FilesError, FilesResult, ObjectPath, ObjectStore, UploadProgress};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<ObjectPath, StoredObject>>,
    failing_uploads: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<ObjectPath>>,
    delete_calls: Mutex<Vec<ObjectPath>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every upload of a file with this name fail after the first chunk.
    pub async fn fail_uploads_named(&self, file_name: &str) {
        self.failing_uploads.lock().await.insert(file_name.to_owned());
    }

    /// Makes deletes of this path fail.
    pub async fn fail_deletes_of(&self, path: &ObjectPath) {
        self.failing_deletes.lock().await.insert(path.clone());
    }

    pub async fn get(&self, path: &ObjectPath) -> Option<StoredObject> {
        self.objects.lock().await.get(path).cloned()
    }

    pub async fn contains(&self, path: &ObjectPath) -> bool {
        self.objects.lock().await.contains_key(path)
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Every path a delete was attempted on, in call order.
    pub async fn delete_calls(&self) -> Vec<ObjectPath> {
        self.delete_calls.lock().await.clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        path: &ObjectPath,
        bytes: &[u8],
        content_type: &str,
        progress: &mut (dyn FnMut(UploadProgress) + Send),
    ) -> FilesResult<()> {
        let fails = self
            .failing_uploads
            .lock()
            .await
            .contains(path.file_name());

        for (_, step) in chunk_progress(bytes.len()) {
            progress(step);
            if fails {
                return Err(FilesError::UploadFailed {
                    path: path.to_string(),
                    reason: "connection reset".into(),
                });
            }
        }

        self.objects.lock().await.insert(
            path.clone(),
            StoredObject {
                bytes: bytes.to_vec(),
                content_type: content_type.to_owned(),
            },
        );
        Ok(())
    }

    async fn download_url(&self, path: &ObjectPath) -> FilesResult<String> {
        if !self.contains(path).await {
            return Err(FilesError::NotFound(path.to_string()));
        }
        Ok(format!("memory://objects/{}", path))
    }

    async fn delete(&self, path: &ObjectPath) -> FilesResult<()> {
        self.delete_calls.lock().await.push(path.clone());

        if self.failing_deletes.lock().await.contains(path) {
            return Err(FilesError::DeleteFailed {
                path: path.to_string(),
                reason: "permission denied".into(),
            });
        }
        match self.objects.lock().await.remove(path) {
            Some(_) => Ok(()),
            None => Err(FilesError::NotFound(path.to_string())),
        }
    }
}
