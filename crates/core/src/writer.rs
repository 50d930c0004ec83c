//! Entry creation.
//!
//! An entry id is allocated on the client first, so that attachments can be
//! uploaded under their final object paths before the entry exists. The entry
//! document is then written exactly once, listing only the uploads that
//! completed. If that write fails, the uploaded objects are left orphaned.

use crate::model::{Attachment, EntryDraft};
use crate::patient::entries_collection;
use crate::store::{DocumentStore, StoreError};
use chrono::Utc;
use clinic_files::{ObjectPath, ObjectStore, Rejection, UploadPolicy, UploadProgress};
use clinic_uuid::DocumentId;

/// A file picked by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    /// As reported by the picker; may be empty.
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Upload progress of the `index`-th selected file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileProgress {
    pub index: usize,
    pub percent: u8,
}

/// What happened to one selected file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Uploaded(Attachment),
    Skipped(Rejection),
    Failed { name: String, reason: String },
}

/// Result of [`EntryWriter::create_entry`].
#[derive(Debug, Clone, PartialEq)]
pub struct EntryReceipt {
    pub entry_id: DocumentId,
    /// One outcome per selected file, in selection order.
    pub outcomes: Vec<FileOutcome>,
    /// Outcome of the single document write.
    pub written: Result<(), StoreError>,
}

impl EntryReceipt {
    pub fn attachments(&self) -> impl Iterator<Item = &Attachment> {
        self.outcomes.iter().filter_map(|o| match o {
            FileOutcome::Uploaded(a) => Some(a),
            _ => None,
        })
    }

    pub fn rejections(&self) -> impl Iterator<Item = &Rejection> {
        self.outcomes.iter().filter_map(|o| match o {
            FileOutcome::Skipped(r) => Some(r),
            _ => None,
        })
    }

    pub fn has_upload_failures(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o, FileOutcome::Failed { .. }))
    }
}

pub struct EntryWriter<'a> {
    documents: &'a dyn DocumentStore,
    objects: &'a dyn ObjectStore,
    policy: &'a UploadPolicy,
}

impl<'a> EntryWriter<'a> {
    pub fn new(
        documents: &'a dyn DocumentStore,
        objects: &'a dyn ObjectStore,
        policy: &'a UploadPolicy,
    ) -> Self {
        Self {
            documents,
            objects,
            policy,
        }
    }

    /// Uploads `files` and writes the entry for `patient_id`.
    ///
    /// Rejected and failed files never abort the entry.
    pub async fn create_entry(
        &self,
        patient_id: &DocumentId,
        draft: &EntryDraft,
        files: &[SelectedFile],
        progress: &mut (dyn FnMut(FileProgress) + Send),
    ) -> EntryReceipt {
        let entry_id = self.documents.allocate_id();
        let mut outcomes = Vec::with_capacity(files.len());

        for (index, file) in files.iter().enumerate() {
            let outcome = self
                .upload_one(patient_id, &entry_id, index, file, progress)
                .await;
            outcomes.push(outcome);
        }

        let attachments: Vec<Attachment> = outcomes
            .iter()
            .filter_map(|o| match o {
                FileOutcome::Uploaded(a) => Some(a.clone()),
                _ => None,
            })
            .collect();

        let path = entries_collection(patient_id).doc(&entry_id);
        let written = self
            .documents
            .create(&path, draft.to_fields(&attachments))
            .await;

        match &written {
            Ok(()) => tracing::info!(
                patient_id = %patient_id,
                entry_id = %entry_id,
                kind = %draft.kind(),
                attachments = attachments.len(),
                "entry created"
            ),
            Err(e) => {
                tracing::error!(entry_id = %entry_id, error = %e, "entry write failed");
                for a in &attachments {
                    tracing::warn!(path = %a.path, "orphaned attachment");
                }
            }
        }

        EntryReceipt {
            entry_id,
            outcomes,
            written,
        }
    }

    async fn upload_one(
        &self,
        patient_id: &DocumentId,
        entry_id: &DocumentId,
        index: usize,
        file: &SelectedFile,
        progress: &mut (dyn FnMut(FileProgress) + Send),
    ) -> FileOutcome {
        if let Err(rejection) = self.policy.check(&file.name, file.size(), &file.content_type) {
            tracing::warn!(file = %file.name, reason = %rejection, "file skipped");
            return FileOutcome::Skipped(rejection);
        }

        let failed = |reason: String| {
            tracing::error!(file = %file.name, reason = %reason, "attachment upload failed");
            FileOutcome::Failed {
                name: file.name.clone(),
                reason,
            }
        };

        let path = match ObjectPath::for_attachment(patient_id, entry_id, &file.name) {
            Ok(path) => path,
            Err(e) => return failed(e.to_string()),
        };

        let mut last_percent = 0u8;
        let mut on_chunk = |p: UploadProgress| {
            // Percent is reported per file and never goes backwards.
            last_percent = last_percent.max(p.percent());
            progress(FileProgress {
                index,
                percent: last_percent,
            });
        };
        if let Err(e) = self
            .objects
            .upload(&path, &file.bytes, &file.content_type, &mut on_chunk)
            .await
        {
            return failed(e.to_string());
        }

        let url = match self.objects.download_url(&path).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(path = %path, "orphaned attachment");
                return failed(e.to_string());
            }
        };

        tracing::debug!(path = %path, size = file.size(), "attachment uploaded");
        FileOutcome::Uploaded(Attachment {
            name: file.name.clone(),
            path,
            content_type: file.content_type.clone(),
            size: file.size(),
            url,
            created_at: Utc::now(),
        })
    }
}
