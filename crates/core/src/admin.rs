//! Admin-only mutation and removal of entries.
//!
//! Every operation takes an [`AdminCapability`], which only the access policy
//! can mint for a principal on the admin allow-list. The backend rules are still
//! evaluated independently by the document store.

use crate::constants::{FIELD_ATTACHMENTS, FIELD_PATH};
use crate::identity::AdminCapability;
use crate::model::{Entry, EntryEdit};
use crate::patient::entries_collection;
use crate::store::{DocPath, Document, DocumentStore, FieldValue, Fields};
use crate::{CoreError, CoreResult};
use clinic_files::{FilesError, ObjectPath, ObjectStore};
use clinic_uuid::DocumentId;

/// Storage cleanup done while deleting an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub removed: Vec<ObjectPath>,
    /// Objects that could not be deleted and are now unreferenced.
    pub orphaned: Vec<ObjectPath>,
}

fn attachment_values(doc: &Document) -> Vec<FieldValue> {
    doc.get(FIELD_ATTACHMENTS)
        .and_then(FieldValue::as_array)
        .map(<[FieldValue]>::to_vec)
        .unwrap_or_default()
}

fn attachment_path(value: &FieldValue) -> Option<&str> {
    value.as_map()?.get(FIELD_PATH)?.as_str()
}

pub struct AdminEditor<'a> {
    documents: &'a dyn DocumentStore,
    objects: &'a dyn ObjectStore,
}

impl<'a> AdminEditor<'a> {
    pub fn new(documents: &'a dyn DocumentStore, objects: &'a dyn ObjectStore) -> Self {
        Self { documents, objects }
    }

    async fn read(&self, path: &DocPath) -> CoreResult<Document> {
        self.documents
            .get(path)
            .await?
            .ok_or_else(|| CoreError::NotFound(path.to_string()))
    }

    /// Patches the text (and, for appointments, the status) of an entry.
    pub async fn edit_entry(
        &self,
        capability: &AdminCapability,
        patient_id: &DocumentId,
        entry_id: &DocumentId,
        edit: &EntryEdit,
    ) -> CoreResult<()> {
        let path = entries_collection(patient_id).doc(entry_id);
        let entry = Entry::from_document(&self.read(&path).await?)?;

        self.documents
            .update(&path, edit.to_patch(entry.kind()))
            .await?;
        tracing::info!(admin = %capability.email(), entry_id = %entry_id, "entry edited");
        Ok(())
    }

    /// Deletes one attachment's object, then rewrites the entry's attachment
    /// list without it.
    ///
    /// The list is re-read just before the rewrite and filtered by path; a
    /// concurrent rewrite between the two steps is overwritten.
    pub async fn delete_attachment(
        &self,
        capability: &AdminCapability,
        patient_id: &DocumentId,
        entry_id: &DocumentId,
        object: &ObjectPath,
    ) -> CoreResult<()> {
        match self.objects.delete(object).await {
            Ok(()) => {}
            Err(FilesError::NotFound(_)) => {
                tracing::warn!(path = %object, "attachment object already gone");
            }
            Err(e) => return Err(e.into()),
        }

        let path = entries_collection(patient_id).doc(entry_id);
        let doc = self.read(&path).await?;
        let remaining: Vec<FieldValue> = attachment_values(&doc)
            .into_iter()
            .filter(|a| attachment_path(a) != Some(object.as_str()))
            .collect();

        let mut patch = Fields::new();
        patch.insert(FIELD_ATTACHMENTS.into(), FieldValue::Array(remaining));
        self.documents.update(&path, patch).await?;
        tracing::info!(admin = %capability.email(), path = %object, "attachment deleted");
        Ok(())
    }

    /// Deletes every attachment object (each independently, failures logged),
    /// then the entry document regardless of how the cleanup went.
    pub async fn delete_entry(
        &self,
        capability: &AdminCapability,
        patient_id: &DocumentId,
        entry_id: &DocumentId,
    ) -> CoreResult<DeleteReport> {
        let path = entries_collection(patient_id).doc(entry_id);
        let attachments = self
            .documents
            .get(&path)
            .await?
            .map(|doc| attachment_values(&doc))
            .unwrap_or_default();

        let mut report = DeleteReport::default();
        for value in &attachments {
            let Some(object) = attachment_path(value).and_then(|p| ObjectPath::parse(p).ok()) else {
                tracing::warn!(entry_id = %entry_id, "attachment without a valid path");
                continue;
            };
            match self.objects.delete(&object).await {
                Ok(()) => report.removed.push(object),
                Err(e) => {
                    tracing::warn!(path = %object, error = %e, "orphaned attachment");
                    report.orphaned.push(object);
                }
            }
        }

        self.documents.delete(&path).await?;
        tracing::info!(
            admin = %capability.email(),
            entry_id = %entry_id,
            removed = report.removed.len(),
            orphaned = report.orphaned.len(),
            "entry deleted"
        );
        Ok(report)
    }
}
