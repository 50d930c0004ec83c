//! Collection and document paths.

use super::StoreError;
use clinic_uuid::DocumentId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Path of a collection: `clinics`, or `patients/{id}/entries` for a sub-collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// A top-level collection.
    pub fn root(name: &str) -> Self {
        Self(name.to_owned())
    }

    pub fn doc(&self, id: &DocumentId) -> DocPath {
        DocPath {
            collection: self.clone(),
            id: id.clone(),
        }
    }

    /// Last segment, which is what composite indexes are declared against.
    pub fn group(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Path of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocPath {
    collection: CollectionPath,
    id: DocumentId,
}

impl DocPath {
    /// Parses `collection/id[/collection/id...]`.
    pub fn parse(input: &str) -> Result<Self, StoreError> {
        let segments: Vec<&str> = input.split('/').collect();
        if segments.len() < 2 || segments.len() % 2 != 0 {
            return Err(StoreError::InvalidArgument(format!(
                "document path must have an even number of segments: '{}'",
                input
            )));
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(StoreError::InvalidArgument(format!(
                "document path has an empty segment: '{}'",
                input
            )));
        }

        let (id, collection) = segments.split_last().ok_or_else(|| {
            StoreError::InvalidArgument(format!("empty document path: '{}'", input))
        })?;
        let id = DocumentId::parse(id).map_err(|e| StoreError::InvalidArgument(e.to_string()))?;

        Ok(Self {
            collection: CollectionPath(collection.join("/")),
            id,
        })
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn parent(&self) -> &CollectionPath {
        &self.collection
    }

    /// A sub-collection under this document.
    pub fn collection(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}", self, name))
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}
