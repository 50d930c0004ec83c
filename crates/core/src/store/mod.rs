//! Document store seam.
//!
//! Records live in a remote document database organised as collections of
//! documents, with per-patient sub-collections. This module defines the
//! [`DocumentStore`] trait the rest of the crate talks to, the query model it
//! accepts, and [`MemoryDocumentStore`], an in-process implementation that
//! also evaluates access rules and composite-index requirements the way the
//! managed backend does.
//!
//! Realtime listeners are modelled as [`Subscription`]s backed by a
//! `tokio::sync::watch` channel: only the latest snapshot is retained, so a
//! newer snapshot supersedes an older unread one.

mod memory;
mod path;
mod query;
mod value;

pub use memory::{AccessRules, MemoryDocumentStore, StoreSnapshot, StoredDocument};
pub use path::{CollectionPath, DocPath};
pub use query::{Cursor, Direction, Filter, FilterOp, IndexSpec, OrderBy, Query};
pub use value::{resolve_server_timestamps, FieldValue, Fields};

use async_trait::async_trait;
use clinic_uuid::DocumentId;
use tokio::sync::watch;

/// Errors reported by a document store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("document already exists: {0}")]
    AlreadyExists(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The query needs an index that has not been declared.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A document read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    path: DocPath,
    fields: Fields,
}

impl Document {
    pub fn new(path: DocPath, fields: Fields) -> Self {
        Self { path, fields }
    }

    pub fn path(&self) -> &DocPath {
        &self.path
    }

    pub fn id(&self) -> &DocumentId {
        self.path.id()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }
}

/// Result of a query, in query order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySnapshot {
    docs: Vec<Document>,
}

impl QuerySnapshot {
    pub fn new(docs: Vec<Document>) -> Self {
        Self { docs }
    }

    pub fn docs(&self) -> &[Document] {
        &self.docs
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// Value carried by a realtime listener: `None` until the first snapshot.
pub type SnapshotSlot = Option<StoreResult<QuerySnapshot>>;

/// Live handle on a query.
///
/// Dropping the subscription detaches the listener; the store prunes it on its
/// next write.
#[derive(Debug)]
pub struct Subscription {
    receiver: watch::Receiver<SnapshotSlot>,
}

impl Subscription {
    pub fn new(receiver: watch::Receiver<SnapshotSlot>) -> Self {
        Self { receiver }
    }

    /// Returns the latest unread snapshot, if one has arrived since the last read.
    pub fn try_next(&mut self) -> Option<StoreResult<QuerySnapshot>> {
        match self.receiver.has_changed() {
            Ok(true) => self.receiver.borrow_and_update().clone(),
            _ => None,
        }
    }

    /// Waits for the next snapshot. Returns `None` once the store has gone away.
    pub async fn next(&mut self) -> Option<StoreResult<QuerySnapshot>> {
        self.receiver.changed().await.ok()?;
        self.receiver.borrow_and_update().clone()
    }
}

/// Remote document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Allocates an identifier for a new document without writing anything.
    fn allocate_id(&self) -> DocumentId {
        DocumentId::new()
    }

    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>>;

    async fn query(&self, query: &Query) -> StoreResult<QuerySnapshot>;

    /// Writes a new document under a store-assigned id.
    async fn add(&self, collection: &CollectionPath, fields: Fields) -> StoreResult<DocPath>;

    /// Writes a new document at `path`; fails if one already exists.
    async fn create(&self, path: &DocPath, fields: Fields) -> StoreResult<()>;

    /// Merges `fields` into an existing document (top-level keys replaced).
    async fn update(&self, path: &DocPath, fields: Fields) -> StoreResult<()>;

    /// Removes a document. Removing a missing document succeeds.
    async fn delete(&self, path: &DocPath) -> StoreResult<()>;

    /// Opens a realtime listener. The first snapshot (or error) is available
    /// immediately; later ones follow every change to the result.
    async fn subscribe(&self, query: Query) -> StoreResult<Subscription>;
}
