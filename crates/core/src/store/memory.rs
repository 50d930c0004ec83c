//! In-process document store.
//!
//! Used by the tests and by the command-line runner, which persists it as a
//! JSON snapshot between invocations. It enforces the same rules the managed
//! backend is configured with: composite-index requirements on queries, and
//! (optionally) admin-only updates and deletes.

use super::{
    resolve_server_timestamps, CollectionPath, DocPath, Document, DocumentStore, Fields,
    IndexSpec, Query, QuerySnapshot, SnapshotSlot, StoreError, StoreResult, Subscription,
};
use crate::identity::{AccessPolicy, AuthSession};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::{watch, Mutex};

/// Backend access rules.
#[derive(Debug, Clone, Default)]
pub enum AccessRules {
    /// Every write is accepted.
    #[default]
    Open,
    /// Updates and deletes require the signed-in principal to be an admin.
    AdminWrites {
        policy: AccessPolicy,
        session: AuthSession,
    },
}

impl AccessRules {
    fn check_mutation(&self, path: &DocPath) -> StoreResult<()> {
        match self {
            AccessRules::Open => Ok(()),
            AccessRules::AdminWrites { policy, session } => {
                let principal = session.current();
                if policy.is_admin(principal.as_ref()) {
                    Ok(())
                } else {
                    Err(StoreError::PermissionDenied(format!(
                        "{} may not modify {}",
                        principal
                            .map(|p| p.email().to_string())
                            .unwrap_or_else(|| "anonymous".into()),
                        path
                    )))
                }
            }
        }
    }
}

/// One persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub path: String,
    pub fields: Fields,
}

/// Serializable copy of the whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub documents: Vec<StoredDocument>,
    pub indexes: Vec<IndexSpec>,
}

struct Listener {
    query: Query,
    sender: watch::Sender<SnapshotSlot>,
    last: SnapshotSlot,
}

#[derive(Default)]
struct Inner {
    documents: BTreeMap<DocPath, Fields>,
    indexes: HashSet<IndexSpec>,
    listeners: Vec<Listener>,
    unavailable: bool,
    last_server_time: Option<DateTime<Utc>>,
}

impl Inner {
    fn ensure_available(&self) -> StoreResult<()> {
        if self.unavailable {
            return Err(StoreError::Unavailable("backend unreachable".into()));
        }
        Ok(())
    }

    /// Server clock; strictly increasing so server timestamps never tie.
    fn server_now(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_server_time {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_server_time = Some(now);
        now
    }

    fn run(&self, query: &Query) -> StoreResult<QuerySnapshot> {
        if let Some(index) = query.required_index() {
            if !self.indexes.contains(&index) {
                return Err(StoreError::FailedPrecondition(format!(
                    "the query requires an index on {} ({})",
                    index.collection_group,
                    index
                        .fields
                        .iter()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
            }
        }
        let docs: Vec<Document> = self
            .documents
            .iter()
            .map(|(path, fields)| Document::new(path.clone(), fields.clone()))
            .collect();
        Ok(QuerySnapshot::new(query.evaluate(&docs)))
    }

    fn notify_listeners(&mut self) {
        self.listeners.retain(|l| !l.sender.is_closed());

        let results: Vec<SnapshotSlot> = self
            .listeners
            .iter()
            .map(|l| Some(self.run(&l.query)))
            .collect();

        for (listener, result) in self.listeners.iter_mut().zip(results) {
            if listener.last != result {
                listener.sender.send_replace(result.clone());
                listener.last = result;
            }
        }
    }

    fn write(&mut self, path: DocPath, mut fields: Fields) {
        let now = self.server_now();
        resolve_server_timestamps(&mut fields, now);
        self.documents.insert(path, fields);
        self.notify_listeners();
    }
}

/// Document store held in memory.
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<Inner>,
    rules: AccessRules,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: AccessRules) -> Self {
        Self {
            inner: Mutex::default(),
            rules,
        }
    }

    /// Declares a composite index.
    pub async fn add_index(&self, index: IndexSpec) {
        self.inner.lock().await.indexes.insert(index);
    }

    /// Makes every call fail with [`StoreError::Unavailable`] while set.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().await.unavailable = unavailable;
    }

    /// Delivers `error` to every open listener.
    pub async fn break_listeners(&self, error: StoreError) {
        let mut inner = self.inner.lock().await;
        for listener in inner.listeners.iter_mut() {
            let slot = Some(Err(error.clone()));
            listener.sender.send_replace(slot.clone());
            listener.last = slot;
        }
    }

    /// Number of listeners whose subscription is still alive.
    pub async fn listener_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.listeners.iter().filter(|l| !l.sender.is_closed()).count()
    }

    pub async fn export(&self) -> StoreSnapshot {
        let inner = self.inner.lock().await;
        let mut indexes: Vec<IndexSpec> = inner.indexes.iter().cloned().collect();
        indexes.sort_by(|a, b| {
            (&a.collection_group, &a.fields).cmp(&(&b.collection_group, &b.fields))
        });
        StoreSnapshot {
            documents: inner
                .documents
                .iter()
                .map(|(path, fields)| StoredDocument {
                    path: path.to_string(),
                    fields: fields.clone(),
                })
                .collect(),
            indexes,
        }
    }

    /// Replaces the store contents with `snapshot`.
    pub async fn import(&self, snapshot: StoreSnapshot) -> StoreResult<()> {
        let mut documents = BTreeMap::new();
        for stored in snapshot.documents {
            documents.insert(DocPath::parse(&stored.path)?, stored.fields);
        }
        let mut inner = self.inner.lock().await;
        inner.documents = documents;
        inner.indexes = snapshot.indexes.into_iter().collect();
        inner.notify_listeners();
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        let inner = self.inner.lock().await;
        inner.ensure_available()?;
        Ok(inner
            .documents
            .get(path)
            .map(|fields| Document::new(path.clone(), fields.clone())))
    }

    async fn query(&self, query: &Query) -> StoreResult<QuerySnapshot> {
        let inner = self.inner.lock().await;
        inner.ensure_available()?;
        inner.run(query)
    }

    async fn add(&self, collection: &CollectionPath, fields: Fields) -> StoreResult<DocPath> {
        let path = collection.doc(&self.allocate_id());
        self.create(&path, fields).await?;
        Ok(path)
    }

    async fn create(&self, path: &DocPath, fields: Fields) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_available()?;
        if inner.documents.contains_key(path) {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        inner.write(path.clone(), fields);
        Ok(())
    }

    async fn update(&self, path: &DocPath, fields: Fields) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_available()?;
        self.rules.check_mutation(path)?;

        let mut merged = inner
            .documents
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        merged.extend(fields);
        inner.write(path.clone(), merged);
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_available()?;
        self.rules.check_mutation(path)?;

        if inner.documents.remove(path).is_some() {
            inner.notify_listeners();
        }
        Ok(())
    }

    async fn subscribe(&self, query: Query) -> StoreResult<Subscription> {
        let mut inner = self.inner.lock().await;
        inner.ensure_available()?;

        let (sender, receiver) = watch::channel(None);
        let initial = Some(inner.run(&query));
        sender.send_replace(initial.clone());
        inner.listeners.push(Listener {
            query,
            sender,
            last: initial,
        });
        Ok(Subscription::new(receiver))
    }
}
