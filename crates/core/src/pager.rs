//! Entry cache and pager for the selected patient.
//!
//! The newest [`PAGE_SIZE`] entries form a [`LivePage`] kept in sync through a
//! realtime subscription. Older entries are pulled on demand into a
//! [`LoadedTail`], which is a point-in-time copy and is never updated.
//!
//! Every snapshot of the live query replaces the live page wholesale and drops
//! the tail; the cursor is reset to the end of the new page. The loaded range is
//! therefore always contiguous, newest first by `dateTime`.

use crate::constants::{FIELD_DATE_TIME, PAGE_SIZE};
use crate::model::Entry;
use crate::patient::entries_collection;
use crate::store::{
    Cursor, Direction, Document, DocumentStore, Query, QuerySnapshot, StoreError, Subscription,
};
use crate::CoreResult;
use clinic_uuid::DocumentId;

/// Entries delivered by the live subscription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LivePage {
    entries: Vec<Entry>,
}

impl LivePage {
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }
}

/// Entries fetched by [`EntryPager::load_more`]. Not kept live.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedTail {
    entries: Vec<Entry>,
}

impl LoadedTail {
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }
}

/// What happened when a snapshot of the live query was received.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotOutcome {
    Applied { entries: usize },
    Failed(StoreError),
}

/// Entries of the newest-first listing for one patient.
pub fn entries_query(patient_id: &DocumentId) -> Query {
    Query::new(entries_collection(patient_id)).order_by(FIELD_DATE_TIME, Direction::Descending)
}

fn decode(docs: &[Document]) -> Vec<Entry> {
    docs.iter()
        .filter_map(|doc| match Entry::from_document(doc) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(path = %doc.path(), error = %e, "skipping malformed entry");
                None
            }
        })
        .collect()
}

pub struct EntryPager {
    page_size: usize,
    patient_id: Option<DocumentId>,
    query: Option<Query>,
    subscription: Option<Subscription>,
    live: LivePage,
    tail: LoadedTail,
    cursor: Option<Cursor>,
    exhausted: bool,
}

impl Default for EntryPager {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryPager {
    pub fn new() -> Self {
        Self::with_page_size(PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            patient_id: None,
            query: None,
            subscription: None,
            live: LivePage::default(),
            tail: LoadedTail::default(),
            cursor: None,
            exhausted: false,
        }
    }

    fn reset(&mut self) {
        self.subscription = None;
        self.query = None;
        self.patient_id = None;
        self.live = LivePage::default();
        self.tail = LoadedTail::default();
        self.cursor = None;
        self.exhausted = false;
    }

    /// Tears down the current subscription and, for `Some(patient)`, opens a new
    /// one on that patient's newest page. The initial snapshot is applied before
    /// returning.
    ///
    /// If opening the subscription fails the pager is left empty.
    pub async fn subscribe(
        &mut self,
        store: &dyn DocumentStore,
        patient_id: Option<DocumentId>,
    ) -> CoreResult<Option<SnapshotOutcome>> {
        self.reset();
        let Some(patient_id) = patient_id else {
            return Ok(None);
        };

        let query = entries_query(&patient_id);
        let subscription = store.subscribe(query.clone().limit(self.page_size)).await?;
        tracing::debug!(patient_id = %patient_id, "subscribed to entries");

        self.patient_id = Some(patient_id);
        self.query = Some(query);
        self.subscription = Some(subscription);
        Ok(self.poll())
    }

    /// Applies the latest snapshot if one arrived since the last call.
    pub fn poll(&mut self) -> Option<SnapshotOutcome> {
        let result = self.subscription.as_mut()?.try_next()?;
        Some(self.apply(result))
    }

    /// Waits for the next snapshot and applies it.
    ///
    /// Returns `None` without a subscription or once the store has gone away.
    pub async fn next_snapshot(&mut self) -> Option<SnapshotOutcome> {
        let result = self.subscription.as_mut()?.next().await?;
        Some(self.apply(result))
    }

    fn apply(&mut self, result: Result<QuerySnapshot, StoreError>) -> SnapshotOutcome {
        match result {
            Ok(snapshot) => {
                self.cursor = match (&self.query, snapshot.docs().last()) {
                    (Some(query), Some(last)) => Some(query.cursor_at(last)),
                    _ => None,
                };
                self.live = LivePage {
                    entries: decode(snapshot.docs()),
                };
                self.tail = LoadedTail::default();
                tracing::debug!(entries = self.live.entries.len(), "live page replaced");
                SnapshotOutcome::Applied {
                    entries: self.live.entries.len(),
                }
            }
            Err(error) => {
                tracing::error!(error = %error, "entries listener failed");
                SnapshotOutcome::Failed(error)
            }
        }
    }

    /// Fetches the page after the cursor and appends it to the tail.
    ///
    /// Does nothing without a patient or cursor, or once a fetch has come back
    /// short. Returns the number of entries appended.
    pub async fn load_more(&mut self, store: &dyn DocumentStore) -> CoreResult<usize> {
        if self.patient_id.is_none() || self.exhausted {
            return Ok(0);
        }
        let (Some(query), Some(cursor)) = (&self.query, &self.cursor) else {
            return Ok(0);
        };

        let next = query.clone().start_after(cursor.clone()).limit(self.page_size);
        let snapshot = store.query(&next).await?;

        if snapshot.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some(last) = snapshot.docs().last() {
            self.cursor = Some(next.cursor_at(last));
        }

        let mut appended = 0;
        for entry in decode(snapshot.docs()) {
            if self.find(&entry.id).is_none() {
                self.tail.entries.push(entry);
                appended += 1;
            }
        }
        tracing::debug!(appended, exhausted = self.exhausted, "loaded older entries");
        Ok(appended)
    }

    pub fn patient_id(&self) -> Option<&DocumentId> {
        self.patient_id.as_ref()
    }

    pub fn live(&self) -> &LivePage {
        &self.live
    }

    pub fn tail(&self) -> &LoadedTail {
        &self.tail
    }

    /// Live page followed by the loaded tail.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.live.entries.iter().chain(self.tail.entries.iter())
    }

    pub fn len(&self) -> usize {
        self.live.entries.len() + self.tail.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, id: &DocumentId) -> Option<&Entry> {
        self.entries().find(|e| &e.id == id)
    }

    pub fn can_load_more(&self) -> bool {
        self.patient_id.is_some() && self.cursor.is_some() && !self.exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntryDetails, EntryDraft};
    use crate::store::{FieldValue, Fields, MemoryDocumentStore};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::collections::HashSet;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap()
    }

    fn exam_at(date_time: DateTime<Utc>) -> EntryDraft {
        EntryDraft {
            date_time,
            clinic_id: None,
            doctor_id: None,
            doctor_specialty: None,
            companion_id: None,
            details: EntryDetails::Exam {
                comment: Some("control".into()),
            },
        }
    }

    async fn seed(store: &MemoryDocumentStore, patient: &DocumentId, hours: &[i64]) -> Vec<DocumentId> {
        let mut ids = Vec::new();
        for h in hours {
            let id = store.allocate_id();
            let path = entries_collection(patient).doc(&id);
            let fields = exam_at(base_time() + Duration::hours(*h)).to_fields(&[]);
            store.create(&path, fields).await.unwrap();
            ids.push(id);
        }
        ids
    }

    fn date_times(pager: &EntryPager) -> Vec<DateTime<Utc>> {
        pager.entries().map(|e| e.date_time).collect()
    }

    #[tokio::test]
    async fn test_initial_snapshot_is_newest_page_descending() {
        let store = MemoryDocumentStore::new();
        let patient = DocumentId::new();
        let hours: Vec<i64> = (0..25).map(|i| (i * 7) % 25).collect();
        seed(&store, &patient, &hours).await;

        let mut pager = EntryPager::new();
        let outcome = pager.subscribe(&store, Some(patient)).await.unwrap();

        assert_eq!(outcome, Some(SnapshotOutcome::Applied { entries: PAGE_SIZE }));
        let expected: Vec<DateTime<Utc>> = (5..25).rev().map(|h| base_time() + Duration::hours(h)).collect();
        assert_eq!(date_times(&pager), expected);
        assert!(pager.tail().entries().is_empty());
        assert!(pager.can_load_more());
    }

    #[tokio::test]
    async fn test_load_more_never_shrinks_or_duplicates() {
        let store = MemoryDocumentStore::new();
        let patient = DocumentId::new();
        let hours: Vec<i64> = (0..47).collect();
        seed(&store, &patient, &hours).await;

        let mut pager = EntryPager::new();
        pager.subscribe(&store, Some(patient)).await.unwrap();

        let mut previous = pager.len();
        let mut calls = 0;
        while pager.can_load_more() {
            pager.load_more(&store).await.unwrap();
            assert!(pager.len() >= previous);
            previous = pager.len();
            calls += 1;
        }

        let ids: HashSet<&DocumentId> = pager.entries().map(|e| &e.id).collect();
        assert_eq!(ids.len(), pager.len());
        assert_eq!(pager.len(), 47);
        assert_eq!(calls, 2);

        let times = date_times(&pager);
        assert!(times.windows(2).all(|w| w[0] >= w[1]));

        // Exhausted: further calls are no-ops.
        assert_eq!(pager.load_more(&store).await.unwrap(), 0);
        assert_eq!(pager.len(), 47);
    }

    #[tokio::test]
    async fn test_exact_multiple_of_page_needs_one_empty_fetch() {
        let store = MemoryDocumentStore::new();
        let patient = DocumentId::new();
        seed(&store, &patient, &(0..20).collect::<Vec<_>>()).await;

        let mut pager = EntryPager::new();
        pager.subscribe(&store, Some(patient)).await.unwrap();
        assert!(pager.can_load_more());

        assert_eq!(pager.load_more(&store).await.unwrap(), 0);
        assert!(!pager.can_load_more());
        assert_eq!(pager.len(), 20);
    }

    #[tokio::test]
    async fn test_snapshot_replaces_live_page_and_drops_tail() {
        let store = MemoryDocumentStore::new();
        let patient = DocumentId::new();
        seed(&store, &patient, &(0..30).collect::<Vec<_>>()).await;

        let mut pager = EntryPager::new();
        pager.subscribe(&store, Some(patient.clone())).await.unwrap();
        pager.load_more(&store).await.unwrap();
        assert_eq!(pager.len(), 30);

        let newest = seed(&store, &patient, &[100]).await;
        let outcome = pager.poll();

        assert_eq!(outcome, Some(SnapshotOutcome::Applied { entries: PAGE_SIZE }));
        assert_eq!(pager.len(), PAGE_SIZE);
        assert!(pager.tail().entries().is_empty());
        assert_eq!(pager.live().entries()[0].id, newest[0]);
        assert!(pager.poll().is_none());
    }

    #[tokio::test]
    async fn test_edits_by_other_clients_reach_live_page() {
        let store = MemoryDocumentStore::new();
        let patient = DocumentId::new();
        let ids = seed(&store, &patient, &[1, 2]).await;

        let mut pager = EntryPager::new();
        pager.subscribe(&store, Some(patient.clone())).await.unwrap();

        let mut patch = Fields::new();
        patch.insert("comment".into(), FieldValue::from("revisado"));
        store
            .update(&entries_collection(&patient).doc(&ids[0]), patch)
            .await
            .unwrap();

        assert!(matches!(pager.next_snapshot().await, Some(SnapshotOutcome::Applied { .. })));
        assert_eq!(pager.find(&ids[0]).unwrap().text(), "revisado");
    }

    #[tokio::test]
    async fn test_switching_patients_resets_everything() {
        let store = MemoryDocumentStore::new();
        let ana = DocumentId::new();
        let luis = DocumentId::new();
        seed(&store, &ana, &(0..25).collect::<Vec<_>>()).await;
        let luis_ids = seed(&store, &luis, &[3]).await;

        let mut pager = EntryPager::new();
        pager.subscribe(&store, Some(ana)).await.unwrap();
        pager.load_more(&store).await.unwrap();

        pager.subscribe(&store, Some(luis.clone())).await.unwrap();
        assert_eq!(pager.patient_id(), Some(&luis));
        assert_eq!(pager.entries().map(|e| e.id.clone()).collect::<Vec<_>>(), luis_ids);
        assert_eq!(store.listener_count().await, 1);

        pager.subscribe(&store, None).await.unwrap();
        assert!(pager.is_empty());
        assert!(!pager.can_load_more());
        assert_eq!(store.listener_count().await, 0);
    }

    #[tokio::test]
    async fn test_listener_error_leaves_cache_untouched() {
        let store = MemoryDocumentStore::new();
        let patient = DocumentId::new();
        seed(&store, &patient, &[1, 2, 3]).await;

        let mut pager = EntryPager::new();
        pager.subscribe(&store, Some(patient)).await.unwrap();
        let before = date_times(&pager);

        store
            .break_listeners(StoreError::PermissionDenied("rules".into()))
            .await;

        assert!(matches!(pager.poll(), Some(SnapshotOutcome::Failed(_))));
        assert_eq!(date_times(&pager), before);
    }

    #[tokio::test]
    async fn test_malformed_entries_are_skipped() {
        let store = MemoryDocumentStore::new();
        let patient = DocumentId::new();
        seed(&store, &patient, &[1]).await;

        let mut broken = Fields::new();
        broken.insert("type".into(), FieldValue::from("surgery"));
        broken.insert("dateTime".into(), FieldValue::from(base_time()));
        store
            .create(&entries_collection(&patient).doc(&DocumentId::new()), broken)
            .await
            .unwrap();

        let mut pager = EntryPager::new();
        pager.subscribe(&store, Some(patient)).await.unwrap();
        assert_eq!(pager.len(), 1);
    }

    #[tokio::test]
    async fn test_small_pages() {
        let store = MemoryDocumentStore::new();
        let patient = DocumentId::new();
        seed(&store, &patient, &[1, 2, 3, 4, 5]).await;

        let mut pager = EntryPager::with_page_size(2);
        pager.subscribe(&store, Some(patient)).await.unwrap();
        assert_eq!(pager.len(), 2);

        assert_eq!(pager.load_more(&store).await.unwrap(), 2);
        assert_eq!(pager.load_more(&store).await.unwrap(), 1);
        assert!(!pager.can_load_more());
        assert_eq!(pager.len(), 5);
    }
}
