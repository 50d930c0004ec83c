//! Upcoming scheduled appointments for the selected patient.

use crate::constants::{
    ENTRIES_COLLECTION, FIELD_DATE_TIME, FIELD_STATUS, FIELD_TYPE, SCHEDULED_STATUS,
    UPCOMING_WINDOW_DAYS,
};
use crate::model::{Entry, EntryKind};
use crate::patient::entries_collection;
use crate::store::{Direction, DocumentStore, FilterOp, IndexSpec, Query, StoreError};
use chrono::{DateTime, Duration, Utc};
use clinic_uuid::DocumentId;

/// Scheduled appointments with `dateTime` in `[now, now + 14 days]`, soonest first.
pub fn upcoming_query(patient_id: &DocumentId, now: DateTime<Utc>) -> Query {
    let until = now + Duration::days(UPCOMING_WINDOW_DAYS);
    Query::new(entries_collection(patient_id))
        .where_eq(FIELD_TYPE, EntryKind::Appointment.as_str())
        .where_eq(FIELD_STATUS, SCHEDULED_STATUS)
        .filter(FIELD_DATE_TIME, FilterOp::Gte, now)
        .filter(FIELD_DATE_TIME, FilterOp::Lte, until)
        .order_by(FIELD_DATE_TIME, Direction::Ascending)
}

/// Composite index the upcoming query runs on; deploy it with the backend.
pub fn upcoming_index() -> IndexSpec {
    IndexSpec::new(ENTRIES_COLLECTION, [FIELD_TYPE, FIELD_STATUS, FIELD_DATE_TIME])
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum UpcomingOutcome {
    #[default]
    NoPatient,
    Entries(Vec<Entry>),
    /// The query failed, usually because the index is missing.
    Unavailable(StoreError),
}

/// Point-in-time fetch of upcoming appointments. Never fails; a query error is
/// reported as [`UpcomingOutcome::Unavailable`].
pub async fn fetch_upcoming(
    store: &dyn DocumentStore,
    patient_id: Option<&DocumentId>,
    now: DateTime<Utc>,
) -> UpcomingOutcome {
    let Some(patient_id) = patient_id else {
        return UpcomingOutcome::NoPatient;
    };

    match store.query(&upcoming_query(patient_id, now)).await {
        Ok(snapshot) => UpcomingOutcome::Entries(
            snapshot
                .docs()
                .iter()
                .filter_map(|doc| Entry::from_document(doc).ok())
                .collect(),
        ),
        Err(error) => {
            tracing::warn!(error = %error, "upcoming appointments query failed; check indexes");
            UpcomingOutcome::Unavailable(error)
        }
    }
}
