//! Reference catalogs: clinics, doctors and companions.
//!
//! Catalogs are small, so each one is loaded wholesale, ordered by name, and
//! kept in memory keyed by id. Entries reference catalog items by id only; an id
//! that is not (yet) in the catalog is displayed as-is.

use crate::constants::{FIELD_NAME, FIELD_SPECIALTY};
use crate::model::{CatalogItem, CatalogKind, Entry};
use crate::store::{CollectionPath, Direction, DocumentStore, Fields, Query};
use crate::validation::optional_text;
use crate::{CoreError, CoreResult};
use clinic_uuid::DocumentId;
use std::collections::HashMap;

/// Label of the empty first option of every select list.
pub const SELECT_PLACEHOLDER: &str = "Selecciona...";

/// A select list fed from a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectBinding {
    AppointmentClinic,
    AppointmentDoctor,
    AppointmentCompanion,
    ExamClinic,
    ExamCompanion,
}

impl SelectBinding {
    pub fn kind(self) -> CatalogKind {
        match self {
            SelectBinding::AppointmentClinic | SelectBinding::ExamClinic => CatalogKind::Clinic,
            SelectBinding::AppointmentDoctor => CatalogKind::Doctor,
            SelectBinding::AppointmentCompanion | SelectBinding::ExamCompanion => {
                CatalogKind::Companion
            }
        }
    }

    /// Every select list bound to `kind`.
    pub fn bound_to(kind: CatalogKind) -> &'static [SelectBinding] {
        match kind {
            CatalogKind::Clinic => &[SelectBinding::AppointmentClinic, SelectBinding::ExamClinic],
            CatalogKind::Doctor => &[SelectBinding::AppointmentDoctor],
            CatalogKind::Companion => &[
                SelectBinding::AppointmentCompanion,
                SelectBinding::ExamCompanion,
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn placeholder(label: &str) -> Self {
        Self {
            value: String::new(),
            label: label.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct CatalogList {
    items: Vec<CatalogItem>,
    by_id: HashMap<DocumentId, usize>,
}

/// In-memory copy of the three catalogs.
#[derive(Debug, Clone, Default)]
pub struct Catalogs {
    lists: HashMap<CatalogKind, CatalogList>,
}

impl Catalogs {
    /// Fetches `kind` ordered by name and replaces the in-memory copy.
    ///
    /// Returns the select lists whose options were rebuilt. Store errors
    /// propagate; the previous copy is kept in that case.
    pub async fn load(
        &mut self,
        store: &dyn DocumentStore,
        kind: CatalogKind,
    ) -> CoreResult<&'static [SelectBinding]> {
        let query = Query::new(CollectionPath::root(kind.collection()))
            .order_by(FIELD_NAME, Direction::Ascending);
        let snapshot = store.query(&query).await?;
        let items: Vec<CatalogItem> = snapshot.docs().iter().map(CatalogItem::from_document).collect();

        tracing::debug!(catalog = kind.collection(), count = items.len(), "catalog loaded");
        self.replace(kind, items);
        Ok(SelectBinding::bound_to(kind))
    }

    pub fn replace(&mut self, kind: CatalogKind, items: Vec<CatalogItem>) {
        let by_id = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.id.clone(), i))
            .collect();
        self.lists.insert(kind, CatalogList { items, by_id });
    }

    /// Items of `kind` in name order.
    pub fn items(&self, kind: CatalogKind) -> &[CatalogItem] {
        self.lists
            .get(&kind)
            .map(|l| l.items.as_slice())
            .unwrap_or(&[])
    }

    pub fn get(&self, kind: CatalogKind, id: &DocumentId) -> Option<&CatalogItem> {
        let list = self.lists.get(&kind)?;
        list.by_id.get(id).and_then(|&i| list.items.get(i))
    }

    /// `-` without an id, the raw id when unknown, the item name otherwise.
    pub fn name_of(&self, kind: CatalogKind, id: Option<&DocumentId>) -> String {
        let Some(id) = id else {
            return "-".into();
        };
        match self.get(kind, id) {
            Some(item) if !item.name.is_empty() => item.name.clone(),
            Some(_) => "-".into(),
            None => id.to_string(),
        }
    }

    /// Doctor column of an entry: the catalog label when the doctor is known,
    /// otherwise the specialty stored on the entry.
    pub fn doctor_label(&self, entry: &Entry) -> String {
        entry
            .doctor_id
            .as_ref()
            .and_then(|id| self.get(CatalogKind::Doctor, id))
            .map(CatalogItem::label)
            .or_else(|| entry.doctor_specialty.clone())
            .unwrap_or_else(|| "-".into())
    }

    /// Specialty of a catalog doctor, used to prefill the specialty field.
    pub fn specialty_for(&self, doctor_id: &DocumentId) -> Option<&str> {
        self.get(CatalogKind::Doctor, doctor_id)
            .and_then(|d| d.specialty.as_deref())
    }

    /// Options for one select list: placeholder first, then one per item.
    pub fn options(&self, binding: SelectBinding) -> Vec<SelectOption> {
        let kind = binding.kind();
        std::iter::once(SelectOption::placeholder(SELECT_PLACEHOLDER))
            .chain(self.items(kind).iter().map(|item| SelectOption {
                value: item.id.to_string(),
                label: match kind {
                    CatalogKind::Doctor => item.label(),
                    _ => item.name.clone(),
                },
            }))
            .collect()
    }
}

/// Creates a catalog item. Specialty is only kept for doctors; blank becomes null.
pub async fn add_catalog_item(
    store: &dyn DocumentStore,
    kind: CatalogKind,
    name: &str,
    specialty: Option<&str>,
) -> CoreResult<DocumentId> {
    let name = optional_text(name)
        .ok_or_else(|| CoreError::InvalidInput("catalog name cannot be empty".into()))?;

    let mut fields = Fields::new();
    fields.insert(FIELD_NAME.into(), name.into());
    if kind == CatalogKind::Doctor {
        fields.insert(
            FIELD_SPECIALTY.into(),
            specialty.and_then(optional_text).into(),
        );
    }

    let path = store
        .add(&CollectionPath::root(kind.collection()), fields)
        .await?;
    tracing::info!(catalog = kind.collection(), id = %path.id(), "catalog item created");
    Ok(path.id().clone())
}
