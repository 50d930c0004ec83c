//! Patient directory.

use crate::catalog::SelectOption;
use crate::constants::{
    ENTRIES_COLLECTION, FIELD_CREATED_AT, FIELD_CREATED_BY, FIELD_NAME, PATIENTS_COLLECTION,
};
use crate::model::Patient;
use crate::store::{CollectionPath, Direction, DocumentStore, FieldValue, Fields, Query};
use crate::validation::optional_text;
use crate::{CoreError, CoreResult};
use clinic_types::EmailAddress;
use clinic_uuid::DocumentId;

/// Label of the empty first option of the patient selector.
pub const PATIENT_PLACEHOLDER: &str = "Selecciona paciente...";

pub fn patients_collection() -> CollectionPath {
    CollectionPath::root(PATIENTS_COLLECTION)
}

/// `patients/{patient_id}/entries`
pub fn entries_collection(patient_id: &DocumentId) -> CollectionPath {
    patients_collection().doc(patient_id).collection(ENTRIES_COLLECTION)
}

/// Patients in creation order.
#[derive(Debug, Clone, Default)]
pub struct PatientDirectory {
    patients: Vec<Patient>,
}

impl PatientDirectory {
    pub async fn reload(&mut self, store: &dyn DocumentStore) -> CoreResult<()> {
        let query = Query::new(patients_collection()).order_by(FIELD_CREATED_AT, Direction::Ascending);
        let snapshot = store.query(&query).await?;
        self.patients = snapshot.docs().iter().map(Patient::from_document).collect();
        tracing::debug!(count = self.patients.len(), "patients loaded");
        Ok(())
    }

    pub fn patients(&self) -> &[Patient] {
        &self.patients
    }

    pub fn get(&self, id: &DocumentId) -> Option<&Patient> {
        self.patients.iter().find(|p| &p.id == id)
    }

    /// First patient, selected automatically when nothing is selected yet.
    pub fn first(&self) -> Option<&Patient> {
        self.patients.first()
    }

    pub fn options(&self) -> Vec<SelectOption> {
        std::iter::once(SelectOption::placeholder(PATIENT_PLACEHOLDER))
            .chain(self.patients.iter().map(|p| SelectOption {
                value: p.id.to_string(),
                label: p.display_name().to_string(),
            }))
            .collect()
    }
}

/// Creates a patient with a store-assigned id.
pub async fn create_patient(
    store: &dyn DocumentStore,
    name: &str,
    created_by: Option<&EmailAddress>,
) -> CoreResult<DocumentId> {
    let name = optional_text(name)
        .ok_or_else(|| CoreError::InvalidInput("patient name cannot be empty".into()))?;

    let mut fields = Fields::new();
    fields.insert(FIELD_NAME.into(), name.into());
    fields.insert(FIELD_CREATED_AT.into(), FieldValue::ServerTimestamp);
    fields.insert(
        FIELD_CREATED_BY.into(),
        created_by.map(|e| e.to_string()).into(),
    );

    let path = store.add(&patients_collection(), fields).await?;
    tracing::info!(patient_id = %path.id(), "patient created");
    Ok(path.id().clone())
}
