//! Stored record types and their document encoding.
//!
//! Every entry is written with all of its keys present; optional values are
//! stored as null rather than omitted so other clients can rely on the shape.

use crate::catalog::Catalogs;
use crate::constants::*;
use crate::store::{Document, FieldValue, Fields};
use crate::validation::{optional_id, optional_text, parse_date_time};
use crate::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use clinic_files::ObjectPath;
use clinic_uuid::DocumentId;
use std::fmt;
use std::str::FromStr;

fn malformed(doc: &Document, reason: impl Into<String>) -> CoreError {
    CoreError::MalformedDocument {
        path: doc.path().to_string(),
        reason: reason.into(),
    }
}

fn string_field(fields: &Fields, name: &str) -> Option<String> {
    fields.get(name).and_then(FieldValue::as_str).map(str::to_string)
}

fn id_field(doc: &Document, name: &str) -> CoreResult<Option<DocumentId>> {
    match doc.get(name) {
        None | Some(FieldValue::Null) => Ok(None),
        Some(FieldValue::String(s)) if s.is_empty() => Ok(None),
        Some(FieldValue::String(s)) => DocumentId::parse(s)
            .map(Some)
            .map_err(|e| malformed(doc, format!("{}: {}", name, e))),
        Some(_) => Err(malformed(doc, format!("{} is not a string", name))),
    }
}

fn id_value(id: &Option<DocumentId>) -> FieldValue {
    id.as_ref().map(|id| id.to_string()).into()
}

/// A patient.
#[derive(Debug, Clone, PartialEq)]
pub struct Patient {
    pub id: DocumentId,
    pub name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
}

impl Patient {
    pub fn from_document(doc: &Document) -> Self {
        let fields = doc.fields();
        Self {
            id: doc.id().clone(),
            name: string_field(fields, FIELD_NAME).filter(|n| !n.is_empty()),
            created_at: fields.get(FIELD_CREATED_AT).and_then(FieldValue::as_timestamp),
            created_by: string_field(fields, FIELD_CREATED_BY),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("(sin nombre)")
    }
}

/// One of the reference collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CatalogKind {
    Clinic,
    Doctor,
    Companion,
}

impl CatalogKind {
    pub const ALL: [CatalogKind; 3] = [CatalogKind::Clinic, CatalogKind::Doctor, CatalogKind::Companion];

    pub fn collection(self) -> &'static str {
        match self {
            CatalogKind::Clinic => CLINICS_COLLECTION,
            CatalogKind::Doctor => DOCTORS_COLLECTION,
            CatalogKind::Companion => COMPANIONS_COLLECTION,
        }
    }
}

impl FromStr for CatalogKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clinic" | "clinics" => Ok(CatalogKind::Clinic),
            "doctor" | "doctors" => Ok(CatalogKind::Doctor),
            "companion" | "companions" => Ok(CatalogKind::Companion),
            other => Err(CoreError::InvalidInput(format!("unknown catalog '{}'", other))),
        }
    }
}

/// A clinic, doctor or companion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub id: DocumentId,
    pub name: String,
    /// Doctors only.
    pub specialty: Option<String>,
}

impl CatalogItem {
    pub fn from_document(doc: &Document) -> Self {
        let fields = doc.fields();
        Self {
            id: doc.id().clone(),
            name: string_field(fields, FIELD_NAME).unwrap_or_default(),
            specialty: string_field(fields, FIELD_SPECIALTY).filter(|s| !s.is_empty()),
        }
    }

    /// `name · specialty`, or just the name.
    pub fn label(&self) -> String {
        match &self.specialty {
            Some(specialty) => format!("{} · {}", self.name, specialty),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Appointment,
    Exam,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Appointment => "appointment",
            EntryKind::Exam => "exam",
        }
    }

    /// Tag shown next to a row.
    pub fn label(self) -> &'static str {
        match self {
            EntryKind::Appointment => "Cita",
            EntryKind::Exam => "Examen",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "appointment" => Ok(EntryKind::Appointment),
            "exam" => Ok(EntryKind::Exam),
            other => Err(CoreError::InvalidInput(format!("unknown entry type '{}'", other))),
        }
    }
}

/// Kind-specific part of an entry. Only one of summary and comment exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryDetails {
    Appointment {
        status: Option<String>,
        summary: Option<String>,
    },
    Exam {
        comment: Option<String>,
    },
}

impl EntryDetails {
    pub fn kind(&self) -> EntryKind {
        match self {
            EntryDetails::Appointment { .. } => EntryKind::Appointment,
            EntryDetails::Exam { .. } => EntryKind::Exam,
        }
    }

    fn write_into(&self, fields: &mut Fields) {
        let (status, summary, comment) = match self {
            EntryDetails::Appointment { status, summary } => (status.clone(), summary.clone(), None),
            EntryDetails::Exam { comment } => (None, None, comment.clone()),
        };
        fields.insert(FIELD_STATUS.into(), status.into());
        fields.insert(FIELD_SUMMARY.into(), summary.into());
        fields.insert(FIELD_COMMENT.into(), comment.into());
    }
}

/// A file stored alongside an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub name: String,
    pub path: ObjectPath,
    pub content_type: String,
    pub size: u64,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    pub fn is_pdf(&self) -> bool {
        self.content_type == "application/pdf"
    }

    pub fn to_field_value(&self) -> FieldValue {
        let mut map = Fields::new();
        map.insert(FIELD_NAME.into(), self.name.as_str().into());
        map.insert(FIELD_PATH.into(), self.path.as_str().into());
        map.insert(FIELD_CONTENT_TYPE.into(), self.content_type.as_str().into());
        map.insert(FIELD_SIZE.into(), self.size.into());
        map.insert(FIELD_URL.into(), self.url.as_str().into());
        map.insert(FIELD_CREATED_AT.into(), self.created_at.into());
        FieldValue::Map(map)
    }

    pub fn from_field_value(value: &FieldValue) -> Result<Self, String> {
        let map = value.as_map().ok_or("attachment is not a map")?;
        let text = |name: &str| string_field(map, name).ok_or(format!("attachment {} missing", name));
        let path = ObjectPath::parse(&text(FIELD_PATH)?).map_err(|e| e.to_string())?;

        Ok(Self {
            name: text(FIELD_NAME)?,
            path,
            content_type: string_field(map, FIELD_CONTENT_TYPE).unwrap_or_default(),
            size: map
                .get(FIELD_SIZE)
                .and_then(FieldValue::as_i64)
                .and_then(|n| u64::try_from(n).ok())
                .unwrap_or(0),
            url: string_field(map, FIELD_URL).unwrap_or_default(),
            created_at: map
                .get(FIELD_CREATED_AT)
                .and_then(FieldValue::as_timestamp)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        })
    }
}

/// Encodes an attachment list as stored in an entry.
pub fn attachments_value(attachments: &[Attachment]) -> FieldValue {
    FieldValue::Array(attachments.iter().map(Attachment::to_field_value).collect())
}

/// One appointment or exam.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: DocumentId,
    pub date_time: DateTime<Utc>,
    pub clinic_id: Option<DocumentId>,
    pub doctor_id: Option<DocumentId>,
    pub doctor_specialty: Option<String>,
    pub companion_id: Option<DocumentId>,
    pub details: EntryDetails,
    pub attachments: Vec<Attachment>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn kind(&self) -> EntryKind {
        self.details.kind()
    }

    pub fn status(&self) -> Option<&str> {
        match &self.details {
            EntryDetails::Appointment { status, .. } => status.as_deref(),
            EntryDetails::Exam { .. } => None,
        }
    }

    /// Summary for appointments, comment for exams.
    pub fn text(&self) -> &str {
        let text = match &self.details {
            EntryDetails::Appointment { summary, .. } => summary.as_deref(),
            EntryDetails::Exam { comment } => comment.as_deref(),
        };
        text.unwrap_or("")
    }

    pub fn from_document(doc: &Document) -> CoreResult<Self> {
        let fields = doc.fields();
        let kind: EntryKind = string_field(fields, FIELD_TYPE)
            .ok_or_else(|| malformed(doc, "type missing"))?
            .parse()
            .map_err(|_| malformed(doc, "unknown type"))?;
        let date_time = fields
            .get(FIELD_DATE_TIME)
            .and_then(FieldValue::as_timestamp)
            .ok_or_else(|| malformed(doc, "dateTime is not a timestamp"))?;

        let details = match kind {
            EntryKind::Appointment => EntryDetails::Appointment {
                status: string_field(fields, FIELD_STATUS),
                summary: string_field(fields, FIELD_SUMMARY),
            },
            EntryKind::Exam => EntryDetails::Exam {
                comment: string_field(fields, FIELD_COMMENT),
            },
        };

        let attachments = match fields.get(FIELD_ATTACHMENTS) {
            None | Some(FieldValue::Null) => Vec::new(),
            Some(value) => value
                .as_array()
                .ok_or_else(|| malformed(doc, "attachments is not an array"))?
                .iter()
                .map(|a| Attachment::from_field_value(a).map_err(|reason| malformed(doc, reason)))
                .collect::<CoreResult<Vec<_>>>()?,
        };

        Ok(Self {
            id: doc.id().clone(),
            date_time,
            clinic_id: id_field(doc, FIELD_CLINIC_ID)?,
            doctor_id: id_field(doc, FIELD_DOCTOR_ID)?,
            doctor_specialty: string_field(fields, FIELD_DOCTOR_SPECIALTY).filter(|s| !s.is_empty()),
            companion_id: id_field(doc, FIELD_COMPANION_ID)?,
            details,
            attachments,
            created_at: fields.get(FIELD_CREATED_AT).and_then(FieldValue::as_timestamp),
        })
    }
}

/// A validated entry, ready to be written once its attachments are known.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDraft {
    pub date_time: DateTime<Utc>,
    pub clinic_id: Option<DocumentId>,
    pub doctor_id: Option<DocumentId>,
    pub doctor_specialty: Option<String>,
    pub companion_id: Option<DocumentId>,
    pub details: EntryDetails,
}

impl EntryDraft {
    pub fn kind(&self) -> EntryKind {
        self.details.kind()
    }

    /// Full document for a new entry; `createdAt` is set by the server.
    pub fn to_fields(&self, attachments: &[Attachment]) -> Fields {
        let mut fields = Fields::new();
        fields.insert(FIELD_TYPE.into(), self.kind().as_str().into());
        fields.insert(FIELD_DATE_TIME.into(), self.date_time.into());
        fields.insert(FIELD_CLINIC_ID.into(), id_value(&self.clinic_id));
        fields.insert(FIELD_DOCTOR_ID.into(), id_value(&self.doctor_id));
        fields.insert(FIELD_DOCTOR_SPECIALTY.into(), self.doctor_specialty.clone().into());
        fields.insert(FIELD_COMPANION_ID.into(), id_value(&self.companion_id));
        self.details.write_into(&mut fields);
        fields.insert(FIELD_ATTACHMENTS.into(), attachments_value(attachments));
        fields.insert(FIELD_CREATED_AT.into(), FieldValue::ServerTimestamp);
        fields
    }
}

/// Raw values of the appointment form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppointmentForm {
    pub date_time: String,
    pub clinic_id: String,
    pub doctor_id: String,
    pub specialty: String,
    pub status: String,
    pub companion_id: String,
    pub summary: String,
}

impl AppointmentForm {
    /// Validates the form. A selected doctor's catalog specialty wins over the
    /// typed one; a blank status becomes the scheduled status.
    pub fn into_draft(self, catalogs: &Catalogs) -> CoreResult<EntryDraft> {
        let date_time = parse_date_time(&self.date_time)?;
        let doctor_id = optional_id(&self.doctor_id)?;
        let typed_specialty = optional_text(&self.specialty);
        let doctor_specialty = doctor_id
            .as_ref()
            .and_then(|id| catalogs.specialty_for(id))
            .map(str::to_string)
            .or(typed_specialty);

        Ok(EntryDraft {
            date_time,
            clinic_id: optional_id(&self.clinic_id)?,
            doctor_id,
            doctor_specialty,
            companion_id: optional_id(&self.companion_id)?,
            details: EntryDetails::Appointment {
                status: Some(optional_text(&self.status).unwrap_or_else(|| SCHEDULED_STATUS.into())),
                summary: Some(self.summary.trim().to_string()),
            },
        })
    }
}

/// Raw values of the exam form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExamForm {
    pub date_time: String,
    pub clinic_id: String,
    pub companion_id: String,
    pub comment: String,
}

impl ExamForm {
    pub fn into_draft(self) -> CoreResult<EntryDraft> {
        Ok(EntryDraft {
            date_time: parse_date_time(&self.date_time)?,
            clinic_id: optional_id(&self.clinic_id)?,
            doctor_id: None,
            doctor_specialty: None,
            companion_id: optional_id(&self.companion_id)?,
            details: EntryDetails::Exam {
                comment: Some(self.comment.trim().to_string()),
            },
        })
    }
}

/// Admin edit of an existing entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryEdit {
    pub text: String,
    /// Appointments only; left unchanged when blank.
    pub status: String,
}

impl EntryEdit {
    /// Patch for an entry of `kind`. The type itself is never patched.
    pub fn to_patch(&self, kind: EntryKind) -> Fields {
        let mut patch = Fields::new();
        let text = self.text.trim().to_string();
        match kind {
            EntryKind::Appointment => {
                if let Some(status) = optional_text(&self.status) {
                    patch.insert(FIELD_STATUS.into(), status.into());
                }
                patch.insert(FIELD_SUMMARY.into(), text.into());
            }
            EntryKind::Exam => {
                patch.insert(FIELD_COMMENT.into(), text.into());
            }
        }
        patch
    }
}
