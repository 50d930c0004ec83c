//! Constants used throughout the clinic core crate.
//!
//! Collection and field names are part of the stored schema shared with every
//! other client of the same backend; keep them in one place.

/// Top-level collection of patients.
pub const PATIENTS_COLLECTION: &str = "patients";

/// Per-patient sub-collection of entries.
pub const ENTRIES_COLLECTION: &str = "entries";

pub const CLINICS_COLLECTION: &str = "clinics";
pub const DOCTORS_COLLECTION: &str = "doctors";
pub const COMPANIONS_COLLECTION: &str = "companions";

// Entry fields.
pub const FIELD_TYPE: &str = "type";
pub const FIELD_DATE_TIME: &str = "dateTime";
pub const FIELD_CLINIC_ID: &str = "clinicId";
pub const FIELD_DOCTOR_ID: &str = "doctorId";
pub const FIELD_DOCTOR_SPECIALTY: &str = "doctorSpecialty";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_COMPANION_ID: &str = "companionId";
pub const FIELD_SUMMARY: &str = "summary";
pub const FIELD_COMMENT: &str = "comment";
pub const FIELD_ATTACHMENTS: &str = "attachments";
pub const FIELD_CREATED_AT: &str = "createdAt";

// Attachment fields.
pub const FIELD_NAME: &str = "name";
pub const FIELD_PATH: &str = "path";
pub const FIELD_CONTENT_TYPE: &str = "contentType";
pub const FIELD_SIZE: &str = "size";
pub const FIELD_URL: &str = "url";

// Patient and catalog fields.
pub const FIELD_CREATED_BY: &str = "createdBy";
pub const FIELD_SPECIALTY: &str = "specialty";

/// Entries per page, for both the live head and each loaded tail page.
pub const PAGE_SIZE: usize = 20;

/// Width of the upcoming-appointments window.
pub const UPCOMING_WINDOW_DAYS: i64 = 14;

/// Status given to appointments created without one.
pub const SCHEDULED_STATUS: &str = "programada";

/// Characters of entry text shown in a list row before truncation.
pub const SUMMARY_PREVIEW_CHARS: usize = 140;
