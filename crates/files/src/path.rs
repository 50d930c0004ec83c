//! Validated object keys.

use crate::{FilesError, FilesResult, ENTRIES_SEGMENT, PATIENTS_PREFIX};
use clinic_uuid::DocumentId;
use std::fmt;

/// A relative, `/`-separated object key.
///
/// Every segment is non-empty, is not `.` or `..`, and contains no backslash, so a
/// key can never escape the root of a filesystem-backed store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn parse(input: &str) -> FilesResult<Self> {
        if input.is_empty() {
            return Err(FilesError::InvalidPath("object path cannot be empty".into()));
        }
        for segment in input.split('/') {
            validate_segment(segment).map_err(|reason| {
                FilesError::InvalidPath(format!("{}: '{}'", reason, input))
            })?;
        }
        Ok(Self(input.to_owned()))
    }

    /// Key of an attachment: `patients/{patient_id}/entries/{entry_id}/{filename}`.
    ///
    /// The filename is used verbatim and must be a single path segment. The
    /// result always parses back with [`ObjectPath::parse`].
    pub fn for_attachment(
        patient_id: &DocumentId,
        entry_id: &DocumentId,
        filename: &str,
    ) -> FilesResult<Self> {
        for id in [patient_id, entry_id] {
            validate_segment(id.as_str()).map_err(|reason| {
                FilesError::InvalidPath(format!("{} in id '{}'", reason, id))
            })?;
        }
        validate_segment(filename).map_err(|reason| {
            FilesError::InvalidPath(format!("{} in filename '{}'", reason, filename))
        })?;
        if filename.contains('/') {
            return Err(FilesError::InvalidPath(format!(
                "filename cannot contain '/': '{}'",
                filename
            )));
        }
        Ok(Self(format!(
            "{}/{}/{}/{}/{}",
            PATIENTS_PREFIX, patient_id, ENTRIES_SEGMENT, entry_id, filename
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Last segment of the key.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

fn validate_segment(segment: &str) -> Result<(), &'static str> {
    if segment.is_empty() {
        return Err("empty path segment");
    }
    if segment == "." || segment == ".." {
        return Err("relative path segment");
    }
    if segment.contains('\\') || segment.contains('\0') {
        return Err("forbidden character");
    }
    Ok(())
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ObjectPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
