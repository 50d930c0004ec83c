//! Input validation utilities.
//!
//! Form values arrive as raw strings. These helpers turn them into typed values,
//! normalising blank input to `None` before anything is written.

use crate::{CoreError, CoreResult};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use clinic_types::NonEmptyText;
use clinic_uuid::DocumentId;

const LOCAL_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parses a date/time form value.
///
/// Accepts RFC 3339 (with offset) or a `datetime-local` value such as
/// `2025-03-14T09:30`, which is interpreted in the local time zone.
///
/// # Errors
///
/// Returns `CoreError::InvalidDateTime` for blank or unparseable input, and for
/// local times that do not exist (daylight-saving gaps).
pub fn parse_date_time(input: &str) -> CoreResult<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CoreError::InvalidDateTime("empty".into()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .ok_or_else(|| CoreError::InvalidDateTime(input.to_string()))?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| CoreError::InvalidDateTime(input.to_string()))
}

/// Blank → `None`, otherwise trimmed text.
pub fn optional_text(input: &str) -> Option<String> {
    NonEmptyText::optional(input).map(NonEmptyText::into_string)
}

/// Parses an optional reference to another document (a select-list value).
pub fn optional_id(input: &str) -> CoreResult<Option<DocumentId>> {
    optional_text(input)
        .map(|id| DocumentId::parse(&id).map_err(CoreError::from))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_rfc3339() {
        let dt = parse_date_time("2025-03-14T09:30:00+02:00").unwrap();
        assert_eq!(dt.hour(), 7);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn test_parse_local_datetime_input() {
        let dt = parse_date_time("2025-03-14T09:30").unwrap();
        let local = dt.with_timezone(&Local);
        assert_eq!((local.hour(), local.minute()), (9, 30));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "   ", "mañana", "2025-13-01T10:00", "14/03/2025"] {
            assert!(
                matches!(parse_date_time(bad), Err(CoreError::InvalidDateTime(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_optional_values_normalise_blank_to_none() {
        assert_eq!(optional_text("  "), None);
        assert_eq!(optional_text(" Control anual "), Some("Control anual".into()));
        assert_eq!(optional_id("").unwrap(), None);
        assert_eq!(optional_id("abc").unwrap().unwrap().as_str(), "abc");
        assert!(optional_id("a/b").is_err());
    }
}
