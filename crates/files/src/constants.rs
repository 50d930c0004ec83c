//! Object layout and upload defaults.

/// Top-level prefix of every attachment object.
pub const PATIENTS_PREFIX: &str = "patients";

/// Segment separating a patient id from its entry ids.
pub const ENTRIES_SEGMENT: &str = "entries";

/// Upload ceiling used when the configuration does not set one (20 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;

/// Content types accepted when the configuration does not set any.
pub const DEFAULT_ALLOWED_TYPES: &[&str] =
    &["image/jpeg", "image/png", "image/webp", "application/pdf"];

/// Size of a single upload chunk; progress is reported once per chunk.
pub const UPLOAD_CHUNK_BYTES: usize = 256 * 1024;
