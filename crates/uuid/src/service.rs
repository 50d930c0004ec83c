//! Implementation of [`DocumentId`].

use crate::{UuidError, UuidResult};
use std::{fmt, str::FromStr};

/// Re-exported for convenience.
pub use ::uuid::Uuid;

/// Longest id accepted as a single path segment.
pub const MAX_ID_BYTES: usize = 1500;

/// Identifier of a single document within a collection.
///
/// # Construction
/// - [`DocumentId::new`] allocates a fresh canonical id on the client.
/// - [`DocumentId::parse`] validates an id received from the store or from user input.
///
/// Once constructed the id is guaranteed to be usable as one path segment: it is
/// non-empty, contains no `/`, backslash or NUL, is not `.` or `..`, and is at most
/// [`MAX_ID_BYTES`] long.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(String);

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentId {
    /// Allocates a new id in canonical form without touching the store.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Validates an id that must be usable as a path segment.
    ///
    /// # Errors
    ///
    /// Returns [`UuidError::InvalidInput`] for empty ids, ids containing `/`,
    /// the relative segments `.` and `..`, and ids longer than [`MAX_ID_BYTES`].
    pub fn parse(input: &str) -> UuidResult<Self> {
        if input.is_empty() {
            return Err(UuidError::InvalidInput("document id cannot be empty".into()));
        }
        if input == "." || input == ".." {
            return Err(UuidError::InvalidInput(format!(
                "document id cannot be '{}'",
                input
            )));
        }
        if input.contains('/') {
            return Err(UuidError::InvalidInput(format!(
                "document id cannot contain '/': '{}'",
                input
            )));
        }
        if input.contains('\\') || input.contains('\0') {
            return Err(UuidError::InvalidInput(format!(
                "document id cannot contain a backslash or NUL: '{}'",
                input.escape_default()
            )));
        }
        if input.len() > MAX_ID_BYTES {
            return Err(UuidError::InvalidInput(format!(
                "document id exceeds {} bytes",
                MAX_ID_BYTES
            )));
        }
        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for DocumentId {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentId::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for DocumentId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for DocumentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DocumentId::parse(&s).map_err(serde::de::Error::custom)
    }
}
