//! Upload admission rules.

use crate::{DEFAULT_ALLOWED_TYPES, DEFAULT_MAX_UPLOAD_BYTES};
use std::fmt;

/// Size ceiling and content-type allow-list applied to every selected file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    max_bytes: u64,
    allowed_types: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_types: DEFAULT_ALLOWED_TYPES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Reason a file was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    TooLarge { name: String, size: u64, limit: u64 },
    DisallowedType { name: String, content_type: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TooLarge { name, size, limit } => {
                write!(f, "{} is {} bytes (limit {})", name, size, limit)
            }
            Rejection::DisallowedType { name, content_type } => {
                write!(f, "{} has disallowed content type '{}'", name, content_type)
            }
        }
    }
}

impl UploadPolicy {
    pub fn new(max_bytes: u64, allowed_types: Vec<String>) -> Self {
        Self {
            max_bytes,
            allowed_types,
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn allowed_types(&self) -> &[String] {
        &self.allowed_types
    }

    /// Checks one file. The size ceiling is inclusive and is checked before the
    /// content type; the content type must match an allowed entry exactly.
    pub fn check(&self, name: &str, size: u64, content_type: &str) -> Result<(), Rejection> {
        if size > self.max_bytes {
            return Err(Rejection::TooLarge {
                name: name.to_owned(),
                size,
                limit: self.max_bytes,
            });
        }
        if !self.allowed_types.iter().any(|t| t == content_type) {
            return Err(Rejection::DisallowedType {
                name: name.to_owned(),
                content_type: content_type.to_owned(),
            });
        }
        Ok(())
    }
}
