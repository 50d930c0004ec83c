//! Document identifiers.
//!
//! Every document in the clinic store lives at a path made of alternating
//! collection names and document ids (`patients/{id}/entries/{id}`). Ids come from
//! two places:
//!
//! - ids generated on the client before anything is written, so that uploaded
//!   attachments can be stored under the id of an entry that does not exist yet;
//! - ids handed back by the store (catalog items, patients), which may have been
//!   created by other clients and do not follow any particular shape.
//!
//! Client-generated ids use the canonical form of a random UUID: **32 lowercase
//! hexadecimal characters** (no hyphens), e.g. `550e8400e29b41d4a716446655440000`.
//! Ids read back from the store only have to be valid path segments.

mod service;

pub use service::{DocumentId, Uuid, MAX_ID_BYTES};

/// Error type for identifier operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
