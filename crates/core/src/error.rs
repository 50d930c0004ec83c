#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid date/time: {0}")]
    InvalidDateTime(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("malformed document {path}: {reason}")]
    MalformedDocument { path: String, reason: String },
    #[error("sign-in failed: {0}")]
    SignInFailed(String),

    #[error("document store error: {0}")]
    Store(#[from] crate::store::StoreError),
    #[error("object store error: {0}")]
    Files(#[from] clinic_files::FilesError),
    #[error("identifier error: {0}")]
    Uuid(#[from] clinic_uuid::UuidError),
    #[error("text error: {0}")]
    Text(#[from] clinic_types::TextError),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
