use thiserror::Error;

/// The three sentinel error kinds that propagate from storage.
/// Upper layers wrap these with context but preserve the sentinel identity
/// so callers several layers up can still classify the failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<ObjectError> for StoreError {
    fn from(e: ObjectError) -> Self {
        match e {
            ObjectError::NotFound { key } => StoreError::NotFound {
                kind: "object",
                id: key,
            },
            ObjectError::PreconditionFailed { key } => {
                StoreError::Conflict(format!("concurrent write to {key}, retry"))
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Low-level S3 object errors, internal to the S3-backed store.
#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("precondition failed for key: {key}")]
    PreconditionFailed { key: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("S3 GetObject error: {0}")]
    GetObject(String),

    #[error("S3 PutObject error: {0}")]
    PutObject(String),

    #[error("S3 DeleteObject error: {0}")]
    DeleteObject(String),

    #[error("S3 ListObjects error: {0}")]
    ListObjects(String),
}
