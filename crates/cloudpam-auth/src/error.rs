use cloudpam_store::ObjectError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("bootstrap token {0} not found")]
    NotFound(uuid::Uuid),

    #[error("bootstrap token {0} is revoked")]
    Revoked(uuid::Uuid),

    #[error("backend error: {0}")]
    Backend(#[from] ObjectError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
