use thiserror::Error;

use creditflow_db::DbError;
use creditflow_store::StoreError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable machine-checkable label for the error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::StateConflict(_) => "state_conflict",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::Internal(_) => "internal",
        }
    }
}

impl From<DbError> for ServiceError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(msg) => ServiceError::NotFound(msg),
            DbError::Conflict(msg) => ServiceError::StateConflict(msg),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => ServiceError::NotFound(msg),
            StoreError::Internal(msg) => ServiceError::Internal(msg),
        }
    }
}
