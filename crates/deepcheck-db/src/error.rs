use deepcheck_core::AppError;

/// Persistence failure. The store never retries; callers decide.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be decoded (malformed JSON column, unknown status text).
    #[error("Data integrity error: {0}")]
    Integrity(String),

    /// A conditional write found the referenced rows in the wrong state.
    #[error("Conflict: {0}")]
    Conflict(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub(crate) fn integrity(
        entity: &str,
        id: impl std::fmt::Display,
        detail: impl std::fmt::Display,
    ) -> Self {
        tracing::error!(entity, id = %id, detail = %detail, "Stored row failed to decode");
        StorageError::Integrity(format!("{} {}: {}", entity, id, detail))
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Database(e) => AppError::Database(e),
            StorageError::Integrity(msg) => AppError::Integrity(msg),
            StorageError::Conflict(msg) => AppError::InvalidRequest(msg),
        }
    }
}
