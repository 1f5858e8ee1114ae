//! Errors surfaced by storage backends.

use thiserror::Error;

use crate::error::ValidationError;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("booking not found: {key}")]
    BookingNotFound { key: String },

    #[error("damage report not found: {id}")]
    DamageReportNotFound { id: String },

    #[error("duplicate booking reference: {reference}")]
    DuplicateReference { reference: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("stored record failed validation: {0}")]
    CorruptRecord(#[from] ValidationError),

    #[error("backend error: {reason}")]
    Backend { reason: String },

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StorageError {
    /// Transient backend trouble the operator may simply retry.
    /// Corrupt or missing records are not retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Io(_) | StorageError::Backend { .. } => true,
            #[cfg(feature = "database")]
            StorageError::Database(_) => true,
            _ => false,
        }
    }

    pub fn backend(reason: impl Into<String>) -> Self {
        StorageError::Backend {
            reason: reason.into(),
        }
    }
}
