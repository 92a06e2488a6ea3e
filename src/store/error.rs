use std::error::Error;

use thiserror::Error;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error raised by store backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or rejected the write; safe to retry
    /// on the next reactive tick.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Human-readable description of the failure.
        message: String,
        /// Backend-specific cause.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The targeted room document does not exist (deleted or never created).
    #[error("room `{room_id}` does not exist")]
    MissingRoom {
        /// Identifier of the missing room.
        room_id: String,
    },
}

impl StoreError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StoreError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}
