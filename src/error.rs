use thiserror::Error;

use crate::{codec::CodecError, store::StoreError};

/// Errors surfaced by the engine across the store boundary.
///
/// The engine never propagates raw backend exceptions: store failures are
/// either retried on the next reactive tick ([`EngineError::Store`]) or
/// reported as the distinct terminal session-ended signal. Only a document
/// that fails to decode is a hard error requiring manual retry/leave.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A store read or write failed transiently; safe to retry.
    #[error("store operation failed")]
    Store(#[from] StoreError),
    /// The session document no longer matches the expected shape.
    #[error("session document is corrupt")]
    Corrupt(#[from] CodecError),
    /// The room document was deleted; the session is over.
    #[error("session ended: room document deleted")]
    SessionEnded,
}
