//! Error types for the sync server.

use cartosync_model::DocumentId;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that reject a request as a whole.
///
/// Per-mutation outcomes are not errors; they travel back inside the
/// push response. These variants mean the server did not process the
/// request at all.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The request was malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The push batch exceeded the configured limit.
    #[error("push batch too large: {actual} > {limit}")]
    BatchTooLarge {
        /// Submitted batch size.
        actual: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Mutation ids in the batch did not ascend strictly.
    #[error("push batch out of order for client {0}")]
    OutOfOrderBatch(cartosync_model::ClientId),

    /// The document is not hosted here.
    #[error("unknown document: {0}")]
    UnknownDocument(DocumentId),

    /// The document already exists.
    #[error("document already exists: {0}")]
    DocumentExists(DocumentId),

    /// Authentication failed.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is the caller's fault (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ServerError::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::NotAuthorized("nope".into()).is_client_error());
        assert!(!ServerError::Internal("oops".into()).is_client_error());
    }

    #[test]
    fn batch_error_display() {
        let err = ServerError::BatchTooLarge {
            actual: 500,
            limit: 100,
        };
        let msg = err.to_string();
        assert!(msg.contains("500"));
        assert!(msg.contains("100"));
    }
}
