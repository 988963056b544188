//! Error types for the sync client.

use cartosync_model::MutationId;
use cartosync_protocol::ValidationError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in the local store and sync engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server answered with something the client cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A local mutation failed validation before it was ever applied.
    #[error("invalid mutation: {0}")]
    Invalid(#[from] ValidationError),

    /// The server rejected a previously optimistic mutation.
    #[error("mutation {id} rejected by server: {detail}")]
    Rejected {
        /// The rejected mutation.
        id: MutationId,
        /// Server-side reason.
        detail: String,
    },

    /// Push retries are exhausted; local edits are preserved and the
    /// store needs a successful sync to recover.
    #[error("out of sync with server")]
    OutOfSync,

    /// Not connected to the server.
    #[error("not connected to server")]
    NotConnected,

    /// An in-flight pull was cancelled before its response was
    /// integrated.
    #[error("pull cancelled")]
    Cancelled,

    /// A gesture operation arrived with no gesture in progress.
    #[error("no gesture in progress")]
    NoGesture,

    /// A gesture was begun while another was in progress.
    #[error("gesture already in progress")]
    GestureInProgress,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if retrying the operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::NotConnected => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(SyncError::NotConnected.is_retryable());
        assert!(!SyncError::OutOfSync.is_retryable());
        assert!(!SyncError::Invalid(ValidationError::EmptyUpdate).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::Rejected {
            id: MutationId::new(7),
            detail: "update carries no fields".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains("update carries no fields"));
    }
}
