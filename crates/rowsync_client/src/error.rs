//! Error types for the client.

use rowsync_core::{CoreError, Ref};
use rowsync_store::StoreError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// An unsolvable unique-constraint conflict the user must resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConflictEntry {
    /// Content type of the conflicting local row.
    pub content_type: String,
    /// Primary key of the conflicting local row.
    pub pk: i64,
    /// Columns of the violated constraint.
    pub columns: Vec<String>,
}

/// Errors that can occur in client synchronization procedures.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Core model error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// No node registration is present locally.
    #[error("node is not registered; call register first")]
    NotRegistered,

    /// The server rejected the push because this client is behind.
    /// React by pulling.
    #[error("push rejected: {detail}")]
    PushRejected {
        /// Server-provided detail.
        detail: String,
    },

    /// Merge detected unsolvable unique-constraint conflicts.
    #[error("unsolvable unique-constraint conflicts on {} row(s)", entries.len())]
    UniqueConstraint {
        /// The conflicting rows the user must resolve.
        entries: Vec<UniqueConflictEntry>,
    },

    /// A row required by the merge is absent from both the local store and
    /// the message. Fatal; indicates journal/store drift.
    #[error("merge fetch failure: row {reference} absent from both store and message")]
    MergeFetchFailure {
        /// The missing row.
        reference: Ref,
    },

    /// The payload builder could not read a row for a journaled
    /// insert/update.
    #[error("cannot build payload: row {reference} is unreadable")]
    MissingLocalRow {
        /// The unreadable row.
        reference: Ref,
    },

    /// Signature mismatch or unknown node, as reported by the server.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The server reported an error (integrity violation, malformed
    /// request, internal failure).
    #[error("server error: {0}")]
    Server(String),

    /// Network or transport failure.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A response could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The push/pull loop exhausted its attempts.
    #[error("synchronization gave up after {attempts} push attempt(s)")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
    },
}

impl ClientError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Returns true if the operation may be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport { retryable: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability() {
        assert!(ClientError::transport_retryable("timeout").is_retryable());
        assert!(!ClientError::NotRegistered.is_retryable());
        assert!(!ClientError::PushRejected {
            detail: "behind".into()
        }
        .is_retryable());
    }

    #[test]
    fn unique_constraint_display_counts_entries() {
        let err = ClientError::UniqueConstraint {
            entries: vec![UniqueConflictEntry {
                content_type: "city".into(),
                pk: 1,
                columns: vec!["name".into()],
            }],
        };
        assert!(err.to_string().contains("1 row"));
    }
}
