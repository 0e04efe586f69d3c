//! Error types for the sync server.

use rowsync_core::messages::error_codes;
use rowsync_core::{CoreError, ErrorBody, VersionId};
use rowsync_store::StoreError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Core model error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The pushing client is behind the server and must pull first.
    #[error("push rejected: client at version {client_version}, server at {latest_version}")]
    PushRejected {
        /// Version the client advertised.
        client_version: VersionId,
        /// The server's latest version.
        latest_version: VersionId,
    },

    /// Signature mismatch.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The node is not registered.
    #[error("unknown node: {node_id}")]
    UnknownNode {
        /// The unknown node id.
        node_id: i64,
    },

    /// A push operation violated a constraint; the transaction was
    /// aborted.
    #[error("integrity error on {content_type}:{pk}: {detail}")]
    Integrity {
        /// Offending content type.
        content_type: String,
        /// Offending primary key.
        pk: i64,
        /// Store-level detail.
        detail: String,
    },

    /// Malformed request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal failure (journal/store drift, misconfiguration).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this error is the client's fault (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::PushRejected { .. }
                | ServerError::Auth(_)
                | ServerError::UnknownNode { .. }
                | ServerError::Integrity { .. }
                | ServerError::InvalidRequest(_)
        )
    }

    /// The HTTP status for this error.
    pub fn status(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }

    /// The wire error body for this error.
    pub fn to_body(&self) -> ErrorBody {
        let code = match self {
            ServerError::PushRejected { .. } => error_codes::PUSH_REJECTED,
            ServerError::Auth(_) | ServerError::UnknownNode { .. } => error_codes::AUTH_FAILED,
            ServerError::Integrity { .. } => error_codes::INTEGRITY,
            ServerError::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            _ => error_codes::INTERNAL,
        };
        ErrorBody::new(code, self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_and_status() {
        let rejected = ServerError::PushRejected {
            client_version: 0,
            latest_version: 3,
        };
        assert!(rejected.is_client_error());
        assert_eq!(rejected.status(), 400);
        assert_eq!(rejected.to_body().code(), Some("push_rejected"));

        let internal = ServerError::Internal("drift".into());
        assert!(!internal.is_client_error());
        assert_eq!(internal.status(), 500);
        assert_eq!(internal.to_body().code(), Some("internal"));
    }

    #[test]
    fn auth_errors_share_a_code() {
        assert_eq!(
            ServerError::UnknownNode { node_id: 9 }.to_body().code(),
            Some("auth_failed")
        );
        assert_eq!(
            ServerError::Auth("bad signature".into()).to_body().code(),
            Some("auth_failed")
        );
    }
}
