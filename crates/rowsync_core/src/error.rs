//! Error types for the core crate.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the core synchronization model.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] rowsync_store::StoreError),

    /// A journal entry or message referenced a content type the registry
    /// does not know. Fatal at merge time.
    #[error("content type not tracked: {content_type}")]
    UnknownContentType {
        /// The unknown content type id.
        content_type: String,
    },

    /// The registry or store was used before initialization, or
    /// initialized inconsistently.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON envelope could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A persisted system row was malformed.
    #[error("corrupt system row in {table}: {message}")]
    CorruptSystemRow {
        /// System table name.
        table: String,
        /// What was wrong.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let err = CoreError::UnknownContentType {
            content_type: "city".into(),
        };
        assert!(err.to_string().contains("city"));
    }
}
