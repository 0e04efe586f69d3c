//! Error types for the store contract.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The table is not known to the store.
    #[error("unknown table: {table}")]
    UnknownTable {
        /// Table name.
        table: String,
    },

    /// A table was re-created with a different description.
    #[error("table {table} already exists with a different description")]
    SchemaMismatch {
        /// Table name.
        table: String,
    },

    /// A row carried a column the table does not declare.
    #[error("unknown column {column} in table {table}")]
    UnknownColumn {
        /// Table name.
        table: String,
        /// Offending column name.
        column: String,
    },

    /// The row is malformed (e.g. missing or non-integer primary key).
    #[error("invalid row for table {table}: {message}")]
    InvalidRow {
        /// Table name.
        table: String,
        /// What was wrong with the row.
        message: String,
    },

    /// Insert with an already-used primary key.
    #[error("duplicate primary key {pk} in table {table}")]
    DuplicatePrimaryKey {
        /// Table name.
        table: String,
        /// The duplicated key.
        pk: i64,
    },

    /// The addressed row does not exist.
    #[error("row {pk} not found in table {table}")]
    RowNotFound {
        /// Table name.
        table: String,
        /// The missing key.
        pk: i64,
    },

    /// A unique constraint was violated.
    #[error("unique constraint ({}) violated by row {pk} in table {table}", columns.join(", "))]
    UniqueViolation {
        /// Table name.
        table: String,
        /// The row that violated the constraint.
        pk: i64,
        /// Constrained columns.
        columns: Vec<String>,
    },
}

impl StoreError {
    /// Returns true if this error reports a constraint violation rather
    /// than a malformed request.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StoreError::UniqueViolation { .. } | StoreError::DuplicatePrimaryKey { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let err = StoreError::UniqueViolation {
            table: "city".into(),
            pk: 1,
            columns: vec!["name".into()],
        };
        assert!(err.is_constraint_violation());

        let err = StoreError::UnknownTable {
            table: "city".into(),
        };
        assert!(!err.is_constraint_violation());
    }

    #[test]
    fn display_names_columns() {
        let err = StoreError::UniqueViolation {
            table: "city".into(),
            pk: 3,
            columns: vec!["a".into(), "b".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("a, b"));
        assert!(msg.contains("city"));
    }
}
