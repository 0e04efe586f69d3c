//! Store contract traits.

use crate::error::{StoreError, StoreResult};
use crate::schema::TableSpec;
use crate::value::{Row, Value};

/// A row removed by cascade when a referenced row was deleted.
///
/// Reported in deletion order so the caller can mirror the cascade into its
/// own bookkeeping (the sync layer journals each victim).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeDelete {
    /// Table the victim lived in.
    pub table: String,
    /// Primary key of the victim.
    pub pk: i64,
}

/// Read-only access to a store state.
pub trait StoreRead {
    /// Returns the description of a table.
    fn schema(&self, table: &str) -> StoreResult<&TableSpec>;

    /// Fetches a row by primary key.
    fn get(&self, table: &str, pk: i64) -> StoreResult<Option<Row>>;

    /// Returns all rows of a table, ordered by primary key.
    fn scan(&self, table: &str) -> StoreResult<Vec<Row>>;

    /// Finds the first row whose columns equal all given criteria.
    ///
    /// Rows are probed in primary-key order, so the result is
    /// deterministic.
    fn find_by(&self, table: &str, criteria: &[(&str, &Value)]) -> StoreResult<Option<Row>>;

    /// Returns the largest primary key in a table, if any rows exist.
    fn max_pk(&self, table: &str) -> StoreResult<Option<i64>>;

    /// Returns the number of rows in a table.
    fn count(&self, table: &str) -> StoreResult<usize>;
}

/// A write transaction over a store.
///
/// All mutations are staged until the surrounding [`RelationalStore::with_tx`]
/// closure returns `Ok`; an `Err` return discards every staged change.
pub trait StoreTx: StoreRead {
    /// Inserts a row. The row must carry an integer primary key.
    ///
    /// Returns the primary key. Fails on duplicate keys, undeclared
    /// columns and unique-constraint violations.
    fn insert(&mut self, table: &str, row: Row) -> StoreResult<i64>;

    /// Replaces an existing row wholesale.
    fn update(&mut self, table: &str, pk: i64, row: Row) -> StoreResult<()>;

    /// Inserts the row, or replaces it if its primary key already exists.
    fn upsert(&mut self, table: &str, row: Row) -> StoreResult<i64>;

    /// Deletes a row.
    ///
    /// With cascades enabled, rows referencing the deleted row through a
    /// foreign key are deleted too (recursively); the victims are returned
    /// in deletion order. The root row itself is not reported.
    fn delete(&mut self, table: &str, pk: i64) -> StoreResult<Vec<CascadeDelete>>;

    /// Removes all rows of a table.
    fn clear(&mut self, table: &str) -> StoreResult<()>;

    /// Toggles cascade deletion for the remainder of this transaction.
    fn set_cascades(&mut self, enabled: bool);

    /// Returns whether cascade deletion is currently enabled.
    fn cascades(&self) -> bool;
}

/// A relational store the synchronization engine can drive.
///
/// Implementations must be `Send + Sync`. Write transactions are exclusive:
/// only one may run at a time, and it blocks readers for its duration (or
/// the implementation provides equivalent isolation).
pub trait RelationalStore: Send + Sync {
    /// Concrete transaction type.
    type Tx: StoreTx;

    /// Creates a table. Idempotent: recreating an identical table is a
    /// no-op; redefining an existing table with a different spec is an
    /// error.
    fn create_table(&self, spec: TableSpec) -> StoreResult<()>;

    /// Returns true if the table exists.
    fn has_table(&self, name: &str) -> bool;

    /// Returns a copy of a table description.
    fn table(&self, name: &str) -> Option<TableSpec>;

    /// Runs a write transaction.
    ///
    /// The closure's staged changes are committed when it returns `Ok` and
    /// discarded when it returns `Err`.
    fn with_tx<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Self::Tx) -> Result<R, E>,
        E: From<StoreError>;

    /// Runs a read-only closure over a consistent view of the store.
    fn with_read<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&dyn StoreRead) -> Result<R, E>,
        E: From<StoreError>;
}
