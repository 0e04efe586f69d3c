//! In-memory reference store.

use crate::error::{StoreError, StoreResult};
use crate::schema::TableSpec;
use crate::store::{CascadeDelete, RelationalStore, StoreRead, StoreTx};
use crate::value::{Row, Value};
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct TableData {
    spec: TableSpec,
    rows: BTreeMap<i64, Row>,
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    tables: BTreeMap<String, TableData>,
}

impl StoreState {
    fn table(&self, name: &str) -> StoreResult<&TableData> {
        self.tables.get(name).ok_or_else(|| StoreError::UnknownTable {
            table: name.to_string(),
        })
    }

    fn table_mut(&mut self, name: &str) -> StoreResult<&mut TableData> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownTable {
                table: name.to_string(),
            })
    }

    fn get(&self, table: &str, pk: i64) -> StoreResult<Option<Row>> {
        Ok(self.table(table)?.rows.get(&pk).cloned())
    }

    fn find_by(&self, table: &str, criteria: &[(&str, &Value)]) -> StoreResult<Option<Row>> {
        let data = self.table(table)?;
        Ok(data
            .rows
            .values()
            .find(|row| {
                criteria
                    .iter()
                    .all(|(col, value)| row.get(*col) == Some(*value))
            })
            .cloned())
    }

    /// Extracts and checks the primary key of a row.
    fn row_pk(spec: &TableSpec, row: &Row) -> StoreResult<i64> {
        match row.get(&spec.pk_column) {
            Some(Value::Integer(pk)) => Ok(*pk),
            Some(_) => Err(StoreError::InvalidRow {
                table: spec.name.clone(),
                message: format!("primary key column {} is not an integer", spec.pk_column),
            }),
            None => Err(StoreError::InvalidRow {
                table: spec.name.clone(),
                message: format!("missing primary key column {}", spec.pk_column),
            }),
        }
    }

    fn check_columns(spec: &TableSpec, row: &Row) -> StoreResult<()> {
        for column in row.keys() {
            if !spec.has_column(column) {
                return Err(StoreError::UnknownColumn {
                    table: spec.name.clone(),
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }

    /// Checks the table's unique constraints against the candidate row,
    /// ignoring the row stored under `pk` itself. Constraints with any
    /// null value do not conflict.
    fn check_uniques(data: &TableData, pk: i64, row: &Row) -> StoreResult<()> {
        for constraint in &data.spec.uniques {
            let values: Vec<&Value> = constraint
                .columns
                .iter()
                .map(|col| row.get(col).unwrap_or(&Value::Null))
                .collect();
            if values.iter().any(|v| v.is_null()) {
                continue;
            }
            let clash = data.rows.iter().any(|(other_pk, other)| {
                *other_pk != pk
                    && constraint
                        .columns
                        .iter()
                        .zip(&values)
                        .all(|(col, value)| other.get(col) == Some(*value))
            });
            if clash {
                return Err(StoreError::UniqueViolation {
                    table: data.spec.name.clone(),
                    pk,
                    columns: constraint.columns.clone(),
                });
            }
        }
        Ok(())
    }

    fn insert(&mut self, table: &str, row: Row) -> StoreResult<i64> {
        let data = self.table_mut(table)?;
        StoreState::check_columns(&data.spec, &row)?;
        let pk = StoreState::row_pk(&data.spec, &row)?;
        if data.rows.contains_key(&pk) {
            return Err(StoreError::DuplicatePrimaryKey {
                table: table.to_string(),
                pk,
            });
        }
        StoreState::check_uniques(data, pk, &row)?;
        data.rows.insert(pk, row);
        Ok(pk)
    }

    fn update(&mut self, table: &str, pk: i64, row: Row) -> StoreResult<()> {
        let data = self.table_mut(table)?;
        StoreState::check_columns(&data.spec, &row)?;
        if let Some(Value::Integer(row_pk)) = row.get(&data.spec.pk_column) {
            if *row_pk != pk {
                return Err(StoreError::InvalidRow {
                    table: table.to_string(),
                    message: format!("row pk {} does not match addressed pk {}", row_pk, pk),
                });
            }
        }
        if !data.rows.contains_key(&pk) {
            return Err(StoreError::RowNotFound {
                table: table.to_string(),
                pk,
            });
        }
        StoreState::check_uniques(data, pk, &row)?;
        data.rows.insert(pk, row);
        Ok(())
    }

    fn delete(
        &mut self,
        table: &str,
        pk: i64,
        cascades: bool,
        victims: &mut Vec<CascadeDelete>,
    ) -> StoreResult<()> {
        {
            let data = self.table_mut(table)?;
            if data.rows.remove(&pk).is_none() {
                return Err(StoreError::RowNotFound {
                    table: table.to_string(),
                    pk,
                });
            }
        }
        if !cascades {
            return Ok(());
        }
        // Collect children referencing the deleted row, then recurse.
        let mut children: Vec<(String, i64)> = Vec::new();
        for data in self.tables.values() {
            for fk in data.spec.foreign_keys_to(table) {
                for (child_pk, row) in &data.rows {
                    if row.get(&fk.column) == Some(&Value::Integer(pk)) {
                        children.push((data.spec.name.clone(), *child_pk));
                    }
                }
            }
        }
        for (child_table, child_pk) in children {
            // A sibling cascade may already have removed the child.
            if self.table(&child_table)?.rows.contains_key(&child_pk) {
                victims.push(CascadeDelete {
                    table: child_table.clone(),
                    pk: child_pk,
                });
                self.delete(&child_table, child_pk, true, victims)?;
            }
        }
        Ok(())
    }
}

/// A write transaction over a [`MemoryStore`].
///
/// Works on a shadow copy of the store state; [`MemoryStore::with_tx`]
/// publishes the shadow on success and drops it on error.
#[derive(Debug)]
pub struct MemoryTx {
    state: StoreState,
    cascades: bool,
}

impl StoreRead for MemoryTx {
    fn schema(&self, table: &str) -> StoreResult<&TableSpec> {
        Ok(&self.state.table(table)?.spec)
    }

    fn get(&self, table: &str, pk: i64) -> StoreResult<Option<Row>> {
        self.state.get(table, pk)
    }

    fn scan(&self, table: &str) -> StoreResult<Vec<Row>> {
        Ok(self.state.table(table)?.rows.values().cloned().collect())
    }

    fn find_by(&self, table: &str, criteria: &[(&str, &Value)]) -> StoreResult<Option<Row>> {
        self.state.find_by(table, criteria)
    }

    fn max_pk(&self, table: &str) -> StoreResult<Option<i64>> {
        Ok(self.state.table(table)?.rows.keys().next_back().copied())
    }

    fn count(&self, table: &str) -> StoreResult<usize> {
        Ok(self.state.table(table)?.rows.len())
    }
}

impl StoreTx for MemoryTx {
    fn insert(&mut self, table: &str, row: Row) -> StoreResult<i64> {
        self.state.insert(table, row)
    }

    fn update(&mut self, table: &str, pk: i64, row: Row) -> StoreResult<()> {
        self.state.update(table, pk, row)
    }

    fn upsert(&mut self, table: &str, row: Row) -> StoreResult<i64> {
        let spec = self.state.table(table)?.spec.clone();
        let pk = StoreState::row_pk(&spec, &row)?;
        if self.state.table(table)?.rows.contains_key(&pk) {
            self.state.update(table, pk, row)?;
        } else {
            self.state.insert(table, row)?;
        }
        Ok(pk)
    }

    fn delete(&mut self, table: &str, pk: i64) -> StoreResult<Vec<CascadeDelete>> {
        let mut victims = Vec::new();
        self.state.delete(table, pk, self.cascades, &mut victims)?;
        Ok(victims)
    }

    fn clear(&mut self, table: &str) -> StoreResult<()> {
        self.state.table_mut(table)?.rows.clear();
        Ok(())
    }

    fn set_cascades(&mut self, enabled: bool) {
        self.cascades = enabled;
    }

    fn cascades(&self) -> bool {
        self.cascades
    }
}

struct MemoryView<'a> {
    state: &'a StoreState,
}

impl StoreRead for MemoryView<'_> {
    fn schema(&self, table: &str) -> StoreResult<&TableSpec> {
        Ok(&self.state.table(table)?.spec)
    }

    fn get(&self, table: &str, pk: i64) -> StoreResult<Option<Row>> {
        self.state.get(table, pk)
    }

    fn scan(&self, table: &str) -> StoreResult<Vec<Row>> {
        Ok(self.state.table(table)?.rows.values().cloned().collect())
    }

    fn find_by(&self, table: &str, criteria: &[(&str, &Value)]) -> StoreResult<Option<Row>> {
        self.state.find_by(table, criteria)
    }

    fn max_pk(&self, table: &str) -> StoreResult<Option<i64>> {
        Ok(self.state.table(table)?.rows.keys().next_back().copied())
    }

    fn count(&self, table: &str) -> StoreResult<usize> {
        Ok(self.state.table(table)?.rows.len())
    }
}

/// An in-memory relational store.
///
/// Suitable for tests, tooling and ephemeral nodes. Transactions clone the
/// full state; commit swaps the clone in under the store's write lock, so
/// an `Err` from the transaction closure rolls everything back.
///
/// # Thread Safety
///
/// The store is thread-safe. A write transaction holds the write lock for
/// its duration, giving single-writer semantics; reads run concurrently
/// with each other.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<StoreState>,
}

impl MemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RelationalStore for MemoryStore {
    type Tx = MemoryTx;

    fn create_table(&self, spec: TableSpec) -> StoreResult<()> {
        let mut state = self.inner.write();
        if let Some(existing) = state.tables.get(&spec.name) {
            if existing.spec == spec {
                return Ok(());
            }
            return Err(StoreError::SchemaMismatch { table: spec.name });
        }
        state.tables.insert(
            spec.name.clone(),
            TableData {
                spec,
                rows: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn has_table(&self, name: &str) -> bool {
        self.inner.read().tables.contains_key(name)
    }

    fn table(&self, name: &str) -> Option<TableSpec> {
        self.inner.read().tables.get(name).map(|t| t.spec.clone())
    }

    fn with_tx<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Self::Tx) -> Result<R, E>,
        E: From<StoreError>,
    {
        let mut guard = self.inner.write();
        let mut tx = MemoryTx {
            state: guard.clone(),
            cascades: true,
        };
        let result = f(&mut tx)?;
        *guard = tx.state;
        Ok(result)
    }

    fn with_read<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&dyn StoreRead) -> Result<R, E>,
        E: From<StoreError>,
    {
        let guard = self.inner.read();
        let view = MemoryView { state: &guard };
        f(&view)
    }
}
