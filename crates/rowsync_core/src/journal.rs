//! The operations journal.
//!
//! The journal is an append-only log of operations persisted in the
//! `sync_operations` system table. It is written inside the same store
//! transaction as the mutation it records, so a rolled-back transaction
//! leaves no journal entry behind. The journal is the sole truth of what
//! changed; it never stores column values.

use crate::compression::{compress_local, Advisory};
use crate::error::{CoreError, CoreResult};
use crate::operation::{OpKind, Operation, Ref};
use crate::registry::Registry;
use crate::version::VersionId;
use rowsync_store::{ColumnType, Row, StoreRead, StoreTx, TableSpec, Value};
use tracing::warn;

/// System table holding the journal.
pub const OPERATIONS_TABLE: &str = "sync_operations";

/// Table description for the journal.
pub fn table_spec() -> TableSpec {
    TableSpec::new(OPERATIONS_TABLE, "order")
        .with_column("kind", ColumnType::Text)
        .with_column("content_type", ColumnType::Text)
        .with_column("row_pk", ColumnType::Integer)
        .with_column("version_id", ColumnType::Integer)
}

fn to_row(op: &Operation) -> Row {
    let mut row = Row::new();
    row.insert("order".into(), Value::Integer(op.order));
    row.insert("kind".into(), Value::Text(op.kind.code().to_string()));
    row.insert(
        "content_type".into(),
        Value::Text(op.content_type.clone()),
    );
    row.insert("row_pk".into(), Value::Integer(op.row_pk));
    row.insert(
        "version_id".into(),
        op.version.map(Value::Integer).unwrap_or(Value::Null),
    );
    row
}

fn from_row(row: &Row) -> CoreResult<Operation> {
    let corrupt = |message: &str| CoreError::CorruptSystemRow {
        table: OPERATIONS_TABLE.to_string(),
        message: message.to_string(),
    };
    let order = row
        .get("order")
        .and_then(Value::as_integer)
        .ok_or_else(|| corrupt("missing order"))?;
    let kind = row
        .get("kind")
        .and_then(Value::as_text)
        .and_then(OpKind::from_code)
        .ok_or_else(|| corrupt("bad kind"))?;
    let content_type = row
        .get("content_type")
        .and_then(Value::as_text)
        .ok_or_else(|| corrupt("missing content_type"))?
        .to_string();
    let row_pk = row
        .get("row_pk")
        .and_then(Value::as_integer)
        .ok_or_else(|| corrupt("missing row_pk"))?;
    let version = row.get("version_id").and_then(Value::as_integer);
    Ok(Operation {
        order,
        kind,
        content_type,
        row_pk,
        version,
    })
}

/// Appends an operation to the journal, assigning the next order index.
pub fn append<T: StoreTx>(
    tx: &mut T,
    kind: OpKind,
    reference: &Ref,
    version: Option<VersionId>,
) -> CoreResult<Operation> {
    let order = tx.max_pk(OPERATIONS_TABLE)?.unwrap_or(0) + 1;
    let op = Operation {
        order,
        kind,
        content_type: reference.content_type.clone(),
        row_pk: reference.pk,
        version,
    };
    tx.insert(OPERATIONS_TABLE, to_row(&op))?;
    Ok(op)
}

/// Returns all journal entries, ordered by append index.
pub fn all<R: StoreRead + ?Sized>(view: &R) -> CoreResult<Vec<Operation>> {
    view.scan(OPERATIONS_TABLE)?
        .iter()
        .map(from_row)
        .collect()
}

/// Returns the unversioned (not yet pushed) entries, ordered by append
/// index.
pub fn unversioned<R: StoreRead + ?Sized>(view: &R) -> CoreResult<Vec<Operation>> {
    Ok(all(view)?
        .into_iter()
        .filter(|op| op.version.is_none())
        .collect())
}

/// Returns the versioned entries with version greater than `version`,
/// ordered by ascending version then append index.
pub fn since<R: StoreRead + ?Sized>(
    view: &R,
    version: VersionId,
) -> CoreResult<Vec<Operation>> {
    let mut ops: Vec<Operation> = all(view)?
        .into_iter()
        .filter(|op| op.version.is_some_and(|v| v > version))
        .collect();
    ops.sort_by_key(|op| (op.version, op.order));
    Ok(ops)
}

/// Removes the entries with the given order indexes.
pub fn drop_orders<T: StoreTx>(tx: &mut T, orders: &[i64]) -> CoreResult<()> {
    for order in orders {
        tx.delete(OPERATIONS_TABLE, *order)?;
    }
    Ok(())
}

/// Removes every journal entry.
pub fn clear<T: StoreTx>(tx: &mut T) -> CoreResult<()> {
    tx.clear(OPERATIONS_TABLE)?;
    Ok(())
}

/// Removes all versioned entries, freeing space in the synchronization
/// tables. Unversioned entries are untouched.
pub fn trim<T: StoreTx>(tx: &mut T) -> CoreResult<()> {
    let versioned: Vec<i64> = all(tx)?
        .into_iter()
        .filter(|op| op.version.is_some())
        .map(|op| op.order)
        .collect();
    drop_orders(tx, &versioned)
}

/// Compacts the unversioned journal in place.
///
/// Applies the local compression grammar and deletes the superseded
/// entries. Insert/update entries whose backing row can no longer be read
/// are dropped as well. Both cases surface advisories; neither is fatal.
pub fn compact<T: StoreTx>(tx: &mut T, registry: &Registry) -> CoreResult<Vec<Advisory>> {
    let ops = unversioned(tx)?;
    let (kept, mut advisories) = compress_local(&ops);

    let surviving: Vec<i64> = kept.iter().map(|op| op.order).collect();
    let superseded: Vec<i64> = ops
        .iter()
        .map(|op| op.order)
        .filter(|order| !surviving.contains(order))
        .collect();
    drop_orders(tx, &superseded)?;

    // Drop surviving inserts/updates that lost their backing row. The
    // journal entry is useless without it and would poison the next push.
    for op in &kept {
        if op.kind.is_delete() {
            continue;
        }
        if !registry.contains(&op.content_type) {
            warn!(content_type = %op.content_type, "journal entry for untracked content type");
            continue;
        }
        if tx.get(&op.content_type, op.row_pk)?.is_none() {
            let advisory = Advisory::MissingBackingRow {
                reference: op.reference(),
                kind: op.kind,
            };
            warn!("{}", advisory);
            advisories.push(advisory);
            tx.delete(OPERATIONS_TABLE, op.order)?;
        }
    }

    for advisory in &advisories {
        if let Advisory::InconsistentSequence { .. } = advisory {
            warn!("{}", advisory);
        }
    }

    Ok(advisories)
}
