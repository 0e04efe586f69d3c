//! Version ledger.
//!
//! Versions are server-assigned, strictly increasing identifiers attached
//! to accepted pushes. The ledger is persisted in the `sync_versions`
//! system table; `0` means "no version yet".

use crate::error::CoreResult;
use rowsync_store::{ColumnType, Row, StoreRead, StoreTx, TableSpec, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// A version identifier. `0` means no version has been seen.
pub type VersionId = i64;

/// System table holding the version ledger.
pub const VERSIONS_TABLE: &str = "sync_versions";

/// A ledger entry: one accepted push (or one server-local operation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// Version identifier.
    pub id: VersionId,
    /// Creation timestamp, Unix millis.
    pub created: i64,
    /// Node that pushed this version, if any.
    pub node_id: Option<i64>,
}

/// Table description for the version ledger.
pub fn table_spec() -> TableSpec {
    TableSpec::new(VERSIONS_TABLE, "version_id")
        .with_column("created", ColumnType::Integer)
        .with_column("node_id", ColumnType::Integer)
}

/// Current wall-clock time as Unix millis.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Returns the latest version id in the ledger, or `0` if empty.
pub fn latest<R: StoreRead + ?Sized>(view: &R) -> CoreResult<VersionId> {
    Ok(view.max_pk(VERSIONS_TABLE)?.unwrap_or(0))
}

/// Records a ledger entry.
pub fn record<T: StoreTx>(tx: &mut T, version: &Version) -> CoreResult<()> {
    let mut row = Row::new();
    row.insert("version_id".into(), Value::Integer(version.id));
    row.insert("created".into(), Value::Integer(version.created));
    row.insert(
        "node_id".into(),
        version.node_id.map(Value::Integer).unwrap_or(Value::Null),
    );
    tx.insert(VERSIONS_TABLE, row)?;
    Ok(())
}

/// Removes all ledger entries but the latest. Used when trimming the
/// synchronization tables.
pub fn prune<T: StoreTx>(tx: &mut T) -> CoreResult<()> {
    let last = latest(tx)?;
    let stale: Vec<i64> = tx
        .scan(VERSIONS_TABLE)?
        .iter()
        .filter_map(|row| row.get("version_id").and_then(Value::as_integer))
        .filter(|id| *id != last)
        .collect();
    for id in stale {
        tx.delete(VERSIONS_TABLE, id)?;
    }
    Ok(())
}
