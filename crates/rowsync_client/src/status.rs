//! Reporting of pending local changes.

use crate::error::ClientResult;
use rowsync_core::{journal, Context, OpKind, Ref};
use rowsync_store::RelationalStore;

/// Returns the unsynchronized changes of the tracked database as
/// `(Ref, OpKind)` pairs, one per row, after compacting the journal.
///
/// For a delete the row is no longer present in the store.
pub fn unsynchronized_changes<S: RelationalStore>(
    ctx: &Context<S>,
) -> ClientResult<Vec<(Ref, OpKind)>> {
    let registry = ctx.registry();
    ctx.with_untracked_transaction(|tx| {
        journal::compact(tx, registry)?;
        let ops = journal::unversioned(tx)?;
        Ok(ops.iter().map(|op| (op.reference(), op.kind)).collect())
    })
}
