//! Pull and the merge engine.
//!
//! The merge consumes a pull message inside a single untracked store
//! transaction: compress both sides, detect identity conflicts, apply the
//! remote operations in order under the fixed resolution policy, resolve
//! unique-constraint swaps, then advance `last_known_version`. Any failure
//! rolls the whole transaction back, leaving journal and version state
//! untouched.
//!
//! The fixed policy:
//!
//! 1. delete vs non-delete: the delete loses; the deleted row is
//!    reinserted from the complementary container and the delete is
//!    neutralized
//! 2. update vs update: local wins, the remote update is discarded
//! 3. insert vs insert: keep both; the incoming row is rewritten to a
//!    fresh primary key
//! 4. delete vs delete: no-op; the local delete entry is dropped

use crate::conflicts::{self, ConflictIndex};
use crate::error::{ClientError, ClientResult, UniqueConflictEntry};
use crate::register;
use crate::transport::Transport;
use rowsync_core::{
    compression, journal, Advisory, Context, OpKind, Operation, PullMessage, PullRequest, Ref,
    Registry, VersionId,
};
use rowsync_store::{RelationalStore, Row, StoreError, StoreTx, Value};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Outcome of a merge.
#[derive(Debug, Clone)]
pub struct MergeReport {
    /// Remote operations applied (including swap-resolved rows).
    pub applied: usize,
    /// Remote operations discarded by the resolution policy.
    pub skipped: usize,
    /// Incoming inserts rewritten to a fresh primary key: `(original
    /// identity, new pk)`.
    pub reallocations: Vec<(Ref, i64)>,
    /// Number of unique-constraint swap components resolved.
    pub swap_components: usize,
    /// Compression advisories surfaced while compacting the journal.
    pub advisories: Vec<Advisory>,
    /// The server version the client advanced to.
    pub latest_version: VersionId,
}

/// How one remote operation will be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Skip,
    Delete,
    Upsert,
    Reallocate,
}

/// Pulls from the server and merges the result.
pub fn pull<S: RelationalStore, T: Transport>(
    ctx: &Context<S>,
    transport: &T,
) -> ClientResult<MergeReport> {
    let node = ctx.with_read(|view| register::require_node(view))?;
    let request = PullRequest {
        node_id: node.node_id,
        last_known_version: node.last_known_version,
        extra_data: None,
    };
    let message = transport.pull(&request)?;
    merge(ctx, &message)
}

/// Merges a pull message into the local database.
pub fn merge<S: RelationalStore>(
    ctx: &Context<S>,
    message: &PullMessage,
) -> ClientResult<MergeReport> {
    let registry = ctx.registry();
    let report = ctx.with_untracked_transaction(|tx| merge_in_tx(tx, registry, message))?;
    info!(
        applied = report.applied,
        skipped = report.skipped,
        version = report.latest_version,
        "merge complete"
    );
    Ok(report)
}

fn merge_in_tx<T: StoreTx>(
    tx: &mut T,
    registry: &Registry,
    message: &PullMessage,
) -> ClientResult<MergeReport> {
    let advisories = journal::compact(tx, registry)?;
    let local_ops = journal::unversioned(tx)?;
    let remote_ops = compression::compress_remote(&message.operations);

    // A message naming an untracked content type is fatal.
    for op in &remote_ops {
        registry.content_type(&op.content_type)?;
    }

    let index = conflicts::detect(tx, registry, &remote_ops, &local_ops, message)?;

    // Resolution pass: decide an action per remote operation, collect the
    // local journal entries neutralized by the policy and the locally
    // deleted parent rows that must be revived from the message.
    let mut neutralized: BTreeSet<i64> = BTreeSet::new();
    let mut revive: BTreeSet<Ref> = BTreeSet::new();
    let mut actions: Vec<Action> = Vec::with_capacity(remote_ops.len());

    for (ri, r) in remote_ops.iter().enumerate() {
        let action = match r.kind {
            OpKind::Delete => {
                let mut deleted_locally = false;
                let mut kept_locally = false;
                for li in index.direct_partners(ri) {
                    match local_ops[li].kind {
                        // delete vs delete: the row is gone on both sides;
                        // drop the local entry, the server already knows.
                        OpKind::Delete => {
                            deleted_locally = true;
                            neutralized.insert(local_ops[li].order);
                        }
                        _ => kept_locally = true,
                    }
                }
                if index.has_dependents(ri) {
                    kept_locally = true;
                }
                if kept_locally {
                    // Delete vs non-delete with a remote delete: nullify it.
                    // The row is still in the store, so the synthesized
                    // re-insert is a no-op.
                    Action::Skip
                } else if deleted_locally {
                    Action::Skip
                } else {
                    Action::Delete
                }
            }
            OpKind::Insert => {
                if index.has_insert_collision(ri) {
                    Action::Reallocate
                } else {
                    plan_revivals(ri, &index, &local_ops, &mut neutralized, &mut revive);
                    Action::Upsert
                }
            }
            OpKind::Update => {
                let mut local_wins = false;
                for li in index.direct_partners(ri) {
                    match local_ops[li].kind {
                        // update vs update: local wins.
                        OpKind::Update => local_wins = true,
                        // update vs local delete: revert the delete; the
                        // upsert below restores the row from the message.
                        OpKind::Delete => {
                            neutralized.insert(local_ops[li].order);
                        }
                        OpKind::Insert => {}
                    }
                }
                if local_wins {
                    Action::Skip
                } else {
                    plan_revivals(ri, &index, &local_ops, &mut neutralized, &mut revive);
                    Action::Upsert
                }
            }
        };
        actions.push(action);
    }

    // Unique-constraint scan over the operations that will be applied.
    let candidates: Vec<&Operation> = remote_ops
        .iter()
        .zip(&actions)
        .filter(|(op, action)| {
            !op.kind.is_delete() && matches!(action, Action::Upsert | Action::Reallocate)
        })
        .map(|(op, _)| op)
        .collect();
    let (steps, errors) = conflicts::find_unique_conflicts(tx, registry, &candidates, message)?;
    if !errors.is_empty() {
        return Err(ClientError::UniqueConstraint { entries: errors });
    }
    let components = conflicts::swap_components(&steps);
    let swap_refs: BTreeSet<Ref> = components.iter().flatten().cloned().collect();

    // Revive locally deleted rows the remote operations depend on.
    for reference in &revive {
        if tx.get(&reference.content_type, reference.pk)?.is_some() {
            continue;
        }
        let row = fetch_payload(message, reference)?;
        checked_upsert(tx, reference, row)?;
    }

    // Apply the remote operations in their ordered sequence.
    let mut applied = 0usize;
    let mut skipped = 0usize;
    let mut reallocations: Vec<(Ref, i64)> = Vec::new();

    for (r, action) in remote_ops.iter().zip(&actions) {
        let reference = r.reference();
        match action {
            Action::Skip => {
                debug!(%reference, kind = %r.kind, "remote operation discarded");
                skipped += 1;
            }
            Action::Delete => {
                if tx.get(&r.content_type, r.row_pk)?.is_some() {
                    tx.delete(&r.content_type, r.row_pk)?;
                }
                applied += 1;
            }
            Action::Upsert => {
                if swap_refs.contains(&reference) {
                    // Applied below as part of its swap component.
                    continue;
                }
                let row = fetch_payload(message, &reference)?;
                checked_upsert(tx, &reference, row)?;
                applied += 1;
            }
            Action::Reallocate => {
                let spec = registry.content_type(&r.content_type)?;
                let new_pk = tx.max_pk(&r.content_type)?.unwrap_or(0) + 1;
                let mut row = fetch_payload(message, &reference)?;
                row.insert(spec.pk_column.clone(), Value::Integer(new_pk));
                tx.insert(&r.content_type, row)
                    .map_err(unique_as_conflict)?;
                debug!(%reference, new_pk, "insert collision: incoming row reallocated");
                reallocations.push((reference, new_pk));
                applied += 1;
            }
        }
    }

    // Resolve swap components: with cascades disabled, delete every
    // involved row and reinsert the final states from the message.
    for component in &components {
        tx.set_cascades(false);
        for reference in component {
            if tx.get(&reference.content_type, reference.pk)?.is_some() {
                tx.delete(&reference.content_type, reference.pk)?;
            }
        }
        for reference in component {
            let row = fetch_payload(message, reference)?;
            tx.insert(&reference.content_type, row)
                .map_err(unique_as_conflict)?;
            applied += 1;
        }
        tx.set_cascades(true);
    }

    journal::drop_orders(tx, &neutralized.iter().copied().collect::<Vec<_>>())?;
    register::set_last_known_version(tx, message.latest_version)?;

    Ok(MergeReport {
        applied,
        skipped,
        reallocations,
        swap_components: components.len(),
        advisories,
        latest_version: message.latest_version,
    })
}

/// Records the reversed-dependency partners of a remote operation: each is
/// a local delete of a row the remote row points at. The delete entry is
/// removed and the row revived from the message.
fn plan_revivals(
    ri: usize,
    index: &ConflictIndex,
    local_ops: &[Operation],
    neutralized: &mut BTreeSet<i64>,
    revive: &mut BTreeSet<Ref>,
) {
    for li in index.reversed_partners(ri) {
        neutralized.insert(local_ops[li].order);
        revive.insert(local_ops[li].reference());
    }
}

fn fetch_payload(message: &PullMessage, reference: &Ref) -> ClientResult<Row> {
    message
        .payloads
        .get(reference)
        .cloned()
        .ok_or_else(|| ClientError::MergeFetchFailure {
            reference: reference.clone(),
        })
}

fn checked_upsert<T: StoreTx>(tx: &mut T, reference: &Ref, row: Row) -> ClientResult<()> {
    tx.upsert(&reference.content_type, row)
        .map_err(unique_as_conflict)?;
    Ok(())
}

/// A unique violation while applying remote state is an unsolvable
/// conflict the user must resolve, not a plain store error.
fn unique_as_conflict(err: StoreError) -> ClientError {
    match err {
        StoreError::UniqueViolation { table, pk, columns } => ClientError::UniqueConstraint {
            entries: vec![UniqueConflictEntry {
                content_type: table,
                pk,
                columns,
            }],
        },
        other => ClientError::Store(other),
    }
}
