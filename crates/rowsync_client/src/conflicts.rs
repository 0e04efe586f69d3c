//! Conflict detection for the local merge.
//!
//! Given the compressed local and remote operation sets, four pairwise
//! conflict classes exist:
//!
//! - **direct**: update/delete on both sides of the same row
//! - **dependency**: a remote delete whose row is referenced by a locally
//!   inserted/updated row (the referring row is fetched from the store)
//! - **reversed dependency**: a remote insert/update whose row (fetched
//!   from the message) references a locally deleted row
//! - **insert collision**: both sides inserted the same primary key
//!
//! A `fetch` required for a non-delete that fails is fatal: it means the
//! journal and the store have drifted apart.

use crate::error::{ClientError, ClientResult, UniqueConflictEntry};
use rowsync_core::{OpKind, Operation, PullMessage, Ref, Registry};
use rowsync_store::{StoreTx, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Pairwise conflicts between remote and local operations, as index pairs
/// into the two compressed operation slices.
#[derive(Debug, Default)]
pub(crate) struct ConflictIndex {
    direct: Vec<(usize, usize)>,
    dependency: Vec<(usize, usize)>,
    reversed: Vec<(usize, usize)>,
    insert: Vec<(usize, usize)>,
}

impl ConflictIndex {
    /// Local partners of a remote operation in the direct set.
    pub fn direct_partners(&self, remote: usize) -> impl Iterator<Item = usize> + '_ {
        self.direct
            .iter()
            .filter(move |(r, _)| *r == remote)
            .map(|(_, l)| *l)
    }

    /// True if the remote delete has locally dependent rows.
    pub fn has_dependents(&self, remote: usize) -> bool {
        self.dependency.iter().any(|(r, _)| *r == remote)
    }

    /// Local delete partners of a remote operation in the reversed
    /// dependency set.
    pub fn reversed_partners(&self, remote: usize) -> impl Iterator<Item = usize> + '_ {
        self.reversed
            .iter()
            .filter(move |(r, _)| *r == remote)
            .map(|(_, l)| *l)
    }

    /// True if the remote insert collides with a local insert.
    pub fn has_insert_collision(&self, remote: usize) -> bool {
        self.insert.iter().any(|(r, _)| *r == remote)
    }
}

fn is_direct_kind(kind: OpKind) -> bool {
    matches!(kind, OpKind::Update | OpKind::Delete)
}

/// Computes the four conflict sets.
pub(crate) fn detect<T: StoreTx>(
    tx: &T,
    registry: &Registry,
    remote: &[Operation],
    local: &[Operation],
    message: &PullMessage,
) -> ClientResult<ConflictIndex> {
    let mut index = ConflictIndex::default();

    for (ri, r) in remote.iter().enumerate() {
        for (li, l) in local.iter().enumerate() {
            if r.reference() != l.reference() {
                continue;
            }
            if is_direct_kind(r.kind) && is_direct_kind(l.kind) {
                index.direct.push((ri, li));
            }
            if r.kind == OpKind::Insert && l.kind == OpKind::Insert {
                index.insert.push((ri, li));
            }
        }
    }

    // Dependency: remote deletes against local inserts/updates whose
    // stored row points at the deleted row.
    for (ri, r) in remote.iter().enumerate() {
        if r.kind != OpKind::Delete {
            continue;
        }
        let target = r.reference();
        for (li, l) in local.iter().enumerate() {
            if l.kind == OpKind::Delete {
                continue;
            }
            let row = tx.get(&l.content_type, l.row_pk)?.ok_or_else(|| {
                ClientError::MergeFetchFailure {
                    reference: l.reference(),
                }
            })?;
            if registry.row_references(&l.content_type, &row, &target)? {
                index.dependency.push((ri, li));
            }
        }
    }

    // Reversed dependency: local deletes against remote inserts/updates
    // whose message row points at the deleted row.
    for (li, l) in local.iter().enumerate() {
        if l.kind != OpKind::Delete {
            continue;
        }
        let target = l.reference();
        for (ri, r) in remote.iter().enumerate() {
            if r.kind == OpKind::Delete {
                continue;
            }
            let row = message.payloads.get(&r.reference()).ok_or_else(|| {
                ClientError::MergeFetchFailure {
                    reference: r.reference(),
                }
            })?;
            if registry.row_references(&r.content_type, row, &target)? {
                index.reversed.push((ri, li));
            }
        }
    }

    Ok(index)
}

/// One detected step of a unique-constraint swap: applying `remote` would
/// collide with local row `local`, whose own final state is also in the
/// message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapStep {
    /// The incoming row.
    pub remote: Ref,
    /// The local row currently holding the constrained values.
    pub local: Ref,
}

/// Scans remote inserts/updates for unique-constraint conflicts against
/// the local database.
///
/// Returns the solvable swap steps and the unsolvable entries. Constraints
/// are probed in declared order.
pub(crate) fn find_unique_conflicts<T: StoreTx>(
    tx: &T,
    registry: &Registry,
    candidates: &[&Operation],
    message: &PullMessage,
) -> ClientResult<(Vec<SwapStep>, Vec<UniqueConflictEntry>)> {
    let mut steps = Vec::new();
    let mut errors = Vec::new();

    for op in candidates {
        let spec = registry.content_type(&op.content_type)?;
        let remote_ref = op.reference();
        let payload = message.payloads.get(&remote_ref).ok_or_else(|| {
            ClientError::MergeFetchFailure {
                reference: remote_ref.clone(),
            }
        })?;

        for constraint in &spec.uniques {
            let values: Vec<&Value> = constraint
                .columns
                .iter()
                .map(|col| payload.get(col).unwrap_or(&Value::Null))
                .collect();
            if values.iter().any(|v| v.is_null()) {
                continue;
            }
            let criteria: Vec<(&str, &Value)> = constraint
                .columns
                .iter()
                .map(String::as_str)
                .zip(values.iter().copied())
                .collect();
            let Some(local_row) = tx.find_by(&op.content_type, &criteria)? else {
                continue;
            };
            let local_pk = registry.row_pk(&op.content_type, &local_row)?;
            if local_pk == op.row_pk {
                continue;
            }
            let local_ref = Ref::new(op.content_type.clone(), local_pk);
            match message.payloads.get(&local_ref) {
                Some(final_row) => {
                    let moved = constraint
                        .columns
                        .iter()
                        .any(|col| final_row.get(col) != local_row.get(col));
                    if moved {
                        steps.push(SwapStep {
                            remote: remote_ref.clone(),
                            local: local_ref,
                        });
                    }
                }
                None => errors.push(UniqueConflictEntry {
                    content_type: op.content_type.clone(),
                    pk: local_pk,
                    columns: constraint.columns.clone(),
                }),
            }
        }
    }

    Ok((steps, errors))
}

/// Union-find over refs; swap steps sharing a row belong to the same
/// multi-step swap.
#[derive(Debug, Default)]
struct UnionFind {
    parent: BTreeMap<Ref, Ref>,
}

impl UnionFind {
    fn find(&mut self, reference: &Ref) -> Ref {
        match self.parent.get(reference).cloned() {
            None => {
                self.parent.insert(reference.clone(), reference.clone());
                reference.clone()
            }
            Some(parent) if parent == *reference => parent,
            Some(parent) => {
                let root = self.find(&parent);
                self.parent.insert(reference.clone(), root.clone());
                root
            }
        }
    }

    fn union(&mut self, a: &Ref, b: &Ref) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            self.parent.insert(root_a, root_b);
        }
    }
}

/// Groups swap steps into connected components of refs.
pub(crate) fn swap_components(steps: &[SwapStep]) -> Vec<BTreeSet<Ref>> {
    let mut uf = UnionFind::default();
    for step in steps {
        uf.union(&step.remote, &step.local);
    }
    let mut components: BTreeMap<Ref, BTreeSet<Ref>> = BTreeMap::new();
    for step in steps {
        for reference in [&step.remote, &step.local] {
            let root = uf.find(reference);
            components
                .entry(root)
                .or_default()
                .insert(reference.clone());
        }
    }
    components.into_values().collect()
}
