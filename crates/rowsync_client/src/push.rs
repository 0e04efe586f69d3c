//! Push: compact the journal, build the signed envelope, send it.

use crate::error::{ClientError, ClientResult};
use crate::register;
use crate::transport::Transport;
use rowsync_core::{journal, Advisory, Context, Payloads, PushMessage, Registry, VersionId};
use rowsync_store::{RelationalStore, StoreTx};
use tracing::{debug, info};

/// Outcome of a push attempt.
#[derive(Debug, Clone)]
pub struct PushReport {
    /// Number of operations accepted by the server.
    pub pushed: usize,
    /// The server version after this push.
    pub latest_version: VersionId,
    /// Compression advisories surfaced while building the message.
    pub advisories: Vec<Advisory>,
}

/// Builds the push envelope from the compacted journal.
///
/// Returns `None` when there is nothing to push. An insert/update whose
/// row cannot be read at this point is an error; compaction has already
/// dropped (and reported) rows that legitimately disappeared.
fn build_message<T: StoreTx>(
    tx: &mut T,
    registry: &Registry,
    node: &register::NodeState,
) -> ClientResult<(Option<PushMessage>, Vec<Advisory>)> {
    let advisories = journal::compact(tx, registry)?;
    let operations = journal::unversioned(tx)?;
    if operations.is_empty() {
        return Ok((None, advisories));
    }

    let mut payloads = Payloads::new();
    for op in &operations {
        if op.kind.is_delete() {
            continue;
        }
        let reference = op.reference();
        let row = tx
            .get(&op.content_type, op.row_pk)?
            .ok_or_else(|| ClientError::MissingLocalRow {
                reference: reference.clone(),
            })?;
        payloads.insert(reference, row);
    }

    let mut message = PushMessage {
        node_id: node.node_id,
        last_known_version: node.last_known_version,
        operations,
        payloads,
        signature: None,
        extra_data: None,
    };
    message.sign(&node.secret)?;
    Ok((Some(message), advisories))
}

/// Pushes the client's unversioned operations to the server.
///
/// On acceptance the pushed journal entries are removed and
/// `last_known_version` advances to the newly assigned version. A
/// [`ClientError::PushRejected`] means the client is behind and must pull
/// first.
pub fn push<S: RelationalStore, T: Transport>(
    ctx: &Context<S>,
    transport: &T,
) -> ClientResult<PushReport> {
    let registry = ctx.registry();
    let (node, message, advisories) = ctx.with_untracked_transaction(|tx| {
        let node = register::require_node(tx)?;
        let (message, advisories) = build_message(tx, registry, &node)?;
        Ok::<_, ClientError>((node, message, advisories))
    })?;

    let Some(message) = message else {
        debug!("nothing to push");
        return Ok(PushReport {
            pushed: 0,
            latest_version: node.last_known_version,
            advisories,
        });
    };

    let reply = transport.push(&message)?;

    let orders: Vec<i64> = message.operations.iter().map(|op| op.order).collect();
    ctx.with_untracked_transaction(|tx| {
        journal::drop_orders(tx, &orders)?;
        register::set_last_known_version(tx, reply.latest_version)
    })?;

    info!(
        operations = orders.len(),
        version = reply.latest_version,
        "push accepted"
    );
    Ok(PushReport {
        pushed: orders.len(),
        latest_version: reply.latest_version,
        advisories,
    })
}
