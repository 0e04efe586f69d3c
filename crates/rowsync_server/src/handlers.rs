//! Request handlers for the sync procedures.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::nodes;
use rowsync_core::{
    compression, journal, version, Context, OpKind, Operation, Payloads, PullMessage,
    PullRequest, PushMessage, PushReply, RegisterReply, SnapshotMessage, Version,
};
use rowsync_store::{RelationalStore, StoreError, StoreRead, StoreTx};
use tracing::{debug, info};

/// Issues fresh node credentials.
pub(crate) fn handle_register<S: RelationalStore>(
    ctx: &Context<S>,
    config: &ServerConfig,
) -> ServerResult<RegisterReply> {
    let reply =
        ctx.with_untracked_transaction(|tx| nodes::issue(tx, config.secret_bytes))?;
    info!(node_id = reply.node_id, "node registered");
    Ok(reply)
}

fn integrity(op: &Operation, err: StoreError) -> ServerError {
    match err {
        StoreError::UnknownTable { .. } => ServerError::InvalidRequest(err.to_string()),
        other => ServerError::Integrity {
            content_type: op.content_type.clone(),
            pk: op.row_pk,
            detail: other.to_string(),
        },
    }
}

/// Validates and applies a push.
///
/// The caller serializes invocations; version assignment must be serial.
/// Within a single store transaction: the divergence gate, the application
/// of every operation in message order, the journal entries tagged with
/// the one new version, and the ledger row. Any failure aborts the whole
/// transaction.
pub(crate) fn handle_push<S: RelationalStore>(
    ctx: &Context<S>,
    config: &ServerConfig,
    message: &PushMessage,
) -> ServerResult<PushReply> {
    let secret = ctx.with_read(|view| nodes::secret_of(view, message.node_id))?;
    if !message.verify(&secret)? {
        return Err(ServerError::Auth(format!(
            "bad signature from node {}",
            message.node_id
        )));
    }
    if message.operations.is_empty() {
        return Err(ServerError::InvalidRequest("empty push".into()));
    }
    if message.operations.len() > config.max_push_operations {
        return Err(ServerError::InvalidRequest(format!(
            "push of {} operations exceeds the limit of {}",
            message.operations.len(),
            config.max_push_operations
        )));
    }

    let registry = ctx.registry();
    let reply = ctx.with_untracked_transaction(|tx| {
        let latest = version::latest(tx)?;
        if message.last_known_version < latest {
            return Err(ServerError::PushRejected {
                client_version: message.last_known_version,
                latest_version: latest,
            });
        }

        let id = latest + 1;
        for op in &message.operations {
            registry
                .content_type(&op.content_type)
                .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
            let reference = op.reference();
            match op.kind {
                OpKind::Insert => {
                    let row = message.payloads.get(&reference).ok_or_else(|| {
                        ServerError::InvalidRequest(format!("missing payload for {reference}"))
                    })?;
                    tx.insert(&op.content_type, row.clone())
                        .map_err(|e| integrity(op, e))?;
                }
                OpKind::Update => {
                    let row = message.payloads.get(&reference).ok_or_else(|| {
                        ServerError::InvalidRequest(format!("missing payload for {reference}"))
                    })?;
                    tx.update(&op.content_type, op.row_pk, row.clone())
                        .map_err(|e| integrity(op, e))?;
                }
                OpKind::Delete => {
                    tx.delete(&op.content_type, op.row_pk)
                        .map_err(|e| integrity(op, e))?;
                }
            }
            journal::append(tx, op.kind, &reference, Some(id))?;
        }

        version::record(
            tx,
            &Version {
                id,
                created: version::now_millis(),
                node_id: Some(message.node_id),
            },
        )?;
        Ok(PushReply { latest_version: id })
    })?;

    info!(
        node_id = message.node_id,
        operations = message.operations.len(),
        version = reply.latest_version,
        "push accepted"
    );
    Ok(reply)
}

/// Builds the pull message for a client position.
///
/// Read-only and idempotent. The server journal since the client's version
/// is compressed with the remote rules; row payloads are attached for
/// every insert/update, plus one level of foreign-key parent rows the
/// client merge may need for conflict resolution.
pub(crate) fn handle_pull<S: RelationalStore>(
    ctx: &Context<S>,
    request: &PullRequest,
) -> ServerResult<PullMessage> {
    // The node must exist; pulls are otherwise unauthenticated.
    ctx.with_read(|view| nodes::secret_of(view, request.node_id))?;

    let registry = ctx.registry();
    ctx.with_read(|view| {
        let latest = version::latest(view)?;
        let since = journal::since(view, request.last_known_version)?;
        let operations = compression::compress_remote(&since);

        let mut payloads = Payloads::new();
        for op in &operations {
            if op.kind.is_delete() {
                continue;
            }
            let row = view.get(&op.content_type, op.row_pk)?.ok_or_else(|| {
                ServerError::Internal(format!(
                    "journal entry for {} has no backing row",
                    op.reference()
                ))
            })?;
            payloads.insert(op.reference(), row);
        }

        // Parents of the shipped rows, for delete-vs-insert resolution on
        // the client. Rows already shipped for an operation are not
        // parents.
        let mut included_parents = Vec::new();
        let shipped: Vec<_> = operations
            .iter()
            .filter(|op| !op.kind.is_delete())
            .map(Operation::reference)
            .collect();
        for reference in &shipped {
            let row = payloads
                .get(reference)
                .cloned()
                .unwrap_or_default();
            for parent in registry.references_of(&reference.content_type, &row)? {
                if shipped.contains(&parent) || payloads.contains(&parent) {
                    continue;
                }
                if let Some(parent_row) = view.get(&parent.content_type, parent.pk)? {
                    payloads.insert(parent.clone(), parent_row);
                    included_parents.push(parent);
                }
            }
        }

        debug!(
            node_id = request.node_id,
            operations = operations.len(),
            parents = included_parents.len(),
            "pull message built"
        );
        Ok(PullMessage {
            latest_version: latest,
            operations,
            payloads,
            included_parents,
        })
    })
}

/// Builds a full snapshot of the tracked tables.
pub(crate) fn handle_repair<S: RelationalStore>(
    ctx: &Context<S>,
) -> ServerResult<SnapshotMessage> {
    let registry = ctx.registry();
    ctx.with_read(|view| {
        let latest = version::latest(view)?;
        let mut payloads = Payloads::new();
        for spec in registry.tracked() {
            for row in view.scan(&spec.name)? {
                let reference = registry.row_ref(&spec.name, &row)?;
                payloads.insert(reference, row);
            }
        }
        Ok(SnapshotMessage {
            latest_version: latest,
            payloads,
        })
    })
}

/// Application-defined remote read: all rows of one tracked content type.
pub(crate) fn handle_query<S: RelationalStore>(
    ctx: &Context<S>,
    content_type: &str,
) -> ServerResult<Payloads> {
    let registry = ctx.registry();
    registry
        .content_type(content_type)
        .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
    ctx.with_read(|view| {
        let mut payloads = Payloads::new();
        for row in view.scan(content_type)? {
            let reference = registry.row_ref(content_type, &row)?;
            payloads.insert(reference, row);
        }
        Ok(payloads)
    })
}
