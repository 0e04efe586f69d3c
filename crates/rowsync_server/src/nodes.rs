//! Server-side node registry.
//!
//! One row per registered node in the `sync_nodes` system table:
//! `{node_id, secret, registered}`. Secrets sign pushes; issuing fresh
//! credentials is always allowed.

use crate::error::{ServerError, ServerResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;
use rowsync_core::{version, RegisterReply, NODES_TABLE};
use rowsync_store::{Row, StoreRead, StoreTx, Value};

fn random_secret(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    BASE64.encode(buf)
}

/// Issues fresh credentials and records the node.
pub(crate) fn issue<T: StoreTx>(tx: &mut T, secret_bytes: usize) -> ServerResult<RegisterReply> {
    let node_id = tx.max_pk(NODES_TABLE)?.unwrap_or(0) + 1;
    let secret = random_secret(secret_bytes);

    let mut row = Row::new();
    row.insert("node_id".into(), Value::Integer(node_id));
    row.insert("secret".into(), Value::Text(secret.clone()));
    row.insert(
        "registered".into(),
        Value::Integer(version::now_millis()),
    );
    row.insert("last_known_version".into(), Value::Null);
    tx.insert(NODES_TABLE, row)?;

    Ok(RegisterReply { node_id, secret })
}

/// Looks up the secret of a registered node.
pub(crate) fn secret_of<R: StoreRead + ?Sized>(view: &R, node_id: i64) -> ServerResult<String> {
    let row = view
        .get(NODES_TABLE, node_id)?
        .ok_or(ServerError::UnknownNode { node_id })?;
    row.get("secret")
        .and_then(Value::as_text)
        .map(str::to_string)
        .ok_or_else(|| ServerError::Internal(format!("node {node_id} row has no secret")))
}
