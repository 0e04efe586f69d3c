//! Node registration and local credential storage.
//!
//! The client keeps a single row in the `sync_nodes` system table:
//! `{node_id, secret, registered, last_known_version}`. That row is the
//! client's version ledger; `last_known_version` only moves forward,
//! except when `repair` resets it.

use crate::error::{ClientError, ClientResult};
use crate::transport::Transport;
use rowsync_core::{version, Context, RegisterReply, VersionId, NODES_TABLE};
use rowsync_store::{RelationalStore, Row, StoreRead, StoreTx, Value};
use tracing::info;

/// The client's local registration state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeState {
    /// Server-issued node id.
    pub node_id: i64,
    /// Shared secret used to sign pushes.
    pub secret: String,
    /// Registration timestamp, Unix millis.
    pub registered: i64,
    /// Last server version this client has seen.
    pub last_known_version: VersionId,
}

fn to_row(node: &NodeState) -> Row {
    let mut row = Row::new();
    row.insert("node_id".into(), Value::Integer(node.node_id));
    row.insert("secret".into(), Value::Text(node.secret.clone()));
    row.insert("registered".into(), Value::Integer(node.registered));
    row.insert(
        "last_known_version".into(),
        Value::Integer(node.last_known_version),
    );
    row
}

fn from_row(row: &Row) -> Option<NodeState> {
    Some(NodeState {
        node_id: row.get("node_id")?.as_integer()?,
        secret: row.get("secret")?.as_text()?.to_string(),
        registered: row.get("registered").and_then(Value::as_integer)?,
        last_known_version: row
            .get("last_known_version")
            .and_then(Value::as_integer)
            .unwrap_or(0),
    })
}

/// Reads the local registration, if any.
pub(crate) fn current_node<R: StoreRead + ?Sized>(view: &R) -> ClientResult<Option<NodeState>> {
    Ok(view.scan(NODES_TABLE)?.first().and_then(from_row))
}

/// Reads the local registration or fails with [`ClientError::NotRegistered`].
pub(crate) fn require_node<R: StoreRead + ?Sized>(view: &R) -> ClientResult<NodeState> {
    current_node(view)?.ok_or(ClientError::NotRegistered)
}

/// Replaces the local registration row.
pub(crate) fn install_node<T: StoreTx>(tx: &mut T, node: &NodeState) -> ClientResult<()> {
    tx.clear(NODES_TABLE)?;
    tx.insert(NODES_TABLE, to_row(node))?;
    Ok(())
}

/// Advances the locally remembered server version.
pub(crate) fn set_last_known_version<T: StoreTx>(
    tx: &mut T,
    version: VersionId,
) -> ClientResult<()> {
    let mut node = require_node(tx)?;
    node.last_known_version = version;
    tx.update(NODES_TABLE, node.node_id, to_row(&node))?;
    Ok(())
}

/// Returns true if this client holds credentials locally.
pub fn is_registered<S: RelationalStore>(ctx: &Context<S>) -> ClientResult<bool> {
    ctx.with_read(|view| Ok(current_node(view)?.is_some()))
}

/// Requests a node registration from the server and installs the issued
/// credentials.
///
/// Re-registration is allowed; fresh credentials replace the old ones
/// while the remembered server version is preserved.
pub fn register<S: RelationalStore, T: Transport>(
    ctx: &Context<S>,
    transport: &T,
    extra_data: Option<serde_json::Value>,
) -> ClientResult<RegisterReply> {
    let reply = transport.register(extra_data)?;
    ctx.with_untracked_transaction(|tx| {
        let last_known_version = current_node(tx)?
            .map(|node| node.last_known_version)
            .unwrap_or(0);
        install_node(
            tx,
            &NodeState {
                node_id: reply.node_id,
                secret: reply.secret.clone(),
                registered: version::now_millis(),
                last_known_version,
            },
        )
    })?;
    info!(node_id = reply.node_id, "node registered");
    Ok(reply)
}

/// Installs credentials without a server round trip.
pub fn save_node<S: RelationalStore>(
    ctx: &Context<S>,
    node_id: i64,
    secret: impl Into<String>,
) -> ClientResult<()> {
    ctx.with_untracked_transaction(|tx| {
        install_node(
            tx,
            &NodeState {
                node_id,
                secret: secret.into(),
                registered: version::now_millis(),
                last_known_version: 0,
            },
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use rowsync_core::{Registry, Role};
    use rowsync_store::{ColumnType, MemoryStore, TableSpec};

    fn context() -> Context<MemoryStore> {
        let mut registry = Registry::new();
        registry
            .register(TableSpec::new("city", "id").with_column("name", ColumnType::Text))
            .unwrap();
        let ctx = Context::new(Role::Client, MemoryStore::new(), registry);
        ctx.create_all().unwrap();
        ctx
    }

    #[test]
    fn unregistered_by_default() {
        let ctx = context();
        assert!(!is_registered(&ctx).unwrap());
        let err = ctx
            .with_read(|view| require_node(view))
            .unwrap_err();
        assert!(matches!(err, ClientError::NotRegistered));
    }

    #[test]
    fn register_installs_credentials() {
        let ctx = context();
        let transport = MockTransport::new();
        transport.set_register_reply(RegisterReply {
            node_id: 5,
            secret: "s3cret".into(),
        });

        let reply = register(&ctx, &transport, None).unwrap();
        assert_eq!(reply.node_id, 5);
        assert!(is_registered(&ctx).unwrap());

        let node = ctx.with_read(|view| require_node(view)).unwrap();
        assert_eq!(node.node_id, 5);
        assert_eq!(node.secret, "s3cret");
        assert_eq!(node.last_known_version, 0);
    }

    #[test]
    fn reregistration_preserves_version() {
        let ctx = context();
        save_node(&ctx, 1, "old").unwrap();
        ctx.with_untracked_transaction(|tx| set_last_known_version(tx, 4))
            .unwrap();

        let transport = MockTransport::new();
        transport.set_register_reply(RegisterReply {
            node_id: 2,
            secret: "new".into(),
        });
        register(&ctx, &transport, None).unwrap();

        let node = ctx.with_read(|view| require_node(view)).unwrap();
        assert_eq!(node.node_id, 2);
        assert_eq!(node.secret, "new");
        assert_eq!(node.last_known_version, 4);
    }

    #[test]
    fn last_known_version_advances() {
        let ctx = context();
        save_node(&ctx, 1, "s").unwrap();
        ctx.with_untracked_transaction(|tx| set_last_known_version(tx, 9))
            .unwrap();
        let node = ctx.with_read(|view| require_node(view)).unwrap();
        assert_eq!(node.last_known_version, 9);
    }
}
