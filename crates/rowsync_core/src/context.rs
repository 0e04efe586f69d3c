//! Synchronization context and transparent DML capture.

use crate::error::{CoreError, CoreResult};
use crate::journal;
use crate::operation::{OpKind, Ref};
use crate::registry::Registry;
use crate::version::{self, Version};
use rowsync_store::{
    ColumnType, RelationalStore, Row, StoreError, StoreRead, StoreTx, TableSpec, Value,
};
use tracing::warn;

/// System table holding node registrations.
///
/// On the server it holds one row per registered node
/// (`{node_id, secret, registered}`); on the client it holds the single
/// local registration, which also carries `last_known_version`.
pub const NODES_TABLE: &str = "sync_nodes";

fn nodes_table_spec() -> TableSpec {
    TableSpec::new(NODES_TABLE, "node_id")
        .with_column("secret", ColumnType::Text)
        .with_column("registered", ColumnType::Integer)
        .with_column("last_known_version", ColumnType::Integer)
}

/// Which side of the synchronization a context plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// An intermittently-connected node with a local journal.
    Client,
    /// The single authority; every journal entry is versioned.
    Server,
}

/// An initialized synchronization context.
///
/// Owns the store and the (read-only) registry. All process-wide state of
/// the engine lives here; there are no globals.
#[derive(Debug)]
pub struct Context<S: RelationalStore> {
    role: Role,
    store: S,
    registry: Registry,
}

impl<S: RelationalStore> Context<S> {
    /// Creates a context. The registry must be fully populated; it is
    /// read-only from here on.
    pub fn new(role: Role, store: S, registry: Registry) -> Self {
        Self {
            role,
            store,
            registry,
        }
    }

    /// The context's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The tracking registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Materializes the synchronization tables and every registered
    /// content type in the store. Idempotent.
    pub fn create_all(&self) -> CoreResult<()> {
        if self.registry.tracked().next().is_none() {
            return Err(CoreError::Config(
                "no content types registered before create_all".into(),
            ));
        }
        self.store.create_table(journal::table_spec())?;
        self.store.create_table(nodes_table_spec())?;
        if self.role == Role::Server {
            self.store.create_table(version::table_spec())?;
        }
        for spec in self.registry.tracked() {
            self.store.create_table(spec.clone())?;
        }
        Ok(())
    }

    /// Runs a tracked transaction: every DML against a registered content
    /// type is journaled inside the same store transaction.
    pub fn with_transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut TrackedTx<'_, S::Tx>) -> Result<R, E>,
        E: From<CoreError> + From<StoreError>,
    {
        let role = self.role;
        let registry = &self.registry;
        self.store.with_tx(|tx| {
            let mut tracked = TrackedTx {
                tx,
                registry,
                role,
                recording: true,
            };
            f(&mut tracked)
        })
    }

    /// Runs a raw store transaction with no journal capture. Used by the
    /// synchronization procedures themselves (merge, repair, server apply).
    pub fn with_untracked_transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut S::Tx) -> Result<R, E>,
        E: From<StoreError>,
    {
        self.store.with_tx(f)
    }

    /// Runs a read-only closure over a consistent store view.
    pub fn with_read<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&dyn StoreRead) -> Result<R, E>,
        E: From<StoreError>,
    {
        self.store.with_read(f)
    }
}

/// A store transaction with transparent DML capture.
///
/// The thin adapter over the store's insert/update/delete events: every
/// mutation against a registered content type appends a journal entry in
/// the same transaction, so a rollback takes the journal entries with it.
pub struct TrackedTx<'a, T: StoreTx> {
    tx: &'a mut T,
    registry: &'a Registry,
    role: Role,
    recording: bool,
}

impl<T: StoreTx> TrackedTx<'_, T> {
    /// Inserts a row and journals the insert.
    pub fn insert(&mut self, content_type: &str, row: Row) -> CoreResult<i64> {
        let pk = self.tx.insert(content_type, row)?;
        self.record(OpKind::Insert, content_type, pk)?;
        Ok(pk)
    }

    /// Replaces a row and journals the update.
    pub fn update(&mut self, content_type: &str, pk: i64, row: Row) -> CoreResult<()> {
        self.tx.update(content_type, pk, row)?;
        self.record(OpKind::Update, content_type, pk)?;
        Ok(())
    }

    /// Deletes a row and journals the delete, including every row removed
    /// by cascade.
    pub fn delete(&mut self, content_type: &str, pk: i64) -> CoreResult<()> {
        let victims = self.tx.delete(content_type, pk)?;
        self.record(OpKind::Delete, content_type, pk)?;
        for victim in victims {
            self.record(OpKind::Delete, &victim.table, victim.pk)?;
        }
        Ok(())
    }

    /// Fetches a row.
    pub fn get(&self, content_type: &str, pk: i64) -> CoreResult<Option<Row>> {
        Ok(self.tx.get(content_type, pk)?)
    }

    /// Returns all rows of a content type.
    pub fn scan(&self, content_type: &str) -> CoreResult<Vec<Row>> {
        Ok(self.tx.scan(content_type)?)
    }

    /// Finds a row by column equality.
    pub fn find_by(&self, content_type: &str, criteria: &[(&str, &Value)]) -> CoreResult<Option<Row>> {
        Ok(self.tx.find_by(content_type, criteria)?)
    }

    /// Largest primary key of a content type.
    pub fn max_pk(&self, content_type: &str) -> CoreResult<Option<i64>> {
        Ok(self.tx.max_pk(content_type)?)
    }

    /// Toggles journal capture for the remainder of this transaction.
    pub fn set_recording(&mut self, enabled: bool) {
        self.recording = enabled;
    }

    /// Returns whether DML is currently journaled.
    pub fn recording(&self) -> bool {
        self.recording
    }

    fn record(&mut self, kind: OpKind, content_type: &str, pk: i64) -> CoreResult<()> {
        if !self.recording {
            return Ok(());
        }
        if !self.registry.contains(content_type) {
            warn!(
                content_type,
                "mutation on unregistered content type is not journaled"
            );
            return Ok(());
        }
        let reference = Ref::new(content_type, pk);
        match self.role {
            Role::Client => {
                journal::append(self.tx, kind, &reference, None)?;
            }
            Role::Server => {
                // The server journal is entirely versioned; each direct
                // server-side operation opens its own version.
                let id = version::latest(self.tx)? + 1;
                version::record(
                    self.tx,
                    &Version {
                        id,
                        created: version::now_millis(),
                        node_id: None,
                    },
                )?;
                journal::append(self.tx, kind, &reference, Some(id))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowsync_store::MemoryStore;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                TableSpec::new("city", "id")
                    .with_column("name", ColumnType::Text)
                    .with_unique(&["name"]),
            )
            .unwrap();
        registry
            .register(
                TableSpec::new("person", "id")
                    .with_column("name", ColumnType::Text)
                    .with_column("city_id", ColumnType::Integer)
                    .with_foreign_key("city_id", "city"),
            )
            .unwrap();
        registry
    }

    fn client_context() -> Context<MemoryStore> {
        let ctx = Context::new(Role::Client, MemoryStore::new(), registry());
        ctx.create_all().unwrap();
        ctx
    }

    fn server_context() -> Context<MemoryStore> {
        let ctx = Context::new(Role::Server, MemoryStore::new(), registry());
        ctx.create_all().unwrap();
        ctx
    }

    fn city_row(pk: i64, name: &str) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), Value::Integer(pk));
        row.insert("name".into(), Value::Text(name.to_string()));
        row
    }

    fn person_row(pk: i64, city: i64) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), Value::Integer(pk));
        row.insert("name".into(), Value::Text("p".into()));
        row.insert("city_id".into(), Value::Integer(city));
        row
    }

    #[test]
    fn create_all_is_idempotent() {
        let ctx = client_context();
        ctx.create_all().unwrap();
        ctx.create_all().unwrap();
        assert!(ctx.store().has_table(journal::OPERATIONS_TABLE));
        assert!(ctx.store().has_table(NODES_TABLE));
        assert!(ctx.store().has_table("city"));
    }

    #[test]
    fn create_all_requires_registered_types() {
        let ctx = Context::new(Role::Client, MemoryStore::new(), Registry::new());
        assert!(matches!(ctx.create_all(), Err(CoreError::Config(_))));
    }

    #[test]
    fn tracked_dml_is_journaled() {
        let ctx = client_context();
        ctx.with_transaction(|tx| {
            tx.insert("city", city_row(1, "A"))?;
            tx.update("city", 1, city_row(1, "B"))?;
            tx.delete("city", 1)?;
            Ok::<_, CoreError>(())
        })
        .unwrap();

        let ops = ctx
            .with_read(|view| journal::unversioned(view))
            .unwrap();
        let kinds: Vec<OpKind> = ops.iter().map(|op| op.kind).collect();
        assert_eq!(kinds, vec![OpKind::Insert, OpKind::Update, OpKind::Delete]);
    }

    #[test]
    fn aborted_transaction_leaves_no_journal_entry() {
        let ctx = client_context();
        let result: Result<(), CoreError> = ctx.with_transaction(|tx| {
            tx.insert("city", city_row(1, "A"))?;
            Err(CoreError::Config("boom".into()))
        });
        assert!(result.is_err());

        let ops = ctx
            .with_read(|view| journal::unversioned(view))
            .unwrap();
        assert!(ops.is_empty());
        ctx.with_read(|view| {
            assert_eq!(view.count("city")?, 0);
            Ok::<_, StoreError>(())
        })
        .unwrap();
    }

    #[test]
    fn cascade_victims_are_journaled() {
        let ctx = client_context();
        ctx.with_transaction(|tx| {
            tx.insert("city", city_row(1, "A"))?;
            tx.insert("person", person_row(10, 1))?;
            tx.delete("city", 1)?;
            Ok::<_, CoreError>(())
        })
        .unwrap();

        let ops = ctx
            .with_read(|view| journal::unversioned(view))
            .unwrap();
        let deletes: Vec<&crate::Operation> =
            ops.iter().filter(|op| op.kind.is_delete()).collect();
        assert_eq!(deletes.len(), 2);
        assert!(deletes
            .iter()
            .any(|op| op.content_type == "person" && op.row_pk == 10));
    }

    #[test]
    fn server_role_versions_every_operation() {
        let ctx = server_context();
        ctx.with_transaction(|tx| {
            tx.insert("city", city_row(1, "A"))?;
            tx.insert("city", city_row(2, "B"))?;
            Ok::<_, CoreError>(())
        })
        .unwrap();

        let ops = ctx.with_read(|view| journal::all(view)).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].version, Some(1));
        assert_eq!(ops[1].version, Some(2));

        let latest = ctx.with_read(|view| version::latest(view)).unwrap();
        assert_eq!(latest, 2);
    }

    #[test]
    fn recording_can_be_suspended() {
        let ctx = client_context();
        ctx.with_transaction(|tx| {
            tx.set_recording(false);
            tx.insert("city", city_row(1, "A"))?;
            tx.set_recording(true);
            tx.insert("city", city_row(2, "B"))?;
            Ok::<_, CoreError>(())
        })
        .unwrap();

        let ops = ctx
            .with_read(|view| journal::unversioned(view))
            .unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].row_pk, 2);
    }
}
