//! Standard test schema and context builders.

use rowsync_core::{Context, Registry, Role};
use rowsync_store::{ColumnType, MemoryStore, Row, TableSpec, Value};

/// The standard test registry: `city {id, name unique}` and
/// `person {id, name, city_id -> city}`.
pub fn standard_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register(
            TableSpec::new("city", "id")
                .with_column("name", ColumnType::Text)
                .with_unique(&["name"]),
        )
        .expect("fresh registry");
    registry
        .register(
            TableSpec::new("person", "id")
                .with_column("name", ColumnType::Text)
                .with_column("city_id", ColumnType::Integer)
                .with_foreign_key("city_id", "city"),
        )
        .expect("fresh registry");
    registry
}

/// A client context over a fresh in-memory store, tables created.
pub fn client_context() -> Context<MemoryStore> {
    let ctx = Context::new(Role::Client, MemoryStore::new(), standard_registry());
    ctx.create_all().expect("create_all on fresh store");
    ctx
}

/// A server context over a fresh in-memory store, tables created.
pub fn server_context() -> Context<MemoryStore> {
    let ctx = Context::new(Role::Server, MemoryStore::new(), standard_registry());
    ctx.create_all().expect("create_all on fresh store");
    ctx
}

/// Builds a city row.
pub fn city_row(pk: i64, name: &str) -> Row {
    let mut row = Row::new();
    row.insert("id".into(), Value::Integer(pk));
    row.insert("name".into(), Value::Text(name.to_string()));
    row
}

/// Builds a person row referencing a city.
pub fn person_row(pk: i64, name: &str, city_id: i64) -> Row {
    let mut row = Row::new();
    row.insert("id".into(), Value::Integer(pk));
    row.insert("name".into(), Value::Text(name.to_string()));
    row.insert("city_id".into(), Value::Integer(city_id));
    row
}
