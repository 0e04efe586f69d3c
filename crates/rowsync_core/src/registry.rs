//! Tracking registry of content types.

use crate::error::{CoreError, CoreResult};
use crate::operation::Ref;
use rowsync_store::{ForeignKey, Row, TableSpec, Value};
use std::collections::BTreeMap;

/// Registry of tracked content types.
///
/// A content type is a registered table description; its id is the table
/// name. The registry is populated before `create_all` and is read-only
/// afterwards (it is owned behind an `Arc` by the [`crate::Context`]).
/// Registration is idempotent.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    types: BTreeMap<String, TableSpec>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a content type for tracking.
    ///
    /// Re-registering an identical description is a no-op; re-registering
    /// with a different description is a configuration error.
    pub fn register(&mut self, spec: TableSpec) -> CoreResult<()> {
        if let Some(existing) = self.types.get(&spec.name) {
            if *existing == spec {
                return Ok(());
            }
            return Err(CoreError::Config(format!(
                "content type {} already registered with a different description",
                spec.name
            )));
        }
        self.types.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Returns true if the content type is tracked.
    pub fn contains(&self, content_type: &str) -> bool {
        self.types.contains_key(content_type)
    }

    /// Looks up a content type. Missing types are fatal at merge time.
    pub fn content_type(&self, content_type: &str) -> CoreResult<&TableSpec> {
        self.types
            .get(content_type)
            .ok_or_else(|| CoreError::UnknownContentType {
                content_type: content_type.to_string(),
            })
    }

    /// Iterates over all tracked content types, in id order.
    pub fn tracked(&self) -> impl Iterator<Item = &TableSpec> {
        self.types.values()
    }

    /// Iterates over all tracked content type ids, in order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Reads the primary key of a row of the given content type.
    pub fn row_pk(&self, content_type: &str, row: &Row) -> CoreResult<i64> {
        let spec = self.content_type(content_type)?;
        row.get(&spec.pk_column)
            .and_then(Value::as_integer)
            .ok_or_else(|| {
                CoreError::Config(format!(
                    "row of {} is missing integer primary key {}",
                    content_type, spec.pk_column
                ))
            })
    }

    /// Returns the identity of a row of the given content type.
    pub fn row_ref(&self, content_type: &str, row: &Row) -> CoreResult<Ref> {
        Ok(Ref::new(content_type, self.row_pk(content_type, row)?))
    }

    /// Returns the references a row points at through its non-null
    /// foreign-key columns.
    pub fn references_of(&self, content_type: &str, row: &Row) -> CoreResult<Vec<Ref>> {
        let spec = self.content_type(content_type)?;
        Ok(spec
            .foreign_keys
            .iter()
            .filter_map(|fk| {
                row.get(&fk.column)
                    .and_then(Value::as_integer)
                    .map(|pk| Ref::new(fk.references.clone(), pk))
            })
            .collect())
    }

    /// Returns true if the row carries a foreign key pointing at `target`.
    pub fn row_references(
        &self,
        content_type: &str,
        row: &Row,
        target: &Ref,
    ) -> CoreResult<bool> {
        let spec = self.content_type(content_type)?;
        Ok(spec.foreign_keys_to(&target.content_type).any(|fk| {
            row.get(&fk.column) == Some(&Value::Integer(target.pk))
        }))
    }

    /// Returns the content types (with the referring edges) that declare a
    /// foreign key to `target`.
    pub fn referrers<'a>(&'a self, target: &'a str) -> Vec<(&'a TableSpec, &'a ForeignKey)> {
        self.types
            .values()
            .flat_map(|spec| spec.foreign_keys_to(target).map(move |fk| (spec, fk)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowsync_store::ColumnType;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                TableSpec::new("city", "id").with_column("name", ColumnType::Text),
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

    fn person_row(pk: i64, city: i64) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), Value::Integer(pk));
        row.insert("name".into(), Value::Text("p".into()));
        row.insert("city_id".into(), Value::Integer(city));
        row
    }

    #[test]
    fn register_is_idempotent() {
        let mut registry = registry();
        registry
            .register(TableSpec::new("city", "id").with_column("name", ColumnType::Text))
            .unwrap();

        let conflicting = TableSpec::new("city", "city_id");
        assert!(registry.register(conflicting).is_err());
    }

    #[test]
    fn unknown_content_type_is_fatal() {
        let registry = registry();
        assert!(matches!(
            registry.content_type("house"),
            Err(CoreError::UnknownContentType { .. })
        ));
    }

    #[test]
    fn row_identity_and_references() {
        let registry = registry();
        let row = person_row(10, 3);

        assert_eq!(registry.row_pk("person", &row).unwrap(), 10);
        assert_eq!(
            registry.row_ref("person", &row).unwrap(),
            Ref::new("person", 10)
        );
        assert_eq!(
            registry.references_of("person", &row).unwrap(),
            vec![Ref::new("city", 3)]
        );
        assert!(registry
            .row_references("person", &row, &Ref::new("city", 3))
            .unwrap());
        assert!(!registry
            .row_references("person", &row, &Ref::new("city", 4))
            .unwrap());
    }

    #[test]
    fn referrers_finds_incoming_edges() {
        let registry = registry();
        let referrers = registry.referrers("city");
        assert_eq!(referrers.len(), 1);
        assert_eq!(referrers[0].0.name, "person");
        assert_eq!(referrers[0].1.column, "city_id");
    }
}
