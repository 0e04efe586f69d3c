//! Table descriptions.

/// Type tag for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Signed 64-bit integer.
    Integer,
    /// Floating point.
    Real,
    /// UTF-8 text.
    Text,
    /// Boolean.
    Bool,
}

/// A typed column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Column type tag.
    pub ty: ColumnType,
}

/// A foreign-key edge: a column of this table referring to the primary key
/// of another table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// The referring column.
    pub column: String,
    /// The referenced table.
    pub references: String,
}

/// A unique constraint over a nonempty set of columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConstraint {
    /// Constrained columns, in declared order.
    pub columns: Vec<String>,
}

/// Description of a table.
///
/// The primary key column is always an integer and is implicitly part of
/// the column list. Foreign keys and unique constraints are introspected by
/// the sync layers for conflict detection and cascade handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    /// Table name.
    pub name: String,
    /// Primary key column name.
    pub pk_column: String,
    /// Ordered columns, including the primary key.
    pub columns: Vec<Column>,
    /// Outgoing foreign-key edges.
    pub foreign_keys: Vec<ForeignKey>,
    /// Unique constraints, in declared order.
    pub uniques: Vec<UniqueConstraint>,
}

impl TableSpec {
    /// Creates a table description with an integer primary key column.
    pub fn new(name: impl Into<String>, pk_column: impl Into<String>) -> Self {
        let pk_column = pk_column.into();
        Self {
            name: name.into(),
            columns: vec![Column {
                name: pk_column.clone(),
                ty: ColumnType::Integer,
            }],
            pk_column,
            foreign_keys: Vec::new(),
            uniques: Vec::new(),
        }
    }

    /// Adds a column.
    pub fn with_column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.push(Column {
            name: name.into(),
            ty,
        });
        self
    }

    /// Adds a foreign-key edge from `column` to the pk of `references`.
    ///
    /// The column itself must be added separately (usually as `Integer`).
    pub fn with_foreign_key(
        mut self,
        column: impl Into<String>,
        references: impl Into<String>,
    ) -> Self {
        self.foreign_keys.push(ForeignKey {
            column: column.into(),
            references: references.into(),
        });
        self
    }

    /// Adds a unique constraint over the given columns.
    pub fn with_unique(mut self, columns: &[&str]) -> Self {
        self.uniques.push(UniqueConstraint {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
        });
        self
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns true if the table declares the given column.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Foreign-key edges pointing at the given table.
    pub fn foreign_keys_to<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a ForeignKey> {
        self.foreign_keys.iter().filter(move |fk| fk.references == table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_declares_pk_column() {
        let spec = TableSpec::new("city", "id")
            .with_column("name", ColumnType::Text)
            .with_unique(&["name"]);

        assert_eq!(spec.pk_column, "id");
        assert!(spec.has_column("id"));
        assert!(spec.has_column("name"));
        assert_eq!(spec.column("id").unwrap().ty, ColumnType::Integer);
        assert_eq!(spec.uniques.len(), 1);
    }

    #[test]
    fn foreign_keys_to_filters_by_target() {
        let spec = TableSpec::new("person", "id")
            .with_column("city_id", ColumnType::Integer)
            .with_column("home_id", ColumnType::Integer)
            .with_foreign_key("city_id", "city")
            .with_foreign_key("home_id", "house");

        let to_city: Vec<_> = spec.foreign_keys_to("city").collect();
        assert_eq!(to_city.len(), 1);
        assert_eq!(to_city[0].column, "city_id");
    }
}
