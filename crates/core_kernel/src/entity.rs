//! Entity contract and mapping metadata
//!
//! Every persisted type implements [`Entity`]: it exposes its identifier,
//! converts to and from a [`Record`], and points at a static [`EntityMeta`]
//! describing the table it lives in. Stores rely on the metadata alone for
//! constraint checks and SQL rendering.

use std::fmt;

use crate::error::CoreError;
use crate::identifiers::EntityId;
use crate::record::{Record, Value};

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    Bool,
    Text,
}

impl ColumnType {
    /// Returns true if `value` may be stored in a column of this type
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (ColumnType::Int, Value::Int(_))
                | (ColumnType::Float, Value::Float(_) | Value::Int(_))
                | (ColumnType::Bool, Value::Bool(_))
                | (ColumnType::Text, Value::Text(_))
        )
    }
}

/// A non-key column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    /// Maximum length in characters for text columns
    pub max_len: Option<usize>,
    pub unique: bool,
}

impl Column {
    pub const fn required(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            max_len: None,
            unique: false,
        }
    }

    pub const fn optional(name: &'static str, ty: ColumnType) -> Self {
        Self {
            nullable: true,
            ..Self::required(name, ty)
        }
    }

    pub const fn max_len(self, max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
            ..self
        }
    }

    pub const fn unique(self) -> Self {
        Self {
            unique: true,
            ..self
        }
    }
}

/// A column holding the key of a row in another table
#[derive(Clone, Copy)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references: &'static EntityMeta,
}

impl fmt::Debug for ForeignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignKey")
            .field("column", &self.column)
            .field("references", &self.references.table)
            .finish()
    }
}

/// Static description of an entity's table
#[derive(Debug)]
pub struct EntityMeta {
    /// Entity name used in logs and errors
    pub name: &'static str,
    pub table: &'static str,
    /// Integer key column, assigned by the store
    pub key: &'static str,
    /// Non-key columns in declaration order
    pub columns: &'static [Column],
    pub foreign_keys: &'static [ForeignKey],
}

impl EntityMeta {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Returns true for the key column and every declared column
    pub fn has_column(&self, name: &str) -> bool {
        name == self.key || self.column(name).is_some()
    }

    /// Returns the assigned key held by `record`, if any
    pub fn key_of(&self, record: &Record) -> Option<EntityId> {
        record.id(self.key)
    }

    /// Fails with [`CoreError::UnknownColumn`] for a column this entity lacks
    pub fn require_column(&self, name: &'static str) -> Result<(), CoreError> {
        if self.has_column(name) {
            Ok(())
        } else {
            Err(CoreError::unknown_column(self.name, name))
        }
    }
}

impl PartialEq for EntityMeta {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table
    }
}

impl Eq for EntityMeta {}

/// A uniquely identified persisted record
///
/// Implementations are plain values; lifecycle state is tracked by the
/// persistent context, never by the entity itself.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Mapping metadata for this entity type
    fn meta() -> &'static EntityMeta;

    fn id(&self) -> EntityId;

    fn set_id(&mut self, id: EntityId);

    /// Converts the persisted columns, key included, into a record
    ///
    /// Navigation data loaded through include paths is not part of the record.
    fn to_record(&self) -> Record;

    /// Rebuilds an entity from a stored record
    fn from_record(record: &Record) -> Result<Self, CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    static PARENT: EntityMeta = EntityMeta {
        name: "Parent",
        table: "parents",
        key: "id",
        columns: &[Column::required("name", ColumnType::Text).max_len(10)],
        foreign_keys: &[],
    };

    static CHILD: EntityMeta = EntityMeta {
        name: "Child",
        table: "children",
        key: "id",
        columns: &[Column::optional("parent_id", ColumnType::Int)],
        foreign_keys: &[ForeignKey {
            column: "parent_id",
            references: &PARENT,
        }],
    };

    #[test]
    fn test_column_builders() {
        let column = Column::required("name", ColumnType::Text).max_len(10).unique();
        assert!(!column.nullable);
        assert!(column.unique);
        assert_eq!(column.max_len, Some(10));
        assert!(Column::optional("note", ColumnType::Text).nullable);
    }

    #[test]
    fn test_has_column_includes_key() {
        assert!(PARENT.has_column("id"));
        assert!(PARENT.has_column("name"));
        assert!(!PARENT.has_column("title"));
        assert_eq!(
            PARENT.require_column("title"),
            Err(CoreError::unknown_column("Parent", "title"))
        );
    }

    #[test]
    fn test_foreign_key_debug_names_table() {
        let debug = format!("{:?}", CHILD.foreign_keys[0]);
        assert!(debug.contains("parents"));
    }

    #[test]
    fn test_column_type_accepts() {
        assert!(ColumnType::Float.accepts(&Value::Int(3)));
        assert!(ColumnType::Text.accepts(&Value::Null));
        assert!(!ColumnType::Int.accepts(&Value::from("3")));
    }
}
