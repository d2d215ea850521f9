//! Untyped rows exchanged between entities and stores
//!
//! A [`Record`] is the column-to-value map an entity maps to before it is
//! handed to a store, and the shape a store returns rows in. Stores never see
//! entity types, only records and the static metadata describing them.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::CoreError;
use crate::identifiers::EntityId;

/// A single column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

static NULL: Value = Value::Null;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Name of the variant, used in mapping errors
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
        }
    }

    /// Compares two values the way SQL does
    ///
    /// Returns `None` when either side is null or the kinds are not
    /// comparable. Integers and floats compare numerically.
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Float(_) | Value::Int(_), Value::Float(_) | Value::Int(_)) => {
                self.as_float()?.partial_cmp(&other.as_float()?)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "'{v}'"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<EntityId> for Value {
    fn from(value: EntityId) -> Self {
        Value::Int(value.value())
    }
}

impl<V: Into<Value>> From<Option<V>> for Value {
    fn from(value: Option<V>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Column-to-value map for one row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: BTreeMap<&'static str, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &'static str, value: impl Into<Value>) {
        self.values.insert(column, value.into());
    }

    /// Returns the value of `column`, or null when the column is absent
    pub fn get(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&NULL)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.values.iter().map(|(column, value)| (*column, value))
    }

    /// Reads `column` as an identifier; unassigned and null map to `None`
    pub fn id(&self, column: &str) -> Option<EntityId> {
        self.get(column).as_int().map(EntityId::new)?.assigned()
    }

    pub fn int(&self, column: &'static str) -> Result<i64, CoreError> {
        let value = self.get(column);
        value
            .as_int()
            .ok_or_else(|| CoreError::mapping(column, "int", value.kind()))
    }

    pub fn opt_int(&self, column: &'static str) -> Result<Option<i64>, CoreError> {
        match self.get(column) {
            Value::Null => Ok(None),
            _ => self.int(column).map(Some),
        }
    }

    pub fn float(&self, column: &'static str) -> Result<f64, CoreError> {
        let value = self.get(column);
        value
            .as_float()
            .ok_or_else(|| CoreError::mapping(column, "float", value.kind()))
    }

    pub fn bool(&self, column: &'static str) -> Result<bool, CoreError> {
        let value = self.get(column);
        value
            .as_bool()
            .ok_or_else(|| CoreError::mapping(column, "bool", value.kind()))
    }

    pub fn text(&self, column: &'static str) -> Result<String, CoreError> {
        let value = self.get(column);
        value
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| CoreError::mapping(column, "text", value.kind()))
    }

    pub fn opt_text(&self, column: &'static str) -> Result<Option<String>, CoreError> {
        match self.get(column) {
            Value::Null => Ok(None),
            _ => self.text(column).map(Some),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (column, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{column}: {value}")?;
        }
        write!(f, "}}")
    }
}
