//! Selection predicates
//!
//! Predicates are data, not closures: a [`Filter`] expression can be evaluated
//! against a record in memory and rendered into SQL by a database store, and
//! both give the same answer. Evaluation follows SQL three-valued logic, so a
//! comparison against null is neither true nor false and never selects a row.
//!
//! [`Predicate<T>`] ties a filter to an entity type so a fuel predicate cannot
//! be handed to the city repository.

use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Not;

use crate::entity::Entity;
use crate::error::CoreError;
use crate::identifiers::EntityId;
use crate::record::{Record, Value};

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// Untyped filter expression over the columns of one table
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Selects every row
    True,
    Compare {
        column: &'static str,
        op: CompareOp,
        value: Value,
    },
    In {
        column: &'static str,
        values: Vec<Value>,
    },
    /// Case-sensitive substring match on a text column
    Contains {
        column: &'static str,
        needle: String,
    },
    IsNull(&'static str),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// Returns true only when the filter evaluates to true for `record`
    pub fn matches(&self, record: &Record) -> bool {
        self.eval(record) == Some(true)
    }

    /// Three-valued evaluation; `None` stands for SQL's unknown
    pub fn eval(&self, record: &Record) -> Option<bool> {
        match self {
            Filter::True => Some(true),
            Filter::Compare { column, op, value } => record
                .get(column)
                .sql_cmp(value)
                .map(|ordering| op.holds(ordering)),
            Filter::In { column, values } => {
                let actual = record.get(column);
                if actual.is_null() {
                    return None;
                }
                let mut unknown = false;
                for candidate in values {
                    match actual.sql_cmp(candidate) {
                        Some(Ordering::Equal) => return Some(true),
                        Some(_) => {}
                        None => unknown = true,
                    }
                }
                if unknown {
                    None
                } else {
                    Some(false)
                }
            }
            Filter::Contains { column, needle } => record
                .get(column)
                .as_text()
                .map(|text| text.contains(needle.as_str())),
            Filter::IsNull(column) => Some(record.get(column).is_null()),
            Filter::And(filters) => {
                let mut result = Some(true);
                for filter in filters {
                    match filter.eval(record) {
                        Some(false) => return Some(false),
                        None => result = None,
                        Some(true) => {}
                    }
                }
                result
            }
            Filter::Or(filters) => {
                let mut result = Some(false);
                for filter in filters {
                    match filter.eval(record) {
                        Some(true) => return Some(true),
                        None => result = None,
                        Some(false) => {}
                    }
                }
                result
            }
            Filter::Not(filter) => filter.eval(record).map(|value| !value),
        }
    }

    /// Conjunction, flattening nested `And` and dropping `True`
    pub fn and(self, other: Filter) -> Filter {
        match (self, other) {
            (Filter::True, other) => other,
            (this, Filter::True) => this,
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), other) => {
                left.push(other);
                Filter::And(left)
            }
            (this, Filter::And(mut right)) => {
                right.insert(0, this);
                Filter::And(right)
            }
            (this, other) => Filter::And(vec![this, other]),
        }
    }

    /// Disjunction, flattening nested `Or`
    pub fn or(self, other: Filter) -> Filter {
        match (self, other) {
            (Filter::Or(mut left), Filter::Or(right)) => {
                left.extend(right);
                Filter::Or(left)
            }
            (Filter::Or(mut left), other) => {
                left.push(other);
                Filter::Or(left)
            }
            (this, other) => Filter::Or(vec![this, other]),
        }
    }

    /// Every column the expression reads
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = Vec::new();
        self.collect_columns(&mut columns);
        columns
    }

    fn collect_columns(&self, columns: &mut Vec<&'static str>) {
        match self {
            Filter::True => {}
            Filter::Compare { column, .. }
            | Filter::In { column, .. }
            | Filter::Contains { column, .. }
            | Filter::IsNull(column) => columns.push(*column),
            Filter::And(filters) | Filter::Or(filters) => {
                for filter in filters {
                    filter.collect_columns(columns);
                }
            }
            Filter::Not(filter) => filter.collect_columns(columns),
        }
    }
}

/// A filter bound to entity type `T`
pub struct Predicate<T> {
    filter: Filter,
    _entity: PhantomData<fn(&T) -> bool>,
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        Self::from_filter(self.filter.clone())
    }
}

impl<T> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.filter).finish()
    }
}

impl<T> PartialEq for Predicate<T> {
    fn eq(&self, other: &Self) -> bool {
        self.filter == other.filter
    }
}

impl<T> Predicate<T> {
    /// Wraps an untyped filter; columns are checked by [`Predicate::validate`]
    pub fn from_filter(filter: Filter) -> Self {
        Self {
            filter,
            _entity: PhantomData,
        }
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn into_filter(self) -> Filter {
        self.filter
    }

    /// Selects every entity
    pub fn all() -> Self {
        Self::from_filter(Filter::True)
    }

    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn ne(column: &'static str, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Ne, value)
    }

    pub fn lt(column: &'static str, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Lt, value)
    }

    pub fn le(column: &'static str, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Le, value)
    }

    pub fn gt(column: &'static str, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Gt, value)
    }

    pub fn ge(column: &'static str, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Ge, value)
    }

    fn compare(column: &'static str, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::from_filter(Filter::Compare {
            column,
            op,
            value: value.into(),
        })
    }

    pub fn is_in<V: Into<Value>>(column: &'static str, values: impl IntoIterator<Item = V>) -> Self {
        Self::from_filter(Filter::In {
            column,
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn contains(column: &'static str, needle: impl Into<String>) -> Self {
        Self::from_filter(Filter::Contains {
            column,
            needle: needle.into(),
        })
    }

    pub fn is_null(column: &'static str) -> Self {
        Self::from_filter(Filter::IsNull(column))
    }

    pub fn and(self, other: Predicate<T>) -> Self {
        Self::from_filter(self.filter.and(other.filter))
    }

    pub fn or(self, other: Predicate<T>) -> Self {
        Self::from_filter(self.filter.or(other.filter))
    }
}

impl<T: Entity> Predicate<T> {
    /// Identifier equality on the entity's key column
    pub fn id_eq(id: EntityId) -> Self {
        Self::eq(T::meta().key, id)
    }

    pub fn matches(&self, entity: &T) -> bool {
        self.filter.matches(&entity.to_record())
    }

    /// Checks that every column the predicate reads exists on `T`
    pub fn validate(&self) -> Result<(), CoreError> {
        let meta = T::meta();
        self.filter
            .columns()
            .into_iter()
            .try_for_each(|column| meta.require_column(column))
    }
}

impl<T> Default for Predicate<T> {
    fn default() -> Self {
        Self::all()
    }
}

impl<T> Not for Predicate<T> {
    type Output = Predicate<T>;

    fn not(self) -> Self::Output {
        Self::from_filter(Filter::Not(Box::new(self.filter)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fuel(id: i64, name: &str) -> Record {
        Record::new().with("id", id).with("name", name)
    }

    #[test]
    fn test_compare_against_null_is_unknown() {
        let record = Record::new().with("id", 1i64).with("ban_id", Value::Null);
        let filter = Filter::Compare {
            column: "ban_id",
            op: CompareOp::Ne,
            value: Value::Int(3),
        };
        assert_eq!(filter.eval(&record), None);
        assert!(!filter.matches(&record));
        assert!(!Filter::Not(Box::new(filter)).matches(&record));
    }

    #[test]
    fn test_in_list() {
        let filter = Filter::In {
            column: "id",
            values: vec![Value::Int(2), Value::Int(3)],
        };
        assert!(filter.matches(&fuel(3, "Diesel")));
        assert!(!filter.matches(&fuel(4, "Petrol")));

        let empty = Filter::In {
            column: "id",
            values: vec![],
        };
        assert!(!empty.matches(&fuel(3, "Diesel")));
    }

    #[test]
    fn test_and_flattens_and_drops_true() {
        let a = Filter::IsNull("a");
        let b = Filter::IsNull("b");
        assert_eq!(Filter::True.and(a.clone()), a);
        assert_eq!(
            a.clone().and(b.clone()).and(Filter::IsNull("c")),
            Filter::And(vec![a, b, Filter::IsNull("c")])
        );
    }

    #[test]
    fn test_or_short_circuits_unknown() {
        let record = fuel(1, "Diesel");
        let filter = Filter::Compare {
            column: "missing",
            op: CompareOp::Eq,
            value: Value::Int(1),
        }
        .or(Filter::Contains {
            column: "name",
            needle: "ies".to_string(),
        });
        assert!(filter.matches(&record));
    }

    #[test]
    fn test_columns_collects_nested() {
        let filter = Filter::Not(Box::new(Filter::IsNull("a").or(Filter::Contains {
            column: "b",
            needle: "x".to_string(),
        })));
        assert_eq!(filter.columns(), vec!["a", "b"]);
    }
}
