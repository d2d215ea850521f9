//! Include paths for eager loading
//!
//! An [`Include<T>`] names one related-data edge of `T`. A query holding
//! includes loads the primary rows first, then issues one lookup per include
//! for the related rows of the whole result set and hands each entity its
//! share through the include's attach function.

use std::collections::BTreeSet;
use std::fmt;

use crate::entity::{Entity, EntityMeta};
use crate::error::CoreError;
use crate::predicate::Filter;
use crate::record::{Record, Value};

/// How the parent and the related rows are joined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// The parent holds `foreign_key`, pointing at the related row's key
    Reference { foreign_key: &'static str },
    /// Each related row holds `foreign_key`, pointing at the parent's key
    Collection { foreign_key: &'static str },
}

/// Stores the related records on the parent entity
pub type Attach<T> = fn(&mut T, &[Record]) -> Result<(), CoreError>;

/// A related-data edge to load together with `T`
pub struct Include<T> {
    path: &'static str,
    target: &'static EntityMeta,
    link: Link,
    attach: Attach<T>,
}

impl<T> Clone for Include<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Include<T> {}

impl<T> fmt::Debug for Include<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Include")
            .field("path", &self.path)
            .field("target", &self.target.table)
            .field("link", &self.link)
            .finish()
    }
}

impl<T: Entity> Include<T> {
    /// Edge through a foreign key held by `T`
    pub fn reference(
        path: &'static str,
        target: &'static EntityMeta,
        foreign_key: &'static str,
        attach: Attach<T>,
    ) -> Self {
        Self {
            path,
            target,
            link: Link::Reference { foreign_key },
            attach,
        }
    }

    /// Edge through a foreign key held by the related rows
    pub fn collection(
        path: &'static str,
        target: &'static EntityMeta,
        foreign_key: &'static str,
        attach: Attach<T>,
    ) -> Self {
        Self {
            path,
            target,
            link: Link::Collection { foreign_key },
            attach,
        }
    }

    pub fn path(&self) -> &'static str {
        self.path
    }

    pub fn target(&self) -> &'static EntityMeta {
        self.target
    }

    pub fn link(&self) -> Link {
        self.link
    }

    /// Filter over the target table selecting every row related to `parents`
    ///
    /// Returns `None` when no parent can have related rows, so the lookup can
    /// be skipped entirely.
    pub fn lookup(&self, parents: &[Record]) -> Option<Filter> {
        let (column, source) = match self.link {
            Link::Reference { foreign_key } => (self.target.key, foreign_key),
            Link::Collection { foreign_key } => (foreign_key, T::meta().key),
        };
        let mut seen = BTreeSet::new();
        let values: Vec<Value> = parents
            .iter()
            .filter_map(|parent| parent.get(source).as_int())
            .filter(|key| seen.insert(*key))
            .map(Value::Int)
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(Filter::In { column, values })
        }
    }

    /// Returns true if `candidate` belongs to `parent` along this edge
    pub fn is_related(&self, parent: &Record, candidate: &Record) -> bool {
        let (parent_value, candidate_value) = match self.link {
            Link::Reference { foreign_key } => {
                (parent.get(foreign_key), candidate.get(self.target.key))
            }
            Link::Collection { foreign_key } => {
                (parent.get(T::meta().key), candidate.get(foreign_key))
            }
        };
        !parent_value.is_null() && parent_value == candidate_value
    }

    /// Hands the related records of one parent to the entity
    pub fn attach(&self, entity: &mut T, related: &[Record]) -> Result<(), CoreError> {
        (self.attach)(entity, related)
    }

    /// Checks both ends of the edge name existing columns
    pub fn validate(&self) -> Result<(), CoreError> {
        match self.link {
            Link::Reference { foreign_key } => T::meta().require_column(foreign_key),
            Link::Collection { foreign_key } => self.target.require_column(foreign_key),
        }
    }
}
