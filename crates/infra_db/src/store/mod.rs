//! Store capability
//!
//! A [`Store`] is the persistence backend behind a context. It knows nothing
//! about entity types: it reads and writes [`Record`]s of the tables described
//! by static [`EntityMeta`], evaluates [`Filter`]s, and applies a whole
//! [`ChangeBatch`] atomically or not at all.
//!
//! Every operation exists twice, a blocking form and an `_async` form, so a
//! context can offer both execution paths over the same backend.

mod memory;
mod postgres;

use std::fmt;

use async_trait::async_trait;
use core_kernel::{EntityId, EntityMeta, Filter, Record};

use crate::error::DatabaseError;
use crate::tracker::EntryId;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Rows of one table to read
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub meta: &'static EntityMeta,
    pub filter: Filter,
    pub limit: Option<usize>,
}

impl Selection {
    /// Every row of the table
    pub fn all(meta: &'static EntityMeta) -> Self {
        Self::new(meta, Filter::True)
    }

    pub fn new(meta: &'static EntityMeta, filter: Filter) -> Self {
        Self {
            meta,
            filter,
            limit: None,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// What a pending change does to its row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One row write inside a batch
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    /// Tracker entry the change came from
    pub entry: EntryId,
    pub meta: &'static EntityMeta,
    pub kind: ChangeKind,
    /// Row key; `None` asks the store to assign one on insert
    pub key: Option<EntityId>,
    pub record: Record,
}

/// Ordered set of writes applied as one transaction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeBatch {
    changes: Vec<PendingChange>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: PendingChange) {
        self.changes.push(change);
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingChange> {
        self.changes.iter()
    }
}

impl FromIterator<PendingChange> for ChangeBatch {
    fn from_iter<I: IntoIterator<Item = PendingChange>>(iter: I) -> Self {
        Self {
            changes: iter.into_iter().collect(),
        }
    }
}

/// Result of a successfully applied batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Number of rows written
    pub affected: usize,
    /// Keys the store assigned to inserted entries
    pub assigned: Vec<(EntryId, EntityId)>,
}

/// Persistence backend of a context
///
/// Implementations return rows in ascending key order and must leave their
/// state untouched when `apply` fails.
#[async_trait]
pub trait Store: Send + Sync + fmt::Debug {
    /// Reads the selected rows
    fn select(&self, selection: &Selection) -> Result<Vec<Record>, DatabaseError>;

    /// Returns true if at least one row is selected
    fn exists(&self, selection: &Selection) -> Result<bool, DatabaseError>;

    fn count(&self, selection: &Selection) -> Result<u64, DatabaseError>;

    /// Applies every change of the batch, or none of them
    fn apply(&self, batch: &ChangeBatch) -> Result<BatchOutcome, DatabaseError>;

    async fn select_async(&self, selection: &Selection) -> Result<Vec<Record>, DatabaseError>;

    async fn exists_async(&self, selection: &Selection) -> Result<bool, DatabaseError>;

    async fn count_async(&self, selection: &Selection) -> Result<u64, DatabaseError>;

    async fn apply_async(&self, batch: &ChangeBatch) -> Result<BatchOutcome, DatabaseError>;
}
