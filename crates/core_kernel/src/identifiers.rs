//! Entity identifiers
//!
//! Catalog entities are keyed by integers assigned by the store when the
//! entity is first written. Wrapping the raw value keeps a key from being
//! mixed up with a row count or a file size.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Store-assigned identifier of a persisted entity
///
/// An identifier is unique within its entity type and never reused. Entities
/// that have not been written yet carry [`EntityId::UNASSIGNED`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(i64);

impl EntityId {
    /// Identifier carried by an entity the store has not keyed yet
    pub const UNASSIGNED: EntityId = EntityId(0);

    /// Creates an identifier from its raw value
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw value
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Returns true once the store has assigned this identifier
    pub const fn is_assigned(self) -> bool {
        self.0 != 0
    }

    /// Returns `None` for the unassigned identifier
    pub fn assigned(self) -> Option<Self> {
        self.is_assigned().then_some(self)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<EntityId> for i64 {
    fn from(id: EntityId) -> i64 {
        id.0
    }
}
