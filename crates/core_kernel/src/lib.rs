//! Core Kernel - Foundational types shared by the catalog crates
//!
//! This crate provides the vocabulary every other crate speaks:
//! - Entity identifiers and the `Entity` mapping contract
//! - Untyped records and values exchanged with stores
//! - Typed selection predicates and include paths for eager loading

pub mod entity;
pub mod error;
pub mod identifiers;
pub mod include;
pub mod predicate;
pub mod record;

pub use entity::{Column, ColumnType, Entity, EntityMeta, ForeignKey};
pub use error::CoreError;
pub use identifiers::EntityId;
pub use include::{Include, Link};
pub use predicate::{CompareOp, Filter, Predicate};
pub use record::{Record, Value};
