//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! catalog data-access test suite.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built catalog entities and a JSON seed data set
//! - `builders`: Builder patterns for test data construction
//! - `database`: PostgreSQL container management for integration tests
//! - `memory`: In-memory contexts and a store with scripted failures
//! - `assertions`: Assertion helpers for repository results
//! - `generators`: Property-based and fake data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod memory;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use memory::*;
pub use assertions::*;
pub use generators::*;
