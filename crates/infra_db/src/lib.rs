//! Infrastructure Database Layer
//!
//! This crate provides the data-access layer of the catalog: a generic
//! transactional repository over a persistent context, with an in-memory
//! store and a PostgreSQL store behind a common [`Store`] capability.
//!
//! # Architecture
//!
//! - [`Repository<T>`] exposes the uniform read, write and commit contract
//!   for one entity type
//! - [`DbContext`] owns the change tracker (the pending change set) and the
//!   store, and flushes pending changes atomically
//! - [`Store`] implementations read and write untyped records described by
//!   static entity metadata
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{DatabaseConfig, DbContext, PgStore, Repository};
//!
//! let store = PgStore::connect(&DatabaseConfig::from_env()?).await?;
//! let context = DbContext::new(store);
//! let fuels = Repository::<Fuel>::new(context.clone());
//! ```

pub mod context;
pub mod error;
pub mod pool;
pub mod query;
pub mod repository;
pub mod store;
pub mod tracker;

pub use context::DbContext;
pub use error::{DatabaseError, PersistenceFailure, RepositoryError, TrackingError};
pub use pool::{create_pool, DatabaseConfig, DatabasePool};
pub use query::Query;
pub use repository::{Repository, COMMIT_FAILED};
pub use store::{
    BatchOutcome, ChangeBatch, ChangeKind, InMemoryStore, PendingChange, PgStore, Selection, Store,
};
pub use tracker::{ChangeTracker, EntityState, EntryId, TrackedEntry};
