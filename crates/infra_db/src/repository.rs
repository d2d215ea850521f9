//! Generic transactional repository
//!
//! [`Repository<T>`] gives every entity type the same read, write and commit
//! contract over a shared [`DbContext`]. Single-entity write helpers commit
//! immediately; the `_without_commit` variants and [`Repository::remove`]
//! only register changes for a later [`Repository::commit`].
//!
//! # Commit failures
//!
//! A commit that hits a write conflict does not return an error. The
//! repository resets every pending entry to unchanged (entries without a
//! stored counterpart are detached), flushes once more so the context ends up
//! consistent with the store, records a [`PersistenceFailure`] on the context
//! and returns [`COMMIT_FAILED`]. Any other store failure is returned as
//! [`RepositoryError::Database`].
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_catalog::Fuel;
//! use infra_db::{DbContext, Repository};
//!
//! let context = DbContext::in_memory();
//! let fuels = Repository::<Fuel>::new(context.clone());
//! let diesel = fuels.insert(Fuel::new("Diesel"))?;
//! assert!(fuels.get_by_id(diesel.id)?.is_some());
//! ```

use std::fmt;
use std::marker::PhantomData;

use core_kernel::{Entity, EntityId, Include, Predicate};
use tracing::{debug, error, instrument, warn};

use crate::context::DbContext;
use crate::error::{DatabaseError, PersistenceFailure, RepositoryError};
use crate::query::Query;
use crate::tracker::{EntityState, EntryId};

/// Returned by committing operations when the flush hit a write conflict
pub const COMMIT_FAILED: i64 = -1;

/// Uniform data access for one entity type
pub struct Repository<T> {
    context: DbContext,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &T::meta().name)
            .field("context", &self.context)
            .finish()
    }
}

impl<T: Entity> Repository<T> {
    /// Creates a repository over the given context
    ///
    /// # Arguments
    ///
    /// * `context` - The unit of work this repository reads and writes through
    pub fn new(context: DbContext) -> Self {
        Self {
            context,
            _entity: PhantomData,
        }
    }

    pub fn context(&self) -> &DbContext {
        &self.context
    }

    /// Every entity of type `T`, tracked when read
    pub fn get_all(&self) -> Query<T> {
        self.context.query()
    }

    /// Every entity of type `T`, never registered with the context
    pub fn get_all_no_tracking(&self) -> Query<T> {
        self.context.query().as_no_tracking()
    }

    /// Returns true if at least one entity matches `predicate`
    pub fn any(&self, predicate: Predicate<T>) -> Result<bool, RepositoryError> {
        self.get_all().filter(predicate).any()
    }

    pub async fn any_async(&self, predicate: Predicate<T>) -> Result<bool, RepositoryError> {
        self.get_all().filter(predicate).any_async().await
    }

    /// First entity matching `predicate`, with every include loaded
    ///
    /// # Returns
    ///
    /// `None` when nothing matches. Among several matches the one with the
    /// lowest identifier is returned.
    pub fn get(
        &self,
        predicate: Predicate<T>,
        includes: &[Include<T>],
    ) -> Result<Option<T>, RepositoryError> {
        self.get_many(predicate, includes).first()
    }

    pub async fn get_async(
        &self,
        predicate: Predicate<T>,
        includes: &[Include<T>],
    ) -> Result<Option<T>, RepositoryError> {
        self.get_many(predicate, includes).first_async().await
    }

    pub fn get_by_id(&self, id: EntityId) -> Result<Option<T>, RepositoryError> {
        self.get(Predicate::id_eq(id), &[])
    }

    pub async fn get_by_id_async(&self, id: EntityId) -> Result<Option<T>, RepositoryError> {
        self.get_async(Predicate::id_eq(id), &[]).await
    }

    /// Lazy query of every entity matching `predicate`
    pub fn get_many(&self, predicate: Predicate<T>, includes: &[Include<T>]) -> Query<T> {
        self.get_all()
            .filter(predicate)
            .includes(includes.iter().copied())
    }

    /// Registers `entity` for insertion and commits
    ///
    /// # Returns
    ///
    /// The entity carrying its store-assigned identifier. When the commit hits
    /// a conflict the identifier stays unassigned and the diagnostic is on the
    /// context.
    pub fn insert(&self, entity: impl Into<Option<T>>) -> Result<T, RepositoryError> {
        let mut entity = required(entity)?;
        let entry = self.context.add(&entity)?;
        self.commit()?;
        self.assign_key(&mut entity, entry);
        Ok(entity)
    }

    pub async fn insert_async(&self, entity: impl Into<Option<T>>) -> Result<T, RepositoryError> {
        let mut entity = required(entity)?;
        let entry = self.context.add(&entity)?;
        self.commit_async().await?;
        self.assign_key(&mut entity, entry);
        Ok(entity)
    }

    /// Registers `entity` for insertion without committing
    ///
    /// # Returns
    ///
    /// The registered entity and its entry. The entity keeps the identifier
    /// it was given; the entry yields the store-assigned key through
    /// [`DbContext::entry_key`] once a later commit succeeds.
    pub fn insert_without_commit(
        &self,
        entity: impl Into<Option<T>>,
    ) -> Result<(T, EntryId), RepositoryError> {
        let entity = required(entity)?;
        let entry = self.context.add(&entity)?;
        Ok((entity, entry))
    }

    /// Registers every entity for insertion and commits once
    ///
    /// An empty vector is a no-op commit returning 0.
    pub fn insert_bulk(&self, entities: impl Into<Option<Vec<T>>>) -> Result<i64, RepositoryError> {
        let entities = required_all(entities)?;
        self.context.add_range(&entities)?;
        self.commit()
    }

    pub async fn insert_bulk_async(
        &self,
        entities: impl Into<Option<Vec<T>>>,
    ) -> Result<i64, RepositoryError> {
        let entities = required_all(entities)?;
        self.context.add_range(&entities)?;
        self.commit_async().await
    }

    /// Replaces the stored record of `entity` and commits
    ///
    /// # Returns
    ///
    /// 1 on success, [`COMMIT_FAILED`] when the registration is refused or the
    /// commit hits a conflict
    pub fn update(&self, entity: impl Into<Option<T>>) -> Result<i64, RepositoryError> {
        let entity = required(entity)?;
        if self.register_update(&entity) == COMMIT_FAILED {
            return Ok(COMMIT_FAILED);
        }
        Ok(succeeded(self.commit()?))
    }

    pub async fn update_async(&self, entity: impl Into<Option<T>>) -> Result<i64, RepositoryError> {
        let entity = required(entity)?;
        if self.register_update(&entity) == COMMIT_FAILED {
            return Ok(COMMIT_FAILED);
        }
        Ok(succeeded(self.commit_async().await?))
    }

    /// Registers a full-record update without committing; 1 or [`COMMIT_FAILED`]
    pub fn update_without_commit(&self, entity: impl Into<Option<T>>) -> Result<i64, RepositoryError> {
        let entity = required(entity)?;
        Ok(self.register_update(&entity))
    }

    /// Registers `entity` for deletion and commits
    ///
    /// # Returns
    ///
    /// The number of rows written, or [`COMMIT_FAILED`] on a conflict
    pub fn delete(&self, entity: impl Into<Option<T>>) -> Result<i64, RepositoryError> {
        let entity = required(entity)?;
        self.context.remove(&entity)?;
        self.commit()
    }

    pub async fn delete_async(&self, entity: impl Into<Option<T>>) -> Result<i64, RepositoryError> {
        let entity = required(entity)?;
        self.context.remove(&entity)?;
        self.commit_async().await
    }

    /// Registers every entity for deletion and commits once
    pub fn delete_bulk(&self, entities: impl Into<Option<Vec<T>>>) -> Result<i64, RepositoryError> {
        let entities = required_all(entities)?;
        self.context.remove_range(&entities)?;
        self.commit()
    }

    pub async fn delete_bulk_async(
        &self,
        entities: impl Into<Option<Vec<T>>>,
    ) -> Result<i64, RepositoryError> {
        let entities = required_all(entities)?;
        self.context.remove_range(&entities)?;
        self.commit_async().await
    }

    /// Registers `entity` for deletion without committing
    ///
    /// # Returns
    ///
    /// 1 on success, [`COMMIT_FAILED`] when the registration is refused
    pub fn remove(&self, entity: impl Into<Option<T>>) -> Result<i64, RepositoryError> {
        let entity = required(entity)?;
        match self.context.remove(&entity) {
            Ok(_) => Ok(1),
            Err(error) => {
                warn!(entity = T::meta().name, %error, "remove refused");
                Ok(COMMIT_FAILED)
            }
        }
    }

    /// Flushes the pending change set of the context
    ///
    /// # Returns
    ///
    /// The number of rows written, or [`COMMIT_FAILED`] after recovering from
    /// a write conflict
    ///
    /// # Errors
    ///
    /// Store failures other than write conflicts
    #[instrument(skip(self), fields(entity = T::meta().name))]
    pub fn commit(&self) -> Result<i64, RepositoryError> {
        match self.context.save_changes() {
            Ok(affected) => Ok(affected as i64),
            Err(error) if error.is_update_conflict() => {
                reset_pending(&self.context);
                // Nothing is pending after the reset, so this flush returns 0 without a store call
                let retry = self.context.save_changes().map(|_| ());
                self.report(&error, retry);
                Ok(COMMIT_FAILED)
            }
            Err(error) => Err(error.into()),
        }
    }

    #[instrument(skip(self), fields(entity = T::meta().name))]
    pub async fn commit_async(&self) -> Result<i64, RepositoryError> {
        match self.context.save_changes_async().await {
            Ok(affected) => Ok(affected as i64),
            Err(error) if error.is_update_conflict() => {
                reset_pending(&self.context);
                // Nothing is pending after the reset, so this flush returns 0 without a store call
                let retry = self.context.save_changes_async().await.map(|_| ());
                self.report(&error, retry);
                Ok(COMMIT_FAILED)
            }
            Err(error) => Err(error.into()),
        }
    }

    fn register_update(&self, entity: &T) -> i64 {
        match self.context.update(entity) {
            Ok(_) => 1,
            Err(error) => {
                warn!(entity = T::meta().name, %error, "update refused");
                COMMIT_FAILED
            }
        }
    }

    fn assign_key(&self, entity: &mut T, entry: EntryId) {
        if let Some(key) = self.context.entry_key(entry) {
            entity.set_id(key);
        }
    }

    fn report(&self, original: &DatabaseError, retry: Result<(), DatabaseError>) {
        let failure = PersistenceFailure::from_attempts(original, retry);
        error!(entity = T::meta().name, %failure, "commit failed");
        self.context.record_failure(failure);
    }
}

/// Forces every pending entry back to unchanged
///
/// Entries without a stored counterpart cannot be unchanged and are detached.
fn reset_pending(context: &DbContext) {
    let pending = context.pending_entries();
    warn!(entries = pending.len(), "resetting pending changes after conflict");
    for entry in pending {
        if context.set_state(entry.id, EntityState::Unchanged).is_err() {
            context.detach(entry.id);
            debug!(entry = %entry.id, "detached entry without stored counterpart");
        }
    }
}

fn succeeded(result: i64) -> i64 {
    if result == COMMIT_FAILED {
        COMMIT_FAILED
    } else {
        1
    }
}

fn required<T: Entity>(entity: impl Into<Option<T>>) -> Result<T, RepositoryError> {
    entity.into().ok_or_else(|| {
        RepositoryError::invalid_argument(format!("{} must not be null", T::meta().name))
    })
}

fn required_all<T: Entity>(entities: impl Into<Option<Vec<T>>>) -> Result<Vec<T>, RepositoryError> {
    entities.into().ok_or_else(|| {
        RepositoryError::invalid_argument(format!(
            "{} collection must not be null",
            T::meta().name
        ))
    })
}
