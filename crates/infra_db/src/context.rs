//! Persistent context
//!
//! A [`DbContext`] is the unit-of-work handle shared by every repository of
//! one logical operation. It owns the change tracker and the store, and
//! flushes the pending change set in one atomic store call.
//!
//! The handle is cheap to clone; clones share the same tracker and store.
//! Locks are never held across an `.await`.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use core_kernel::{Entity, EntityId, EntityMeta, Record};
use tracing::{debug, instrument};

use crate::error::{DatabaseError, PersistenceFailure, TrackingError};
use crate::query::Query;
use crate::store::{ChangeBatch, InMemoryStore, Store};
use crate::tracker::{ChangeTracker, EntityState, EntryId, TrackedEntry};

struct ContextInner {
    store: Arc<dyn Store>,
    tracker: Mutex<ChangeTracker>,
    last_failure: Mutex<Option<PersistenceFailure>>,
}

/// Shared handle to a store and its pending change set
#[derive(Clone)]
pub struct DbContext {
    inner: Arc<ContextInner>,
}

impl fmt::Debug for DbContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbContext")
            .field("store", &self.inner.store)
            .field("tracked", &self.tracker().len())
            .finish()
    }
}

impl DbContext {
    pub fn new(store: impl Store + 'static) -> Self {
        Self::with_store(Arc::new(store))
    }

    pub fn with_store(store: Arc<dyn Store>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                store,
                tracker: Mutex::new(ChangeTracker::new()),
                last_failure: Mutex::new(None),
            }),
        }
    }

    /// Context over a fresh [`InMemoryStore`]
    pub fn in_memory() -> Self {
        Self::new(InMemoryStore::new())
    }

    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    /// Collection view over every entity of type `T`, tracking by default
    pub fn query<T: Entity>(&self) -> Query<T> {
        Query::new(self.clone())
    }

    /// Registers `entity` for insertion
    pub fn add<T: Entity>(&self, entity: &T) -> Result<EntryId, TrackingError> {
        self.tracker().add(T::meta(), entity.to_record())
    }

    /// Registers every entity for insertion, stopping at the first refusal
    pub fn add_range<T: Entity>(&self, entities: &[T]) -> Result<Vec<EntryId>, TrackingError> {
        let mut tracker = self.tracker();
        entities
            .iter()
            .map(|entity| tracker.add(T::meta(), entity.to_record()))
            .collect()
    }

    /// Registers a full-record update of `entity`
    pub fn update<T: Entity>(&self, entity: &T) -> Result<EntryId, TrackingError> {
        self.tracker().update(T::meta(), entity.to_record())
    }

    /// Registers `entity` for deletion
    pub fn remove<T: Entity>(&self, entity: &T) -> Result<EntryId, TrackingError> {
        self.tracker().remove(T::meta(), entity.to_record())
    }

    /// Registers every entity for deletion, stopping at the first refusal
    pub fn remove_range<T: Entity>(&self, entities: &[T]) -> Result<Vec<EntryId>, TrackingError> {
        let mut tracker = self.tracker();
        entities
            .iter()
            .map(|entity| tracker.remove(T::meta(), entity.to_record()))
            .collect()
    }

    /// Tracks rows read by a tracking query and returns their local records
    pub(crate) fn attach(&self, meta: &'static EntityMeta, records: Vec<Record>) -> Vec<Record> {
        let mut tracker = self.tracker();
        records
            .into_iter()
            .map(|record| tracker.attach(meta, record))
            .collect()
    }

    /// Snapshot of every tracked entry in registration order
    pub fn entries(&self) -> Vec<TrackedEntry> {
        self.tracker().entries().cloned().collect()
    }

    /// Snapshot of the entries a flush would write
    pub fn pending_entries(&self) -> Vec<TrackedEntry> {
        self.tracker()
            .entries()
            .filter(|entry| entry.state.is_pending())
            .cloned()
            .collect()
    }

    pub fn entry_state(&self, entry: EntryId) -> EntityState {
        self.tracker().state(entry)
    }

    /// Key of an entry, assigned by the store once its insert is flushed
    pub fn entry_key(&self, entry: EntryId) -> Option<EntityId> {
        self.tracker().key(entry)
    }

    /// Forces an entry into `state` without touching the store
    pub fn set_state(&self, entry: EntryId, state: EntityState) -> Result<(), TrackingError> {
        self.tracker().set_state(entry, state)
    }

    pub fn detach(&self, entry: EntryId) -> bool {
        self.tracker().detach(entry)
    }

    pub fn has_changes(&self) -> bool {
        self.tracker().has_changes()
    }

    /// Forgets every tracked entry
    pub fn clear(&self) {
        self.tracker().clear();
    }

    /// Flushes the pending change set and returns the number of rows written
    ///
    /// An empty change set returns 0 without calling the store. On failure
    /// the tracker is left as it was.
    #[instrument(skip(self))]
    pub fn save_changes(&self) -> Result<usize, DatabaseError> {
        let batch = self.tracker().batch();
        if batch.is_empty() {
            return Ok(0);
        }
        let outcome = self.inner.store.apply(&batch)?;
        Ok(self.accept(&batch, outcome))
    }

    /// Async variant of [`DbContext::save_changes`]
    #[instrument(skip(self))]
    pub async fn save_changes_async(&self) -> Result<usize, DatabaseError> {
        let batch = self.tracker().batch();
        if batch.is_empty() {
            return Ok(0);
        }
        let outcome = self.inner.store.apply_async(&batch).await?;
        Ok(self.accept(&batch, outcome))
    }

    fn accept(&self, batch: &ChangeBatch, outcome: crate::store::BatchOutcome) -> usize {
        self.tracker().accept(batch, &outcome);
        debug!(affected = outcome.affected, "flushed pending changes");
        outcome.affected
    }

    /// Diagnostic of the most recent absorbed commit failure
    pub fn last_failure(&self) -> Option<PersistenceFailure> {
        lock(&self.inner.last_failure).clone()
    }

    /// Takes the diagnostic, leaving none behind
    pub fn take_last_failure(&self) -> Option<PersistenceFailure> {
        lock(&self.inner.last_failure).take()
    }

    pub(crate) fn record_failure(&self, failure: PersistenceFailure) {
        *lock(&self.inner.last_failure) = Some(failure);
    }

    fn tracker(&self) -> MutexGuard<'_, ChangeTracker> {
        lock(&self.inner.tracker)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
