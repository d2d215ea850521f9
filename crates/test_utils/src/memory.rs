//! In-Memory Test Helpers
//!
//! Contexts over the in-memory store, and a store wrapper that fails on
//! demand so tests can drive the commit paths a healthy store never takes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use core_kernel::Record;
use infra_db::{
    BatchOutcome, ChangeBatch, DatabaseError, DbContext, InMemoryStore, Selection, Store,
};

/// Creates a context over a fresh in-memory store
pub fn memory_context() -> DbContext {
    DbContext::in_memory()
}

/// Creates a context over a fresh in-memory store, returning the store too
pub fn memory_context_with_store() -> (DbContext, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    (DbContext::with_store(store.clone()), store)
}

/// In-memory store that fails scripted calls
///
/// Queued failures are consumed one per `apply` (or `select`) call, in order.
/// Calls without a queued failure go to the wrapped store.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: InMemoryStore,
    apply_failures: Mutex<VecDeque<DatabaseError>>,
    select_failures: Mutex<VecDeque<DatabaseError>>,
    apply_calls: Mutex<usize>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next unscripted `apply` fail with `error`
    pub fn fail_next_apply(&self, error: DatabaseError) {
        self.apply_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    /// Makes the next unscripted `select` fail with `error`
    pub fn fail_next_select(&self, error: DatabaseError) {
        self.select_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    /// Number of `apply` calls that reached the store, failed or not
    pub fn apply_calls(&self) -> usize {
        *self.apply_calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    fn next_failure(queue: &Mutex<VecDeque<DatabaseError>>) -> Option<DatabaseError> {
        queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
    }
}

#[async_trait]
impl Store for FaultyStore {
    fn select(&self, selection: &Selection) -> Result<Vec<Record>, DatabaseError> {
        match Self::next_failure(&self.select_failures) {
            Some(error) => Err(error),
            None => self.inner.select(selection),
        }
    }

    fn exists(&self, selection: &Selection) -> Result<bool, DatabaseError> {
        self.inner.exists(selection)
    }

    fn count(&self, selection: &Selection) -> Result<u64, DatabaseError> {
        self.inner.count(selection)
    }

    fn apply(&self, batch: &ChangeBatch) -> Result<BatchOutcome, DatabaseError> {
        *self.apply_calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        match Self::next_failure(&self.apply_failures) {
            Some(error) => Err(error),
            None => self.inner.apply(batch),
        }
    }

    async fn select_async(&self, selection: &Selection) -> Result<Vec<Record>, DatabaseError> {
        self.select(selection)
    }

    async fn exists_async(&self, selection: &Selection) -> Result<bool, DatabaseError> {
        self.exists(selection)
    }

    async fn count_async(&self, selection: &Selection) -> Result<u64, DatabaseError> {
        self.count(selection)
    }

    async fn apply_async(&self, batch: &ChangeBatch) -> Result<BatchOutcome, DatabaseError> {
        self.apply(batch)
    }
}

/// Creates a context over a [`FaultyStore`], returning the store too
pub fn faulty_context() -> (DbContext, Arc<FaultyStore>) {
    let store = Arc::new(FaultyStore::new());
    (DbContext::with_store(store.clone()), store)
}
