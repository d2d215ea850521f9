//! Lazy queries over one entity type
//!
//! A [`Query<T>`] describes a selection and runs nothing until a terminal
//! operation executes it. Every execution goes back to the store, so a query
//! can be kept and re-run to observe later writes.

use core_kernel::{Entity, Include, Predicate, Record};
use tracing::debug;

use crate::context::DbContext;
use crate::error::RepositoryError;
use crate::store::Selection;

/// Deferred selection of `T` with optional eager loading
///
/// Tracking queries register every returned row with the context as
/// unchanged and hand back the tracked values of rows the context already
/// knows. Related rows loaded through includes are never tracked.
#[derive(Clone)]
pub struct Query<T> {
    context: DbContext,
    predicate: Predicate<T>,
    includes: Vec<Include<T>>,
    tracking: bool,
    limit: Option<usize>,
}

impl<T> std::fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("predicate", &self.predicate)
            .field("includes", &self.includes)
            .field("tracking", &self.tracking)
            .field("limit", &self.limit)
            .finish()
    }
}

impl<T: Entity> Query<T> {
    pub(crate) fn new(context: DbContext) -> Self {
        Self {
            context,
            predicate: Predicate::all(),
            includes: Vec::new(),
            tracking: true,
            limit: None,
        }
    }

    /// Narrows the selection; successive filters are combined with AND
    pub fn filter(mut self, predicate: Predicate<T>) -> Self {
        self.predicate = self.predicate.and(predicate);
        self
    }

    /// Loads a related-data edge together with each result
    pub fn include(mut self, include: Include<T>) -> Self {
        self.includes.push(include);
        self
    }

    pub fn includes(mut self, includes: impl IntoIterator<Item = Include<T>>) -> Self {
        self.includes.extend(includes);
        self
    }

    /// Leaves the results out of the change tracker
    pub fn as_no_tracking(mut self) -> Self {
        self.tracking = false;
        self
    }

    /// Caps the number of results
    pub fn take(mut self, limit: usize) -> Self {
        self.limit = Some(self.limit.map_or(limit, |current| current.min(limit)));
        self
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn predicate(&self) -> &Predicate<T> {
        &self.predicate
    }

    /// Runs the query and maps every result
    pub fn to_vec(&self) -> Result<Vec<T>, RepositoryError> {
        let selection = self.selection()?;
        let store = self.context.store();
        let records = store.select(&selection)?;
        let related = self
            .lookups(&records)
            .iter()
            .map(|lookup| match lookup {
                Some(selection) => store.select(selection),
                None => Ok(Vec::new()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.assemble(records, related)
    }

    pub async fn to_vec_async(&self) -> Result<Vec<T>, RepositoryError> {
        let selection = self.selection()?;
        let store = self.context.store();
        let records = store.select_async(&selection).await?;
        let mut related = Vec::with_capacity(self.includes.len());
        for lookup in self.lookups(&records) {
            related.push(match lookup {
                Some(selection) => store.select_async(&selection).await?,
                None => Vec::new(),
            });
        }
        self.assemble(records, related)
    }

    /// First result in store order
    pub fn first(&self) -> Result<Option<T>, RepositoryError> {
        Ok(self.clone().take(1).to_vec()?.into_iter().next())
    }

    pub async fn first_async(&self) -> Result<Option<T>, RepositoryError> {
        Ok(self.clone().take(1).to_vec_async().await?.into_iter().next())
    }

    /// Returns true if any row matches, without loading rows
    pub fn any(&self) -> Result<bool, RepositoryError> {
        Ok(self.context.store().exists(&self.selection()?)?)
    }

    pub async fn any_async(&self) -> Result<bool, RepositoryError> {
        let selection = self.selection()?;
        Ok(self.context.store().exists_async(&selection).await?)
    }

    /// Number of matching rows, ignoring [`Query::take`]
    pub fn count(&self) -> Result<u64, RepositoryError> {
        let mut selection = self.selection()?;
        selection.limit = None;
        Ok(self.context.store().count(&selection)?)
    }

    pub async fn count_async(&self) -> Result<u64, RepositoryError> {
        let mut selection = self.selection()?;
        selection.limit = None;
        Ok(self.context.store().count_async(&selection).await?)
    }

    /// Executes the query and iterates the results
    pub fn iter(&self) -> Result<std::vec::IntoIter<T>, RepositoryError> {
        Ok(self.to_vec()?.into_iter())
    }

    fn selection(&self) -> Result<Selection, RepositoryError> {
        self.predicate
            .validate()
            .map_err(|e| RepositoryError::invalid_argument(e.to_string()))?;
        for include in &self.includes {
            include
                .validate()
                .map_err(|e| RepositoryError::invalid_argument(e.to_string()))?;
        }
        Ok(Selection {
            meta: T::meta(),
            filter: self.predicate.filter().clone(),
            limit: self.limit,
        })
    }

    /// One lookup per include, `None` where no parent can have related rows
    fn lookups(&self, records: &[Record]) -> Vec<Option<Selection>> {
        self.includes
            .iter()
            .map(|include| {
                include
                    .lookup(records)
                    .map(|filter| Selection::new(include.target(), filter))
            })
            .collect()
    }

    fn assemble(
        &self,
        records: Vec<Record>,
        related: Vec<Vec<Record>>,
    ) -> Result<Vec<T>, RepositoryError> {
        let records = if self.tracking {
            self.context.attach(T::meta(), records)
        } else {
            records
        };
        debug!(
            entity = T::meta().name,
            rows = records.len(),
            tracking = self.tracking,
            "materialized query"
        );

        let mut entities = Vec::with_capacity(records.len());
        for record in &records {
            let mut entity = T::from_record(record)?;
            for (include, candidates) in self.includes.iter().zip(&related) {
                let mine: Vec<Record> = candidates
                    .iter()
                    .filter(|candidate| include.is_related(record, candidate))
                    .cloned()
                    .collect();
                include.attach(&mut entity, &mine)?;
            }
            entities.push(entity);
        }
        Ok(entities)
    }
}
