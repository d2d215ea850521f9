//! Change tracking
//!
//! The [`ChangeTracker`] is the pending change set of a context. Each entry
//! holds the latest local record of one entity together with its lifecycle
//! state. Entries are kept in registration order, which is also the order a
//! flush applies them in.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use core_kernel::{EntityId, EntityMeta, Record};
use tracing::debug;

use crate::error::TrackingError;
use crate::store::{BatchOutcome, ChangeBatch, ChangeKind, PendingChange};

/// Handle to one tracked entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Not tracked by the context
    Detached,
    /// Matches the store as far as the context knows
    Unchanged,
    /// Registered for insertion
    Added,
    /// Registered for a full-record update
    Modified,
    /// Registered for deletion
    Deleted,
}

impl EntityState {
    /// Returns true for states a flush writes
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            EntityState::Added | EntityState::Modified | EntityState::Deleted
        )
    }
}

/// One entity known to the context
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEntry {
    pub id: EntryId,
    pub meta: &'static EntityMeta,
    pub state: EntityState,
    /// Assigned key, `None` for an added entity the store has not keyed yet
    pub key: Option<EntityId>,
    pub record: Record,
}

/// The pending change set and identity map of a context
#[derive(Debug, Default)]
pub struct ChangeTracker {
    next_id: u64,
    entries: BTreeMap<EntryId, TrackedEntry>,
    by_key: HashMap<(&'static str, EntityId), EntryId>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new entity for insertion
    ///
    /// An entity carrying an assigned key is inserted with that key, so the
    /// key must not be tracked already.
    pub fn add(&mut self, meta: &'static EntityMeta, record: Record) -> Result<EntryId, TrackingError> {
        let key = meta.key_of(&record);
        if let Some(key) = key {
            if self.find(meta, key).is_some() {
                return Err(TrackingError::AlreadyTracked {
                    entity: meta.name,
                    id: key,
                });
            }
        }
        let entry = self.insert_entry(meta, EntityState::Added, key, record);
        debug!(entity = meta.name, entry = %entry, "registered insert");
        Ok(entry)
    }

    /// Tracks a record just read from the store as unchanged
    ///
    /// If the key is tracked already the existing entry wins and its local
    /// record is returned instead of the stored one.
    pub fn attach(&mut self, meta: &'static EntityMeta, record: Record) -> Record {
        let Some(key) = meta.key_of(&record) else {
            return record;
        };
        if let Some(entry) = self.find(meta, key).and_then(|id| self.entries.get(&id)) {
            return entry.record.clone();
        }
        self.insert_entry(meta, EntityState::Unchanged, Some(key), record.clone());
        record
    }

    /// Registers a full-record update
    ///
    /// Updating an entry that is still waiting for insertion only replaces the
    /// values it will be inserted with.
    pub fn update(&mut self, meta: &'static EntityMeta, record: Record) -> Result<EntryId, TrackingError> {
        let key = Self::require_key(meta, &record, "update")?;
        let Some(id) = self.find(meta, key) else {
            let entry = self.insert_entry(meta, EntityState::Modified, Some(key), record);
            debug!(entity = meta.name, entry = %entry, "registered update");
            return Ok(entry);
        };
        let entry = self.entry_mut(id)?;
        match entry.state {
            EntityState::Deleted => {
                return Err(TrackingError::Deleted {
                    entity: meta.name,
                    id: key,
                })
            }
            EntityState::Added => {}
            _ => entry.state = EntityState::Modified,
        }
        entry.record = record;
        debug!(entity = meta.name, entry = %id, state = ?entry.state, "registered update");
        Ok(id)
    }

    /// Registers a deletion
    ///
    /// Removing an entry that was never inserted simply forgets it.
    pub fn remove(&mut self, meta: &'static EntityMeta, record: Record) -> Result<EntryId, TrackingError> {
        let key = Self::require_key(meta, &record, "remove")?;
        let Some(id) = self.find(meta, key) else {
            let entry = self.insert_entry(meta, EntityState::Deleted, Some(key), record);
            debug!(entity = meta.name, entry = %entry, "registered delete");
            return Ok(entry);
        };
        if self.state(id) == EntityState::Added {
            self.detach(id);
            debug!(entity = meta.name, entry = %id, "dropped pending insert");
        } else {
            self.entry_mut(id)?.state = EntityState::Deleted;
            debug!(entity = meta.name, entry = %id, "registered delete");
        }
        Ok(id)
    }

    pub fn get(&self, id: EntryId) -> Option<&TrackedEntry> {
        self.entries.get(&id)
    }

    /// State of an entry, `Detached` once it is no longer tracked
    pub fn state(&self, id: EntryId) -> EntityState {
        self.entries
            .get(&id)
            .map_or(EntityState::Detached, |entry| entry.state)
    }

    /// Assigned key of an entry
    pub fn key(&self, id: EntryId) -> Option<EntityId> {
        self.entries.get(&id).and_then(|entry| entry.key)
    }

    pub fn find(&self, meta: &EntityMeta, key: EntityId) -> Option<EntryId> {
        self.by_key.get(&(meta.table, key)).copied()
    }

    /// Every tracked entry in registration order
    pub fn entries(&self) -> impl Iterator<Item = &TrackedEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_changes(&self) -> bool {
        self.entries.values().any(|entry| entry.state.is_pending())
    }

    /// Forces an entry into `state`
    ///
    /// `Detached` forgets the entry. Any other state needs an assigned key,
    /// except `Added`.
    pub fn set_state(&mut self, id: EntryId, state: EntityState) -> Result<(), TrackingError> {
        if state == EntityState::Detached {
            self.detach(id);
            return Ok(());
        }
        let entry = self.entry_mut(id)?;
        if entry.key.is_none() && state != EntityState::Added {
            return Err(TrackingError::MissingKey {
                entity: entry.meta.name,
                operation: "reset",
            });
        }
        entry.state = state;
        Ok(())
    }

    /// Stops tracking an entry; returns false if it was not tracked
    pub fn detach(&mut self, id: EntryId) -> bool {
        match self.entries.remove(&id) {
            Some(entry) => {
                if let Some(key) = entry.key {
                    self.by_key.remove(&(entry.meta.table, key));
                }
                true
            }
            None => false,
        }
    }

    /// Forgets every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_key.clear();
    }

    /// The pending changes in the order they were registered
    pub fn batch(&self) -> ChangeBatch {
        self.entries
            .values()
            .filter_map(|entry| {
                let kind = match entry.state {
                    EntityState::Added => ChangeKind::Insert,
                    EntityState::Modified => ChangeKind::Update,
                    EntityState::Deleted => ChangeKind::Delete,
                    EntityState::Unchanged | EntityState::Detached => return None,
                };
                Some(PendingChange {
                    entry: entry.id,
                    meta: entry.meta,
                    kind,
                    key: entry.key,
                    record: entry.record.clone(),
                })
            })
            .collect()
    }

    /// Moves the entries of a flushed batch to their post-flush state
    ///
    /// Inserted entries take their assigned keys, inserted and updated entries
    /// become unchanged, and deleted entries are forgotten.
    pub fn accept(&mut self, batch: &ChangeBatch, outcome: &BatchOutcome) {
        for (entry, key) in &outcome.assigned {
            if let Some(tracked) = self.entries.get_mut(entry) {
                tracked.key = Some(*key);
                tracked.record.set(tracked.meta.key, *key);
                self.by_key.insert((tracked.meta.table, *key), *entry);
            }
        }
        for change in batch.iter() {
            match change.kind {
                ChangeKind::Delete => {
                    self.detach(change.entry);
                }
                ChangeKind::Insert | ChangeKind::Update => {
                    if let Some(tracked) = self.entries.get_mut(&change.entry) {
                        tracked.state = EntityState::Unchanged;
                    }
                }
            }
        }
    }

    fn insert_entry(
        &mut self,
        meta: &'static EntityMeta,
        state: EntityState,
        key: Option<EntityId>,
        record: Record,
    ) -> EntryId {
        self.next_id += 1;
        let id = EntryId(self.next_id);
        if let Some(key) = key {
            self.by_key.insert((meta.table, key), id);
        }
        self.entries.insert(
            id,
            TrackedEntry {
                id,
                meta,
                state,
                key,
                record,
            },
        );
        id
    }

    fn entry_mut(&mut self, id: EntryId) -> Result<&mut TrackedEntry, TrackingError> {
        self.entries
            .get_mut(&id)
            .ok_or(TrackingError::UnknownEntry(id))
    }

    fn require_key(
        meta: &'static EntityMeta,
        record: &Record,
        operation: &'static str,
    ) -> Result<EntityId, TrackingError> {
        meta.key_of(record).ok_or(TrackingError::MissingKey {
            entity: meta.name,
            operation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{Column, ColumnType};

    static FUELS: EntityMeta = EntityMeta {
        name: "Fuel",
        table: "fuels",
        key: "id",
        columns: &[Column::required("name", ColumnType::Text)],
        foreign_keys: &[],
    };

    fn fuel(id: i64, name: &str) -> Record {
        Record::new().with("id", id).with("name", name)
    }

    #[test]
    fn test_add_without_key_is_pending_insert() {
        let mut tracker = ChangeTracker::new();
        let entry = tracker.add(&FUELS, fuel(0, "Diesel")).unwrap();
        assert_eq!(tracker.state(entry), EntityState::Added);
        assert_eq!(tracker.key(entry), None);
        assert_eq!(tracker.batch().len(), 1);
    }

    #[test]
    fn test_add_rejects_tracked_key() {
        let mut tracker = ChangeTracker::new();
        tracker.attach(&FUELS, fuel(3, "Diesel"));
        assert_eq!(
            tracker.add(&FUELS, fuel(3, "Petrol")),
            Err(TrackingError::AlreadyTracked {
                entity: "Fuel",
                id: EntityId::new(3)
            })
        );
    }

    #[test]
    fn test_attach_resolves_identity() {
        let mut tracker = ChangeTracker::new();
        let entry = tracker.update(&FUELS, fuel(3, "Local")).unwrap();
        let record = tracker.attach(&FUELS, fuel(3, "Stored"));
        assert_eq!(record.text("name").unwrap(), "Local");
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.state(entry), EntityState::Modified);
    }

    #[test]
    fn test_update_rules() {
        let mut tracker = ChangeTracker::new();
        assert!(matches!(
            tracker.update(&FUELS, fuel(0, "Diesel")),
            Err(TrackingError::MissingKey { .. })
        ));

        let added = tracker.add(&FUELS, fuel(5, "Diesel")).unwrap();
        tracker.update(&FUELS, fuel(5, "Biodiesel")).unwrap();
        assert_eq!(tracker.state(added), EntityState::Added);

        let deleted = tracker.remove(&FUELS, fuel(6, "Petrol")).unwrap();
        assert_eq!(tracker.state(deleted), EntityState::Deleted);
        assert!(matches!(
            tracker.update(&FUELS, fuel(6, "Petrol")),
            Err(TrackingError::Deleted { .. })
        ));
    }

    #[test]
    fn test_remove_of_added_entry_detaches() {
        let mut tracker = ChangeTracker::new();
        let entry = tracker.add(&FUELS, fuel(5, "Diesel")).unwrap();
        tracker.remove(&FUELS, fuel(5, "Diesel")).unwrap();
        assert_eq!(tracker.state(entry), EntityState::Detached);
        assert!(!tracker.has_changes());
    }

    #[test]
    fn test_accept_assigns_keys_and_settles_states() {
        let mut tracker = ChangeTracker::new();
        let inserted = tracker.add(&FUELS, fuel(0, "Diesel")).unwrap();
        let updated = tracker.update(&FUELS, fuel(2, "Petrol")).unwrap();
        let deleted = tracker.remove(&FUELS, fuel(3, "Kerosene")).unwrap();
        let batch = tracker.batch();
        let outcome = BatchOutcome {
            affected: 3,
            assigned: vec![(inserted, EntityId::new(9))],
        };
        tracker.accept(&batch, &outcome);

        assert_eq!(tracker.state(inserted), EntityState::Unchanged);
        assert_eq!(tracker.key(inserted), Some(EntityId::new(9)));
        assert_eq!(tracker.find(&FUELS, EntityId::new(9)), Some(inserted));
        assert_eq!(tracker.state(updated), EntityState::Unchanged);
        assert_eq!(tracker.state(deleted), EntityState::Detached);
        assert!(tracker.batch().is_empty());
    }

    #[test]
    fn test_set_state_needs_key_to_reset() {
        let mut tracker = ChangeTracker::new();
        let entry = tracker.add(&FUELS, fuel(0, "Diesel")).unwrap();
        assert!(tracker.set_state(entry, EntityState::Unchanged).is_err());
        tracker.set_state(entry, EntityState::Detached).unwrap();
        assert!(tracker.is_empty());
    }
}
