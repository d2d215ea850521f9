//! In-memory store
//!
//! Tables live in a map keyed by table name and are created on first use from
//! the metadata of the rows written to them. A batch is applied to a copy of
//! the tables and the copy replaces the live state only if every change and
//! every constraint check succeeds.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use core_kernel::{EntityId, EntityMeta, Record};
use tracing::debug;

use super::{BatchOutcome, ChangeBatch, ChangeKind, PendingChange, Selection, Store};
use crate::error::DatabaseError;

#[derive(Debug, Clone)]
struct Table {
    meta: &'static EntityMeta,
    /// Highest key handed out or inserted so far
    sequence: i64,
    rows: BTreeMap<i64, Record>,
}

impl Table {
    fn new(meta: &'static EntityMeta) -> Self {
        Self {
            meta,
            sequence: 0,
            rows: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Tables(HashMap<&'static str, Table>);

impl Tables {
    fn table(&self, meta: &EntityMeta) -> Option<&Table> {
        self.0.get(meta.table)
    }

    fn table_mut(&mut self, meta: &'static EntityMeta) -> &mut Table {
        self.0
            .entry(meta.table)
            .or_insert_with(|| Table::new(meta))
    }

    fn contains_key(&self, meta: &EntityMeta, key: i64) -> bool {
        self.table(meta).is_some_and(|table| table.rows.contains_key(&key))
    }
}

/// Store keeping every table in process memory
///
/// Enforces required columns, maximum text lengths, column types, unique
/// columns and foreign keys. Updating or deleting a row that does not exist
/// is reported as a concurrency conflict.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every row of a table in key order
    pub fn snapshot(&self, meta: &EntityMeta) -> Vec<Record> {
        self.lock()
            .table(meta)
            .map(|table| table.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn matching(&self, selection: &Selection) -> Vec<Record> {
        let tables = self.lock();
        let Some(table) = tables.table(selection.meta) else {
            return Vec::new();
        };
        let rows = table
            .rows
            .values()
            .filter(|row| selection.filter.matches(row))
            .cloned();
        match selection.limit {
            Some(limit) => rows.take(limit).collect(),
            None => rows.collect(),
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn select(&self, selection: &Selection) -> Result<Vec<Record>, DatabaseError> {
        Ok(self.matching(selection))
    }

    fn exists(&self, selection: &Selection) -> Result<bool, DatabaseError> {
        let tables = self.lock();
        Ok(tables.table(selection.meta).is_some_and(|table| {
            table
                .rows
                .values()
                .any(|row| selection.filter.matches(row))
        }))
    }

    fn count(&self, selection: &Selection) -> Result<u64, DatabaseError> {
        Ok(self.matching(selection).len() as u64)
    }

    fn apply(&self, batch: &ChangeBatch) -> Result<BatchOutcome, DatabaseError> {
        let mut live = self.lock();
        let mut working = live.clone();
        let mut outcome = BatchOutcome::default();

        for change in batch.iter() {
            match change.kind {
                ChangeKind::Insert => {
                    let key = insert(&mut working, change)?;
                    outcome.assigned.push((change.entry, EntityId::new(key)));
                }
                ChangeKind::Update => update(&mut working, change)?,
                ChangeKind::Delete => delete(&mut working, change)?,
            }
            outcome.affected += 1;
        }
        check_foreign_keys(&working)?;

        *live = working;
        debug!(affected = outcome.affected, "applied batch in memory");
        Ok(outcome)
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

fn insert(tables: &mut Tables, change: &PendingChange) -> Result<i64, DatabaseError> {
    let meta = change.meta;
    check_columns(meta, &change.record)?;
    let table = tables.table_mut(meta);
    let key = match change.key {
        Some(key) if table.rows.contains_key(&key.value()) => {
            return Err(DatabaseError::duplicate(meta.table, meta.key, key));
        }
        Some(key) => key.value(),
        None => table.sequence + 1,
    };
    table.sequence = table.sequence.max(key);

    let mut row = change.record.clone();
    row.set(meta.key, key);
    check_unique(table, key, &row)?;
    table.rows.insert(key, row);
    Ok(key)
}

fn update(tables: &mut Tables, change: &PendingChange) -> Result<(), DatabaseError> {
    let meta = change.meta;
    let key = existing_key(tables, change)?;
    check_columns(meta, &change.record)?;
    let table = tables.table_mut(meta);
    let mut row = change.record.clone();
    row.set(meta.key, key);
    check_unique(table, key, &row)?;
    table.rows.insert(key, row);
    Ok(())
}

fn delete(tables: &mut Tables, change: &PendingChange) -> Result<(), DatabaseError> {
    let key = existing_key(tables, change)?;
    tables.table_mut(change.meta).rows.remove(&key);
    Ok(())
}

fn existing_key(tables: &Tables, change: &PendingChange) -> Result<i64, DatabaseError> {
    let meta = change.meta;
    let key = change.key.unwrap_or(EntityId::UNASSIGNED);
    if tables.contains_key(meta, key.value()) {
        Ok(key.value())
    } else {
        Err(DatabaseError::missing_row(meta.table, key))
    }
}

fn check_columns(meta: &EntityMeta, record: &Record) -> Result<(), DatabaseError> {
    if let Some((column, _)) = record.iter().find(|(column, _)| !meta.has_column(column)) {
        return Err(DatabaseError::QueryFailed(format!(
            "column \"{}\" of relation \"{}\" does not exist",
            column, meta.table
        )));
    }
    for column in meta.columns {
        let value = record.get(column.name);
        if value.is_null() && !column.nullable {
            return Err(DatabaseError::ConstraintViolation(format!(
                "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                column.name, meta.table
            )));
        }
        if !column.ty.accepts(value) {
            return Err(DatabaseError::QueryFailed(format!(
                "column \"{}\" is of type {:?} but expression is of type {}",
                column.name,
                column.ty,
                value.kind()
            )));
        }
        if let (Some(max_len), Some(text)) = (column.max_len, value.as_text()) {
            if text.chars().count() > max_len {
                return Err(DatabaseError::ConstraintViolation(format!(
                    "value too long for column \"{}\" of relation \"{}\" (max {})",
                    column.name, meta.table, max_len
                )));
            }
        }
    }
    Ok(())
}

fn check_unique(table: &Table, key: i64, row: &Record) -> Result<(), DatabaseError> {
    for column in table.meta.columns.iter().filter(|column| column.unique) {
        let value = row.get(column.name);
        if value.is_null() {
            continue;
        }
        let taken = table
            .rows
            .iter()
            .any(|(other, existing)| *other != key && existing.get(column.name) == value);
        if taken {
            return Err(DatabaseError::duplicate(table.meta.table, column.name, value));
        }
    }
    Ok(())
}

fn check_foreign_keys(tables: &Tables) -> Result<(), DatabaseError> {
    for table in tables.0.values() {
        for foreign_key in table.meta.foreign_keys {
            for row in table.rows.values() {
                let Some(target) = row.get(foreign_key.column).as_int() else {
                    continue;
                };
                if !tables.contains_key(foreign_key.references, target) {
                    return Err(DatabaseError::ForeignKeyViolation(format!(
                        "{}.{} = {} has no matching row in {}",
                        table.meta.table,
                        foreign_key.column,
                        target,
                        foreign_key.references.table
                    )));
                }
            }
        }
    }
    Ok(())
}
