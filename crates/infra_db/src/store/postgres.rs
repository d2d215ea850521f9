//! PostgreSQL store
//!
//! SQL is generated at runtime from entity metadata with SQLx's
//! `QueryBuilder`; every value travels as a bind parameter and every
//! identifier is quoted. A batch runs inside one transaction, so a failing
//! change rolls back the whole flush.
//!
//! The blocking half of [`Store`] drives the async half on the caller's
//! multi-threaded tokio runtime through `block_in_place`, or on a private
//! runtime when the caller runs outside tokio. Blocking calls from a
//! current-thread runtime fail with [`DatabaseError::ConnectionFailed`].

use std::future::Future;

use async_trait::async_trait;
use core_kernel::{ColumnType, EntityId, EntityMeta, Filter, Record, Value};
use once_cell::sync::OnceCell;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};
use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};
use tracing::{debug, info, instrument};

use super::{BatchOutcome, ChangeBatch, ChangeKind, PendingChange, Selection, Store};
use crate::error::DatabaseError;
use crate::pool::{create_pool, DatabaseConfig, DatabasePool};

static FALLBACK_RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// Store backed by a PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DatabasePool,
}

impl PgStore {
    /// Creates a store over an existing pool
    ///
    /// # Arguments
    ///
    /// * `pool` - The PostgreSQL connection pool
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Creates the pool described by `config` and wraps it
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        Ok(Self::new(create_pool(config).await?))
    }

    /// Blocking variant of [`PgStore::connect`]
    ///
    /// Outside a tokio runtime the pool is bound to the private runtime the
    /// blocking operations run on, so the store stays usable from plain
    /// threads.
    pub fn connect_blocking(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        block_on(Self::connect(config))
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Creates the tables of `metas` that do not exist yet
    ///
    /// Tables are created in the given order, so referenced tables must come
    /// first.
    pub async fn ensure_schema(&self, metas: &[&'static EntityMeta]) -> Result<(), DatabaseError> {
        for meta in metas {
            sqlx::query(&create_table_sql(meta))
                .execute(&self.pool)
                .await?;
            info!(table = meta.table, "ensured table");
        }
        Ok(())
    }

    async fn insert(
        &self,
        tx: &mut sqlx::Transaction<'_, Postgres>,
        change: &PendingChange,
    ) -> Result<EntityId, DatabaseError> {
        let meta = change.meta;
        let mut builder = QueryBuilder::<Postgres>::new(format!("INSERT INTO {} (", quote(meta.table)));
        let mut columns = builder.separated(", ");
        if change.key.is_some() {
            columns.push(quote(meta.key));
        }
        for column in meta.columns {
            columns.push(quote(column.name));
        }
        builder.push(") VALUES (");
        let mut first = true;
        if let Some(key) = change.key {
            builder.push_bind(key.value());
            first = false;
        }
        for column in meta.columns {
            if !first {
                builder.push(", ");
            }
            first = false;
            push_value(&mut builder, change.record.get(column.name));
        }
        builder.push(format!(") RETURNING {}", quote(meta.key)));

        let key: i64 = builder.build_query_scalar().fetch_one(&mut **tx).await?;
        if change.key.is_some() {
            advance_identity(tx, meta, key).await?;
        }
        Ok(EntityId::new(key))
    }

    async fn update(
        &self,
        tx: &mut sqlx::Transaction<'_, Postgres>,
        change: &PendingChange,
    ) -> Result<(), DatabaseError> {
        let meta = change.meta;
        let key = change.key.unwrap_or(EntityId::UNASSIGNED);
        let mut builder = QueryBuilder::<Postgres>::new(format!("UPDATE {} SET ", quote(meta.table)));
        for (i, column) in meta.columns.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            builder.push(format!("{} = ", quote(column.name)));
            push_value(&mut builder, change.record.get(column.name));
        }
        builder.push(format!(" WHERE {} = ", quote(meta.key)));
        builder.push_bind(key.value());

        let result = builder.build().execute(&mut **tx).await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::missing_row(meta.table, key));
        }
        Ok(())
    }

    async fn delete(
        &self,
        tx: &mut sqlx::Transaction<'_, Postgres>,
        change: &PendingChange,
    ) -> Result<(), DatabaseError> {
        let meta = change.meta;
        let key = change.key.unwrap_or(EntityId::UNASSIGNED);
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "DELETE FROM {} WHERE {} = ",
            quote(meta.table),
            quote(meta.key)
        ));
        builder.push_bind(key.value());

        let result = builder.build().execute(&mut **tx).await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::missing_row(meta.table, key));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    fn select(&self, selection: &Selection) -> Result<Vec<Record>, DatabaseError> {
        block_on(self.select_async(selection))
    }

    fn exists(&self, selection: &Selection) -> Result<bool, DatabaseError> {
        block_on(self.exists_async(selection))
    }

    fn count(&self, selection: &Selection) -> Result<u64, DatabaseError> {
        block_on(self.count_async(selection))
    }

    fn apply(&self, batch: &ChangeBatch) -> Result<BatchOutcome, DatabaseError> {
        block_on(self.apply_async(batch))
    }

    #[instrument(skip(self, selection), fields(table = selection.meta.table))]
    async fn select_async(&self, selection: &Selection) -> Result<Vec<Record>, DatabaseError> {
        let mut builder = select_query(selection);
        let rows = builder.build().fetch_all(&self.pool).await?;
        debug!(rows = rows.len(), "selected rows");
        rows.iter()
            .map(|row| decode_row(selection.meta, row))
            .collect()
    }

    async fn exists_async(&self, selection: &Selection) -> Result<bool, DatabaseError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT EXISTS (SELECT 1 FROM ");
        builder.push(quote(selection.meta.table));
        builder.push(" WHERE ");
        push_filter(&mut builder, &selection.filter);
        builder.push(")");
        let exists: bool = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(exists)
    }

    async fn count_async(&self, selection: &Selection) -> Result<u64, DatabaseError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM ");
        builder.push(quote(selection.meta.table));
        builder.push(" WHERE ");
        push_filter(&mut builder, &selection.filter);
        let count: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self, batch), fields(changes = batch.len()))]
    async fn apply_async(&self, batch: &ChangeBatch) -> Result<BatchOutcome, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let mut outcome = BatchOutcome::default();

        for change in batch.iter() {
            match change.kind {
                ChangeKind::Insert => {
                    let key = self.insert(&mut tx, change).await?;
                    outcome.assigned.push((change.entry, key));
                }
                ChangeKind::Update => self.update(&mut tx, change).await?,
                ChangeKind::Delete => self.delete(&mut tx, change).await?,
            }
            outcome.affected += 1;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;
        debug!(affected = outcome.affected, "committed batch");
        Ok(outcome)
    }
}

/// Moves the identity sequence of `meta` past an explicitly written key
///
/// Identity columns do not see keys supplied by the insert, so without this
/// the next generated key could collide with one already stored.
async fn advance_identity(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    meta: &EntityMeta,
    key: i64,
) -> Result<(), DatabaseError> {
    sqlx::query(&advance_identity_sql(meta))
        .bind(quote(meta.table))
        .bind(meta.key)
        .bind(key)
        .execute(&mut **tx)
        .await?;
    debug!(table = meta.table, key, "advanced identity sequence");
    Ok(())
}

fn advance_identity_sql(meta: &EntityMeta) -> String {
    format!(
        "SELECT setval(pg_get_serial_sequence($1, $2), GREATEST($3, (SELECT COALESCE(MAX({key}), 0) FROM {table})))",
        key = quote(meta.key),
        table = quote(meta.table)
    )
}

/// Runs a store future to completion from blocking code
///
/// A current-thread runtime cannot block one of its own tasks, so blocking
/// calls made from one fail instead of stalling the runtime.
fn block_on<T>(future: impl Future<Output = Result<T, DatabaseError>>) -> Result<T, DatabaseError> {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::CurrentThread => {
            Err(DatabaseError::ConnectionFailed(
                "blocking store call on a current-thread runtime; use the async operations"
                    .to_string(),
            ))
        }
        Ok(handle) => tokio::task::block_in_place(|| handle.block_on(future)),
        Err(_) => fallback_runtime()?.block_on(future),
    }
}

fn fallback_runtime() -> Result<&'static Runtime, DatabaseError> {
    FALLBACK_RUNTIME.get_or_try_init(|| {
        Builder::new_multi_thread()
            .enable_all()
            .thread_name("catalog-store")
            .build()
            .map_err(|e| DatabaseError::ConnectionFailed(format!("cannot start runtime: {e}")))
    })
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn select_query(selection: &Selection) -> QueryBuilder<'static, Postgres> {
    let meta = selection.meta;
    let mut builder = QueryBuilder::<Postgres>::new("SELECT ");
    let mut columns = builder.separated(", ");
    columns.push(quote(meta.key));
    for column in meta.columns {
        columns.push(quote(column.name));
    }
    builder.push(format!(" FROM {} WHERE ", quote(meta.table)));
    push_filter(&mut builder, &selection.filter);
    builder.push(format!(" ORDER BY {}", quote(meta.key)));
    if let Some(limit) = selection.limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit as i64);
    }
    builder
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: &Value) {
    match value {
        Value::Null => {
            builder.push("NULL");
        }
        Value::Bool(v) => {
            builder.push_bind(*v);
        }
        Value::Int(v) => {
            builder.push_bind(*v);
        }
        Value::Float(v) => {
            builder.push_bind(*v);
        }
        Value::Text(v) => {
            builder.push_bind(v.clone());
        }
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    match filter {
        Filter::True => {
            builder.push("TRUE");
        }
        Filter::Compare { column, op, value } => {
            builder.push(format!("{} {} ", quote(column), op.sql()));
            push_value(builder, value);
        }
        Filter::In { values, .. } if values.is_empty() => {
            builder.push("FALSE");
        }
        Filter::In { column, values } => {
            builder.push(format!("{} IN (", quote(column)));
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                push_value(builder, value);
            }
            builder.push(")");
        }
        Filter::Contains { column, needle } => {
            builder.push(format!("strpos({}, ", quote(column)));
            builder.push_bind(needle.clone());
            builder.push(") > 0");
        }
        Filter::IsNull(column) => {
            builder.push(format!("{} IS NULL", quote(column)));
        }
        Filter::And(filters) => push_joined(builder, filters, " AND ", "TRUE"),
        Filter::Or(filters) => push_joined(builder, filters, " OR ", "FALSE"),
        Filter::Not(inner) => {
            builder.push("NOT (");
            push_filter(builder, inner);
            builder.push(")");
        }
    }
}

fn push_joined(
    builder: &mut QueryBuilder<'_, Postgres>,
    filters: &[Filter],
    separator: &str,
    empty: &str,
) {
    if filters.is_empty() {
        builder.push(empty);
        return;
    }
    builder.push("(");
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            builder.push(separator);
        }
        push_filter(builder, filter);
    }
    builder.push(")");
}

fn decode_row(meta: &EntityMeta, row: &PgRow) -> Result<Record, DatabaseError> {
    let mut record = Record::new().with(meta.key, row.try_get::<i64, _>(meta.key)?);
    for column in meta.columns {
        let value = match column.ty {
            ColumnType::Int => Value::from(row.try_get::<Option<i64>, _>(column.name)?),
            ColumnType::Float => Value::from(row.try_get::<Option<f64>, _>(column.name)?),
            ColumnType::Bool => Value::from(row.try_get::<Option<bool>, _>(column.name)?),
            ColumnType::Text => Value::from(row.try_get::<Option<String>, _>(column.name)?),
        };
        record.set(column.name, value);
    }
    Ok(record)
}

/// DDL creating the table of `meta` if it is missing
pub(crate) fn create_table_sql(meta: &EntityMeta) -> String {
    let mut columns = vec![format!(
        "{} BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY",
        quote(meta.key)
    )];
    for column in meta.columns {
        let mut definition = format!("{} ", quote(column.name));
        definition.push_str(&match (column.ty, column.max_len) {
            (ColumnType::Int, _) => "BIGINT".to_string(),
            (ColumnType::Float, _) => "DOUBLE PRECISION".to_string(),
            (ColumnType::Bool, _) => "BOOLEAN".to_string(),
            (ColumnType::Text, Some(max_len)) => format!("VARCHAR({max_len})"),
            (ColumnType::Text, None) => "TEXT".to_string(),
        });
        if !column.nullable {
            definition.push_str(" NOT NULL");
        }
        if column.unique {
            definition.push_str(" UNIQUE");
        }
        if let Some(foreign_key) = meta
            .foreign_keys
            .iter()
            .find(|foreign_key| foreign_key.column == column.name)
        {
            definition.push_str(&format!(
                " REFERENCES {} ({})",
                quote(foreign_key.references.table),
                quote(foreign_key.references.key)
            ));
        }
        columns.push(definition);
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote(meta.table),
        columns.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{Column, CompareOp, ForeignKey};

    static BANS: EntityMeta = EntityMeta {
        name: "Ban",
        table: "bans",
        key: "id",
        columns: &[Column::required("name", ColumnType::Text).max_len(100)],
        foreign_keys: &[],
    };

    static MEDIA: EntityMeta = EntityMeta {
        name: "Media",
        table: "media",
        key: "id",
        columns: &[
            Column::required("file_size", ColumnType::Int),
            Column::optional("ban_id", ColumnType::Int),
        ],
        foreign_keys: &[ForeignKey {
            column: "ban_id",
            references: &BANS,
        }],
    };

    #[test]
    fn test_select_renders_binds_and_order() {
        let filter = Filter::Compare {
            column: "file_size",
            op: CompareOp::Ge,
            value: Value::Int(10),
        }
        .and(Filter::In {
            column: "ban_id",
            values: vec![Value::Int(1), Value::Int(2)],
        });
        let builder = select_query(&Selection::new(&MEDIA, filter).limit(1));
        assert_eq!(
            builder.sql(),
            "SELECT \"id\", \"file_size\", \"ban_id\" FROM \"media\" WHERE \
             (\"file_size\" >= $1 AND \"ban_id\" IN ($2, $3)) ORDER BY \"id\" LIMIT $4"
        );
    }

    #[test]
    fn test_empty_in_and_contains() {
        let mut builder = QueryBuilder::<Postgres>::new("");
        push_filter(
            &mut builder,
            &Filter::Not(Box::new(Filter::In {
                column: "id",
                values: vec![],
            })),
        );
        assert_eq!(builder.sql(), "NOT (FALSE)");

        let mut builder = QueryBuilder::<Postgres>::new("");
        push_filter(
            &mut builder,
            &Filter::Contains {
                column: "name",
                needle: "%".to_string(),
            },
        );
        assert_eq!(builder.sql(), "strpos(\"name\", $1) > 0");
    }

    #[test]
    fn test_create_table_sql() {
        assert_eq!(
            create_table_sql(&MEDIA),
            "CREATE TABLE IF NOT EXISTS \"media\" (\"id\" BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY, \
             \"file_size\" BIGINT NOT NULL, \"ban_id\" BIGINT REFERENCES \"bans\" (\"id\"))"
        );
        assert!(create_table_sql(&BANS).contains("\"name\" VARCHAR(100) NOT NULL"));
    }

    #[test]
    fn test_advance_identity_sql() {
        assert_eq!(
            advance_identity_sql(&BANS),
            "SELECT setval(pg_get_serial_sequence($1, $2), GREATEST($3, \
             (SELECT COALESCE(MAX(\"id\"), 0) FROM \"bans\")))"
        );
    }

    #[tokio::test]
    async fn test_blocking_call_on_current_thread_runtime_fails() {
        let result = block_on(async { Ok(7) });
        assert!(matches!(result, Err(DatabaseError::ConnectionFailed(_))));

        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/catalog")
            .unwrap();
        let store = PgStore::new(pool);
        let error = store.count(&Selection::all(&BANS)).unwrap_err();
        assert!(error.is_connection_error());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_blocking_call_on_multi_thread_runtime() {
        assert_eq!(block_on(async { Ok(7) }).unwrap(), 7);
    }

    #[test]
    fn test_blocking_call_outside_runtime() {
        assert_eq!(block_on(async { Ok(7) }).unwrap(), 7);
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("we\"ird"), "\"we\"\"ird\"");
    }
}
