//! PostgreSQL storage backend
//!
//! Runs the compiled statements from [`super::sql`] over an sqlx
//! connection pool. Unique constraints live in the database; SQLSTATE
//! 23505 comes back as UniqueViolation with the entity filled in.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::{Pool, Postgres, Row};
use tokio::sync::Mutex as AsyncMutex;

use crate::backends::sql::{
    compile_count, compile_delete_by_key, compile_delete_many, compile_insert,
    compile_insert_many, compile_link, compile_related, compile_select, compile_unlink,
    compile_update_by_key, compile_update_many, compile_upsert, SqlQuery,
};
use crate::backends::{BackendOps, BackendTransaction, RecordQuery, StorageBackend};
use crate::error::{OrmError, OrmResult};
use crate::filter::Filter;
use crate::query::UniqueWhere;
use crate::schema::{EntityDescriptor, RelationDescriptor, Schema};
use crate::transaction::TransactionOptions;
use crate::value::{FieldKind, Record, ScalarValue};

/// Connection pool failures on the PostgreSQL path
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Connection acquisition failed: {0}")]
    AcquisitionFailed(#[from] sqlx::Error),

    #[error("Pool is not connected")]
    NotConnected,

    #[error("Health check failed: {reason}")]
    HealthCheckFailed { reason: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },
}

impl From<PoolError> for OrmError {
    fn from(err: PoolError) -> Self {
        OrmError::Initialization(err.to_string())
    }
}

/// Connection pool tuning
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub test_before_acquire: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            test_before_acquire: true,
        }
    }
}

/// Live pool statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub total_connections: u32,
    pub idle_connections: u32,
}

pub struct PostgresBackend {
    schema: Arc<Schema>,
    url: String,
    config: PoolConfig,
    pool: std::sync::RwLock<Option<Pool<Postgres>>>,
}

impl PostgresBackend {
    pub fn new(schema: Arc<Schema>, url: impl Into<String>, config: PoolConfig) -> Self {
        Self {
            schema,
            url: url.into(),
            config,
            pool: std::sync::RwLock::new(None),
        }
    }

    fn pool(&self) -> OrmResult<Pool<Postgres>> {
        self.pool
            .read()
            .map_err(|_| OrmError::Initialization("pool state poisoned".into()))?
            .clone()
            .ok_or_else(|| PoolError::NotConnected.into())
    }

    pub fn stats(&self) -> OrmResult<PoolStats> {
        let pool = self.pool()?;
        Ok(PoolStats {
            total_connections: pool.size(),
            idle_connections: pool.num_idle() as u32,
        })
    }

    /// Round-trip a trivial query to prove the pool serves connections
    pub async fn health_check(&self) -> OrmResult<Duration> {
        let pool = self.pool()?;
        let start = Instant::now();
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| PoolError::HealthCheckFailed {
                reason: e.to_string(),
            })?;
        let elapsed = start.elapsed();
        tracing::debug!(?elapsed, "postgres health check passed");
        Ok(elapsed)
    }
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    value: &ScalarValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match value {
        ScalarValue::String(s) => query.bind(s.clone()),
        ScalarValue::Int(i) => query.bind(*i),
        ScalarValue::Bool(b) => query.bind(*b),
        ScalarValue::DateTime(dt) => query.bind(*dt),
        ScalarValue::Float(f) => query.bind(*f),
        ScalarValue::Null => query.bind(Option::<String>::None),
    }
}

fn build_query<'q>(compiled: &'q SqlQuery) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    let mut query = sqlx::query(&compiled.sql);
    for param in &compiled.params {
        query = bind_value(query, param);
    }
    query
}

fn decode_row(entity: &EntityDescriptor, row: &PgRow) -> OrmResult<Record> {
    let mut record = Record::new();
    for field in entity.fields {
        let value = match field.kind {
            FieldKind::String => row
                .try_get::<Option<String>, _>(field.name)?
                .map(ScalarValue::String),
            FieldKind::Int => match row.try_get::<Option<i64>, _>(field.name) {
                Ok(v) => v.map(ScalarValue::Int),
                // INTEGER columns decode as i32
                Err(_) => row
                    .try_get::<Option<i32>, _>(field.name)?
                    .map(|v| ScalarValue::Int(v as i64)),
            },
            FieldKind::Bool => row
                .try_get::<Option<bool>, _>(field.name)?
                .map(ScalarValue::Bool),
            FieldKind::DateTime => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(field.name)?
                .map(ScalarValue::DateTime),
        };
        record.insert(field.name, value.unwrap_or(ScalarValue::Null));
    }
    Ok(record)
}

/// Fill the entity behind the generic sqlx error classification
fn map_db_err(entity: &EntityDescriptor, err: sqlx::Error) -> OrmError {
    match OrmError::from(err) {
        OrmError::UniqueViolation { key, .. } => OrmError::UniqueViolation {
            entity: entity.name.to_string(),
            key,
        },
        OrmError::NotFound { .. } => OrmError::not_found(entity.name),
        other => other,
    }
}

async fn fetch_all_records<'e, E>(
    executor: E,
    entity: &EntityDescriptor,
    compiled: &SqlQuery,
) -> OrmResult<Vec<Record>>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    tracing::trace!(sql = %compiled.sql, "postgres query");
    let rows = build_query(compiled)
        .fetch_all(executor)
        .await
        .map_err(|e| map_db_err(entity, e))?;
    rows.iter().map(|row| decode_row(entity, row)).collect()
}

async fn fetch_optional_record<'e, E>(
    executor: E,
    entity: &EntityDescriptor,
    compiled: &SqlQuery,
) -> OrmResult<Option<Record>>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    tracing::trace!(sql = %compiled.sql, "postgres query");
    let row = build_query(compiled)
        .fetch_optional(executor)
        .await
        .map_err(|e| map_db_err(entity, e))?;
    row.map(|row| decode_row(entity, &row)).transpose()
}

async fn execute_rows<'e, E>(
    executor: E,
    entity: &EntityDescriptor,
    compiled: &SqlQuery,
) -> OrmResult<u64>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    tracing::trace!(sql = %compiled.sql, "postgres statement");
    let result = build_query(compiled)
        .execute(executor)
        .await
        .map_err(|e| map_db_err(entity, e))?;
    Ok(result.rows_affected())
}

async fn fetch_count<'e, E>(
    executor: E,
    entity: &EntityDescriptor,
    compiled: &SqlQuery,
) -> OrmResult<u64>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let row = build_query(compiled)
        .fetch_one(executor)
        .await
        .map_err(|e| map_db_err(entity, e))?;
    let count: i64 = row.try_get(0)?;
    Ok(count as u64)
}

fn key_filter(entity: &EntityDescriptor, key: &UniqueWhere) -> OrmResult<SqlQuery> {
    let (descriptor, values) = key.resolve(entity)?;
    let mut params = Vec::new();
    let conditions: Vec<String> = descriptor
        .fields
        .iter()
        .zip(values)
        .map(|(field, value)| {
            params.push(value);
            format!("t0.\"{}\" = ${}", field, params.len())
        })
        .collect();
    Ok(SqlQuery {
        sql: format!(
            "SELECT t0.* FROM \"{}\" AS t0 WHERE {}",
            entity.table,
            conditions.join(" AND ")
        ),
        params,
    })
}

#[async_trait]
impl BackendOps for PostgresBackend {
    async fn select(
        &self,
        entity: &EntityDescriptor,
        query: RecordQuery<'_>,
    ) -> OrmResult<Vec<Record>> {
        let compiled = compile_select(&self.schema, entity, query)?;
        fetch_all_records(&self.pool()?, entity, &compiled).await
    }

    async fn select_by_key(
        &self,
        entity: &EntityDescriptor,
        key: &UniqueWhere,
    ) -> OrmResult<Option<Record>> {
        let compiled = key_filter(entity, key)?;
        fetch_optional_record(&self.pool()?, entity, &compiled).await
    }

    async fn insert(&self, entity: &EntityDescriptor, record: Record) -> OrmResult<Record> {
        let compiled = compile_insert(entity, &record);
        fetch_optional_record(&self.pool()?, entity, &compiled)
            .await?
            .ok_or_else(|| OrmError::Unknown("insert returned no row".into()))
    }

    async fn insert_many(
        &self,
        entity: &EntityDescriptor,
        records: Vec<Record>,
        skip_duplicates: bool,
    ) -> OrmResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let compiled = compile_insert_many(entity, &records, skip_duplicates);
        execute_rows(&self.pool()?, entity, &compiled).await
    }

    async fn update_by_key(
        &self,
        entity: &EntityDescriptor,
        key: &UniqueWhere,
        sets: &[(String, ScalarValue)],
    ) -> OrmResult<Record> {
        let compiled = compile_update_by_key(entity, key, sets)?;
        fetch_optional_record(&self.pool()?, entity, &compiled)
            .await?
            .ok_or_else(|| OrmError::not_found(entity.name))
    }

    async fn update_many(
        &self,
        entity: &EntityDescriptor,
        filter: Option<&Filter>,
        sets: &[(String, ScalarValue)],
    ) -> OrmResult<u64> {
        let compiled = compile_update_many(&self.schema, entity, filter, sets)?;
        execute_rows(&self.pool()?, entity, &compiled).await
    }

    async fn upsert(
        &self,
        entity: &EntityDescriptor,
        key: &UniqueWhere,
        create: Record,
        sets: &[(String, ScalarValue)],
    ) -> OrmResult<Record> {
        let compiled = compile_upsert(entity, key, &create, sets)?;
        fetch_optional_record(&self.pool()?, entity, &compiled)
            .await?
            .ok_or_else(|| OrmError::Unknown("upsert returned no row".into()))
    }

    async fn delete_by_key(
        &self,
        entity: &EntityDescriptor,
        key: &UniqueWhere,
    ) -> OrmResult<Record> {
        let compiled = compile_delete_by_key(entity, key)?;
        fetch_optional_record(&self.pool()?, entity, &compiled)
            .await?
            .ok_or_else(|| OrmError::not_found(entity.name))
    }

    async fn delete_many(
        &self,
        entity: &EntityDescriptor,
        filter: Option<&Filter>,
    ) -> OrmResult<u64> {
        let compiled = compile_delete_many(&self.schema, entity, filter)?;
        execute_rows(&self.pool()?, entity, &compiled).await
    }

    async fn count(&self, entity: &EntityDescriptor, filter: Option<&Filter>) -> OrmResult<u64> {
        let compiled = compile_count(&self.schema, entity, filter)?;
        fetch_count(&self.pool()?, entity, &compiled).await
    }

    async fn related(
        &self,
        entity: &EntityDescriptor,
        relation: &RelationDescriptor,
        record: &Record,
        query: RecordQuery<'_>,
    ) -> OrmResult<Vec<Record>> {
        let target = self.schema.entity(relation.target)?;
        let compiled = compile_related(&self.schema, entity, relation, record, query)?;
        fetch_all_records(&self.pool()?, target, &compiled).await
    }

    async fn link(
        &self,
        relation: &RelationDescriptor,
        left_id: &ScalarValue,
        right_id: &ScalarValue,
    ) -> OrmResult<()> {
        let mut compiled = compile_link(relation)?;
        compiled.params = vec![left_id.clone(), right_id.clone()];
        build_query(&compiled).execute(&self.pool()?).await?;
        Ok(())
    }

    async fn unlink(
        &self,
        relation: &RelationDescriptor,
        left_id: &ScalarValue,
        right_id: &ScalarValue,
    ) -> OrmResult<()> {
        let mut compiled = compile_unlink(relation)?;
        compiled.params = vec![left_id.clone(), right_id.clone()];
        build_query(&compiled).execute(&self.pool()?).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for PostgresBackend {
    async fn connect(&self) -> OrmResult<()> {
        let pool = PgPoolOptions::new()
            .max_connections(self.config.max_connections)
            .min_connections(self.config.min_connections)
            .acquire_timeout(self.config.acquire_timeout)
            .test_before_acquire(self.config.test_before_acquire)
            .connect(&self.url)
            .await
            .map_err(|e| {
                OrmError::Initialization(format!("failed to create database pool: {}", e))
            })?;
        tracing::info!(
            max_connections = self.config.max_connections,
            "database pool created"
        );
        *self
            .pool
            .write()
            .map_err(|_| OrmError::Initialization("pool state poisoned".into()))? = Some(pool);
        Ok(())
    }

    async fn disconnect(&self) -> OrmResult<()> {
        let pool = self
            .pool
            .write()
            .map_err(|_| OrmError::Initialization("pool state poisoned".into()))?
            .take();
        if let Some(pool) = pool {
            pool.close().await;
            tracing::info!("database pool closed");
        }
        Ok(())
    }

    async fn begin(&self, options: &TransactionOptions) -> OrmResult<Arc<dyn BackendTransaction>> {
        let pool = self.pool()?;
        let mut tx = tokio::time::timeout(options.max_wait, pool.begin())
            .await
            .map_err(|_| {
                OrmError::Transaction(format!(
                    "could not acquire transaction within {:?}",
                    options.max_wait
                ))
            })?
            .map_err(|e| OrmError::Transaction(format!("failed to begin transaction: {}", e)))?;
        if let Some(level) = options.isolation_level {
            let sql = format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql());
            sqlx::query(&sql).execute(&mut *tx).await.map_err(|e| {
                OrmError::Transaction(format!("failed to set isolation level: {}", e))
            })?;
            tracing::debug!(?level, "transaction isolation level set");
        }
        Ok(Arc::new(PostgresTransaction {
            schema: self.schema.clone(),
            inner: AsyncMutex::new(Some(tx)),
        }))
    }

    fn as_ops(&self) -> &dyn BackendOps {
        self
    }
}

pub struct PostgresTransaction {
    schema: Arc<Schema>,
    inner: AsyncMutex<Option<sqlx::Transaction<'static, Postgres>>>,
}

fn closed() -> OrmError {
    OrmError::Transaction("transaction has already been committed or rolled back".into())
}

#[async_trait]
impl BackendOps for PostgresTransaction {
    async fn select(
        &self,
        entity: &EntityDescriptor,
        query: RecordQuery<'_>,
    ) -> OrmResult<Vec<Record>> {
        let compiled = compile_select(&self.schema, entity, query)?;
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(closed)?;
        fetch_all_records(&mut **tx, entity, &compiled).await
    }

    async fn select_by_key(
        &self,
        entity: &EntityDescriptor,
        key: &UniqueWhere,
    ) -> OrmResult<Option<Record>> {
        let compiled = key_filter(entity, key)?;
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(closed)?;
        fetch_optional_record(&mut **tx, entity, &compiled).await
    }

    async fn insert(&self, entity: &EntityDescriptor, record: Record) -> OrmResult<Record> {
        let compiled = compile_insert(entity, &record);
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(closed)?;
        fetch_optional_record(&mut **tx, entity, &compiled)
            .await?
            .ok_or_else(|| OrmError::Unknown("insert returned no row".into()))
    }

    async fn insert_many(
        &self,
        entity: &EntityDescriptor,
        records: Vec<Record>,
        skip_duplicates: bool,
    ) -> OrmResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let compiled = compile_insert_many(entity, &records, skip_duplicates);
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(closed)?;
        execute_rows(&mut **tx, entity, &compiled).await
    }

    async fn update_by_key(
        &self,
        entity: &EntityDescriptor,
        key: &UniqueWhere,
        sets: &[(String, ScalarValue)],
    ) -> OrmResult<Record> {
        let compiled = compile_update_by_key(entity, key, sets)?;
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(closed)?;
        fetch_optional_record(&mut **tx, entity, &compiled)
            .await?
            .ok_or_else(|| OrmError::not_found(entity.name))
    }

    async fn update_many(
        &self,
        entity: &EntityDescriptor,
        filter: Option<&Filter>,
        sets: &[(String, ScalarValue)],
    ) -> OrmResult<u64> {
        let compiled = compile_update_many(&self.schema, entity, filter, sets)?;
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(closed)?;
        execute_rows(&mut **tx, entity, &compiled).await
    }

    async fn upsert(
        &self,
        entity: &EntityDescriptor,
        key: &UniqueWhere,
        create: Record,
        sets: &[(String, ScalarValue)],
    ) -> OrmResult<Record> {
        let compiled = compile_upsert(entity, key, &create, sets)?;
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(closed)?;
        fetch_optional_record(&mut **tx, entity, &compiled)
            .await?
            .ok_or_else(|| OrmError::Unknown("upsert returned no row".into()))
    }

    async fn delete_by_key(
        &self,
        entity: &EntityDescriptor,
        key: &UniqueWhere,
    ) -> OrmResult<Record> {
        let compiled = compile_delete_by_key(entity, key)?;
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(closed)?;
        fetch_optional_record(&mut **tx, entity, &compiled)
            .await?
            .ok_or_else(|| OrmError::not_found(entity.name))
    }

    async fn delete_many(
        &self,
        entity: &EntityDescriptor,
        filter: Option<&Filter>,
    ) -> OrmResult<u64> {
        let compiled = compile_delete_many(&self.schema, entity, filter)?;
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(closed)?;
        execute_rows(&mut **tx, entity, &compiled).await
    }

    async fn count(&self, entity: &EntityDescriptor, filter: Option<&Filter>) -> OrmResult<u64> {
        let compiled = compile_count(&self.schema, entity, filter)?;
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(closed)?;
        fetch_count(&mut **tx, entity, &compiled).await
    }

    async fn related(
        &self,
        entity: &EntityDescriptor,
        relation: &RelationDescriptor,
        record: &Record,
        query: RecordQuery<'_>,
    ) -> OrmResult<Vec<Record>> {
        let target = self.schema.entity(relation.target)?;
        let compiled = compile_related(&self.schema, entity, relation, record, query)?;
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(closed)?;
        fetch_all_records(&mut **tx, target, &compiled).await
    }

    async fn link(
        &self,
        relation: &RelationDescriptor,
        left_id: &ScalarValue,
        right_id: &ScalarValue,
    ) -> OrmResult<()> {
        let mut compiled = compile_link(relation)?;
        compiled.params = vec![left_id.clone(), right_id.clone()];
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(closed)?;
        build_query(&compiled).execute(&mut **tx).await?;
        Ok(())
    }

    async fn unlink(
        &self,
        relation: &RelationDescriptor,
        left_id: &ScalarValue,
        right_id: &ScalarValue,
    ) -> OrmResult<()> {
        let mut compiled = compile_unlink(relation)?;
        compiled.params = vec![left_id.clone(), right_id.clone()];
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(closed)?;
        build_query(&compiled).execute(&mut **tx).await?;
        Ok(())
    }
}

#[async_trait]
impl BackendTransaction for PostgresTransaction {
    async fn commit(&self) -> OrmResult<()> {
        let tx = self.inner.lock().await.take().ok_or_else(closed)?;
        tx.commit()
            .await
            .map_err(|e| OrmError::Transaction(format!("failed to commit transaction: {}", e)))
    }

    async fn rollback(&self) -> OrmResult<()> {
        let tx = self.inner.lock().await.take().ok_or_else(closed)?;
        tx.rollback()
            .await
            .map_err(|e| OrmError::Transaction(format!("failed to rollback transaction: {}", e)))
    }

    fn as_ops(&self) -> &dyn BackendOps {
        self
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        if let Ok(guard) = self.inner.try_lock() {
            if guard.is_some() {
                // sqlx rolls the inner transaction back on drop
                tracing::warn!("postgres transaction dropped without commit or rollback");
            }
        }
    }
}
