//! Storage backend abstraction
//!
//! The dispatch layer talks to storage exclusively through [`BackendOps`],
//! a record-level operation set implemented both by a backend (autocommit)
//! and by its live transactions, so every operation runs identically
//! inside and outside a transaction block.

pub mod memory;
pub mod postgres;
pub mod sql;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::OrmResult;
use crate::filter::Filter;
use crate::query::{OrderBy, UniqueWhere};
use crate::schema::{EntityDescriptor, RelationDescriptor};
use crate::transaction::TransactionOptions;
use crate::value::{Record, ScalarValue};

/// Read shape a backend must honor: filter, full ordering, and a plain
/// forward window. Cursor, distinct and reverse takes are sliced by the
/// dispatcher, which then passes `take: None, skip: 0` here.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordQuery<'a> {
    pub filter: Option<&'a Filter>,
    pub order_by: &'a [OrderBy],
    pub take: Option<i64>,
    pub skip: u64,
}

/// Record-level operation set shared by backends and their transactions
#[async_trait]
pub trait BackendOps: Send + Sync {
    async fn select(
        &self,
        entity: &EntityDescriptor,
        query: RecordQuery<'_>,
    ) -> OrmResult<Vec<Record>>;

    async fn select_by_key(
        &self,
        entity: &EntityDescriptor,
        key: &UniqueWhere,
    ) -> OrmResult<Option<Record>>;

    /// Insert a complete record (defaults already applied); fails with
    /// UniqueViolation when any declared key collides
    async fn insert(&self, entity: &EntityDescriptor, record: Record) -> OrmResult<Record>;

    /// Batch insert, atomic per statement; with `skip_duplicates` rows that
    /// would collide are silently omitted. Returns rows actually inserted.
    async fn insert_many(
        &self,
        entity: &EntityDescriptor,
        records: Vec<Record>,
        skip_duplicates: bool,
    ) -> OrmResult<u64>;

    async fn update_by_key(
        &self,
        entity: &EntityDescriptor,
        key: &UniqueWhere,
        sets: &[(String, ScalarValue)],
    ) -> OrmResult<Record>;

    async fn update_many(
        &self,
        entity: &EntityDescriptor,
        filter: Option<&Filter>,
        sets: &[(String, ScalarValue)],
    ) -> OrmResult<u64>;

    /// Update-or-create as one storage-level operation; exactly one branch
    /// takes effect
    async fn upsert(
        &self,
        entity: &EntityDescriptor,
        key: &UniqueWhere,
        create: Record,
        sets: &[(String, ScalarValue)],
    ) -> OrmResult<Record>;

    async fn delete_by_key(
        &self,
        entity: &EntityDescriptor,
        key: &UniqueWhere,
    ) -> OrmResult<Record>;

    async fn delete_many(
        &self,
        entity: &EntityDescriptor,
        filter: Option<&Filter>,
    ) -> OrmResult<u64>;

    async fn count(&self, entity: &EntityDescriptor, filter: Option<&Filter>) -> OrmResult<u64>;

    /// Records on the far side of a relation of `record`, further
    /// restricted by `query`
    async fn related(
        &self,
        entity: &EntityDescriptor,
        relation: &RelationDescriptor,
        record: &Record,
        query: RecordQuery<'_>,
    ) -> OrmResult<Vec<Record>>;

    /// Attach two ids through an implicit many-to-many join table;
    /// idempotent
    async fn link(
        &self,
        relation: &RelationDescriptor,
        left_id: &ScalarValue,
        right_id: &ScalarValue,
    ) -> OrmResult<()>;

    /// Detach two ids; removing an absent link is a no-op
    async fn unlink(
        &self,
        relation: &RelationDescriptor,
        left_id: &ScalarValue,
        right_id: &ScalarValue,
    ) -> OrmResult<()>;
}

/// A storage engine: the ops surface plus lifecycle and transactions
#[async_trait]
pub trait StorageBackend: BackendOps {
    async fn connect(&self) -> OrmResult<()>;

    async fn disconnect(&self) -> OrmResult<()>;

    /// Open a transaction; acquisition is bounded by `options.max_wait`
    async fn begin(&self, options: &TransactionOptions) -> OrmResult<Arc<dyn BackendTransaction>>;

    /// View as the plain operation surface
    fn as_ops(&self) -> &dyn BackendOps;
}

/// A live transaction: the same ops surface plus commit/rollback.
/// Both finishers take `&self`; finishing twice is a Transaction error.
#[async_trait]
pub trait BackendTransaction: BackendOps {
    async fn commit(&self) -> OrmResult<()>;

    async fn rollback(&self) -> OrmResult<()>;

    /// View as the plain operation surface
    fn as_ops(&self) -> &dyn BackendOps;
}
