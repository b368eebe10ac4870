//! In-memory storage engine
//!
//! The default backend for `memory://` datasources and the test suite.
//! Tables keep rows in insertion order; every declared unique key is
//! enforced through a hash index at this layer, never by check-then-insert
//! above it. Transactions snapshot the whole store and serialize behind a
//! gate, so their effects become visible all at once or not at all.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::backends::{BackendOps, BackendTransaction, RecordQuery, StorageBackend};
use crate::error::{OrmError, OrmResult};
use crate::filter::eval::{matches, RelationSource};
use crate::filter::Filter;
use crate::query::{slice_window, sort_records, UniqueWhere};
use crate::schema::{EntityDescriptor, RelationDescriptor, RelationKind, Schema};
use crate::transaction::TransactionOptions;
use crate::value::{Record, ScalarValue};

#[derive(Debug, Clone, Default)]
struct Table {
    next_row: u64,
    rows: BTreeMap<u64, Record>,
    /// unique key name -> composite key value -> row id
    unique: HashMap<String, HashMap<Vec<ScalarValue>, u64>>,
}

#[derive(Debug, Clone, Default)]
struct Store {
    tables: HashMap<String, Table>,
}

pub struct MemoryBackend {
    schema: Arc<Schema>,
    store: Arc<AsyncMutex<Store>>,
    gate: Arc<AsyncMutex<()>>,
}

impl MemoryBackend {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            store: Arc::new(AsyncMutex::new(Store::default())),
            gate: Arc::new(AsyncMutex::new(())),
        }
    }

    /// Run one operation against the store. Waiting on the gate makes
    /// autocommit operations invisible to half-done transactions and vice
    /// versa.
    async fn with_store<R>(
        &self,
        f: impl FnOnce(&Schema, &mut Store) -> OrmResult<R> + Send,
    ) -> OrmResult<R> {
        let _gate = self.gate.lock().await;
        let mut store = self.store.lock().await;
        f(&self.schema, &mut store)
    }
}

/// Relation traversal over a locked store view
struct StoreSource<'a> {
    schema: &'a Schema,
    store: &'a Store,
}

impl RelationSource for StoreSource<'_> {
    fn related(
        &self,
        entity: &EntityDescriptor,
        relation: &RelationDescriptor,
        record: &Record,
    ) -> OrmResult<Vec<Record>> {
        related_records(self.schema, self.store, entity, relation, record)
    }
}

fn table_rows<'s>(store: &'s Store, table: &str) -> impl Iterator<Item = &'s Record> {
    store
        .tables
        .get(table)
        .into_iter()
        .flat_map(|t| t.rows.values())
}

fn related_records(
    schema: &Schema,
    store: &Store,
    _entity: &EntityDescriptor,
    relation: &RelationDescriptor,
    record: &Record,
) -> OrmResult<Vec<Record>> {
    let target = schema.entity(relation.target)?;
    match relation.kind {
        RelationKind::BelongsTo { foreign_key } => {
            let fk = record.value(foreign_key);
            if fk.is_null() {
                return Ok(Vec::new());
            }
            Ok(table_rows(store, target.table)
                .filter(|r| r.value("id") == fk)
                .cloned()
                .collect())
        }
        RelationKind::HasMany { target_key } => {
            let id = record.value("id");
            Ok(table_rows(store, target.table)
                .filter(|r| r.value(target_key) == id)
                .cloned()
                .collect())
        }
        RelationKind::ManyToMany {
            join_table,
            left_key,
            right_key,
        } => {
            let id = record.value("id");
            let right_ids: Vec<ScalarValue> = table_rows(store, join_table)
                .filter(|link| link.value(left_key) == id)
                .map(|link| link.value(right_key))
                .collect();
            // join insertion order decides result order
            let mut out = Vec::with_capacity(right_ids.len());
            for right in right_ids {
                if let Some(rec) = table_rows(store, target.table).find(|r| r.value("id") == right)
                {
                    out.push(rec.clone());
                }
            }
            Ok(out)
        }
    }
}

fn matching_rows(
    schema: &Schema,
    store: &Store,
    entity: &EntityDescriptor,
    filter: Option<&Filter>,
) -> OrmResult<Vec<(u64, Record)>> {
    let candidates: Vec<(u64, Record)> = store
        .tables
        .get(entity.table)
        .map(|t| t.rows.iter().map(|(id, r)| (*id, r.clone())).collect())
        .unwrap_or_default();
    let Some(filter) = filter else {
        return Ok(candidates);
    };
    let source = StoreSource { schema, store };
    let mut out = Vec::new();
    for (id, record) in candidates {
        if matches(schema, entity, filter, &record, &source)? {
            out.push((id, record));
        }
    }
    Ok(out)
}

fn op_select(
    schema: &Schema,
    store: &Store,
    entity: &EntityDescriptor,
    query: RecordQuery<'_>,
) -> OrmResult<Vec<Record>> {
    let mut rows: Vec<Record> = matching_rows(schema, store, entity, query.filter)?
        .into_iter()
        .map(|(_, r)| r)
        .collect();
    sort_records(query.order_by, &mut rows);
    let (start, end) = slice_window(rows.len(), None, query.take, query.skip);
    Ok(rows.drain(..).skip(start).take(end - start).collect())
}

fn find_row_by_key(
    store: &Store,
    entity: &EntityDescriptor,
    key: &UniqueWhere,
) -> OrmResult<Option<u64>> {
    let (descriptor, values) = key.resolve(entity)?;
    Ok(store
        .tables
        .get(entity.table)
        .and_then(|t| t.unique.get(descriptor.name))
        .and_then(|index| index.get(&values))
        .copied())
}

fn op_insert(store: &mut Store, entity: &EntityDescriptor, record: Record) -> OrmResult<Record> {
    let table = store.tables.entry(entity.table.to_string()).or_default();
    for key in entity.unique_keys {
        if let Some(composite) = entity.key_value(key, &record) {
            let collides = table
                .unique
                .get(key.name)
                .is_some_and(|index| index.contains_key(&composite));
            if collides {
                return Err(OrmError::unique_violation(entity.name, key.name));
            }
        }
    }
    let id = table.next_row;
    table.next_row += 1;
    for key in entity.unique_keys {
        if let Some(composite) = entity.key_value(key, &record) {
            table
                .unique
                .entry(key.name.to_string())
                .or_default()
                .insert(composite, id);
        }
    }
    table.rows.insert(id, record.clone());
    Ok(record)
}

fn op_insert_many(
    store: &mut Store,
    entity: &EntityDescriptor,
    records: Vec<Record>,
    skip_duplicates: bool,
) -> OrmResult<u64> {
    // statement-level atomicity: restore the table when the batch aborts
    let before = store.tables.get(entity.table).cloned();
    let mut inserted = 0u64;
    for record in records {
        match op_insert(store, entity, record) {
            Ok(_) => inserted += 1,
            Err(OrmError::UniqueViolation { .. }) if skip_duplicates => continue,
            Err(e) => {
                match before {
                    Some(table) => {
                        store.tables.insert(entity.table.to_string(), table);
                    }
                    None => {
                        store.tables.remove(entity.table);
                    }
                }
                return Err(e);
            }
        }
    }
    Ok(inserted)
}

fn apply_sets(record: &Record, sets: &[(String, ScalarValue)]) -> Record {
    let mut updated = record.clone();
    for (field, value) in sets {
        updated.insert(field.clone(), value.clone());
    }
    updated
}

fn op_update_row(
    store: &mut Store,
    entity: &EntityDescriptor,
    row_id: u64,
    sets: &[(String, ScalarValue)],
) -> OrmResult<Record> {
    let table = store
        .tables
        .get_mut(entity.table)
        .ok_or_else(|| OrmError::not_found(entity.name))?;
    let old = table
        .rows
        .get(&row_id)
        .cloned()
        .ok_or_else(|| OrmError::not_found(entity.name))?;
    let new = apply_sets(&old, sets);

    // verify every changed key before touching any index
    for key in entity.unique_keys {
        let old_composite = entity.key_value(key, &old);
        let new_composite = entity.key_value(key, &new);
        if old_composite == new_composite {
            continue;
        }
        if let Some(composite) = &new_composite {
            let taken = table
                .unique
                .get(key.name)
                .and_then(|index| index.get(composite))
                .is_some_and(|other| *other != row_id);
            if taken {
                return Err(OrmError::unique_violation(entity.name, key.name));
            }
        }
    }
    for key in entity.unique_keys {
        let old_composite = entity.key_value(key, &old);
        let new_composite = entity.key_value(key, &new);
        if old_composite == new_composite {
            continue;
        }
        let index = table.unique.entry(key.name.to_string()).or_default();
        if let Some(composite) = old_composite {
            index.remove(&composite);
        }
        if let Some(composite) = new_composite {
            index.insert(composite, row_id);
        }
    }
    table.rows.insert(row_id, new.clone());
    Ok(new)
}

fn op_update_by_key(
    store: &mut Store,
    entity: &EntityDescriptor,
    key: &UniqueWhere,
    sets: &[(String, ScalarValue)],
) -> OrmResult<Record> {
    let row_id =
        find_row_by_key(store, entity, key)?.ok_or_else(|| OrmError::not_found(entity.name))?;
    op_update_row(store, entity, row_id, sets)
}

fn op_update_many(
    schema: &Schema,
    store: &mut Store,
    entity: &EntityDescriptor,
    filter: Option<&Filter>,
    sets: &[(String, ScalarValue)],
) -> OrmResult<u64> {
    let ids: Vec<u64> = matching_rows(schema, store, entity, filter)?
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    let before = store.tables.get(entity.table).cloned();
    for id in &ids {
        if let Err(e) = op_update_row(store, entity, *id, sets) {
            if let Some(table) = before {
                store.tables.insert(entity.table.to_string(), table);
            }
            return Err(e);
        }
    }
    Ok(ids.len() as u64)
}

fn op_upsert(
    store: &mut Store,
    entity: &EntityDescriptor,
    key: &UniqueWhere,
    create: Record,
    sets: &[(String, ScalarValue)],
) -> OrmResult<Record> {
    match find_row_by_key(store, entity, key)? {
        Some(row_id) => op_update_row(store, entity, row_id, sets),
        None => op_insert(store, entity, create),
    }
}

fn op_delete_row(store: &mut Store, entity: &EntityDescriptor, row_id: u64) -> OrmResult<Record> {
    let table = store
        .tables
        .get_mut(entity.table)
        .ok_or_else(|| OrmError::not_found(entity.name))?;
    let record = table
        .rows
        .remove(&row_id)
        .ok_or_else(|| OrmError::not_found(entity.name))?;
    for key in entity.unique_keys {
        if let Some(composite) = entity.key_value(key, &record) {
            if let Some(index) = table.unique.get_mut(key.name) {
                index.remove(&composite);
            }
        }
    }
    Ok(record)
}

fn op_delete_by_key(
    store: &mut Store,
    entity: &EntityDescriptor,
    key: &UniqueWhere,
) -> OrmResult<Record> {
    let row_id =
        find_row_by_key(store, entity, key)?.ok_or_else(|| OrmError::not_found(entity.name))?;
    op_delete_row(store, entity, row_id)
}

fn op_delete_many(
    schema: &Schema,
    store: &mut Store,
    entity: &EntityDescriptor,
    filter: Option<&Filter>,
) -> OrmResult<u64> {
    let ids: Vec<u64> = matching_rows(schema, store, entity, filter)?
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    for id in &ids {
        op_delete_row(store, entity, *id)?;
    }
    Ok(ids.len() as u64)
}

fn op_related(
    schema: &Schema,
    store: &Store,
    entity: &EntityDescriptor,
    relation: &RelationDescriptor,
    record: &Record,
    query: RecordQuery<'_>,
) -> OrmResult<Vec<Record>> {
    let target = schema.entity(relation.target)?;
    let mut rows = related_records(schema, store, entity, relation, record)?;
    if let Some(filter) = query.filter {
        let source = StoreSource { schema, store };
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if matches(schema, target, filter, &row, &source)? {
                kept.push(row);
            }
        }
        rows = kept;
    }
    sort_records(query.order_by, &mut rows);
    let (start, end) = slice_window(rows.len(), None, query.take, query.skip);
    Ok(rows.drain(..).skip(start).take(end - start).collect())
}

fn join_parts(relation: &RelationDescriptor) -> OrmResult<(&'static str, &'static str, &'static str)> {
    match relation.kind {
        RelationKind::ManyToMany {
            join_table,
            left_key,
            right_key,
        } => Ok((join_table, left_key, right_key)),
        _ => Err(OrmError::validation(format!(
            "relation '{}' is not an implicit many-to-many and cannot be linked",
            relation.name
        ))),
    }
}

/// Index composite for one join row, ordered by column name so both
/// traversal directions of the same join table agree
fn link_composite(
    left_key: &str,
    right_key: &str,
    left_id: &ScalarValue,
    right_id: &ScalarValue,
) -> Vec<ScalarValue> {
    if left_key <= right_key {
        vec![left_id.clone(), right_id.clone()]
    } else {
        vec![right_id.clone(), left_id.clone()]
    }
}

fn op_link(
    store: &mut Store,
    relation: &RelationDescriptor,
    left_id: &ScalarValue,
    right_id: &ScalarValue,
) -> OrmResult<()> {
    let (join_table, left_key, right_key) = join_parts(relation)?;
    let table = store.tables.entry(join_table.to_string()).or_default();
    let composite = link_composite(left_key, right_key, left_id, right_id);
    let index = table.unique.entry("link".to_string()).or_default();
    if index.contains_key(&composite) {
        return Ok(());
    }
    let row_id = table.next_row;
    table.next_row += 1;
    index.insert(composite, row_id);
    let link = Record::new()
        .set(left_key, left_id.clone())
        .set(right_key, right_id.clone());
    table.rows.insert(row_id, link);
    Ok(())
}

fn op_unlink(
    store: &mut Store,
    relation: &RelationDescriptor,
    left_id: &ScalarValue,
    right_id: &ScalarValue,
) -> OrmResult<()> {
    let (join_table, left_key, right_key) = join_parts(relation)?;
    let Some(table) = store.tables.get_mut(join_table) else {
        return Ok(());
    };
    let composite = link_composite(left_key, right_key, left_id, right_id);
    if let Some(index) = table.unique.get_mut("link") {
        if let Some(row_id) = index.remove(&composite) {
            table.rows.remove(&row_id);
        }
    }
    Ok(())
}

#[async_trait]
impl BackendOps for MemoryBackend {
    async fn select(
        &self,
        entity: &EntityDescriptor,
        query: RecordQuery<'_>,
    ) -> OrmResult<Vec<Record>> {
        self.with_store(|schema, store| op_select(schema, store, entity, query))
            .await
    }

    async fn select_by_key(
        &self,
        entity: &EntityDescriptor,
        key: &UniqueWhere,
    ) -> OrmResult<Option<Record>> {
        self.with_store(|_, store| {
            Ok(find_row_by_key(store, entity, key)?.and_then(|id| {
                store
                    .tables
                    .get(entity.table)
                    .and_then(|t| t.rows.get(&id))
                    .cloned()
            }))
        })
        .await
    }

    async fn insert(&self, entity: &EntityDescriptor, record: Record) -> OrmResult<Record> {
        self.with_store(|_, store| op_insert(store, entity, record)).await
    }

    async fn insert_many(
        &self,
        entity: &EntityDescriptor,
        records: Vec<Record>,
        skip_duplicates: bool,
    ) -> OrmResult<u64> {
        self.with_store(|_, store| op_insert_many(store, entity, records, skip_duplicates))
            .await
    }

    async fn update_by_key(
        &self,
        entity: &EntityDescriptor,
        key: &UniqueWhere,
        sets: &[(String, ScalarValue)],
    ) -> OrmResult<Record> {
        self.with_store(|_, store| op_update_by_key(store, entity, key, sets))
            .await
    }

    async fn update_many(
        &self,
        entity: &EntityDescriptor,
        filter: Option<&Filter>,
        sets: &[(String, ScalarValue)],
    ) -> OrmResult<u64> {
        self.with_store(|schema, store| op_update_many(schema, store, entity, filter, sets))
            .await
    }

    async fn upsert(
        &self,
        entity: &EntityDescriptor,
        key: &UniqueWhere,
        create: Record,
        sets: &[(String, ScalarValue)],
    ) -> OrmResult<Record> {
        self.with_store(|_, store| op_upsert(store, entity, key, create, sets))
            .await
    }

    async fn delete_by_key(
        &self,
        entity: &EntityDescriptor,
        key: &UniqueWhere,
    ) -> OrmResult<Record> {
        self.with_store(|_, store| op_delete_by_key(store, entity, key)).await
    }

    async fn delete_many(
        &self,
        entity: &EntityDescriptor,
        filter: Option<&Filter>,
    ) -> OrmResult<u64> {
        self.with_store(|schema, store| op_delete_many(schema, store, entity, filter))
            .await
    }

    async fn count(&self, entity: &EntityDescriptor, filter: Option<&Filter>) -> OrmResult<u64> {
        self.with_store(|schema, store| {
            Ok(matching_rows(schema, store, entity, filter)?.len() as u64)
        })
        .await
    }

    async fn related(
        &self,
        entity: &EntityDescriptor,
        relation: &RelationDescriptor,
        record: &Record,
        query: RecordQuery<'_>,
    ) -> OrmResult<Vec<Record>> {
        self.with_store(|schema, store| op_related(schema, store, entity, relation, record, query))
            .await
    }

    async fn link(
        &self,
        relation: &RelationDescriptor,
        left_id: &ScalarValue,
        right_id: &ScalarValue,
    ) -> OrmResult<()> {
        self.with_store(|_, store| op_link(store, relation, left_id, right_id))
            .await
    }

    async fn unlink(
        &self,
        relation: &RelationDescriptor,
        left_id: &ScalarValue,
        right_id: &ScalarValue,
    ) -> OrmResult<()> {
        self.with_store(|_, store| op_unlink(store, relation, left_id, right_id))
            .await
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn connect(&self) -> OrmResult<()> {
        tracing::debug!("memory backend ready");
        Ok(())
    }

    async fn disconnect(&self) -> OrmResult<()> {
        tracing::debug!("memory backend closed");
        Ok(())
    }

    async fn begin(&self, options: &TransactionOptions) -> OrmResult<Arc<dyn BackendTransaction>> {
        let gate = tokio::time::timeout(options.max_wait, self.gate.clone().lock_owned())
            .await
            .map_err(|_| {
                OrmError::Transaction(format!(
                    "could not acquire transaction within {:?}",
                    options.max_wait
                ))
            })?;
        let snapshot = self.store.lock().await.clone();
        tracing::debug!(isolation = ?options.isolation_level, "memory transaction started");
        Ok(Arc::new(MemoryTransaction {
            schema: self.schema.clone(),
            store: self.store.clone(),
            state: std::sync::Mutex::new(Some(TxState {
                snapshot,
                _gate: gate,
            })),
        }))
    }

    fn as_ops(&self) -> &dyn BackendOps {
        self
    }
}

struct TxState {
    snapshot: Store,
    _gate: OwnedMutexGuard<()>,
}

/// A live memory transaction. Holding the gate keeps every other
/// operation out until commit or rollback, so intermediate writes are
/// never observable.
pub struct MemoryTransaction {
    schema: Arc<Schema>,
    store: Arc<AsyncMutex<Store>>,
    state: std::sync::Mutex<Option<TxState>>,
}

impl MemoryTransaction {
    fn ensure_open(&self) -> OrmResult<()> {
        let state = self
            .state
            .lock()
            .map_err(|_| OrmError::Transaction("transaction state poisoned".into()))?;
        if state.is_none() {
            return Err(OrmError::Transaction(
                "transaction has already been committed or rolled back".into(),
            ));
        }
        Ok(())
    }

    async fn with_store<R>(
        &self,
        f: impl FnOnce(&Schema, &mut Store) -> OrmResult<R> + Send,
    ) -> OrmResult<R> {
        self.ensure_open()?;
        let mut store = self.store.lock().await;
        f(&self.schema, &mut store)
    }

    fn take_state(&self) -> OrmResult<TxState> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| OrmError::Transaction("transaction state poisoned".into()))?;
        state.take().ok_or_else(|| {
            OrmError::Transaction("transaction has already been committed or rolled back".into())
        })
    }
}

#[async_trait]
impl BackendOps for MemoryTransaction {
    async fn select(
        &self,
        entity: &EntityDescriptor,
        query: RecordQuery<'_>,
    ) -> OrmResult<Vec<Record>> {
        self.with_store(|schema, store| op_select(schema, store, entity, query))
            .await
    }

    async fn select_by_key(
        &self,
        entity: &EntityDescriptor,
        key: &UniqueWhere,
    ) -> OrmResult<Option<Record>> {
        self.with_store(|_, store| {
            Ok(find_row_by_key(store, entity, key)?.and_then(|id| {
                store
                    .tables
                    .get(entity.table)
                    .and_then(|t| t.rows.get(&id))
                    .cloned()
            }))
        })
        .await
    }

    async fn insert(&self, entity: &EntityDescriptor, record: Record) -> OrmResult<Record> {
        self.with_store(|_, store| op_insert(store, entity, record)).await
    }

    async fn insert_many(
        &self,
        entity: &EntityDescriptor,
        records: Vec<Record>,
        skip_duplicates: bool,
    ) -> OrmResult<u64> {
        self.with_store(|_, store| op_insert_many(store, entity, records, skip_duplicates))
            .await
    }

    async fn update_by_key(
        &self,
        entity: &EntityDescriptor,
        key: &UniqueWhere,
        sets: &[(String, ScalarValue)],
    ) -> OrmResult<Record> {
        self.with_store(|_, store| op_update_by_key(store, entity, key, sets))
            .await
    }

    async fn update_many(
        &self,
        entity: &EntityDescriptor,
        filter: Option<&Filter>,
        sets: &[(String, ScalarValue)],
    ) -> OrmResult<u64> {
        self.with_store(|schema, store| op_update_many(schema, store, entity, filter, sets))
            .await
    }

    async fn upsert(
        &self,
        entity: &EntityDescriptor,
        key: &UniqueWhere,
        create: Record,
        sets: &[(String, ScalarValue)],
    ) -> OrmResult<Record> {
        self.with_store(|_, store| op_upsert(store, entity, key, create, sets))
            .await
    }

    async fn delete_by_key(
        &self,
        entity: &EntityDescriptor,
        key: &UniqueWhere,
    ) -> OrmResult<Record> {
        self.with_store(|_, store| op_delete_by_key(store, entity, key)).await
    }

    async fn delete_many(
        &self,
        entity: &EntityDescriptor,
        filter: Option<&Filter>,
    ) -> OrmResult<u64> {
        self.with_store(|schema, store| op_delete_many(schema, store, entity, filter))
            .await
    }

    async fn count(&self, entity: &EntityDescriptor, filter: Option<&Filter>) -> OrmResult<u64> {
        self.with_store(|schema, store| {
            Ok(matching_rows(schema, store, entity, filter)?.len() as u64)
        })
        .await
    }

    async fn related(
        &self,
        entity: &EntityDescriptor,
        relation: &RelationDescriptor,
        record: &Record,
        query: RecordQuery<'_>,
    ) -> OrmResult<Vec<Record>> {
        self.with_store(|schema, store| op_related(schema, store, entity, relation, record, query))
            .await
    }

    async fn link(
        &self,
        relation: &RelationDescriptor,
        left_id: &ScalarValue,
        right_id: &ScalarValue,
    ) -> OrmResult<()> {
        self.with_store(|_, store| op_link(store, relation, left_id, right_id))
            .await
    }

    async fn unlink(
        &self,
        relation: &RelationDescriptor,
        left_id: &ScalarValue,
        right_id: &ScalarValue,
    ) -> OrmResult<()> {
        self.with_store(|_, store| op_unlink(store, relation, left_id, right_id))
            .await
    }
}

#[async_trait]
impl BackendTransaction for MemoryTransaction {
    async fn commit(&self) -> OrmResult<()> {
        let state = self.take_state()?;
        drop(state);
        tracing::debug!("memory transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> OrmResult<()> {
        let state = self.take_state()?;
        *self.store.lock().await = state.snapshot;
        tracing::debug!("memory transaction rolled back");
        Ok(())
    }

    fn as_ops(&self) -> &dyn BackendOps {
        self
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(tx) = state.take() {
                tracing::warn!("memory transaction dropped without commit or rollback");
                // best effort restore; the gate is released either way
                if let Ok(mut store) = self.store.try_lock() {
                    *store = tx.snapshot;
                }
            }
        }
    }
}
