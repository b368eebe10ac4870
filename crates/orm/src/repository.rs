//! Typed repository - the per-entity operation surface
//!
//! A `Repository<E>` is a cheap handle binding an entity type to the
//! client (or to a live transaction). Every call flows through the
//! middleware chain into the generic dispatcher and back out as typed
//! entities.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::backends::BackendTransaction;
use crate::client::ClientCore;
use crate::dispatch::{Dispatcher, Operation, OperationArgs, QueryResult};
use crate::error::{OrmError, OrmResult};
use crate::filter::Filter;
use crate::middleware::Next;
use crate::projection::{ProjectedRow, Projection};
use crate::query::aggregate::{AggregateArgs, AggregateResult, GroupByArgs, GroupRow};
use crate::query::{FindManyArgs, Patch, UniqueWhere};
use crate::schema::Entity;
use crate::value::{Record, ScalarValue};

#[derive(Clone)]
pub(crate) enum OpsHandle {
    Backend,
    Transaction(Arc<dyn BackendTransaction>),
}

pub struct Repository<E: Entity> {
    core: Arc<ClientCore>,
    ops: OpsHandle,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> Repository<E> {
    pub(crate) fn new(core: Arc<ClientCore>, ops: OpsHandle) -> Self {
        Self {
            core,
            ops,
            _marker: PhantomData,
        }
    }

    async fn run(&self, args: OperationArgs) -> OrmResult<QueryResult> {
        self.core.ensure_connected()?;
        let dispatcher = Dispatcher {
            schema: self.core.schema.as_ref(),
            ops: match &self.ops {
                OpsHandle::Backend => self.core.backend.as_ops(),
                OpsHandle::Transaction(tx) => tx.as_ops(),
            },
        };
        Next::new(&self.core.middleware, &dispatcher)
            .run(Operation::new(E::descriptor(), args))
            .await
    }

    /// Look a record up by one declared unique key; None when absent
    pub async fn find_unique(&self, key: UniqueWhere) -> OrmResult<Option<E>> {
        match self.run(OperationArgs::FindUnique { key }).await? {
            QueryResult::MaybeRecord(Some(record)) => Ok(Some(E::from_record(&record)?)),
            QueryResult::MaybeRecord(None) => Ok(None),
            other => Err(shape_mismatch(other)),
        }
    }

    /// Unique lookup that fails with NotFound when absent
    pub async fn find_unique_or_throw(&self, key: UniqueWhere) -> OrmResult<E> {
        self.find_unique(key)
            .await?
            .ok_or_else(|| OrmError::not_found(E::descriptor().name))
    }

    /// First match in the requested order, or None
    pub async fn find_first(&self, mut args: FindManyArgs) -> OrmResult<Option<E>> {
        args.take = Some(1);
        Ok(self.find_many(args).await?.into_iter().next())
    }

    pub async fn find_first_or_throw(&self, args: FindManyArgs) -> OrmResult<E> {
        self.find_first(args)
            .await?
            .ok_or_else(|| OrmError::not_found(E::descriptor().name))
    }

    /// Ordered matches; an empty list, never null, when nothing matches
    pub async fn find_many(&self, args: FindManyArgs) -> OrmResult<Vec<E>> {
        let rows = expect_records(self.run(OperationArgs::Find { args }).await?)?;
        rows.iter().map(E::from_record).collect()
    }

    /// findMany with a field allowlist and/or eagerly fetched relations
    pub async fn find_many_projected(
        &self,
        args: FindManyArgs,
        projection: Projection,
    ) -> OrmResult<Vec<ProjectedRow>> {
        projection.validate(E::descriptor())?;
        let rows = expect_records(self.run(OperationArgs::Find { args }).await?)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut relations = BTreeMap::new();
            for relation in projection.included_relations() {
                let related = expect_records(
                    self.run(OperationArgs::Related {
                        relation: relation.clone(),
                        record: row.clone(),
                        args: FindManyArgs::new(),
                    })
                    .await?,
                )?;
                relations.insert(relation.clone(), related);
            }
            out.push(ProjectedRow {
                fields: projection.project(row),
                relations,
            });
        }
        Ok(out)
    }

    /// Create one record; server-assigned defaults come back populated
    pub async fn create(&self, data: E) -> OrmResult<E> {
        let record = expect_record(
            self.run(OperationArgs::Create {
                data: data.to_record(),
            })
            .await?,
        )?;
        E::from_record(&record)
    }

    /// Batch create; returns the number of rows actually inserted
    pub async fn create_many(&self, data: Vec<E>, skip_duplicates: bool) -> OrmResult<u64> {
        expect_count(
            self.run(OperationArgs::CreateMany {
                data: data.iter().map(Entity::to_record).collect(),
                skip_duplicates,
            })
            .await?,
        )
    }

    /// Update the uniquely keyed record; NotFound when absent
    pub async fn update(&self, key: UniqueWhere, patch: Patch) -> OrmResult<E> {
        let record = expect_record(self.run(OperationArgs::Update { key, patch }).await?)?;
        E::from_record(&record)
    }

    /// Patch every match; zero is a valid count, not an error
    pub async fn update_many(&self, filter: Option<Filter>, patch: Patch) -> OrmResult<u64> {
        expect_count(self.run(OperationArgs::UpdateMany { filter, patch }).await?)
    }

    /// Update if the key exists, otherwise create; exactly one branch runs
    pub async fn upsert(&self, key: UniqueWhere, create: E, update: Patch) -> OrmResult<E> {
        let record = expect_record(
            self.run(OperationArgs::Upsert {
                key,
                create: create.to_record(),
                update,
            })
            .await?,
        )?;
        E::from_record(&record)
    }

    /// Delete the uniquely keyed record and return it; NotFound when absent
    pub async fn delete(&self, key: UniqueWhere) -> OrmResult<E> {
        let record = expect_record(self.run(OperationArgs::Delete { key }).await?)?;
        E::from_record(&record)
    }

    pub async fn delete_many(&self, filter: Option<Filter>) -> OrmResult<u64> {
        expect_count(self.run(OperationArgs::DeleteMany { filter }).await?)
    }

    pub async fn count(&self, filter: Option<Filter>) -> OrmResult<u64> {
        expect_count(self.run(OperationArgs::Count { filter }).await?)
    }

    /// Per-field non-null counts, plus `_all` for the row count
    pub async fn count_fields(
        &self,
        filter: Option<Filter>,
        fields: Vec<&str>,
    ) -> OrmResult<BTreeMap<String, u64>> {
        match self
            .run(OperationArgs::CountFields {
                filter,
                fields: fields.into_iter().map(String::from).collect(),
            })
            .await?
        {
            QueryResult::FieldCounts(counts) => Ok(counts),
            other => Err(shape_mismatch(other)),
        }
    }

    pub async fn aggregate(&self, args: AggregateArgs) -> OrmResult<AggregateResult> {
        match self.run(OperationArgs::Aggregate { args }).await? {
            QueryResult::Aggregate(result) => Ok(result),
            other => Err(shape_mismatch(other)),
        }
    }

    pub async fn group_by(&self, args: GroupByArgs) -> OrmResult<Vec<GroupRow>> {
        match self.run(OperationArgs::GroupBy { args }).await? {
            QueryResult::Groups(groups) => Ok(groups),
            other => Err(shape_mismatch(other)),
        }
    }

    /// Records on the far side of a declared relation, with the same
    /// filter/sort/pagination surface as findMany on the target
    pub async fn related<T: Entity>(
        &self,
        record: &E,
        relation: &str,
        args: FindManyArgs,
    ) -> OrmResult<Vec<T>> {
        let rel = E::descriptor().relation(relation).ok_or_else(|| {
            OrmError::validation(format!(
                "unknown relation '{}' on {}",
                relation,
                E::descriptor().name
            ))
        })?;
        if rel.target != T::descriptor().name {
            return Err(OrmError::validation(format!(
                "relation '{}' targets {}, not {}",
                relation,
                rel.target,
                T::descriptor().name
            )));
        }
        let rows = expect_records(
            self.run(OperationArgs::Related {
                relation: relation.to_string(),
                record: record.to_record(),
                args,
            })
            .await?,
        )?;
        rows.iter().map(T::from_record).collect()
    }

    /// To-one accessor; a null foreign key is a valid no-relation state
    /// and returns None
    pub async fn related_one<T: Entity>(&self, record: &E, relation: &str) -> OrmResult<Option<T>> {
        Ok(self
            .related::<T>(record, relation, FindManyArgs::new())
            .await?
            .into_iter()
            .next())
    }

    /// Attach a record to a many-to-many relation target; idempotent
    pub async fn link(&self, record: &E, relation: &str, target_id: &str) -> OrmResult<()> {
        let left = self.own_id(record)?;
        match self
            .run(OperationArgs::Link {
                relation: relation.to_string(),
                left,
                right: ScalarValue::String(target_id.to_string()),
            })
            .await?
        {
            QueryResult::Unit => Ok(()),
            other => Err(shape_mismatch(other)),
        }
    }

    /// Detach a record from a many-to-many relation target; detaching an
    /// absent link is a no-op
    pub async fn unlink(&self, record: &E, relation: &str, target_id: &str) -> OrmResult<()> {
        let left = self.own_id(record)?;
        match self
            .run(OperationArgs::Unlink {
                relation: relation.to_string(),
                left,
                right: ScalarValue::String(target_id.to_string()),
            })
            .await?
        {
            QueryResult::Unit => Ok(()),
            other => Err(shape_mismatch(other)),
        }
    }

    fn own_id(&self, record: &E) -> OrmResult<ScalarValue> {
        let id = record.to_record().value("id");
        if id.is_null() {
            return Err(OrmError::validation(format!(
                "{} record carries no id; create it first",
                E::descriptor().name
            )));
        }
        Ok(id)
    }
}

fn expect_records(result: QueryResult) -> OrmResult<Vec<Record>> {
    match result {
        QueryResult::Records(rows) => Ok(rows),
        other => Err(shape_mismatch(other)),
    }
}

fn expect_record(result: QueryResult) -> OrmResult<Record> {
    match result {
        QueryResult::Record(record) => Ok(record),
        other => Err(shape_mismatch(other)),
    }
}

fn expect_count(result: QueryResult) -> OrmResult<u64> {
    match result {
        QueryResult::Count(count) => Ok(count),
        other => Err(shape_mismatch(other)),
    }
}

fn shape_mismatch(result: QueryResult) -> OrmError {
    OrmError::Unknown(format!(
        "middleware chain returned a mismatched result shape: {:?}",
        result
    ))
}
