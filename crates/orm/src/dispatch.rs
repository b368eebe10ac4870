//! Operation envelope and the generic dispatcher
//!
//! One dispatcher serves every entity: it validates arguments against the
//! descriptor, fills server-assigned defaults, refreshes touch-on-update
//! fields, pushes what it can down to the backend and applies the
//! cursor/distinct slicing contracts on top. Argument validation happens
//! here, after the middleware chain and before any storage round-trip.

use std::collections::BTreeMap;

use crate::backends::{BackendOps, RecordQuery};
use crate::error::{OrmError, OrmResult};
use crate::filter::{validate_filter, Filter};
use crate::query::aggregate::{
    fold_aggregate, fold_group_by, validate_aggregate, validate_group_by, AggregateArgs,
    AggregateResult, GroupByArgs, GroupRow,
};
use crate::query::{
    apply_distinct, slice_window, validate_find_args, validate_patch, FindManyArgs, Patch,
    UniqueWhere,
};
use crate::schema::{EntityDescriptor, FieldDefault, Schema};
use crate::value::{Record, ScalarValue};

/// What an operation does, for middleware and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    FindUnique,
    FindMany,
    Create,
    CreateMany,
    Update,
    UpdateMany,
    Upsert,
    Delete,
    DeleteMany,
    Count,
    CountFields,
    Aggregate,
    GroupBy,
    Related,
    Link,
    Unlink,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Action::FindUnique => "findUnique",
            Action::FindMany => "findMany",
            Action::Create => "create",
            Action::CreateMany => "createMany",
            Action::Update => "update",
            Action::UpdateMany => "updateMany",
            Action::Upsert => "upsert",
            Action::Delete => "delete",
            Action::DeleteMany => "deleteMany",
            Action::Count => "count",
            Action::CountFields => "count(fields)",
            Action::Aggregate => "aggregate",
            Action::GroupBy => "groupBy",
            Action::Related => "related",
            Action::Link => "link",
            Action::Unlink => "unlink",
        };
        write!(f, "{}", name)
    }
}

/// Operation payload; middleware may inspect or rewrite it before dispatch
#[derive(Debug, Clone)]
pub enum OperationArgs {
    FindUnique {
        key: UniqueWhere,
    },
    Find {
        args: FindManyArgs,
    },
    Create {
        data: Record,
    },
    CreateMany {
        data: Vec<Record>,
        skip_duplicates: bool,
    },
    Update {
        key: UniqueWhere,
        patch: Patch,
    },
    UpdateMany {
        filter: Option<Filter>,
        patch: Patch,
    },
    Upsert {
        key: UniqueWhere,
        create: Record,
        update: Patch,
    },
    Delete {
        key: UniqueWhere,
    },
    DeleteMany {
        filter: Option<Filter>,
    },
    Count {
        filter: Option<Filter>,
    },
    CountFields {
        filter: Option<Filter>,
        fields: Vec<String>,
    },
    Aggregate {
        args: AggregateArgs,
    },
    GroupBy {
        args: GroupByArgs,
    },
    Related {
        relation: String,
        record: Record,
        args: FindManyArgs,
    },
    Link {
        relation: String,
        left: ScalarValue,
        right: ScalarValue,
    },
    Unlink {
        relation: String,
        left: ScalarValue,
        right: ScalarValue,
    },
}

impl OperationArgs {
    pub fn action(&self) -> Action {
        match self {
            OperationArgs::FindUnique { .. } => Action::FindUnique,
            OperationArgs::Find { .. } => Action::FindMany,
            OperationArgs::Create { .. } => Action::Create,
            OperationArgs::CreateMany { .. } => Action::CreateMany,
            OperationArgs::Update { .. } => Action::Update,
            OperationArgs::UpdateMany { .. } => Action::UpdateMany,
            OperationArgs::Upsert { .. } => Action::Upsert,
            OperationArgs::Delete { .. } => Action::Delete,
            OperationArgs::DeleteMany { .. } => Action::DeleteMany,
            OperationArgs::Count { .. } => Action::Count,
            OperationArgs::CountFields { .. } => Action::CountFields,
            OperationArgs::Aggregate { .. } => Action::Aggregate,
            OperationArgs::GroupBy { .. } => Action::GroupBy,
            OperationArgs::Related { .. } => Action::Related,
            OperationArgs::Link { .. } => Action::Link,
            OperationArgs::Unlink { .. } => Action::Unlink,
        }
    }
}

/// One dispatched operation
#[derive(Debug, Clone)]
pub struct Operation {
    pub entity: &'static EntityDescriptor,
    pub action: Action,
    pub args: OperationArgs,
}

impl Operation {
    pub fn new(entity: &'static EntityDescriptor, args: OperationArgs) -> Self {
        Self {
            entity,
            action: args.action(),
            args,
        }
    }
}

/// Result of a dispatched operation
#[derive(Debug, Clone)]
pub enum QueryResult {
    Unit,
    MaybeRecord(Option<Record>),
    Record(Record),
    Records(Vec<Record>),
    Count(u64),
    FieldCounts(BTreeMap<String, u64>),
    Aggregate(AggregateResult),
    Groups(Vec<GroupRow>),
}

/// Terminal stage of the middleware chain
#[derive(Clone, Copy)]
pub struct Dispatcher<'a> {
    pub schema: &'a Schema,
    pub ops: &'a dyn BackendOps,
}

impl Dispatcher<'_> {
    pub async fn execute(&self, op: Operation) -> OrmResult<QueryResult> {
        let entity = op.entity;
        match op.args {
            OperationArgs::FindUnique { key } => {
                key.resolve(entity)?;
                let record = self.ops.select_by_key(entity, &key).await?;
                Ok(QueryResult::MaybeRecord(record))
            }
            OperationArgs::Find { args } => {
                validate_find_args(self.schema, entity, &args)?;
                Ok(QueryResult::Records(self.fetch_window(entity, &args).await?))
            }
            OperationArgs::Create { data } => {
                let record = prepare_create(entity, &data)?;
                let stored = self.ops.insert(entity, record).await?;
                Ok(QueryResult::Record(stored))
            }
            OperationArgs::CreateMany {
                data,
                skip_duplicates,
            } => {
                let records = data
                    .iter()
                    .map(|r| prepare_create(entity, r))
                    .collect::<OrmResult<Vec<_>>>()?;
                let inserted = self
                    .ops
                    .insert_many(entity, records, skip_duplicates)
                    .await?;
                Ok(QueryResult::Count(inserted))
            }
            OperationArgs::Update { key, patch } => {
                key.resolve(entity)?;
                validate_patch(entity, &patch)?;
                let sets = effective_sets(entity, &patch);
                let updated = self.ops.update_by_key(entity, &key, &sets).await?;
                Ok(QueryResult::Record(updated))
            }
            OperationArgs::UpdateMany { filter, patch } => {
                if let Some(filter) = &filter {
                    validate_filter(self.schema, entity, filter)?;
                }
                validate_patch(entity, &patch)?;
                let sets = effective_sets(entity, &patch);
                let updated = self
                    .ops
                    .update_many(entity, filter.as_ref(), &sets)
                    .await?;
                Ok(QueryResult::Count(updated))
            }
            OperationArgs::Upsert {
                key,
                create,
                update,
            } => {
                key.resolve(entity)?;
                validate_patch(entity, &update)?;
                let create = prepare_create(entity, &create)?;
                let sets = effective_sets(entity, &update);
                let stored = self.ops.upsert(entity, &key, create, &sets).await?;
                Ok(QueryResult::Record(stored))
            }
            OperationArgs::Delete { key } => {
                key.resolve(entity)?;
                let deleted = self.ops.delete_by_key(entity, &key).await?;
                Ok(QueryResult::Record(deleted))
            }
            OperationArgs::DeleteMany { filter } => {
                if let Some(filter) = &filter {
                    validate_filter(self.schema, entity, filter)?;
                }
                let deleted = self.ops.delete_many(entity, filter.as_ref()).await?;
                Ok(QueryResult::Count(deleted))
            }
            OperationArgs::Count { filter } => {
                if let Some(filter) = &filter {
                    validate_filter(self.schema, entity, filter)?;
                }
                let count = self.ops.count(entity, filter.as_ref()).await?;
                Ok(QueryResult::Count(count))
            }
            OperationArgs::CountFields { filter, fields } => {
                if let Some(filter) = &filter {
                    validate_filter(self.schema, entity, filter)?;
                }
                for field in &fields {
                    if entity.field(field).is_none() {
                        return Err(OrmError::validation(format!(
                            "unknown field '{}' on {} in count selection",
                            field, entity.name
                        )));
                    }
                }
                let rows = self
                    .ops
                    .select(entity, RecordQuery { filter: filter.as_ref(), ..Default::default() })
                    .await?;
                let mut counts = BTreeMap::new();
                counts.insert("_all".to_string(), rows.len() as u64);
                for field in fields {
                    let n = rows.iter().filter(|r| !r.value(&field).is_null()).count() as u64;
                    counts.insert(field, n);
                }
                Ok(QueryResult::FieldCounts(counts))
            }
            OperationArgs::Aggregate { args } => {
                validate_aggregate(self.schema, entity, &args)?;
                let rows = self
                    .ops
                    .select(
                        entity,
                        RecordQuery {
                            filter: args.filter.as_ref(),
                            ..Default::default()
                        },
                    )
                    .await?;
                Ok(QueryResult::Aggregate(fold_aggregate(&rows, &args.select)))
            }
            OperationArgs::GroupBy { args } => {
                validate_group_by(self.schema, entity, &args)?;
                let rows = self
                    .ops
                    .select(
                        entity,
                        RecordQuery {
                            filter: args.filter.as_ref(),
                            ..Default::default()
                        },
                    )
                    .await?;
                Ok(QueryResult::Groups(fold_group_by(rows, &args)))
            }
            OperationArgs::Related {
                relation,
                record,
                args,
            } => {
                let rel = entity.relation(&relation).ok_or_else(|| {
                    OrmError::validation(format!(
                        "unknown relation '{}' on {}",
                        relation, entity.name
                    ))
                })?;
                let target = self.schema.entity(rel.target)?;
                validate_find_args(self.schema, target, &args)?;
                if args.plain_window() {
                    let rows = self
                        .ops
                        .related(
                            entity,
                            rel,
                            &record,
                            RecordQuery {
                                filter: args.filter.as_ref(),
                                order_by: &args.order_by,
                                take: args.take,
                                skip: args.skip,
                            },
                        )
                        .await?;
                    return Ok(QueryResult::Records(rows));
                }
                let rows = self
                    .ops
                    .related(
                        entity,
                        rel,
                        &record,
                        RecordQuery {
                            filter: args.filter.as_ref(),
                            order_by: &args.order_by,
                            take: None,
                            skip: 0,
                        },
                    )
                    .await?;
                Ok(QueryResult::Records(slice_fetched(rows, &args)?))
            }
            OperationArgs::Link {
                relation,
                left,
                right,
            } => {
                let rel = entity.relation(&relation).ok_or_else(|| {
                    OrmError::validation(format!(
                        "unknown relation '{}' on {}",
                        relation, entity.name
                    ))
                })?;
                self.ops.link(rel, &left, &right).await?;
                Ok(QueryResult::Unit)
            }
            OperationArgs::Unlink {
                relation,
                left,
                right,
            } => {
                let rel = entity.relation(&relation).ok_or_else(|| {
                    OrmError::validation(format!(
                        "unknown relation '{}' on {}",
                        relation, entity.name
                    ))
                })?;
                self.ops.unlink(rel, &left, &right).await?;
                Ok(QueryResult::Unit)
            }
        }
    }

    /// Ordered fetch plus the cursor/distinct/reverse-take slicing the
    /// backends do not implement themselves
    async fn fetch_window(
        &self,
        entity: &EntityDescriptor,
        args: &FindManyArgs,
    ) -> OrmResult<Vec<Record>> {
        if args.plain_window() {
            return self
                .ops
                .select(
                    entity,
                    RecordQuery {
                        filter: args.filter.as_ref(),
                        order_by: &args.order_by,
                        take: args.take,
                        skip: args.skip,
                    },
                )
                .await;
        }
        let rows = self
            .ops
            .select(
                entity,
                RecordQuery {
                    filter: args.filter.as_ref(),
                    order_by: &args.order_by,
                    take: None,
                    skip: 0,
                },
            )
            .await?;
        slice_fetched(rows, args)
    }
}

/// Apply cursor location, signed take/skip and distinct to a fully
/// fetched, ordered result set
fn slice_fetched(rows: Vec<Record>, args: &FindManyArgs) -> OrmResult<Vec<Record>> {
    let cursor_index = match &args.cursor {
        Some(cursor) => match rows.iter().position(|r| cursor.matches(r)) {
            Some(index) => Some(index),
            // a cursor outside the filtered set yields an empty page
            None => return Ok(Vec::new()),
        },
        None => None,
    };
    let (start, end) = slice_window(rows.len(), cursor_index, args.take, args.skip);
    let page: Vec<Record> = rows.into_iter().skip(start).take(end - start).collect();
    Ok(apply_distinct(page, &args.distinct))
}

/// Complete a create payload: reject unknown fields and kind mismatches,
/// fill declared defaults, then require every non-nullable column
fn prepare_create(entity: &EntityDescriptor, data: &Record) -> OrmResult<Record> {
    for name in data.field_names() {
        if entity.field(name).is_none() {
            return Err(OrmError::validation(format!(
                "unknown field '{}' on {} in create data",
                name, entity.name
            )));
        }
    }
    let mut out = Record::new();
    for field in entity.fields {
        let mut value = data.value(field.name);
        if matches!(value, ScalarValue::Float(_)) {
            return Err(OrmError::validation(format!(
                "{}.{} does not accept float values",
                entity.name, field.name
            )));
        }
        if let Some(kind) = value.kind() {
            if kind != field.kind {
                return Err(OrmError::validation(format!(
                    "create data for {}.{} expects {} but got {}",
                    entity.name, field.name, field.kind, kind
                )));
            }
        }
        if value.is_null() {
            value = match field.default {
                FieldDefault::None => ScalarValue::Null,
                FieldDefault::Uuid => ScalarValue::String(uuid::Uuid::new_v4().to_string()),
                FieldDefault::Now => ScalarValue::DateTime(chrono::Utc::now()),
                FieldDefault::Bool(b) => ScalarValue::Bool(b),
                FieldDefault::Text(t) => ScalarValue::String(t.to_string()),
            };
        }
        if value.is_null() && !field.nullable {
            return Err(OrmError::validation(format!(
                "missing required field {}.{} in create data",
                entity.name, field.name
            )));
        }
        out.insert(field.name, value);
    }
    Ok(out)
}

/// Patch entries plus the touch-on-update refreshes the caller did not set
/// explicitly
fn effective_sets(entity: &EntityDescriptor, patch: &Patch) -> Vec<(String, ScalarValue)> {
    let mut sets: Vec<(String, ScalarValue)> = patch.entries().to_vec();
    for field in entity.fields {
        if field.touch_on_update && !patch.touches(field.name) {
            sets.push((
                field.name.to_string(),
                ScalarValue::DateTime(chrono::Utc::now()),
            ));
        }
    }
    sets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDescriptor, UniqueKeyDescriptor};
    use crate::value::FieldKind;

    static ARBITRE: EntityDescriptor = EntityDescriptor {
        name: "Arbitre",
        table: "arbitres",
        fields: &[
            FieldDescriptor::required("id", FieldKind::String)
                .with_default(FieldDefault::Uuid)
                .immutable(),
            FieldDescriptor::required("nom", FieldKind::String),
            FieldDescriptor::required("grade", FieldKind::String)
                .with_default(FieldDefault::Text("departemental")),
            FieldDescriptor::required("actif", FieldKind::Bool)
                .with_default(FieldDefault::Bool(true)),
            FieldDescriptor::optional("notes", FieldKind::String),
            FieldDescriptor::required("created_at", FieldKind::DateTime)
                .with_default(FieldDefault::Now)
                .immutable(),
            FieldDescriptor::required("updated_at", FieldKind::DateTime)
                .with_default(FieldDefault::Now)
                .touched_on_update(),
        ],
        unique_keys: &[UniqueKeyDescriptor {
            name: "id",
            fields: &["id"],
        }],
        relations: &[],
    };

    #[test]
    fn create_fills_defaults() {
        let data = Record::new().set("nom", "Martin");
        let record = prepare_create(&ARBITRE, &data).unwrap();
        assert!(!record.req_string("id").unwrap().is_empty());
        assert_eq!(record.req_string("grade").unwrap(), "departemental");
        assert!(record.req_bool("actif").unwrap());
        assert!(record.req_datetime("created_at").is_ok());
        assert_eq!(record.value("notes"), ScalarValue::Null);
    }

    #[test]
    fn create_respects_explicit_values_over_defaults() {
        let data = Record::new()
            .set("nom", "Martin")
            .set("grade", "national")
            .set("actif", false);
        let record = prepare_create(&ARBITRE, &data).unwrap();
        assert_eq!(record.req_string("grade").unwrap(), "national");
        assert!(!record.req_bool("actif").unwrap());
    }

    #[test]
    fn create_rejects_bad_payloads() {
        // missing required field without a default
        let err = prepare_create(&ARBITRE, &Record::new()).unwrap_err();
        assert!(matches!(err, OrmError::Validation(_)));
        // unknown field
        let data = Record::new().set("nom", "Martin").set("licence", "x");
        assert!(prepare_create(&ARBITRE, &data).is_err());
        // kind mismatch
        let data = Record::new().set("nom", 12i64);
        assert!(prepare_create(&ARBITRE, &data).is_err());
    }

    #[test]
    fn touch_on_update_is_added_once() {
        let patch = Patch::new().set("nom", "Durand");
        let sets = effective_sets(&ARBITRE, &patch);
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[1].0, "updated_at");

        // an explicit updated_at wins
        let explicit = Patch::new().set("nom", "Durand").set(
            "updated_at",
            ScalarValue::DateTime(chrono::Utc::now()),
        );
        let sets = effective_sets(&ARBITRE, &explicit);
        assert_eq!(sets.len(), 2);
    }

    #[test]
    fn cursor_slicing_through_fetched_rows() {
        let rows: Vec<Record> = (0..6)
            .map(|i| Record::new().set("id", format!("r{}", i)).set("ordre", i as i64))
            .collect();
        let args = FindManyArgs::new()
            .cursor(UniqueWhere::id("r2"))
            .take(2);
        let page = slice_fetched(rows.clone(), &args).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].req_string("id").unwrap(), "r2");
        assert_eq!(page[1].req_string("id").unwrap(), "r3");

        // cursor missing from the set
        let args = FindManyArgs::new().cursor(UniqueWhere::id("zz")).take(2);
        assert!(slice_fetched(rows, &args).unwrap().is_empty());
    }
}
