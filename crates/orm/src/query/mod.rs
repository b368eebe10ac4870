//! Query arguments - ordering, pagination, distinct, unique lookups, patches
//!
//! These are the caller-facing inputs of every read and write operation.
//! The slicing helpers at the bottom implement the cursor/take/skip and
//! distinct contracts in one place so both storage backends behave
//! identically.

pub mod aggregate;

use crate::error::{OrmError, OrmResult};
use crate::filter::{validate_filter, Filter};
use crate::schema::{EntityDescriptor, Schema, UniqueKeyDescriptor};
use crate::value::{Record, ScalarValue};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Explicit placement of null values within a sorted field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

/// One (field, direction) pair; ties fall through to the next pair
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
    pub nulls: Option<NullsOrder>,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
            nulls: None,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
            nulls: None,
        }
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullsOrder::First);
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullsOrder::Last);
        self
    }

    /// Resolved null placement: last when ascending, first when descending,
    /// unless overridden
    pub fn effective_nulls(&self) -> NullsOrder {
        self.nulls.unwrap_or(match self.direction {
            SortDirection::Asc => NullsOrder::Last,
            SortDirection::Desc => NullsOrder::First,
        })
    }
}

/// A lookup by one declared unique key, single-field or compound
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueWhere {
    pairs: Vec<(String, ScalarValue)>,
}

impl UniqueWhere {
    pub fn id(value: impl Into<String>) -> Self {
        Self::field("id", ScalarValue::String(value.into()))
    }

    pub fn field(name: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self {
            pairs: vec![(name.into(), value.into())],
        }
    }

    pub fn and_field(mut self, name: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.pairs.push((name.into(), value.into()));
        self
    }

    pub fn pairs(&self) -> &[(String, ScalarValue)] {
        &self.pairs
    }

    /// Match this lookup against the entity's declared unique keys. The
    /// supplied field set must equal one key's field set exactly; partial
    /// matches over a compound key are rejected.
    pub fn resolve<'e>(
        &self,
        entity: &'e EntityDescriptor,
    ) -> OrmResult<(&'e UniqueKeyDescriptor, Vec<ScalarValue>)> {
        for (field, value) in &self.pairs {
            let descriptor = entity.field(field).ok_or_else(|| {
                OrmError::validation(format!(
                    "unknown field '{}' on {} in unique lookup",
                    field, entity.name
                ))
            })?;
            match value.kind() {
                Some(k) if k != descriptor.kind => {
                    return Err(OrmError::validation(format!(
                        "unique lookup on {}.{} expects {} but got {}",
                        entity.name, field, descriptor.kind, k
                    )));
                }
                None => {
                    return Err(OrmError::validation(format!(
                        "unique lookup on {}.{} cannot be null",
                        entity.name, field
                    )));
                }
                _ => {}
            }
        }

        let key = entity
            .unique_keys
            .iter()
            .find(|key| {
                key.fields.len() == self.pairs.len()
                    && key
                        .fields
                        .iter()
                        .all(|f| self.pairs.iter().any(|(name, _)| name == f))
            })
            .ok_or_else(|| {
                let fields: Vec<&str> = self.pairs.iter().map(|(n, _)| n.as_str()).collect();
                OrmError::validation(format!(
                    "fields [{}] do not form a declared unique key of {}",
                    fields.join(", "),
                    entity.name
                ))
            })?;

        let mut values = Vec::with_capacity(key.fields.len());
        for field in key.fields {
            match self.pairs.iter().find(|(name, _)| name == field) {
                Some((_, value)) => values.push(value.clone()),
                None => {
                    return Err(OrmError::validation(format!(
                        "unique lookup on {} is missing field '{}'",
                        entity.name, field
                    )));
                }
            }
        }

        Ok((key, values))
    }

    /// True when the record carries exactly these key values
    pub fn matches(&self, record: &Record) -> bool {
        self.pairs
            .iter()
            .all(|(field, value)| record.get(field) == Some(value))
    }
}

/// Partial update: ordered field assignments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    sets: Vec<(String, ScalarValue)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.sets.push((field.into(), value.into()));
        self
    }

    pub fn set_null(self, field: impl Into<String>) -> Self {
        self.set(field, ScalarValue::Null)
    }

    pub fn entries(&self) -> &[(String, ScalarValue)] {
        &self.sets
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn touches(&self, field: &str) -> bool {
        self.sets.iter().any(|(name, _)| name == field)
    }
}

/// Check a patch against the entity: unknown fields, immutable fields,
/// kind mismatches and nulls on required columns all fail fast.
pub fn validate_patch(entity: &EntityDescriptor, patch: &Patch) -> OrmResult<()> {
    for (field, value) in patch.entries() {
        let descriptor = entity.field(field).ok_or_else(|| {
            OrmError::validation(format!(
                "unknown field '{}' on {} in update data",
                field, entity.name
            ))
        })?;
        if descriptor.immutable {
            return Err(OrmError::validation(format!(
                "{}.{} is immutable after creation",
                entity.name, field
            )));
        }
        if matches!(value, ScalarValue::Float(_)) {
            return Err(OrmError::validation(format!(
                "{}.{} does not accept float values",
                entity.name, field
            )));
        }
        match value.kind() {
            Some(k) if k != descriptor.kind => {
                return Err(OrmError::validation(format!(
                    "update of {}.{} expects {} but got {}",
                    entity.name, field, descriptor.kind, k
                )));
            }
            None if !descriptor.nullable => {
                return Err(OrmError::validation(format!(
                    "{}.{} is required and cannot be set to null",
                    entity.name, field
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Arguments of findMany and findFirst
#[derive(Debug, Clone, Default)]
pub struct FindManyArgs {
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    pub cursor: Option<UniqueWhere>,
    /// Signed limit: negative means the |take| records ending at the cursor
    /// (or at the end of the result set when no cursor is given)
    pub take: Option<i64>,
    pub skip: u64,
    pub distinct: Vec<String>,
}

impl FindManyArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn cursor(mut self, cursor: UniqueWhere) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn distinct(mut self, fields: Vec<&str>) -> Self {
        self.distinct = fields.into_iter().map(String::from).collect();
        self
    }

    /// True when pagination can be pushed down to the backend as a plain
    /// limit/offset; cursor, distinct and reverse takes are sliced by the
    /// dispatcher after the ordered fetch
    pub fn plain_window(&self) -> bool {
        self.cursor.is_none() && self.distinct.is_empty() && self.take.map_or(true, |t| t >= 0)
    }
}

pub fn validate_find_args(
    schema: &Schema,
    entity: &EntityDescriptor,
    args: &FindManyArgs,
) -> OrmResult<()> {
    if let Some(filter) = &args.filter {
        validate_filter(schema, entity, filter)?;
    }
    validate_order_by(entity, &args.order_by)?;
    for field in &args.distinct {
        if entity.field(field).is_none() {
            return Err(OrmError::validation(format!(
                "unknown field '{}' on {} in distinct",
                field, entity.name
            )));
        }
    }
    if let Some(cursor) = &args.cursor {
        cursor.resolve(entity)?;
    }
    Ok(())
}

pub fn validate_order_by(entity: &EntityDescriptor, order_by: &[OrderBy]) -> OrmResult<()> {
    for order in order_by {
        if entity.field(&order.field).is_none() {
            return Err(OrmError::validation(format!(
                "unknown field '{}' on {} in orderBy",
                order.field, entity.name
            )));
        }
    }
    Ok(())
}

/// Stable multi-key sort; insertion order breaks remaining ties
pub fn sort_records(order_by: &[OrderBy], rows: &mut [Record]) {
    use std::cmp::Ordering;

    if order_by.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for order in order_by {
            let va = a.value(&order.field);
            let vb = b.value(&order.field);
            let ord = match (va.is_null(), vb.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => match order.effective_nulls() {
                    NullsOrder::First => Ordering::Less,
                    NullsOrder::Last => Ordering::Greater,
                },
                (false, true) => match order.effective_nulls() {
                    NullsOrder::First => Ordering::Greater,
                    NullsOrder::Last => Ordering::Less,
                },
                (false, false) => {
                    let ord = va.compare(&vb).unwrap_or(Ordering::Equal);
                    match order.direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    }
                }
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Collapse rows to one per unique combination of `fields`,
/// first-encountered-in-order wins
pub fn apply_distinct(rows: Vec<Record>, fields: &[String]) -> Vec<Record> {
    if fields.is_empty() {
        return rows;
    }
    let mut seen = std::collections::HashSet::new();
    rows.into_iter()
        .filter(|row| {
            let key: Vec<ScalarValue> = fields.iter().map(|f| row.value(f)).collect();
            seen.insert(key)
        })
        .collect()
}

/// Index window over an ordered result set of `len` rows.
///
/// `cursor` is the index of the cursor row when one was requested and
/// found; the cursor row itself is part of the window, `skip` then moves
/// past it. A negative take pages backwards, ending at the cursor.
pub fn slice_window(len: usize, cursor: Option<usize>, take: Option<i64>, skip: u64) -> (usize, usize) {
    let skip = usize::try_from(skip).unwrap_or(usize::MAX);
    match take {
        Some(take) if take < 0 => {
            let n = take.unsigned_abs() as usize;
            let end = match cursor {
                Some(c) => (c + 1).saturating_sub(skip),
                None => len.saturating_sub(skip),
            };
            let end = end.min(len);
            (end.saturating_sub(n), end)
        }
        _ => {
            let start = match cursor {
                Some(c) => c.saturating_add(skip),
                None => skip,
            };
            let start = start.min(len);
            let end = match take {
                Some(take) => start.saturating_add(take as usize).min(len),
                None => len,
            };
            (start, end)
        }
    }
}
