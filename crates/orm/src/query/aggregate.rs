//! Aggregation and group-by
//!
//! Accumulators are folded over the backend's filtered rows here in the
//! dispatch layer, so the memory and SQL backends share one
//! implementation; only plain `count` is pushed down.

use std::collections::BTreeMap;

use crate::error::{OrmError, OrmResult};
use crate::filter::eval::scalar_matches;
use crate::filter::{validate_filter, Filter, ScalarOp};
use crate::query::{SortDirection, NullsOrder};
use crate::schema::{EntityDescriptor, Schema};
use crate::value::{FieldKind, Record, ScalarValue};

/// Aggregate accumulator kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    Count,
    Avg,
    Sum,
    Min,
    Max,
}

/// Which accumulators an aggregate/groupBy call requests
#[derive(Debug, Clone, Default)]
pub struct AggSelect {
    /// Plain row count (`_count: true`)
    pub count: bool,
    /// Per-field non-null counts (`_count: {field: true}`)
    pub count_fields: Vec<String>,
    pub avg: Vec<String>,
    pub sum: Vec<String>,
    pub min: Vec<String>,
    pub max: Vec<String>,
}

impl AggSelect {
    pub fn count() -> Self {
        Self {
            count: true,
            ..Default::default()
        }
    }

    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }

    pub fn with_count_field(mut self, field: impl Into<String>) -> Self {
        self.count_fields.push(field.into());
        self
    }

    pub fn with_avg(mut self, field: impl Into<String>) -> Self {
        self.avg.push(field.into());
        self
    }

    pub fn with_sum(mut self, field: impl Into<String>) -> Self {
        self.sum.push(field.into());
        self
    }

    pub fn with_min(mut self, field: impl Into<String>) -> Self {
        self.min.push(field.into());
        self
    }

    pub fn with_max(mut self, field: impl Into<String>) -> Self {
        self.max.push(field.into());
        self
    }
}

/// Arguments of aggregate
#[derive(Debug, Clone, Default)]
pub struct AggregateArgs {
    pub filter: Option<Filter>,
    pub select: AggSelect,
}

/// Result of aggregate: one entry per requested accumulator, null (None)
/// when the aggregated set carries no value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateResult {
    pub count: Option<u64>,
    pub count_fields: BTreeMap<String, u64>,
    pub avg: BTreeMap<String, Option<f64>>,
    pub sum: BTreeMap<String, Option<i64>>,
    pub min: BTreeMap<String, Option<ScalarValue>>,
    pub max: BTreeMap<String, Option<ScalarValue>>,
}

/// Post-aggregation group filter: references `by` fields or accumulators
#[derive(Debug, Clone, PartialEq)]
pub enum Having {
    And(Vec<Having>),
    Or(Vec<Having>),
    Not(Box<Having>),
    Field {
        field: String,
        op: ScalarOp,
    },
    Agg {
        kind: AggKind,
        /// None only for Count (plain row count)
        field: Option<String>,
        op: ScalarOp,
    },
}

impl Having {
    pub fn field(field: impl Into<String>, op: ScalarOp) -> Self {
        Having::Field {
            field: field.into(),
            op,
        }
    }

    pub fn count(op: ScalarOp) -> Self {
        Having::Agg {
            kind: AggKind::Count,
            field: None,
            op,
        }
    }

    pub fn agg(kind: AggKind, field: impl Into<String>, op: ScalarOp) -> Self {
        Having::Agg {
            kind,
            field: Some(field.into()),
            op,
        }
    }
}

/// Sort key for group results
#[derive(Debug, Clone, PartialEq)]
pub enum GroupOrderKey {
    Field(String),
    Agg(AggKind, Option<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupOrderBy {
    pub key: GroupOrderKey,
    pub direction: SortDirection,
}

impl GroupOrderBy {
    pub fn field_asc(field: impl Into<String>) -> Self {
        Self {
            key: GroupOrderKey::Field(field.into()),
            direction: SortDirection::Asc,
        }
    }

    pub fn field_desc(field: impl Into<String>) -> Self {
        Self {
            key: GroupOrderKey::Field(field.into()),
            direction: SortDirection::Desc,
        }
    }

    pub fn count_desc() -> Self {
        Self {
            key: GroupOrderKey::Agg(AggKind::Count, None),
            direction: SortDirection::Desc,
        }
    }
}

/// Arguments of groupBy
#[derive(Debug, Clone, Default)]
pub struct GroupByArgs {
    pub by: Vec<String>,
    pub filter: Option<Filter>,
    pub having: Option<Having>,
    pub order_by: Vec<GroupOrderBy>,
    pub take: Option<i64>,
    pub skip: u64,
    pub select: AggSelect,
}

impl GroupByArgs {
    pub fn by(fields: Vec<&str>) -> Self {
        Self {
            by: fields.into_iter().map(String::from).collect(),
            select: AggSelect::count(),
            ..Default::default()
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn having(mut self, having: Having) -> Self {
        self.having = Some(having);
        self
    }

    pub fn order_by(mut self, order: GroupOrderBy) -> Self {
        self.order_by.push(order);
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

    pub fn select(mut self, select: AggSelect) -> Self {
        self.select = select;
        self
    }
}

/// One group result: the distinct `by` combination plus requested
/// accumulators
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    pub keys: BTreeMap<String, ScalarValue>,
    pub count: Option<u64>,
    pub count_fields: BTreeMap<String, u64>,
    pub avg: BTreeMap<String, Option<f64>>,
    pub sum: BTreeMap<String, Option<i64>>,
    pub min: BTreeMap<String, Option<ScalarValue>>,
    pub max: BTreeMap<String, Option<ScalarValue>>,
}

pub fn validate_aggregate(
    schema: &Schema,
    entity: &EntityDescriptor,
    args: &AggregateArgs,
) -> OrmResult<()> {
    if let Some(filter) = &args.filter {
        validate_filter(schema, entity, filter)?;
    }
    validate_agg_select(entity, &args.select)
}

fn validate_agg_select(entity: &EntityDescriptor, select: &AggSelect) -> OrmResult<()> {
    for field in select
        .count_fields
        .iter()
        .chain(&select.min)
        .chain(&select.max)
    {
        if entity.field(field).is_none() {
            return Err(OrmError::validation(format!(
                "unknown field '{}' on {} in aggregate selection",
                field, entity.name
            )));
        }
    }
    for field in select.avg.iter().chain(&select.sum) {
        check_numeric(entity, field)?;
    }
    Ok(())
}

fn check_numeric(entity: &EntityDescriptor, field: &str) -> OrmResult<()> {
    match entity.field(field) {
        None => Err(OrmError::validation(format!(
            "unknown field '{}' on {} in aggregate selection",
            field, entity.name
        ))),
        Some(descriptor) if descriptor.kind != FieldKind::Int => Err(OrmError::validation(format!(
            "_avg/_sum apply to numeric fields only; {}.{} is {}",
            entity.name, field, descriptor.kind
        ))),
        Some(_) => Ok(()),
    }
}

pub fn validate_group_by(
    schema: &Schema,
    entity: &EntityDescriptor,
    args: &GroupByArgs,
) -> OrmResult<()> {
    if args.by.is_empty() {
        return Err(OrmError::validation(
            "groupBy requires a non-empty `by` list",
        ));
    }
    for field in &args.by {
        if entity.field(field).is_none() {
            return Err(OrmError::validation(format!(
                "unknown field '{}' on {} in groupBy",
                field, entity.name
            )));
        }
    }
    if let Some(filter) = &args.filter {
        validate_filter(schema, entity, filter)?;
    }
    if let Some(having) = &args.having {
        validate_having(entity, &args.by, having)?;
    }
    for order in &args.order_by {
        match &order.key {
            GroupOrderKey::Field(field) => {
                if !args.by.iter().any(|b| b == field) {
                    return Err(OrmError::validation(format!(
                        "groupBy orderBy references '{}' which is not in `by`",
                        field
                    )));
                }
            }
            GroupOrderKey::Agg(kind, field) => validate_agg_ref(entity, *kind, field.as_deref())?,
        }
    }
    if (args.take.is_some() || args.skip > 0) && args.order_by.is_empty() {
        return Err(OrmError::validation(
            "groupBy take/skip require an orderBy",
        ));
    }
    validate_agg_select(entity, &args.select)
}

fn validate_having(entity: &EntityDescriptor, by: &[String], having: &Having) -> OrmResult<()> {
    match having {
        Having::And(list) | Having::Or(list) => {
            for h in list {
                validate_having(entity, by, h)?;
            }
            Ok(())
        }
        Having::Not(inner) => validate_having(entity, by, inner),
        Having::Field { field, .. } => {
            if !by.iter().any(|b| b == field) {
                return Err(OrmError::validation(format!(
                    "having references '{}' which is not in `by`",
                    field
                )));
            }
            Ok(())
        }
        Having::Agg { kind, field, .. } => validate_agg_ref(entity, *kind, field.as_deref()),
    }
}

fn validate_agg_ref(
    entity: &EntityDescriptor,
    kind: AggKind,
    field: Option<&str>,
) -> OrmResult<()> {
    match (kind, field) {
        (AggKind::Count, None) => Ok(()),
        (_, None) => Err(OrmError::validation(
            "aggregate reference requires a field except for plain _count",
        )),
        (AggKind::Avg | AggKind::Sum, Some(field)) => check_numeric(entity, field),
        (_, Some(field)) => {
            if entity.field(field).is_none() {
                return Err(OrmError::validation(format!(
                    "unknown field '{}' on {} in aggregate reference",
                    field, entity.name
                )));
            }
            Ok(())
        }
    }
}

/// Fold the requested accumulators over a filtered row set
pub fn fold_aggregate(rows: &[Record], select: &AggSelect) -> AggregateResult {
    let mut result = AggregateResult::default();
    if select.count {
        result.count = Some(rows.len() as u64);
    }
    for field in &select.count_fields {
        result
            .count_fields
            .insert(field.clone(), non_null_count(rows, field));
    }
    for field in &select.avg {
        result.avg.insert(field.clone(), fold_avg(rows, field));
    }
    for field in &select.sum {
        result.sum.insert(field.clone(), fold_sum(rows, field));
    }
    for field in &select.min {
        result.min.insert(field.clone(), fold_extreme(rows, field, true));
    }
    for field in &select.max {
        result.max.insert(field.clone(), fold_extreme(rows, field, false));
    }
    result
}

fn non_null_count(rows: &[Record], field: &str) -> u64 {
    rows.iter().filter(|r| !r.value(field).is_null()).count() as u64
}

fn fold_sum(rows: &[Record], field: &str) -> Option<i64> {
    let mut sum = None;
    for row in rows {
        if let Some(v) = row.value(field).as_i64() {
            sum = Some(sum.unwrap_or(0) + v);
        }
    }
    sum
}

fn fold_avg(rows: &[Record], field: &str) -> Option<f64> {
    let mut sum = 0i64;
    let mut n = 0u64;
    for row in rows {
        if let Some(v) = row.value(field).as_i64() {
            sum += v;
            n += 1;
        }
    }
    if n == 0 {
        None
    } else {
        Some(sum as f64 / n as f64)
    }
}

fn fold_extreme(rows: &[Record], field: &str, min: bool) -> Option<ScalarValue> {
    let mut best: Option<ScalarValue> = None;
    for row in rows {
        let v = row.value(field);
        if v.is_null() {
            continue;
        }
        best = match best {
            None => Some(v),
            Some(current) => match v.compare(&current) {
                Some(ord) if (min && ord.is_lt()) || (!min && ord.is_gt()) => Some(v),
                _ => Some(current),
            },
        };
    }
    best
}

/// Accumulator value of one group, as a scalar, for having/order use
fn agg_value(rows: &[Record], kind: AggKind, field: Option<&str>) -> ScalarValue {
    match (kind, field) {
        (AggKind::Count, None) => ScalarValue::Int(rows.len() as i64),
        (AggKind::Count, Some(field)) => ScalarValue::Int(non_null_count(rows, field) as i64),
        (AggKind::Sum, Some(field)) => match fold_sum(rows, field) {
            Some(v) => ScalarValue::Int(v),
            None => ScalarValue::Null,
        },
        (AggKind::Avg, Some(field)) => match fold_avg(rows, field) {
            Some(v) => ScalarValue::Float(v),
            None => ScalarValue::Null,
        },
        (AggKind::Min, Some(field)) => fold_extreme(rows, field, true).unwrap_or(ScalarValue::Null),
        (AggKind::Max, Some(field)) => fold_extreme(rows, field, false).unwrap_or(ScalarValue::Null),
        _ => ScalarValue::Null,
    }
}

fn having_holds(keys: &BTreeMap<String, ScalarValue>, rows: &[Record], having: &Having) -> bool {
    match having {
        Having::And(list) => list.iter().all(|h| having_holds(keys, rows, h)),
        Having::Or(list) => list.iter().any(|h| having_holds(keys, rows, h)),
        Having::Not(inner) => !having_holds(keys, rows, inner),
        Having::Field { field, op } => {
            scalar_matches(keys.get(field).unwrap_or(&ScalarValue::Null), op)
        }
        Having::Agg { kind, field, op } => {
            scalar_matches(&agg_value(rows, *kind, field.as_deref()), op)
        }
    }
}

/// Partition validated, filtered rows into groups, apply having, order,
/// window, and build the result rows
pub fn fold_group_by(rows: Vec<Record>, args: &GroupByArgs) -> Vec<GroupRow> {
    // first-encountered order of key combinations is preserved
    let mut order: Vec<Vec<ScalarValue>> = Vec::new();
    let mut groups: std::collections::HashMap<Vec<ScalarValue>, Vec<Record>> =
        std::collections::HashMap::new();
    for row in rows {
        let key: Vec<ScalarValue> = args.by.iter().map(|f| row.value(f)).collect();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(row);
    }

    let mut entries: Vec<(BTreeMap<String, ScalarValue>, Vec<Record>)> = order
        .into_iter()
        .map(|key| {
            let rows = groups.remove(&key).unwrap_or_default();
            let keys: BTreeMap<String, ScalarValue> = args
                .by
                .iter()
                .cloned()
                .zip(key.into_iter())
                .collect();
            (keys, rows)
        })
        .collect();

    if let Some(having) = &args.having {
        entries.retain(|(keys, rows)| having_holds(keys, rows, having));
    }

    if !args.order_by.is_empty() {
        entries.sort_by(|(keys_a, rows_a), (keys_b, rows_b)| {
            for order in &args.order_by {
                let (va, vb) = match &order.key {
                    GroupOrderKey::Field(field) => (
                        keys_a.get(field).cloned().unwrap_or(ScalarValue::Null),
                        keys_b.get(field).cloned().unwrap_or(ScalarValue::Null),
                    ),
                    GroupOrderKey::Agg(kind, field) => (
                        agg_value(rows_a, *kind, field.as_deref()),
                        agg_value(rows_b, *kind, field.as_deref()),
                    ),
                };
                let ord = compare_for_order(&va, &vb, order.direction);
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
    }

    let (start, end) = crate::query::slice_window(entries.len(), None, args.take, args.skip);
    entries
        .into_iter()
        .skip(start)
        .take(end.saturating_sub(start))
        .map(|(keys, rows)| {
            let folded = fold_aggregate(&rows, &args.select);
            GroupRow {
                keys,
                count: folded.count,
                count_fields: folded.count_fields,
                avg: folded.avg,
                sum: folded.sum,
                min: folded.min,
                max: folded.max,
            }
        })
        .collect()
}

fn compare_for_order(
    a: &ScalarValue,
    b: &ScalarValue,
    direction: SortDirection,
) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    let nulls = match direction {
        SortDirection::Asc => NullsOrder::Last,
        SortDirection::Desc => NullsOrder::First,
    };
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => match nulls {
            NullsOrder::First => Ordering::Less,
            NullsOrder::Last => Ordering::Greater,
        },
        (false, true) => match nulls {
            NullsOrder::First => Ordering::Greater,
            NullsOrder::Last => Ordering::Less,
        },
        (false, false) => {
            let ord = a.compare(b).unwrap_or(Ordering::Equal);
            match direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        }
    }
}
