//! Filter AST - the where-clause contract shared by every entity
//!
//! A [`Filter`] is a tree of scalar conditions, boolean composition and
//! relation quantifiers. It is validated against an entity descriptor
//! before anything touches storage, then either evaluated in memory
//! ([`eval`]) or compiled to SQL by the PostgreSQL backend.

pub mod eval;

use crate::error::{OrmError, OrmResult};
use crate::schema::{EntityDescriptor, RelationKind, Schema};
use crate::value::{FieldKind, ScalarValue};

/// Case handling for string operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringMode {
    /// Case-sensitive comparison
    #[default]
    Default,
    /// Case-folded comparison
    Insensitive,
}

/// Condition on a single scalar field
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarOp {
    Equals(ScalarValue),
    NotEquals(ScalarValue),
    /// Empty list matches nothing
    In(Vec<ScalarValue>),
    /// Empty list matches everything
    NotIn(Vec<ScalarValue>),
    Lt(ScalarValue),
    Lte(ScalarValue),
    Gt(ScalarValue),
    Gte(ScalarValue),
    Contains(String, StringMode),
    StartsWith(String, StringMode),
    EndsWith(String, StringMode),
}

/// Filter tree over one entity and, through relations, its neighbours
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// All sub-filters hold; empty list matches everything
    And(Vec<Filter>),
    /// Any sub-filter holds; empty list matches nothing
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Scalar { field: String, op: ScalarOp },
    /// At least one related record matches (to-many relations)
    SomeRelated { relation: String, filter: Box<Filter> },
    /// Every related record matches; vacuously true when none exist
    EveryRelated { relation: String, filter: Box<Filter> },
    /// No related record matches; vacuously true when none exist
    NoneRelated { relation: String, filter: Box<Filter> },
    /// To-one relation is present and matches
    RelatedIs { relation: String, filter: Box<Filter> },
    /// To-one relation is absent (null foreign key)
    RelatedIsNull { relation: String },
}

impl Filter {
    fn scalar(field: impl Into<String>, op: ScalarOp) -> Self {
        Filter::Scalar {
            field: field.into(),
            op,
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::scalar(field, ScalarOp::Equals(value.into()))
    }

    pub fn ne(field: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::scalar(field, ScalarOp::NotEquals(value.into()))
    }

    /// Shorthand for `eq(field, null)`
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::scalar(field, ScalarOp::Equals(ScalarValue::Null))
    }

    pub fn is_in<V: Into<ScalarValue>>(field: impl Into<String>, values: Vec<V>) -> Self {
        Self::scalar(
            field,
            ScalarOp::In(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn not_in<V: Into<ScalarValue>>(field: impl Into<String>, values: Vec<V>) -> Self {
        Self::scalar(
            field,
            ScalarOp::NotIn(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn lt(field: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::scalar(field, ScalarOp::Lt(value.into()))
    }

    pub fn lte(field: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::scalar(field, ScalarOp::Lte(value.into()))
    }

    pub fn gt(field: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::scalar(field, ScalarOp::Gt(value.into()))
    }

    pub fn gte(field: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::scalar(field, ScalarOp::Gte(value.into()))
    }

    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::scalar(field, ScalarOp::Contains(needle.into(), StringMode::Default))
    }

    pub fn contains_insensitive(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::scalar(
            field,
            ScalarOp::Contains(needle.into(), StringMode::Insensitive),
        )
    }

    pub fn starts_with(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::scalar(
            field,
            ScalarOp::StartsWith(prefix.into(), StringMode::Default),
        )
    }

    pub fn starts_with_insensitive(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::scalar(
            field,
            ScalarOp::StartsWith(prefix.into(), StringMode::Insensitive),
        )
    }

    pub fn ends_with(field: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self::scalar(field, ScalarOp::EndsWith(suffix.into(), StringMode::Default))
    }

    pub fn ends_with_insensitive(field: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self::scalar(
            field,
            ScalarOp::EndsWith(suffix.into(), StringMode::Insensitive),
        )
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    pub fn some(relation: impl Into<String>, filter: Filter) -> Self {
        Filter::SomeRelated {
            relation: relation.into(),
            filter: Box::new(filter),
        }
    }

    pub fn every(relation: impl Into<String>, filter: Filter) -> Self {
        Filter::EveryRelated {
            relation: relation.into(),
            filter: Box::new(filter),
        }
    }

    pub fn none(relation: impl Into<String>, filter: Filter) -> Self {
        Filter::NoneRelated {
            relation: relation.into(),
            filter: Box::new(filter),
        }
    }

    pub fn related(relation: impl Into<String>, filter: Filter) -> Self {
        Filter::RelatedIs {
            relation: relation.into(),
            filter: Box::new(filter),
        }
    }

    pub fn related_is_null(relation: impl Into<String>) -> Self {
        Filter::RelatedIsNull {
            relation: relation.into(),
        }
    }
}

/// Check a filter against the entity it targets. Unknown fields or
/// relations, kind mismatches, quantifiers on the wrong relation arity -
/// all fail fast as Validation before any storage round-trip.
pub fn validate_filter(
    schema: &Schema,
    entity: &EntityDescriptor,
    filter: &Filter,
) -> OrmResult<()> {
    match filter {
        Filter::And(list) | Filter::Or(list) => {
            for f in list {
                validate_filter(schema, entity, f)?;
            }
            Ok(())
        }
        Filter::Not(inner) => validate_filter(schema, entity, inner),
        Filter::Scalar { field, op } => {
            let descriptor = entity.field(field).ok_or_else(|| {
                OrmError::validation(format!(
                    "unknown field '{}' on {} in filter",
                    field, entity.name
                ))
            })?;
            validate_scalar_op(entity.name, field, descriptor.kind, op)
        }
        Filter::SomeRelated { relation, filter }
        | Filter::EveryRelated { relation, filter }
        | Filter::NoneRelated { relation, filter } => {
            let rel = lookup_relation(entity, relation)?;
            if !rel.is_to_many() {
                return Err(OrmError::validation(format!(
                    "relation '{}' on {} is to-one; some/every/none apply to list relations",
                    relation, entity.name
                )));
            }
            validate_filter(schema, schema.entity(rel.target)?, filter)
        }
        Filter::RelatedIs { relation, filter } => {
            let rel = lookup_relation(entity, relation)?;
            if rel.is_to_many() {
                return Err(OrmError::validation(format!(
                    "relation '{}' on {} is a list relation; use some/every/none",
                    relation, entity.name
                )));
            }
            validate_filter(schema, schema.entity(rel.target)?, filter)
        }
        Filter::RelatedIsNull { relation } => {
            let rel = lookup_relation(entity, relation)?;
            match rel.kind {
                RelationKind::BelongsTo { .. } => Ok(()),
                _ => Err(OrmError::validation(format!(
                    "relation '{}' on {} is a list relation and cannot be null-tested",
                    relation, entity.name
                ))),
            }
        }
    }
}

fn lookup_relation<'a>(
    entity: &'a EntityDescriptor,
    name: &str,
) -> OrmResult<&'a crate::schema::RelationDescriptor> {
    entity.relation(name).ok_or_else(|| {
        OrmError::validation(format!(
            "unknown relation '{}' on {} in filter",
            name, entity.name
        ))
    })
}

fn validate_scalar_op(
    entity: &str,
    field: &str,
    kind: FieldKind,
    op: &ScalarOp,
) -> OrmResult<()> {
    let check_operand = |value: &ScalarValue| -> OrmResult<()> {
        match value.kind() {
            None => Ok(()),
            Some(k) if k == kind => Ok(()),
            Some(k) => Err(OrmError::validation(format!(
                "filter on {}.{} expects {} but got {}",
                entity, field, kind, k
            ))),
        }
    };

    match op {
        ScalarOp::Equals(v) | ScalarOp::NotEquals(v) => check_operand(v),
        ScalarOp::In(values) | ScalarOp::NotIn(values) => {
            for v in values {
                if v.is_null() {
                    return Err(OrmError::validation(format!(
                        "null is not a legal element of in/notIn on {}.{}",
                        entity, field
                    )));
                }
                check_operand(v)?;
            }
            Ok(())
        }
        ScalarOp::Lt(v) | ScalarOp::Lte(v) | ScalarOp::Gt(v) | ScalarOp::Gte(v) => {
            if kind == FieldKind::Bool {
                return Err(OrmError::validation(format!(
                    "ordering operators do not apply to Bool field {}.{}",
                    entity, field
                )));
            }
            if v.is_null() {
                return Err(OrmError::validation(format!(
                    "ordering comparison against null on {}.{}",
                    entity, field
                )));
            }
            check_operand(v)
        }
        ScalarOp::Contains(_, _) | ScalarOp::StartsWith(_, _) | ScalarOp::EndsWith(_, _) => {
            if kind != FieldKind::String {
                return Err(OrmError::validation(format!(
                    "string operators do not apply to {} field {}.{}",
                    kind, entity, field
                )));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDefault, FieldDescriptor, UniqueKeyDescriptor};

    static MATCH: EntityDescriptor = EntityDescriptor {
        name: "Match",
        table: "matches",
        fields: &[
            FieldDescriptor::required("id", FieldKind::String)
                .with_default(FieldDefault::Uuid)
                .immutable(),
            FieldDescriptor::required("adversaire", FieldKind::String),
            FieldDescriptor::optional("score", FieldKind::Int),
            FieldDescriptor::required("domicile", FieldKind::Bool),
        ],
        unique_keys: &[UniqueKeyDescriptor {
            name: "id",
            fields: &["id"],
        }],
        relations: &[],
    };

    fn schema() -> Schema {
        Schema::new(&[&MATCH])
    }

    #[test]
    fn accepts_well_formed_filters() {
        let filter = Filter::and(vec![
            Filter::contains_insensitive("adversaire", "lyon"),
            Filter::or(vec![
                Filter::gte("score", 10i64),
                Filter::is_null("score"),
            ]),
            Filter::not(Filter::eq("domicile", false)),
        ]);
        assert!(validate_filter(&schema(), &MATCH, &filter).is_ok());
    }

    #[test]
    fn rejects_unknown_field() {
        let filter = Filter::eq("arbitre", "x");
        assert!(matches!(
            validate_filter(&schema(), &MATCH, &filter),
            Err(OrmError::Validation(_))
        ));
    }

    #[test]
    fn rejects_kind_mismatch() {
        let filter = Filter::eq("score", "dix");
        assert!(validate_filter(&schema(), &MATCH, &filter).is_err());
    }

    #[test]
    fn rejects_ordering_on_bool() {
        let filter = Filter::gt("domicile", true);
        assert!(validate_filter(&schema(), &MATCH, &filter).is_err());
    }

    #[test]
    fn rejects_string_ops_on_int() {
        let filter = Filter::contains("score", "1");
        assert!(validate_filter(&schema(), &MATCH, &filter).is_err());
    }

    #[test]
    fn rejects_null_in_list() {
        let filter = Filter::Scalar {
            field: "adversaire".into(),
            op: ScalarOp::In(vec!["a".into(), ScalarValue::Null]),
        };
        assert!(validate_filter(&schema(), &MATCH, &filter).is_err());
    }

    #[test]
    fn rejects_unknown_relation() {
        let filter = Filter::some("joueurs", Filter::eq("id", "x"));
        assert!(validate_filter(&schema(), &MATCH, &filter).is_err());
    }
}
