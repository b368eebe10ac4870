//! In-memory predicate evaluation
//!
//! Decides whether a stored record matches a validated filter. Comparison
//! semantics mirror SQL three-valued logic: a null or missing field fails
//! every scalar test except an explicit equals-null, so the memory backend
//! and the SQL backend agree on edge cases.

use crate::error::OrmResult;
use crate::filter::{Filter, ScalarOp, StringMode};
use crate::schema::{EntityDescriptor, RelationDescriptor, Schema};
use crate::value::{Record, ScalarValue};

/// Supplies related records during evaluation. The memory backend
/// implements this over its locked store; quantifier filters recurse
/// through it.
pub trait RelationSource {
    fn related(
        &self,
        entity: &EntityDescriptor,
        relation: &RelationDescriptor,
        record: &Record,
    ) -> OrmResult<Vec<Record>>;
}

/// Evaluate a validated filter against one record
pub fn matches(
    schema: &Schema,
    entity: &EntityDescriptor,
    filter: &Filter,
    record: &Record,
    source: &dyn RelationSource,
) -> OrmResult<bool> {
    match filter {
        Filter::And(list) => {
            for f in list {
                if !matches(schema, entity, f, record, source)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Filter::Or(list) => {
            for f in list {
                if matches(schema, entity, f, record, source)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Filter::Not(inner) => Ok(!matches(schema, entity, inner, record, source)?),
        Filter::Scalar { field, op } => Ok(scalar_matches(&record.value(field), op)),
        Filter::SomeRelated { relation, filter } => {
            let (target, related) = fetch_related(schema, entity, relation, record, source)?;
            for rec in &related {
                if matches(schema, target, filter, rec, source)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Filter::EveryRelated { relation, filter } => {
            let (target, related) = fetch_related(schema, entity, relation, record, source)?;
            for rec in &related {
                if !matches(schema, target, filter, rec, source)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Filter::NoneRelated { relation, filter } => {
            let (target, related) = fetch_related(schema, entity, relation, record, source)?;
            for rec in &related {
                if matches(schema, target, filter, rec, source)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Filter::RelatedIs { relation, filter } => {
            let (target, related) = fetch_related(schema, entity, relation, record, source)?;
            match related.first() {
                Some(rec) => matches(schema, target, filter, rec, source),
                None => Ok(false),
            }
        }
        Filter::RelatedIsNull { relation } => {
            let (_, related) = fetch_related(schema, entity, relation, record, source)?;
            Ok(related.is_empty())
        }
    }
}

fn fetch_related<'s>(
    schema: &'s Schema,
    entity: &EntityDescriptor,
    relation: &str,
    record: &Record,
    source: &dyn RelationSource,
) -> OrmResult<(&'s EntityDescriptor, Vec<Record>)> {
    let rel = entity.relation(relation).ok_or_else(|| {
        crate::error::OrmError::validation(format!(
            "unknown relation '{}' on {} in filter",
            relation, entity.name
        ))
    })?;
    let target = schema.entity(rel.target)?;
    let related = source.related(entity, rel, record)?;
    Ok((target, related))
}

pub(crate) fn scalar_matches(value: &ScalarValue, op: &ScalarOp) -> bool {
    match op {
        ScalarOp::Equals(expected) => value == expected,
        ScalarOp::NotEquals(expected) => match (value.is_null(), expected.is_null()) {
            (_, true) => !value.is_null(),
            // SQL: NULL <> x is unknown
            (true, false) => false,
            (false, false) => value != expected,
        },
        ScalarOp::In(list) => !value.is_null() && list.contains(value),
        ScalarOp::NotIn(list) => {
            if list.is_empty() {
                return true;
            }
            !value.is_null() && !list.contains(value)
        }
        ScalarOp::Lt(bound) => matches_order(value, bound, |o| o.is_lt()),
        ScalarOp::Lte(bound) => matches_order(value, bound, |o| o.is_le()),
        ScalarOp::Gt(bound) => matches_order(value, bound, |o| o.is_gt()),
        ScalarOp::Gte(bound) => matches_order(value, bound, |o| o.is_ge()),
        ScalarOp::Contains(needle, mode) => {
            string_test(value, needle, *mode, |haystack, needle| {
                haystack.contains(needle)
            })
        }
        ScalarOp::StartsWith(prefix, mode) => {
            string_test(value, prefix, *mode, |haystack, prefix| {
                haystack.starts_with(prefix)
            })
        }
        ScalarOp::EndsWith(suffix, mode) => {
            string_test(value, suffix, *mode, |haystack, suffix| {
                haystack.ends_with(suffix)
            })
        }
    }
}

fn matches_order(
    value: &ScalarValue,
    bound: &ScalarValue,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> bool {
    value.compare(bound).map(accept).unwrap_or(false)
}

fn string_test(
    value: &ScalarValue,
    operand: &str,
    mode: StringMode,
    test: impl Fn(&str, &str) -> bool,
) -> bool {
    let Some(haystack) = value.as_str() else {
        return false;
    };
    match mode {
        StringMode::Default => test(haystack, operand),
        StringMode::Insensitive => test(&haystack.to_lowercase(), &operand.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use crate::schema::{FieldDescriptor, UniqueKeyDescriptor};
    use crate::value::FieldKind;

    static DRILL: EntityDescriptor = EntityDescriptor {
        name: "Drill",
        table: "drills",
        fields: &[
            FieldDescriptor::required("id", FieldKind::String),
            FieldDescriptor::required("nom", FieldKind::String),
            FieldDescriptor::optional("duree", FieldKind::Int),
        ],
        unique_keys: &[UniqueKeyDescriptor {
            name: "id",
            fields: &["id"],
        }],
        relations: &[],
    };

    struct NoRelations;

    impl RelationSource for NoRelations {
        fn related(
            &self,
            _entity: &EntityDescriptor,
            _relation: &RelationDescriptor,
            _record: &Record,
        ) -> OrmResult<Vec<Record>> {
            Ok(Vec::new())
        }
    }

    fn check(filter: &Filter, record: &Record) -> bool {
        let schema = Schema::new(&[&DRILL]);
        matches(&schema, &DRILL, filter, record, &NoRelations).unwrap()
    }

    fn drill(nom: &str, duree: Option<i64>) -> Record {
        Record::new()
            .set("id", "d1")
            .set("nom", nom)
            .set("duree", ScalarValue::from(duree))
    }

    #[test]
    fn equality_and_null_tests() {
        let rec = drill("passes croisées", None);
        assert!(check(&Filter::eq("nom", "passes croisées"), &rec));
        assert!(check(&Filter::is_null("duree"), &rec));
        assert!(!check(&Filter::eq("duree", 10i64), &rec));
        // NULL <> 10 is unknown, not true
        assert!(!check(&Filter::ne("duree", 10i64), &rec));
        assert!(check(&Filter::ne("nom", "autre"), &rec));
    }

    #[test]
    fn membership_edge_cases() {
        let rec = drill("smash", Some(12));
        assert!(!check(&Filter::is_in("duree", Vec::<i64>::new()), &rec));
        assert!(check(&Filter::not_in("duree", Vec::<i64>::new()), &rec));
        assert!(check(&Filter::is_in("duree", vec![10i64, 12]), &rec));
        assert!(!check(&Filter::not_in("duree", vec![10i64, 12]), &rec));

        let rec = drill("smash", None);
        // null is in no list and excluded by notIn on a non-empty list
        assert!(!check(&Filter::is_in("duree", vec![12i64]), &rec));
        assert!(!check(&Filter::not_in("duree", vec![12i64]), &rec));
        assert!(check(&Filter::not_in("duree", Vec::<i64>::new()), &rec));
    }

    #[test]
    fn ordering_skips_nulls() {
        assert!(check(&Filter::gt("duree", 10i64), &drill("a", Some(12))));
        assert!(!check(&Filter::gt("duree", 10i64), &drill("a", None)));
        assert!(check(&Filter::lte("duree", 12i64), &drill("a", Some(12))));
    }

    #[test]
    fn string_modes() {
        let rec = drill("Attaque Rapide", None);
        assert!(check(&Filter::contains("nom", "Rapide"), &rec));
        assert!(!check(&Filter::contains("nom", "rapide"), &rec));
        assert!(check(&Filter::contains_insensitive("nom", "rapide"), &rec));
        assert!(check(&Filter::starts_with("nom", "Attaque"), &rec));
        assert!(check(&Filter::ends_with_insensitive("nom", "RAPIDE"), &rec));
    }

    #[test]
    fn composition() {
        let rec = drill("bloc", Some(5));
        assert!(check(&Filter::and(vec![]), &rec));
        assert!(!check(&Filter::or(vec![]), &rec));
        assert!(check(
            &Filter::and(vec![
                Filter::eq("nom", "bloc"),
                Filter::not(Filter::gt("duree", 10i64)),
            ]),
            &rec
        ));
    }

    #[test]
    fn quantifiers_on_empty_relations() {
        // with no related records: some=false, every=true, none=true
        static TEAM: EntityDescriptor = EntityDescriptor {
            name: "Team",
            table: "teams",
            fields: &[FieldDescriptor::required("id", FieldKind::String)],
            unique_keys: &[],
            relations: &[crate::schema::RelationDescriptor {
                name: "drills",
                target: "Drill",
                kind: crate::schema::RelationKind::HasMany { target_key: "team_id" },
            }],
        };
        let schema = Schema::new(&[&DRILL, &TEAM]);
        let rec = Record::new().set("id", "t1");
        let inner = Filter::eq("nom", "x");

        let some = Filter::some("drills", inner.clone());
        let every = Filter::every("drills", inner.clone());
        let none = Filter::none("drills", inner);

        assert!(!matches(&schema, &TEAM, &some, &rec, &NoRelations).unwrap());
        assert!(matches(&schema, &TEAM, &every, &rec, &NoRelations).unwrap());
        assert!(matches(&schema, &TEAM, &none, &rec, &NoRelations).unwrap());
    }
}
