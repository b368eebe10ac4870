//! Filter and statement compilation for the PostgreSQL backend
//!
//! Everything binds through numbered placeholders; null values are written
//! as literal NULL so parameters always carry a concrete type. Relation
//! quantifiers become EXISTS subqueries with fresh table aliases.

use crate::error::{OrmError, OrmResult};
use crate::filter::{Filter, ScalarOp, StringMode};
use crate::query::{NullsOrder, OrderBy, SortDirection, UniqueWhere};
use crate::schema::{EntityDescriptor, RelationDescriptor, RelationKind, Schema};
use crate::value::{Record, ScalarValue};

/// A compiled statement and its bound parameters, in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<ScalarValue>,
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier)
}

fn push_param(params: &mut Vec<ScalarValue>, value: ScalarValue) -> String {
    params.push(value);
    format!("${}", params.len())
}

/// Escape LIKE wildcards in a caller-supplied fragment
fn escape_like(fragment: &str) -> String {
    fragment
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Compile a validated filter into a WHERE fragment over `alias`
pub fn compile_filter(
    schema: &Schema,
    entity: &EntityDescriptor,
    filter: &Filter,
    alias: &str,
    next_alias: &mut u32,
    params: &mut Vec<ScalarValue>,
) -> OrmResult<String> {
    match filter {
        Filter::And(list) => {
            if list.is_empty() {
                return Ok("TRUE".to_string());
            }
            let parts = list
                .iter()
                .map(|f| compile_filter(schema, entity, f, alias, next_alias, params))
                .collect::<OrmResult<Vec<_>>>()?;
            Ok(format!("({})", parts.join(" AND ")))
        }
        Filter::Or(list) => {
            if list.is_empty() {
                return Ok("FALSE".to_string());
            }
            let parts = list
                .iter()
                .map(|f| compile_filter(schema, entity, f, alias, next_alias, params))
                .collect::<OrmResult<Vec<_>>>()?;
            Ok(format!("({})", parts.join(" OR ")))
        }
        Filter::Not(inner) => {
            let part = compile_filter(schema, entity, inner, alias, next_alias, params)?;
            // IS TRUE collapses SQL unknown to false so negation matches
            // the evaluator's two-valued reading of null operands
            Ok(format!("NOT (({}) IS TRUE)", part))
        }
        Filter::Scalar { field, op } => Ok(compile_scalar(alias, field, op, params)),
        Filter::SomeRelated { relation, filter } => {
            let rel = relation_of(entity, relation)?;
            compile_quantifier(schema, entity, rel, filter, alias, next_alias, params, Quantifier::Some)
        }
        Filter::EveryRelated { relation, filter } => {
            let rel = relation_of(entity, relation)?;
            compile_quantifier(schema, entity, rel, filter, alias, next_alias, params, Quantifier::Every)
        }
        Filter::NoneRelated { relation, filter } => {
            let rel = relation_of(entity, relation)?;
            compile_quantifier(schema, entity, rel, filter, alias, next_alias, params, Quantifier::None)
        }
        Filter::RelatedIs { relation, filter } => {
            let rel = relation_of(entity, relation)?;
            let RelationKind::BelongsTo { foreign_key } = rel.kind else {
                return Err(OrmError::validation(format!(
                    "relation '{}' is not to-one",
                    relation
                )));
            };
            let target = schema.entity(rel.target)?;
            let inner_alias = fresh_alias(next_alias);
            let inner = compile_filter(schema, target, filter, &inner_alias, next_alias, params)?;
            Ok(format!(
                "EXISTS (SELECT 1 FROM {} AS {} WHERE {}.{} = {}.{} AND ({}))",
                quote(target.table),
                inner_alias,
                inner_alias,
                quote("id"),
                alias,
                quote(foreign_key),
                inner
            ))
        }
        Filter::RelatedIsNull { relation } => {
            let rel = relation_of(entity, relation)?;
            let RelationKind::BelongsTo { foreign_key } = rel.kind else {
                return Err(OrmError::validation(format!(
                    "relation '{}' is not to-one",
                    relation
                )));
            };
            Ok(format!("{}.{} IS NULL", alias, quote(foreign_key)))
        }
    }
}

enum Quantifier {
    Some,
    Every,
    None,
}

#[allow(clippy::too_many_arguments)]
fn compile_quantifier(
    schema: &Schema,
    _entity: &EntityDescriptor,
    rel: &RelationDescriptor,
    filter: &Filter,
    alias: &str,
    next_alias: &mut u32,
    params: &mut Vec<ScalarValue>,
    quantifier: Quantifier,
) -> OrmResult<String> {
    let target = schema.entity(rel.target)?;
    let inner_alias = fresh_alias(next_alias);

    let (from_clause, correlation) = match rel.kind {
        RelationKind::HasMany { target_key } => (
            format!("{} AS {}", quote(target.table), inner_alias),
            format!("{}.{} = {}.{}", inner_alias, quote(target_key), alias, quote("id")),
        ),
        RelationKind::ManyToMany {
            join_table,
            left_key,
            right_key,
        } => {
            let join_alias = fresh_alias(next_alias);
            (
                format!(
                    "{} AS {} JOIN {} AS {} ON {}.{} = {}.{}",
                    quote(join_table),
                    join_alias,
                    quote(target.table),
                    inner_alias,
                    join_alias,
                    quote(right_key),
                    inner_alias,
                    quote("id"),
                ),
                format!("{}.{} = {}.{}", join_alias, quote(left_key), alias, quote("id")),
            )
        }
        RelationKind::BelongsTo { .. } => {
            return Err(OrmError::validation(format!(
                "relation '{}' is to-one; quantifiers apply to list relations",
                rel.name
            )));
        }
    };

    let inner = compile_filter(schema, target, filter, &inner_alias, next_alias, params)?;
    Ok(match quantifier {
        Quantifier::Some => format!(
            "EXISTS (SELECT 1 FROM {} WHERE {} AND ({}))",
            from_clause, correlation, inner
        ),
        Quantifier::Every => format!(
            "NOT EXISTS (SELECT 1 FROM {} WHERE {} AND NOT (({}) IS TRUE))",
            from_clause, correlation, inner
        ),
        Quantifier::None => format!(
            "NOT EXISTS (SELECT 1 FROM {} WHERE {} AND ({}))",
            from_clause, correlation, inner
        ),
    })
}

fn relation_of<'e>(
    entity: &'e EntityDescriptor,
    name: &str,
) -> OrmResult<&'e RelationDescriptor> {
    entity
        .relation(name)
        .ok_or_else(|| OrmError::validation(format!("unknown relation '{}' on {}", name, entity.name)))
}

fn fresh_alias(next_alias: &mut u32) -> String {
    let alias = format!("t{}", *next_alias);
    *next_alias += 1;
    alias
}

fn compile_scalar(
    alias: &str,
    field: &str,
    op: &ScalarOp,
    params: &mut Vec<ScalarValue>,
) -> String {
    let column = format!("{}.{}", alias, quote(field));
    match op {
        ScalarOp::Equals(ScalarValue::Null) => format!("{} IS NULL", column),
        ScalarOp::NotEquals(ScalarValue::Null) => format!("{} IS NOT NULL", column),
        ScalarOp::Equals(v) => {
            let p = push_param(params, v.clone());
            format!("{} = {}", column, p)
        }
        ScalarOp::NotEquals(v) => {
            let p = push_param(params, v.clone());
            format!("{} <> {}", column, p)
        }
        ScalarOp::In(values) => {
            if values.is_empty() {
                return "FALSE".to_string();
            }
            let placeholders: Vec<String> = values
                .iter()
                .map(|v| push_param(params, v.clone()))
                .collect();
            format!("{} IN ({})", column, placeholders.join(", "))
        }
        ScalarOp::NotIn(values) => {
            if values.is_empty() {
                return "TRUE".to_string();
            }
            let placeholders: Vec<String> = values
                .iter()
                .map(|v| push_param(params, v.clone()))
                .collect();
            format!("{} NOT IN ({})", column, placeholders.join(", "))
        }
        ScalarOp::Lt(v) => {
            let p = push_param(params, v.clone());
            format!("{} < {}", column, p)
        }
        ScalarOp::Lte(v) => {
            let p = push_param(params, v.clone());
            format!("{} <= {}", column, p)
        }
        ScalarOp::Gt(v) => {
            let p = push_param(params, v.clone());
            format!("{} > {}", column, p)
        }
        ScalarOp::Gte(v) => {
            let p = push_param(params, v.clone());
            format!("{} >= {}", column, p)
        }
        ScalarOp::Contains(needle, mode) => {
            like_clause(&column, format!("%{}%", escape_like(needle)), *mode, params)
        }
        ScalarOp::StartsWith(prefix, mode) => {
            like_clause(&column, format!("{}%", escape_like(prefix)), *mode, params)
        }
        ScalarOp::EndsWith(suffix, mode) => {
            like_clause(&column, format!("%{}", escape_like(suffix)), *mode, params)
        }
    }
}

fn like_clause(
    column: &str,
    pattern: String,
    mode: StringMode,
    params: &mut Vec<ScalarValue>,
) -> String {
    let operator = match mode {
        StringMode::Default => "LIKE",
        StringMode::Insensitive => "ILIKE",
    };
    let p = push_param(params, ScalarValue::String(pattern));
    format!("{} {} {} ESCAPE '\\'", column, operator, p)
}

fn compile_order(alias: &str, order_by: &[OrderBy]) -> String {
    if order_by.is_empty() {
        return String::new();
    }
    let clauses: Vec<String> = order_by
        .iter()
        .map(|order| {
            let direction = match order.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            let nulls = match order.effective_nulls() {
                NullsOrder::First => "NULLS FIRST",
                NullsOrder::Last => "NULLS LAST",
            };
            format!("{}.{} {} {}", alias, quote(&order.field), direction, nulls)
        })
        .collect();
    format!(" ORDER BY {}", clauses.join(", "))
}

fn window_clause(take: Option<i64>, skip: u64) -> String {
    let mut out = String::new();
    if let Some(take) = take {
        // the dispatcher only pushes forward windows down to SQL
        if take >= 0 {
            out.push_str(&format!(" LIMIT {}", take));
        }
    }
    if skip > 0 {
        out.push_str(&format!(" OFFSET {}", skip));
    }
    out
}

pub fn compile_select(
    schema: &Schema,
    entity: &EntityDescriptor,
    query: crate::backends::RecordQuery<'_>,
) -> OrmResult<SqlQuery> {
    let mut params = Vec::new();
    let mut next_alias = 1u32;
    let mut sql = format!("SELECT t0.* FROM {} AS t0", quote(entity.table));
    if let Some(filter) = query.filter {
        let clause = compile_filter(schema, entity, filter, "t0", &mut next_alias, &mut params)?;
        sql.push_str(&format!(" WHERE {}", clause));
    }
    sql.push_str(&compile_order("t0", query.order_by));
    sql.push_str(&window_clause(query.take, query.skip));
    Ok(SqlQuery { sql, params })
}

pub fn compile_count(
    schema: &Schema,
    entity: &EntityDescriptor,
    filter: Option<&Filter>,
) -> OrmResult<SqlQuery> {
    let mut params = Vec::new();
    let mut next_alias = 1u32;
    let mut sql = format!("SELECT COUNT(*) FROM {} AS t0", quote(entity.table));
    if let Some(filter) = filter {
        let clause = compile_filter(schema, entity, filter, "t0", &mut next_alias, &mut params)?;
        sql.push_str(&format!(" WHERE {}", clause));
    }
    Ok(SqlQuery { sql, params })
}

fn insert_columns(entity: &EntityDescriptor) -> String {
    entity
        .fields
        .iter()
        .map(|f| quote(f.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn insert_values(entity: &EntityDescriptor, record: &Record, params: &mut Vec<ScalarValue>) -> String {
    let values: Vec<String> = entity
        .fields
        .iter()
        .map(|f| {
            let value = record.value(f.name);
            if value.is_null() {
                "NULL".to_string()
            } else {
                push_param(params, value)
            }
        })
        .collect();
    format!("({})", values.join(", "))
}

pub fn compile_insert(entity: &EntityDescriptor, record: &Record) -> SqlQuery {
    let mut params = Vec::new();
    let values = insert_values(entity, record, &mut params);
    let sql = format!(
        "INSERT INTO {} ({}) VALUES {} RETURNING *",
        quote(entity.table),
        insert_columns(entity),
        values
    );
    SqlQuery { sql, params }
}

pub fn compile_insert_many(
    entity: &EntityDescriptor,
    records: &[Record],
    skip_duplicates: bool,
) -> SqlQuery {
    let mut params = Vec::new();
    let rows: Vec<String> = records
        .iter()
        .map(|record| insert_values(entity, record, &mut params))
        .collect();
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote(entity.table),
        insert_columns(entity),
        rows.join(", ")
    );
    if skip_duplicates {
        sql.push_str(" ON CONFLICT DO NOTHING");
    }
    SqlQuery { sql, params }
}

fn key_conditions(
    key: &UniqueWhere,
    entity: &EntityDescriptor,
    params: &mut Vec<ScalarValue>,
) -> OrmResult<String> {
    let (descriptor, values) = key.resolve(entity)?;
    let parts: Vec<String> = descriptor
        .fields
        .iter()
        .zip(values)
        .map(|(field, value)| {
            let p = push_param(params, value);
            format!("{} = {}", quote(field), p)
        })
        .collect();
    Ok(parts.join(" AND "))
}

fn set_clauses(sets: &[(String, ScalarValue)], params: &mut Vec<ScalarValue>) -> String {
    sets.iter()
        .map(|(field, value)| {
            if value.is_null() {
                format!("{} = NULL", quote(field))
            } else {
                let p = push_param(params, value.clone());
                format!("{} = {}", quote(field), p)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn compile_update_by_key(
    entity: &EntityDescriptor,
    key: &UniqueWhere,
    sets: &[(String, ScalarValue)],
) -> OrmResult<SqlQuery> {
    let mut params = Vec::new();
    let set_sql = set_clauses(sets, &mut params);
    let where_sql = key_conditions(key, entity, &mut params)?;
    Ok(SqlQuery {
        sql: format!(
            "UPDATE {} SET {} WHERE {} RETURNING *",
            quote(entity.table),
            set_sql,
            where_sql
        ),
        params,
    })
}

pub fn compile_update_many(
    schema: &Schema,
    entity: &EntityDescriptor,
    filter: Option<&Filter>,
    sets: &[(String, ScalarValue)],
) -> OrmResult<SqlQuery> {
    let mut params = Vec::new();
    let set_sql = set_clauses(sets, &mut params);
    let mut sql = format!("UPDATE {} AS t0 SET {}", quote(entity.table), set_sql);
    if let Some(filter) = filter {
        let mut next_alias = 1u32;
        let clause = compile_filter(schema, entity, filter, "t0", &mut next_alias, &mut params)?;
        sql.push_str(&format!(" WHERE {}", clause));
    }
    Ok(SqlQuery { sql, params })
}

pub fn compile_upsert(
    entity: &EntityDescriptor,
    key: &UniqueWhere,
    create: &Record,
    sets: &[(String, ScalarValue)],
) -> OrmResult<SqlQuery> {
    let (descriptor, _) = key.resolve(entity)?;
    let mut params = Vec::new();
    let values = insert_values(entity, create, &mut params);
    let conflict_target = descriptor
        .fields
        .iter()
        .map(|f| quote(f))
        .collect::<Vec<_>>()
        .join(", ");
    let update_sql = if sets.is_empty() {
        // force RETURNING on the conflict path with a no-op assignment
        let field = descriptor.fields[0];
        format!("{} = EXCLUDED.{}", quote(field), quote(field))
    } else {
        set_clauses(sets, &mut params)
    };
    Ok(SqlQuery {
        sql: format!(
            "INSERT INTO {} ({}) VALUES {} ON CONFLICT ({}) DO UPDATE SET {} RETURNING *",
            quote(entity.table),
            insert_columns(entity),
            values,
            conflict_target,
            update_sql
        ),
        params,
    })
}

pub fn compile_delete_by_key(entity: &EntityDescriptor, key: &UniqueWhere) -> OrmResult<SqlQuery> {
    let mut params = Vec::new();
    let where_sql = key_conditions(key, entity, &mut params)?;
    Ok(SqlQuery {
        sql: format!(
            "DELETE FROM {} WHERE {} RETURNING *",
            quote(entity.table),
            where_sql
        ),
        params,
    })
}

pub fn compile_delete_many(
    schema: &Schema,
    entity: &EntityDescriptor,
    filter: Option<&Filter>,
) -> OrmResult<SqlQuery> {
    let mut params = Vec::new();
    let mut sql = format!("DELETE FROM {} AS t0", quote(entity.table));
    if let Some(filter) = filter {
        let mut next_alias = 1u32;
        let clause = compile_filter(schema, entity, filter, "t0", &mut next_alias, &mut params)?;
        sql.push_str(&format!(" WHERE {}", clause));
    }
    Ok(SqlQuery { sql, params })
}

/// Select the far side of a relation for one record
pub fn compile_related(
    schema: &Schema,
    entity: &EntityDescriptor,
    relation: &RelationDescriptor,
    record: &Record,
    query: crate::backends::RecordQuery<'_>,
) -> OrmResult<SqlQuery> {
    let target = schema.entity(relation.target)?;
    let mut params = Vec::new();
    let mut next_alias = 1u32;

    let mut sql = match relation.kind {
        RelationKind::BelongsTo { foreign_key } => {
            let fk = record.value(foreign_key);
            if fk.is_null() {
                // no relation: a query that returns nothing
                return Ok(SqlQuery {
                    sql: format!(
                        "SELECT t0.* FROM {} AS t0 WHERE FALSE",
                        quote(target.table)
                    ),
                    params,
                });
            }
            let p = push_param(&mut params, fk);
            format!(
                "SELECT t0.* FROM {} AS t0 WHERE t0.{} = {}",
                quote(target.table),
                quote("id"),
                p
            )
        }
        RelationKind::HasMany { target_key } => {
            let p = push_param(&mut params, record.value("id"));
            format!(
                "SELECT t0.* FROM {} AS t0 WHERE t0.{} = {}",
                quote(target.table),
                quote(target_key),
                p
            )
        }
        RelationKind::ManyToMany {
            join_table,
            left_key,
            right_key,
        } => {
            let p = push_param(&mut params, record.value("id"));
            format!(
                "SELECT t0.* FROM {} AS t0 JOIN {} AS j ON j.{} = t0.{} WHERE j.{} = {}",
                quote(target.table),
                quote(join_table),
                quote(right_key),
                quote("id"),
                quote(left_key),
                p
            )
        }
    };

    if let Some(filter) = query.filter {
        let clause = compile_filter(schema, target, filter, "t0", &mut next_alias, &mut params)?;
        sql.push_str(" AND (");
        sql.push_str(&clause);
        sql.push(')');
    }
    sql.push_str(&compile_order("t0", query.order_by));
    sql.push_str(&window_clause(query.take, query.skip));
    Ok(SqlQuery { sql, params })
}

pub fn compile_link(relation: &RelationDescriptor) -> OrmResult<SqlQuery> {
    match relation.kind {
        RelationKind::ManyToMany {
            join_table,
            left_key,
            right_key,
        } => Ok(SqlQuery {
            sql: format!(
                "INSERT INTO {} ({}, {}) VALUES ($1, $2) ON CONFLICT DO NOTHING",
                quote(join_table),
                quote(left_key),
                quote(right_key)
            ),
            params: Vec::new(),
        }),
        _ => Err(OrmError::validation(format!(
            "relation '{}' is not an implicit many-to-many and cannot be linked",
            relation.name
        ))),
    }
}

pub fn compile_unlink(relation: &RelationDescriptor) -> OrmResult<SqlQuery> {
    match relation.kind {
        RelationKind::ManyToMany {
            join_table,
            left_key,
            right_key,
        } => Ok(SqlQuery {
            sql: format!(
                "DELETE FROM {} WHERE {} = $1 AND {} = $2",
                quote(join_table),
                quote(left_key),
                quote(right_key)
            ),
            params: Vec::new(),
        }),
        _ => Err(OrmError::validation(format!(
            "relation '{}' is not an implicit many-to-many and cannot be unlinked",
            relation.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::RecordQuery;
    use crate::schema::{FieldDescriptor, UniqueKeyDescriptor};
    use crate::value::FieldKind;

    static CLUB: EntityDescriptor = EntityDescriptor {
        name: "Club",
        table: "clubs",
        fields: &[
            FieldDescriptor::required("id", FieldKind::String).immutable(),
            FieldDescriptor::required("nom", FieldKind::String),
            FieldDescriptor::optional("ville", FieldKind::String),
            FieldDescriptor::optional("division", FieldKind::Int),
        ],
        unique_keys: &[
            UniqueKeyDescriptor {
                name: "id",
                fields: &["id"],
            },
            UniqueKeyDescriptor {
                name: "nom_ville",
                fields: &["nom", "ville"],
            },
        ],
        relations: &[
            RelationDescriptor {
                name: "equipes",
                target: "Equipe",
                kind: RelationKind::HasMany {
                    target_key: "club_id",
                },
            },
            RelationDescriptor {
                name: "labels",
                target: "Label",
                kind: RelationKind::ManyToMany {
                    join_table: "club_labels",
                    left_key: "club_id",
                    right_key: "label_id",
                },
            },
        ],
    };

    static EQUIPE: EntityDescriptor = EntityDescriptor {
        name: "Equipe",
        table: "equipes",
        fields: &[
            FieldDescriptor::required("id", FieldKind::String).immutable(),
            FieldDescriptor::required("club_id", FieldKind::String),
            FieldDescriptor::required("niveau", FieldKind::Int),
        ],
        unique_keys: &[UniqueKeyDescriptor {
            name: "id",
            fields: &["id"],
        }],
        relations: &[RelationDescriptor {
            name: "club",
            target: "Club",
            kind: RelationKind::BelongsTo {
                foreign_key: "club_id",
            },
        }],
    };

    static LABEL: EntityDescriptor = EntityDescriptor {
        name: "Label",
        table: "labels",
        fields: &[
            FieldDescriptor::required("id", FieldKind::String).immutable(),
            FieldDescriptor::required("nom", FieldKind::String),
        ],
        unique_keys: &[UniqueKeyDescriptor {
            name: "id",
            fields: &["id"],
        }],
        relations: &[],
    };

    fn schema() -> Schema {
        Schema::new(&[&CLUB, &EQUIPE, &LABEL])
    }

    #[test]
    fn select_with_scalar_filters() {
        let filter = Filter::and(vec![
            Filter::contains_insensitive("nom", "vol%ley"),
            Filter::gte("division", 2i64),
        ]);
        let query = RecordQuery {
            filter: Some(&filter),
            order_by: &[OrderBy::asc("nom"), OrderBy::desc("division")],
            take: Some(10),
            skip: 5,
        };
        let compiled = compile_select(&schema(), &CLUB, query).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT t0.* FROM \"clubs\" AS t0 WHERE (t0.\"nom\" ILIKE $1 ESCAPE '\\' AND t0.\"division\" >= $2) \
             ORDER BY t0.\"nom\" ASC NULLS LAST, t0.\"division\" DESC NULLS FIRST LIMIT 10 OFFSET 5"
        );
        assert_eq!(
            compiled.params,
            vec![
                ScalarValue::from("%vol\\%ley%"),
                ScalarValue::Int(2)
            ]
        );
    }

    #[test]
    fn null_tests_and_memberships() {
        let mut params = Vec::new();
        let mut next = 1;
        let clause = compile_filter(
            &schema(),
            &CLUB,
            &Filter::is_null("ville"),
            "t0",
            &mut next,
            &mut params,
        )
        .unwrap();
        assert_eq!(clause, "t0.\"ville\" IS NULL");

        let clause = compile_filter(
            &schema(),
            &CLUB,
            &Filter::is_in("division", Vec::<i64>::new()),
            "t0",
            &mut next,
            &mut params,
        )
        .unwrap();
        assert_eq!(clause, "FALSE");

        let clause = compile_filter(
            &schema(),
            &CLUB,
            &Filter::not_in("division", vec![1i64, 2]),
            "t0",
            &mut next,
            &mut params,
        )
        .unwrap();
        assert_eq!(clause, "t0.\"division\" NOT IN ($1, $2)");
    }

    #[test]
    fn quantifiers_become_exists_subqueries() {
        let mut params = Vec::new();
        let mut next = 1;
        let filter = Filter::some("equipes", Filter::gt("niveau", 3i64));
        let clause =
            compile_filter(&schema(), &CLUB, &filter, "t0", &mut next, &mut params).unwrap();
        assert_eq!(
            clause,
            "EXISTS (SELECT 1 FROM \"equipes\" AS t1 WHERE t1.\"club_id\" = t0.\"id\" AND (t1.\"niveau\" > $1))"
        );

        let filter = Filter::every("labels", Filter::eq("nom", "federal"));
        let clause =
            compile_filter(&schema(), &CLUB, &filter, "t0", &mut next, &mut params).unwrap();
        assert_eq!(
            clause,
            "NOT EXISTS (SELECT 1 FROM \"club_labels\" AS t3 JOIN \"labels\" AS t2 ON t3.\"label_id\" = t2.\"id\" \
             WHERE t3.\"club_id\" = t0.\"id\" AND NOT ((t2.\"nom\" = $2) IS TRUE))"
        );
    }

    #[test]
    fn to_one_filters() {
        let mut params = Vec::new();
        let mut next = 1;
        let filter = Filter::related("club", Filter::eq("nom", "ASUL"));
        let clause =
            compile_filter(&schema(), &EQUIPE, &filter, "t0", &mut next, &mut params).unwrap();
        assert_eq!(
            clause,
            "EXISTS (SELECT 1 FROM \"clubs\" AS t1 WHERE t1.\"id\" = t0.\"club_id\" AND (t1.\"nom\" = $1))"
        );

        let clause = compile_filter(
            &schema(),
            &EQUIPE,
            &Filter::related_is_null("club"),
            "t0",
            &mut next,
            &mut params,
        )
        .unwrap();
        assert_eq!(clause, "t0.\"club_id\" IS NULL");
    }

    #[test]
    fn insert_writes_nulls_as_literals() {
        let record = Record::new()
            .set("id", "c1")
            .set("nom", "ASUL")
            .set("ville", ScalarValue::Null)
            .set("division", 1i64);
        let compiled = compile_insert(&CLUB, &record);
        assert_eq!(
            compiled.sql,
            "INSERT INTO \"clubs\" (\"id\", \"nom\", \"ville\", \"division\") VALUES ($1, $2, NULL, $3) RETURNING *"
        );
        assert_eq!(compiled.params.len(), 3);
    }

    #[test]
    fn upsert_targets_the_resolved_key() {
        let record = Record::new()
            .set("id", "c1")
            .set("nom", "ASUL")
            .set("ville", "Lyon")
            .set("division", 1i64);
        let key = UniqueWhere::field("nom", "ASUL").and_field("ville", "Lyon");
        let sets = vec![("division".to_string(), ScalarValue::Int(2))];
        let compiled = compile_upsert(&CLUB, &key, &record, &sets).unwrap();
        assert!(compiled
            .sql
            .contains("ON CONFLICT (\"nom\", \"ville\") DO UPDATE SET \"division\" = $5"));
        assert!(compiled.sql.ends_with("RETURNING *"));
    }

    #[test]
    fn update_and_delete_by_key() {
        let key = UniqueWhere::id("c1");
        let sets = vec![
            ("ville".to_string(), ScalarValue::Null),
            ("division".to_string(), ScalarValue::Int(3)),
        ];
        let compiled = compile_update_by_key(&CLUB, &key, &sets).unwrap();
        assert_eq!(
            compiled.sql,
            "UPDATE \"clubs\" SET \"ville\" = NULL, \"division\" = $1 WHERE \"id\" = $2 RETURNING *"
        );

        let compiled = compile_delete_by_key(&CLUB, &key).unwrap();
        assert_eq!(
            compiled.sql,
            "DELETE FROM \"clubs\" WHERE \"id\" = $1 RETURNING *"
        );
    }

    #[test]
    fn related_queries() {
        let club = Record::new().set("id", "c1").set("nom", "ASUL");
        let compiled = compile_related(
            &schema(),
            &CLUB,
            CLUB.relation("labels").unwrap(),
            &club,
            RecordQuery::default(),
        )
        .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT t0.* FROM \"labels\" AS t0 JOIN \"club_labels\" AS j ON j.\"label_id\" = t0.\"id\" WHERE j.\"club_id\" = $1"
        );

        // null foreign key yields a never-matching query
        let equipe = Record::new().set("id", "e1").set("club_id", ScalarValue::Null);
        let compiled = compile_related(
            &schema(),
            &EQUIPE,
            EQUIPE.relation("club").unwrap(),
            &equipe,
            RecordQuery::default(),
        )
        .unwrap();
        assert!(compiled.sql.ends_with("WHERE FALSE"));
        assert!(compiled.params.is_empty());
    }
}
