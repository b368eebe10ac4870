//! Runtime result projection
//!
//! Callers can narrow the returned fields to an allowlist or eagerly fetch
//! related records; the response shape reflects exactly what was asked.
//! Supplying both a select list and an include list on one operation is a
//! validation error.

use std::collections::BTreeMap;

use crate::error::{OrmError, OrmResult};
use crate::schema::EntityDescriptor;
use crate::value::Record;

/// Field allowlist and/or relation inclusion for a read operation
#[derive(Debug, Clone, Default)]
pub struct Projection {
    select: Option<Vec<String>>,
    include: Vec<String>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return only the named scalar fields
    pub fn select(fields: Vec<&str>) -> Self {
        Self {
            select: Some(fields.into_iter().map(String::from).collect()),
            include: Vec::new(),
        }
    }

    /// Return all scalar fields plus the named relations
    pub fn include(relations: Vec<&str>) -> Self {
        Self {
            select: None,
            include: relations.into_iter().map(String::from).collect(),
        }
    }

    pub fn with_select(mut self, field: &str) -> Self {
        self.select.get_or_insert_with(Vec::new).push(field.to_string());
        self
    }

    pub fn with_include(mut self, relation: &str) -> Self {
        self.include.push(relation.to_string());
        self
    }

    pub fn selected_fields(&self) -> Option<&[String]> {
        self.select.as_deref()
    }

    pub fn included_relations(&self) -> &[String] {
        &self.include
    }

    pub fn validate(&self, entity: &EntityDescriptor) -> OrmResult<()> {
        if self.select.is_some() && !self.include.is_empty() {
            return Err(OrmError::validation(
                "select and include cannot be combined on one operation",
            ));
        }
        if let Some(fields) = &self.select {
            if fields.is_empty() {
                return Err(OrmError::validation("select list cannot be empty"));
            }
            for field in fields {
                if entity.field(field).is_none() {
                    return Err(OrmError::validation(format!(
                        "unknown field '{}' on {} in select",
                        field, entity.name
                    )));
                }
            }
        }
        for relation in &self.include {
            if entity.relation(relation).is_none() {
                return Err(OrmError::validation(format!(
                    "unknown relation '{}' on {} in include",
                    relation, entity.name
                )));
            }
        }
        Ok(())
    }

    /// Narrow one record to the select list, if any
    pub fn project(&self, mut record: Record) -> Record {
        if let Some(fields) = &self.select {
            record.retain_fields(fields);
        }
        record
    }
}

/// One result row of a projected read: the (possibly narrowed) record plus
/// any included relations. To-one inclusions carry zero or one record.
#[derive(Debug, Clone)]
pub struct ProjectedRow {
    pub fields: Record,
    pub relations: BTreeMap<String, Vec<Record>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDescriptor, RelationDescriptor, RelationKind, UniqueKeyDescriptor};
    use crate::value::FieldKind;

    static SAISON: EntityDescriptor = EntityDescriptor {
        name: "Saison",
        table: "saisons",
        fields: &[
            FieldDescriptor::required("id", FieldKind::String),
            FieldDescriptor::required("libelle", FieldKind::String),
            FieldDescriptor::optional("debut", FieldKind::DateTime),
        ],
        unique_keys: &[UniqueKeyDescriptor {
            name: "id",
            fields: &["id"],
        }],
        relations: &[RelationDescriptor {
            name: "journees",
            target: "Journee",
            kind: RelationKind::HasMany {
                target_key: "saison_id",
            },
        }],
    };

    #[test]
    fn select_and_include_are_mutually_exclusive() {
        let projection = Projection::select(vec!["libelle"]).with_include("journees");
        assert!(matches!(
            projection.validate(&SAISON),
            Err(OrmError::Validation(_))
        ));
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!(Projection::select(vec!["fin"]).validate(&SAISON).is_err());
        assert!(Projection::include(vec!["matchs"]).validate(&SAISON).is_err());
        assert!(Projection::select(vec![]).validate(&SAISON).is_err());
        assert!(Projection::select(vec!["libelle"]).validate(&SAISON).is_ok());
        assert!(Projection::include(vec!["journees"]).validate(&SAISON).is_ok());
    }

    #[test]
    fn project_narrows_fields() {
        let record = Record::new()
            .set("id", "s1")
            .set("libelle", "2024-2025")
            .set("debut", crate::value::ScalarValue::Null);
        let projected = Projection::select(vec!["libelle"]).project(record);
        assert_eq!(projected.len(), 1);
        assert_eq!(projected.req_string("libelle").unwrap(), "2024-2025");
    }
}
