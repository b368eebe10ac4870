//! Schema descriptors - the metadata surface driving the generic engine
//!
//! Every entity is described by a static [`EntityDescriptor`]: its fields,
//! unique keys and relations. The descriptor is the closed universe the
//! filter validator, the dispatcher and the storage backends all consult,
//! so a filter or sort can never reference a column that does not exist.

use std::collections::HashMap;

use crate::error::{OrmError, OrmResult};
use crate::value::{FieldKind, Record};

/// Server-assigned default applied when a create omits the field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    None,
    /// UUID v4 rendered as an opaque string
    Uuid,
    /// Current UTC timestamp
    Now,
    Bool(bool),
    Text(&'static str),
}

/// One column of an entity
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
    pub default: FieldDefault,
    /// Reject writes after creation (id, created_at)
    pub immutable: bool,
    /// Refresh to now() on every mutating write (User.updated_at)
    pub touch_on_update: bool,
}

impl FieldDescriptor {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            default: FieldDefault::None,
            immutable: false,
            touch_on_update: false,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        let mut f = Self::required(name, kind);
        f.nullable = true;
        f
    }

    pub const fn with_default(mut self, default: FieldDefault) -> Self {
        self.default = default;
        self
    }

    pub const fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    pub const fn touched_on_update(mut self) -> Self {
        self.touch_on_update = true;
        self
    }
}

/// A declared unique constraint, single-field or compound
#[derive(Debug, Clone, Copy)]
pub struct UniqueKeyDescriptor {
    pub name: &'static str,
    pub fields: &'static [&'static str],
}

/// How a relation reaches the target entity
#[derive(Debug, Clone, Copy)]
pub enum RelationKind {
    /// Foreign key on this entity pointing at the target's id
    BelongsTo { foreign_key: &'static str },
    /// Foreign key on the target entity pointing back at this id
    HasMany { target_key: &'static str },
    /// Implicit join table; `left_key` holds this entity's id,
    /// `right_key` the target's
    ManyToMany {
        join_table: &'static str,
        left_key: &'static str,
        right_key: &'static str,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct RelationDescriptor {
    pub name: &'static str,
    /// Entity name of the far side, resolved through the [`Schema`]
    pub target: &'static str,
    pub kind: RelationKind,
}

impl RelationDescriptor {
    pub fn is_to_many(&self) -> bool {
        !matches!(self.kind, RelationKind::BelongsTo { .. })
    }
}

/// Static description of one entity
#[derive(Debug)]
pub struct EntityDescriptor {
    pub name: &'static str,
    pub table: &'static str,
    pub fields: &'static [FieldDescriptor],
    pub unique_keys: &'static [UniqueKeyDescriptor],
    pub relations: &'static [RelationDescriptor],
}

impl EntityDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }

    /// Fields a `_avg`/`_sum` accumulator may reference
    pub fn numeric_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields
            .iter()
            .filter(|f| f.kind == FieldKind::Int)
            .map(|f| f.name)
    }

    /// Composite value of one unique key for a record; None when any
    /// component is null (null components never participate in uniqueness,
    /// as in SQL)
    pub fn key_value(&self, key: &UniqueKeyDescriptor, record: &Record) -> Option<Vec<crate::value::ScalarValue>> {
        let mut out = Vec::with_capacity(key.fields.len());
        for field in key.fields {
            let v = record.value(field);
            if v.is_null() {
                return None;
            }
            out.push(v);
        }
        Some(out)
    }
}

/// Registry of all entity descriptors a client serves
#[derive(Debug, Clone)]
pub struct Schema {
    entities: HashMap<&'static str, &'static EntityDescriptor>,
}

impl Schema {
    pub fn new(entities: &[&'static EntityDescriptor]) -> Self {
        Self {
            entities: entities.iter().map(|e| (e.name, *e)).collect(),
        }
    }

    pub fn entity(&self, name: &str) -> OrmResult<&'static EntityDescriptor> {
        self.entities
            .get(name)
            .copied()
            .ok_or_else(|| OrmError::validation(format!("unknown entity '{}'", name)))
    }

    pub fn entities(&self) -> impl Iterator<Item = &'static EntityDescriptor> + '_ {
        self.entities.values().copied()
    }
}

/// A typed entity backed by a descriptor, convertible to and from the
/// engine's record representation
pub trait Entity: Clone + Send + Sync + 'static {
    fn descriptor() -> &'static EntityDescriptor;

    fn from_record(record: &Record) -> OrmResult<Self>
    where
        Self: Sized;

    fn to_record(&self) -> Record;
}

#[cfg(test)]
mod tests {
    use super::*;

    static PLAYER: EntityDescriptor = EntityDescriptor {
        name: "Player",
        table: "players",
        fields: &[
            FieldDescriptor::required("id", FieldKind::String)
                .with_default(FieldDefault::Uuid)
                .immutable(),
            FieldDescriptor::required("nom", FieldKind::String),
            FieldDescriptor::optional("numero", FieldKind::Int),
        ],
        unique_keys: &[UniqueKeyDescriptor {
            name: "id",
            fields: &["id"],
        }],
        relations: &[],
    };

    #[test]
    fn field_lookup() {
        assert!(PLAYER.field("nom").is_some());
        assert!(PLAYER.field("prenom").is_none());
        assert_eq!(PLAYER.numeric_fields().collect::<Vec<_>>(), vec!["numero"]);
    }

    #[test]
    fn key_value_skips_null_components() {
        let key = &PLAYER.unique_keys[0];
        let rec = Record::new().set("id", "abc");
        assert!(PLAYER.key_value(key, &rec).is_some());

        let rec = Record::new().set("nom", "x");
        assert_eq!(PLAYER.key_value(key, &rec), None);
    }

    #[test]
    fn schema_registry_lookup() {
        let schema = Schema::new(&[&PLAYER]);
        assert!(schema.entity("Player").is_ok());
        assert!(matches!(
            schema.entity("Coach"),
            Err(OrmError::Validation(_))
        ));
    }
}
