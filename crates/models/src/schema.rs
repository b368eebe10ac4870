//! Static schema of the training planner
//!
//! One descriptor per entity: fields, server defaults, unique keys and
//! relations. The field constant modules are the closed set of column
//! names accepted in distinct / groupBy / orderBy inputs.

use courtside_orm::{
    EntityDescriptor, FieldDefault, FieldDescriptor, FieldKind, RelationDescriptor, RelationKind,
    Schema, UniqueKeyDescriptor,
};

const fn id_field() -> FieldDescriptor {
    FieldDescriptor::required("id", FieldKind::String)
        .with_default(FieldDefault::Uuid)
        .immutable()
}

const fn created_at_field() -> FieldDescriptor {
    FieldDescriptor::required("created_at", FieldKind::DateTime)
        .with_default(FieldDefault::Now)
        .immutable()
}

const ID_KEY: UniqueKeyDescriptor = UniqueKeyDescriptor {
    name: "id",
    fields: &["id"],
};

pub static EXERCICE: EntityDescriptor = EntityDescriptor {
    name: "Exercice",
    table: "exercices",
    fields: &[
        id_field(),
        FieldDescriptor::required("nom", FieldKind::String),
        FieldDescriptor::required("description", FieldKind::String),
        FieldDescriptor::optional("image_url", FieldKind::String),
        FieldDescriptor::optional("schema_url", FieldKind::String),
        FieldDescriptor::optional("materiel", FieldKind::String),
        FieldDescriptor::optional("notes", FieldKind::String),
        FieldDescriptor::optional("variables_text", FieldKind::String),
        FieldDescriptor::optional("variables_plus", FieldKind::String),
        FieldDescriptor::optional("variables_minus", FieldKind::String),
        created_at_field(),
    ],
    unique_keys: &[ID_KEY],
    relations: &[
        RelationDescriptor {
            name: "tags",
            target: "Tag",
            kind: RelationKind::ManyToMany {
                join_table: "exercice_tags",
                left_key: "exercice_id",
                right_key: "tag_id",
            },
        },
        RelationDescriptor {
            name: "entrainement_links",
            target: "EntrainementExercice",
            kind: RelationKind::HasMany {
                target_key: "exercice_id",
            },
        },
    ],
};

pub static TAG: EntityDescriptor = EntityDescriptor {
    name: "Tag",
    table: "tags",
    fields: &[
        id_field(),
        FieldDescriptor::required("label", FieldKind::String),
        FieldDescriptor::required("category", FieldKind::String),
        FieldDescriptor::optional("color", FieldKind::String),
        FieldDescriptor::optional("level", FieldKind::Int),
        created_at_field(),
    ],
    unique_keys: &[
        ID_KEY,
        UniqueKeyDescriptor {
            name: "label_category",
            fields: &["label", "category"],
        },
    ],
    relations: &[
        RelationDescriptor {
            name: "exercices",
            target: "Exercice",
            kind: RelationKind::ManyToMany {
                join_table: "exercice_tags",
                left_key: "tag_id",
                right_key: "exercice_id",
            },
        },
        RelationDescriptor {
            name: "entrainements",
            target: "Entrainement",
            kind: RelationKind::ManyToMany {
                join_table: "entrainement_tags",
                left_key: "tag_id",
                right_key: "entrainement_id",
            },
        },
        RelationDescriptor {
            name: "situations_match",
            target: "SituationMatch",
            kind: RelationKind::ManyToMany {
                join_table: "situation_match_tags",
                left_key: "tag_id",
                right_key: "situation_match_id",
            },
        },
    ],
};

pub static ENTRAINEMENT: EntityDescriptor = EntityDescriptor {
    name: "Entrainement",
    table: "entrainements",
    fields: &[
        id_field(),
        FieldDescriptor::required("titre", FieldKind::String),
        FieldDescriptor::optional("date", FieldKind::DateTime),
        FieldDescriptor::optional("image_url", FieldKind::String),
        FieldDescriptor::optional("echauffement_id", FieldKind::String),
        FieldDescriptor::optional("situation_match_id", FieldKind::String),
        created_at_field(),
    ],
    unique_keys: &[ID_KEY],
    relations: &[
        RelationDescriptor {
            name: "exercice_links",
            target: "EntrainementExercice",
            kind: RelationKind::HasMany {
                target_key: "entrainement_id",
            },
        },
        RelationDescriptor {
            name: "tags",
            target: "Tag",
            kind: RelationKind::ManyToMany {
                join_table: "entrainement_tags",
                left_key: "entrainement_id",
                right_key: "tag_id",
            },
        },
        RelationDescriptor {
            name: "echauffement",
            target: "Echauffement",
            kind: RelationKind::BelongsTo {
                foreign_key: "echauffement_id",
            },
        },
        RelationDescriptor {
            name: "situation_match",
            target: "SituationMatch",
            kind: RelationKind::BelongsTo {
                foreign_key: "situation_match_id",
            },
        },
    ],
};

pub static ENTRAINEMENT_EXERCICE: EntityDescriptor = EntityDescriptor {
    name: "EntrainementExercice",
    table: "entrainement_exercices",
    fields: &[
        id_field(),
        FieldDescriptor::required("entrainement_id", FieldKind::String),
        FieldDescriptor::required("exercice_id", FieldKind::String),
        FieldDescriptor::required("ordre", FieldKind::Int),
        FieldDescriptor::optional("duree", FieldKind::Int),
        FieldDescriptor::optional("notes", FieldKind::String),
        created_at_field(),
    ],
    unique_keys: &[
        ID_KEY,
        // an exercise appears at most once per training session
        UniqueKeyDescriptor {
            name: "entrainement_exercice",
            fields: &["entrainement_id", "exercice_id"],
        },
    ],
    relations: &[
        RelationDescriptor {
            name: "entrainement",
            target: "Entrainement",
            kind: RelationKind::BelongsTo {
                foreign_key: "entrainement_id",
            },
        },
        RelationDescriptor {
            name: "exercice",
            target: "Exercice",
            kind: RelationKind::BelongsTo {
                foreign_key: "exercice_id",
            },
        },
    ],
};

pub static ECHAUFFEMENT: EntityDescriptor = EntityDescriptor {
    name: "Echauffement",
    table: "echauffements",
    fields: &[
        id_field(),
        FieldDescriptor::required("nom", FieldKind::String),
        FieldDescriptor::optional("description", FieldKind::String),
        FieldDescriptor::optional("image_url", FieldKind::String),
        created_at_field(),
    ],
    unique_keys: &[ID_KEY],
    relations: &[
        RelationDescriptor {
            name: "blocs",
            target: "BlocEchauffement",
            kind: RelationKind::HasMany {
                target_key: "echauffement_id",
            },
        },
        RelationDescriptor {
            name: "entrainements",
            target: "Entrainement",
            kind: RelationKind::HasMany {
                target_key: "echauffement_id",
            },
        },
    ],
};

pub static BLOC_ECHAUFFEMENT: EntityDescriptor = EntityDescriptor {
    name: "BlocEchauffement",
    table: "bloc_echauffements",
    fields: &[
        id_field(),
        FieldDescriptor::required("echauffement_id", FieldKind::String),
        FieldDescriptor::required("ordre", FieldKind::Int),
        FieldDescriptor::required("titre", FieldKind::String),
        FieldDescriptor::optional("repetitions", FieldKind::String),
        FieldDescriptor::optional("temps", FieldKind::String),
        FieldDescriptor::optional("informations", FieldKind::String),
        FieldDescriptor::optional("fonctionnement", FieldKind::String),
        FieldDescriptor::optional("notes", FieldKind::String),
        created_at_field(),
    ],
    unique_keys: &[
        ID_KEY,
        // no two blocs under the same warm-up share an order index
        UniqueKeyDescriptor {
            name: "echauffement_ordre",
            fields: &["echauffement_id", "ordre"],
        },
    ],
    relations: &[RelationDescriptor {
        name: "echauffement",
        target: "Echauffement",
        kind: RelationKind::BelongsTo {
            foreign_key: "echauffement_id",
        },
    }],
};

pub static SITUATION_MATCH: EntityDescriptor = EntityDescriptor {
    name: "SituationMatch",
    table: "situations_match",
    fields: &[
        id_field(),
        FieldDescriptor::required("type", FieldKind::String),
        FieldDescriptor::optional("nom", FieldKind::String),
        FieldDescriptor::optional("description", FieldKind::String),
        FieldDescriptor::optional("temps", FieldKind::String),
        FieldDescriptor::optional("image_url", FieldKind::String),
        created_at_field(),
    ],
    unique_keys: &[ID_KEY],
    relations: &[
        RelationDescriptor {
            name: "entrainements",
            target: "Entrainement",
            kind: RelationKind::HasMany {
                target_key: "situation_match_id",
            },
        },
        RelationDescriptor {
            name: "tags",
            target: "Tag",
            kind: RelationKind::ManyToMany {
                join_table: "situation_match_tags",
                left_key: "situation_match_id",
                right_key: "tag_id",
            },
        },
    ],
};

pub static USER: EntityDescriptor = EntityDescriptor {
    name: "User",
    table: "users",
    fields: &[
        id_field(),
        FieldDescriptor::required("email", FieldKind::String),
        FieldDescriptor::optional("password", FieldKind::String),
        FieldDescriptor::required("nom", FieldKind::String),
        FieldDescriptor::optional("prenom", FieldKind::String),
        FieldDescriptor::required("role", FieldKind::String)
            .with_default(FieldDefault::Text("user")),
        FieldDescriptor::optional("icon_url", FieldKind::String),
        FieldDescriptor::optional("security_question", FieldKind::String),
        FieldDescriptor::optional("security_answer", FieldKind::String),
        FieldDescriptor::required("is_active", FieldKind::Bool)
            .with_default(FieldDefault::Bool(true)),
        created_at_field(),
        FieldDescriptor::required("updated_at", FieldKind::DateTime)
            .with_default(FieldDefault::Now)
            .touched_on_update(),
    ],
    unique_keys: &[
        ID_KEY,
        UniqueKeyDescriptor {
            name: "email",
            fields: &["email"],
        },
    ],
    relations: &[],
};

/// Registry of every entity this client serves
pub fn schema() -> Schema {
    Schema::new(&[
        &EXERCICE,
        &TAG,
        &ENTRAINEMENT,
        &ENTRAINEMENT_EXERCICE,
        &ECHAUFFEMENT,
        &BLOC_ECHAUFFEMENT,
        &SITUATION_MATCH,
        &USER,
    ])
}

/// Column-name constants per entity, the closed universe for
/// distinct / groupBy / orderBy inputs
pub mod fields {
    pub mod exercice {
        pub const ID: &str = "id";
        pub const NOM: &str = "nom";
        pub const DESCRIPTION: &str = "description";
        pub const IMAGE_URL: &str = "image_url";
        pub const SCHEMA_URL: &str = "schema_url";
        pub const MATERIEL: &str = "materiel";
        pub const NOTES: &str = "notes";
        pub const VARIABLES_TEXT: &str = "variables_text";
        pub const VARIABLES_PLUS: &str = "variables_plus";
        pub const VARIABLES_MINUS: &str = "variables_minus";
        pub const CREATED_AT: &str = "created_at";
    }

    pub mod tag {
        pub const ID: &str = "id";
        pub const LABEL: &str = "label";
        pub const CATEGORY: &str = "category";
        pub const COLOR: &str = "color";
        pub const LEVEL: &str = "level";
        pub const CREATED_AT: &str = "created_at";
    }

    pub mod entrainement {
        pub const ID: &str = "id";
        pub const TITRE: &str = "titre";
        pub const DATE: &str = "date";
        pub const IMAGE_URL: &str = "image_url";
        pub const ECHAUFFEMENT_ID: &str = "echauffement_id";
        pub const SITUATION_MATCH_ID: &str = "situation_match_id";
        pub const CREATED_AT: &str = "created_at";
    }

    pub mod entrainement_exercice {
        pub const ID: &str = "id";
        pub const ENTRAINEMENT_ID: &str = "entrainement_id";
        pub const EXERCICE_ID: &str = "exercice_id";
        pub const ORDRE: &str = "ordre";
        pub const DUREE: &str = "duree";
        pub const NOTES: &str = "notes";
        pub const CREATED_AT: &str = "created_at";
    }

    pub mod echauffement {
        pub const ID: &str = "id";
        pub const NOM: &str = "nom";
        pub const DESCRIPTION: &str = "description";
        pub const IMAGE_URL: &str = "image_url";
        pub const CREATED_AT: &str = "created_at";
    }

    pub mod bloc_echauffement {
        pub const ID: &str = "id";
        pub const ECHAUFFEMENT_ID: &str = "echauffement_id";
        pub const ORDRE: &str = "ordre";
        pub const TITRE: &str = "titre";
        pub const REPETITIONS: &str = "repetitions";
        pub const TEMPS: &str = "temps";
        pub const INFORMATIONS: &str = "informations";
        pub const FONCTIONNEMENT: &str = "fonctionnement";
        pub const NOTES: &str = "notes";
        pub const CREATED_AT: &str = "created_at";
    }

    pub mod situation_match {
        pub const ID: &str = "id";
        pub const TYPE: &str = "type";
        pub const NOM: &str = "nom";
        pub const DESCRIPTION: &str = "description";
        pub const TEMPS: &str = "temps";
        pub const IMAGE_URL: &str = "image_url";
        pub const CREATED_AT: &str = "created_at";
    }

    pub mod user {
        pub const ID: &str = "id";
        pub const EMAIL: &str = "email";
        pub const PASSWORD: &str = "password";
        pub const NOM: &str = "nom";
        pub const PRENOM: &str = "prenom";
        pub const ROLE: &str = "role";
        pub const ICON_URL: &str = "icon_url";
        pub const SECURITY_QUESTION: &str = "security_question";
        pub const SECURITY_ANSWER: &str = "security_answer";
        pub const IS_ACTIVE: &str = "is_active";
        pub const CREATED_AT: &str = "created_at";
        pub const UPDATED_AT: &str = "updated_at";
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_serves_every_entity() {
        let schema = schema();
        for name in [
            "Exercice",
            "Tag",
            "Entrainement",
            "EntrainementExercice",
            "Echauffement",
            "BlocEchauffement",
            "SituationMatch",
            "User",
        ] {
            assert!(schema.entity(name).is_ok(), "missing entity {}", name);
        }
    }

    #[test]
    fn compound_keys_are_declared() {
        assert!(TAG.unique_keys.iter().any(|k| k.name == "label_category"));
        assert!(ENTRAINEMENT_EXERCICE
            .unique_keys
            .iter()
            .any(|k| k.fields == &["entrainement_id", "exercice_id"]));
        assert!(BLOC_ECHAUFFEMENT
            .unique_keys
            .iter()
            .any(|k| k.fields == &["echauffement_id", "ordre"]));
        assert!(USER.unique_keys.iter().any(|k| k.name == "email"));
    }

    #[test]
    fn relation_targets_resolve() {
        let schema = schema();
        for entity in schema.entities() {
            for relation in entity.relations {
                assert!(
                    schema.entity(relation.target).is_ok(),
                    "{}.{} targets unknown entity {}",
                    entity.name,
                    relation.name,
                    relation.target
                );
            }
        }
    }

    #[test]
    fn nullable_foreign_keys_on_entrainement() {
        let echauffement_id = ENTRAINEMENT.field("echauffement_id").unwrap();
        assert!(echauffement_id.nullable);
        let situation_match_id = ENTRAINEMENT.field("situation_match_id").unwrap();
        assert!(situation_match_id.nullable);
    }
}
