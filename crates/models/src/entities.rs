//! Domain entities of the training planner
//!
//! Server-assigned fields (id, created_at, updated_at and defaulted
//! columns) are Option-typed: None on a value headed for create, Some on
//! anything read back from storage.

use chrono::{DateTime, Utc};
use courtside_orm::{Entity, EntityDescriptor, OrmResult, Record, ScalarValue};
use serde::{Deserialize, Serialize};

use crate::schema;

/// A drill in the exercise library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercice {
    pub id: Option<String>,
    pub nom: String,
    pub description: String,
    pub image_url: Option<String>,
    pub schema_url: Option<String>,
    pub materiel: Option<String>,
    pub notes: Option<String>,
    pub variables_text: Option<String>,
    pub variables_plus: Option<String>,
    pub variables_minus: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Exercice {
    pub fn new(nom: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: None,
            nom: nom.into(),
            description: description.into(),
            image_url: None,
            schema_url: None,
            materiel: None,
            notes: None,
            variables_text: None,
            variables_plus: None,
            variables_minus: None,
            created_at: None,
        }
    }
}

impl Entity for Exercice {
    fn descriptor() -> &'static EntityDescriptor {
        &schema::EXERCICE
    }

    fn from_record(record: &Record) -> OrmResult<Self> {
        Ok(Self {
            id: Some(record.req_string("id")?),
            nom: record.req_string("nom")?,
            description: record.req_string("description")?,
            image_url: record.opt_string("image_url")?,
            schema_url: record.opt_string("schema_url")?,
            materiel: record.opt_string("materiel")?,
            notes: record.opt_string("notes")?,
            variables_text: record.opt_string("variables_text")?,
            variables_plus: record.opt_string("variables_plus")?,
            variables_minus: record.opt_string("variables_minus")?,
            created_at: Some(record.req_datetime("created_at")?),
        })
    }

    fn to_record(&self) -> Record {
        Record::new()
            .set("id", ScalarValue::from(self.id.clone()))
            .set("nom", self.nom.as_str())
            .set("description", self.description.as_str())
            .set("image_url", ScalarValue::from(self.image_url.clone()))
            .set("schema_url", ScalarValue::from(self.schema_url.clone()))
            .set("materiel", ScalarValue::from(self.materiel.clone()))
            .set("notes", ScalarValue::from(self.notes.clone()))
            .set("variables_text", ScalarValue::from(self.variables_text.clone()))
            .set("variables_plus", ScalarValue::from(self.variables_plus.clone()))
            .set("variables_minus", ScalarValue::from(self.variables_minus.clone()))
            .set("created_at", ScalarValue::from(self.created_at))
    }
}

/// Classification label; (label, category) is unique
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Option<String>,
    pub label: String,
    pub category: String,
    pub color: Option<String>,
    pub level: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Tag {
    pub fn new(label: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: None,
            label: label.into(),
            category: category.into(),
            color: None,
            level: None,
            created_at: None,
        }
    }
}

impl Entity for Tag {
    fn descriptor() -> &'static EntityDescriptor {
        &schema::TAG
    }

    fn from_record(record: &Record) -> OrmResult<Self> {
        Ok(Self {
            id: Some(record.req_string("id")?),
            label: record.req_string("label")?,
            category: record.req_string("category")?,
            color: record.opt_string("color")?,
            level: record.opt_i64("level")?,
            created_at: Some(record.req_datetime("created_at")?),
        })
    }

    fn to_record(&self) -> Record {
        Record::new()
            .set("id", ScalarValue::from(self.id.clone()))
            .set("label", self.label.as_str())
            .set("category", self.category.as_str())
            .set("color", ScalarValue::from(self.color.clone()))
            .set("level", ScalarValue::from(self.level))
            .set("created_at", ScalarValue::from(self.created_at))
    }
}

/// A training session; warm-up and match situation are optional
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entrainement {
    pub id: Option<String>,
    pub titre: String,
    pub date: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
    pub echauffement_id: Option<String>,
    pub situation_match_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Entrainement {
    pub fn new(titre: impl Into<String>) -> Self {
        Self {
            id: None,
            titre: titre.into(),
            date: None,
            image_url: None,
            echauffement_id: None,
            situation_match_id: None,
            created_at: None,
        }
    }
}

impl Entity for Entrainement {
    fn descriptor() -> &'static EntityDescriptor {
        &schema::ENTRAINEMENT
    }

    fn from_record(record: &Record) -> OrmResult<Self> {
        Ok(Self {
            id: Some(record.req_string("id")?),
            titre: record.req_string("titre")?,
            date: record.opt_datetime("date")?,
            image_url: record.opt_string("image_url")?,
            echauffement_id: record.opt_string("echauffement_id")?,
            situation_match_id: record.opt_string("situation_match_id")?,
            created_at: Some(record.req_datetime("created_at")?),
        })
    }

    fn to_record(&self) -> Record {
        Record::new()
            .set("id", ScalarValue::from(self.id.clone()))
            .set("titre", self.titre.as_str())
            .set("date", ScalarValue::from(self.date))
            .set("image_url", ScalarValue::from(self.image_url.clone()))
            .set("echauffement_id", ScalarValue::from(self.echauffement_id.clone()))
            .set(
                "situation_match_id",
                ScalarValue::from(self.situation_match_id.clone()),
            )
            .set("created_at", ScalarValue::from(self.created_at))
    }
}

/// Ordered, attributed link between a training session and an exercise;
/// (entrainement_id, exercice_id) is unique
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrainementExercice {
    pub id: Option<String>,
    pub entrainement_id: String,
    pub exercice_id: String,
    pub ordre: i64,
    pub duree: Option<i64>,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl EntrainementExercice {
    pub fn new(
        entrainement_id: impl Into<String>,
        exercice_id: impl Into<String>,
        ordre: i64,
    ) -> Self {
        Self {
            id: None,
            entrainement_id: entrainement_id.into(),
            exercice_id: exercice_id.into(),
            ordre,
            duree: None,
            notes: None,
            created_at: None,
        }
    }
}

impl Entity for EntrainementExercice {
    fn descriptor() -> &'static EntityDescriptor {
        &schema::ENTRAINEMENT_EXERCICE
    }

    fn from_record(record: &Record) -> OrmResult<Self> {
        Ok(Self {
            id: Some(record.req_string("id")?),
            entrainement_id: record.req_string("entrainement_id")?,
            exercice_id: record.req_string("exercice_id")?,
            ordre: record.req_i64("ordre")?,
            duree: record.opt_i64("duree")?,
            notes: record.opt_string("notes")?,
            created_at: Some(record.req_datetime("created_at")?),
        })
    }

    fn to_record(&self) -> Record {
        Record::new()
            .set("id", ScalarValue::from(self.id.clone()))
            .set("entrainement_id", self.entrainement_id.as_str())
            .set("exercice_id", self.exercice_id.as_str())
            .set("ordre", self.ordre)
            .set("duree", ScalarValue::from(self.duree))
            .set("notes", ScalarValue::from(self.notes.clone()))
            .set("created_at", ScalarValue::from(self.created_at))
    }
}

/// Warm-up routine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Echauffement {
    pub id: Option<String>,
    pub nom: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Echauffement {
    pub fn new(nom: impl Into<String>) -> Self {
        Self {
            id: None,
            nom: nom.into(),
            description: None,
            image_url: None,
            created_at: None,
        }
    }
}

impl Entity for Echauffement {
    fn descriptor() -> &'static EntityDescriptor {
        &schema::ECHAUFFEMENT
    }

    fn from_record(record: &Record) -> OrmResult<Self> {
        Ok(Self {
            id: Some(record.req_string("id")?),
            nom: record.req_string("nom")?,
            description: record.opt_string("description")?,
            image_url: record.opt_string("image_url")?,
            created_at: Some(record.req_datetime("created_at")?),
        })
    }

    fn to_record(&self) -> Record {
        Record::new()
            .set("id", ScalarValue::from(self.id.clone()))
            .set("nom", self.nom.as_str())
            .set("description", ScalarValue::from(self.description.clone()))
            .set("image_url", ScalarValue::from(self.image_url.clone()))
            .set("created_at", ScalarValue::from(self.created_at))
    }
}

/// One block of a warm-up; (echauffement_id, ordre) is unique
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlocEchauffement {
    pub id: Option<String>,
    pub echauffement_id: String,
    pub ordre: i64,
    pub titre: String,
    pub repetitions: Option<String>,
    pub temps: Option<String>,
    pub informations: Option<String>,
    pub fonctionnement: Option<String>,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl BlocEchauffement {
    pub fn new(
        echauffement_id: impl Into<String>,
        ordre: i64,
        titre: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            echauffement_id: echauffement_id.into(),
            ordre,
            titre: titre.into(),
            repetitions: None,
            temps: None,
            informations: None,
            fonctionnement: None,
            notes: None,
            created_at: None,
        }
    }
}

impl Entity for BlocEchauffement {
    fn descriptor() -> &'static EntityDescriptor {
        &schema::BLOC_ECHAUFFEMENT
    }

    fn from_record(record: &Record) -> OrmResult<Self> {
        Ok(Self {
            id: Some(record.req_string("id")?),
            echauffement_id: record.req_string("echauffement_id")?,
            ordre: record.req_i64("ordre")?,
            titre: record.req_string("titre")?,
            repetitions: record.opt_string("repetitions")?,
            temps: record.opt_string("temps")?,
            informations: record.opt_string("informations")?,
            fonctionnement: record.opt_string("fonctionnement")?,
            notes: record.opt_string("notes")?,
            created_at: Some(record.req_datetime("created_at")?),
        })
    }

    fn to_record(&self) -> Record {
        Record::new()
            .set("id", ScalarValue::from(self.id.clone()))
            .set("echauffement_id", self.echauffement_id.as_str())
            .set("ordre", self.ordre)
            .set("titre", self.titre.as_str())
            .set("repetitions", ScalarValue::from(self.repetitions.clone()))
            .set("temps", ScalarValue::from(self.temps.clone()))
            .set("informations", ScalarValue::from(self.informations.clone()))
            .set("fonctionnement", ScalarValue::from(self.fonctionnement.clone()))
            .set("notes", ScalarValue::from(self.notes.clone()))
            .set("created_at", ScalarValue::from(self.created_at))
    }
}

/// Match-play situation attachable to training sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SituationMatch {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub nom: Option<String>,
    pub description: Option<String>,
    pub temps: Option<String>,
    pub image_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl SituationMatch {
    pub fn new(type_: impl Into<String>) -> Self {
        Self {
            id: None,
            type_: type_.into(),
            nom: None,
            description: None,
            temps: None,
            image_url: None,
            created_at: None,
        }
    }
}

impl Entity for SituationMatch {
    fn descriptor() -> &'static EntityDescriptor {
        &schema::SITUATION_MATCH
    }

    fn from_record(record: &Record) -> OrmResult<Self> {
        Ok(Self {
            id: Some(record.req_string("id")?),
            type_: record.req_string("type")?,
            nom: record.opt_string("nom")?,
            description: record.opt_string("description")?,
            temps: record.opt_string("temps")?,
            image_url: record.opt_string("image_url")?,
            created_at: Some(record.req_datetime("created_at")?),
        })
    }

    fn to_record(&self) -> Record {
        Record::new()
            .set("id", ScalarValue::from(self.id.clone()))
            .set("type", self.type_.as_str())
            .set("nom", ScalarValue::from(self.nom.clone()))
            .set("description", ScalarValue::from(self.description.clone()))
            .set("temps", ScalarValue::from(self.temps.clone()))
            .set("image_url", ScalarValue::from(self.image_url.clone()))
            .set("created_at", ScalarValue::from(self.created_at))
    }
}

/// Account record; email is unique, role and is_active are
/// server-defaulted, updated_at refreshes on every mutating write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Option<String>,
    pub email: String,
    pub password: Option<String>,
    pub nom: String,
    pub prenom: Option<String>,
    /// None on create = server default ("user")
    pub role: Option<String>,
    pub icon_url: Option<String>,
    pub security_question: Option<String>,
    pub security_answer: Option<String>,
    /// None on create = server default (true)
    pub is_active: Option<bool>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(email: impl Into<String>, nom: impl Into<String>) -> Self {
        Self {
            id: None,
            email: email.into(),
            password: None,
            nom: nom.into(),
            prenom: None,
            role: None,
            icon_url: None,
            security_question: None,
            security_answer: None,
            is_active: None,
            created_at: None,
            updated_at: None,
        }
    }
}

impl Entity for User {
    fn descriptor() -> &'static EntityDescriptor {
        &schema::USER
    }

    fn from_record(record: &Record) -> OrmResult<Self> {
        Ok(Self {
            id: Some(record.req_string("id")?),
            email: record.req_string("email")?,
            password: record.opt_string("password")?,
            nom: record.req_string("nom")?,
            prenom: record.opt_string("prenom")?,
            role: Some(record.req_string("role")?),
            icon_url: record.opt_string("icon_url")?,
            security_question: record.opt_string("security_question")?,
            security_answer: record.opt_string("security_answer")?,
            is_active: Some(record.req_bool("is_active")?),
            created_at: Some(record.req_datetime("created_at")?),
            updated_at: Some(record.req_datetime("updated_at")?),
        })
    }

    fn to_record(&self) -> Record {
        Record::new()
            .set("id", ScalarValue::from(self.id.clone()))
            .set("email", self.email.as_str())
            .set("password", ScalarValue::from(self.password.clone()))
            .set("nom", self.nom.as_str())
            .set("prenom", ScalarValue::from(self.prenom.clone()))
            .set("role", ScalarValue::from(self.role.clone()))
            .set("icon_url", ScalarValue::from(self.icon_url.clone()))
            .set(
                "security_question",
                ScalarValue::from(self.security_question.clone()),
            )
            .set(
                "security_answer",
                ScalarValue::from(self.security_answer.clone()),
            )
            .set("is_active", ScalarValue::from(self.is_active))
            .set("created_at", ScalarValue::from(self.created_at))
            .set("updated_at", ScalarValue::from(self.updated_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trip_preserves_every_field() {
        let mut tag = Tag::new("Endurance", "Physique");
        tag.id = Some("t1".to_string());
        tag.color = Some("#ff0000".to_string());
        tag.level = Some(3);
        tag.created_at = Some(Utc::now());

        let back = Tag::from_record(&tag.to_record()).unwrap();
        assert_eq!(back, tag);
    }

    #[test]
    fn unset_server_fields_serialize_as_null() {
        let exercice = Exercice::new("Passe haute", "Travail de la passe");
        let record = exercice.to_record();
        assert!(record.value("id").is_null());
        assert!(record.value("created_at").is_null());
        assert_eq!(record.req_string("nom").unwrap(), "Passe haute");
    }

    #[test]
    fn situation_match_type_column_name() {
        let situation = SituationMatch::new("2v2");
        assert_eq!(situation.to_record().req_string("type").unwrap(), "2v2");
    }
}
