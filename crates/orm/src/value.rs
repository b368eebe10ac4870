//! Scalar value domain shared by records, filters and aggregates

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OrmError, OrmResult};

/// Column types an entity field can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Int,
    Bool,
    DateTime,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::String => write!(f, "String"),
            FieldKind::Int => write!(f, "Int"),
            FieldKind::Bool => write!(f, "Bool"),
            FieldKind::DateTime => write!(f, "DateTime"),
        }
    }
}

/// A single stored or filter-supplied value.
///
/// `Float` never appears in a stored record (no entity declares a float
/// column); it exists for `_avg` accumulators and `having` comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    String(String),
    Int(i64),
    Bool(bool),
    DateTime(DateTime<Utc>),
    Float(f64),
    Null,
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            ScalarValue::String(s) => {
                state.write_u8(0);
                s.hash(state);
            }
            ScalarValue::Int(i) => {
                state.write_u8(1);
                i.hash(state);
            }
            ScalarValue::Bool(b) => {
                state.write_u8(2);
                b.hash(state);
            }
            ScalarValue::DateTime(dt) => {
                state.write_u8(3);
                dt.timestamp_nanos_opt().unwrap_or_default().hash(state);
            }
            ScalarValue::Float(f) => {
                state.write_u8(4);
                state.write_u64(f.to_bits());
            }
            ScalarValue::Null => state.write_u8(5),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::String(s) => write!(f, "{}", s),
            ScalarValue::Int(i) => write!(f, "{}", i),
            ScalarValue::Bool(b) => write!(f, "{}", b),
            ScalarValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            ScalarValue::Float(v) => write!(f, "{}", v),
            ScalarValue::Null => write!(f, "null"),
        }
    }
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Kind of a non-null value; None for Null
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            ScalarValue::String(_) => Some(FieldKind::String),
            ScalarValue::Int(_) => Some(FieldKind::Int),
            ScalarValue::Bool(_) => Some(FieldKind::Bool),
            ScalarValue::DateTime(_) => Some(FieldKind::DateTime),
            // aggregate-only, compatible with Int comparisons
            ScalarValue::Float(_) => Some(FieldKind::Int),
            ScalarValue::Null => None,
        }
    }

    /// Same-kind ordering. Null and cross-kind pairs are unordered, which
    /// makes every ordering comparison against them evaluate to false,
    /// matching SQL three-valued logic.
    pub fn compare(&self, other: &ScalarValue) -> Option<Ordering> {
        match (self, other) {
            (ScalarValue::String(a), ScalarValue::String(b)) => Some(a.cmp(b)),
            (ScalarValue::Int(a), ScalarValue::Int(b)) => Some(a.cmp(b)),
            (ScalarValue::DateTime(a), ScalarValue::DateTime(b)) => Some(a.cmp(b)),
            (ScalarValue::Bool(a), ScalarValue::Bool(b)) => Some(a.cmp(b)),
            (ScalarValue::Float(a), ScalarValue::Float(b)) => a.partial_cmp(b),
            (ScalarValue::Float(a), ScalarValue::Int(b)) => a.partial_cmp(&(*b as f64)),
            (ScalarValue::Int(a), ScalarValue::Float(b)) => (*a as f64).partial_cmp(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Int(i) => Some(*i as f64),
            ScalarValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::String(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::String(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int(v)
    }
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        ScalarValue::Int(v as i64)
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Bool(v)
    }
}

impl From<DateTime<Utc>> for ScalarValue {
    fn from(v: DateTime<Utc>) -> Self {
        ScalarValue::DateTime(v)
    }
}

impl<T> From<Option<T>> for ScalarValue
where
    T: Into<ScalarValue>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => ScalarValue::Null,
        }
    }
}

/// One stored row: field name to scalar value.
///
/// BTreeMap keeps iteration deterministic, which the memory backend and the
/// test suite both rely on.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    fields: BTreeMap<String, ScalarValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<ScalarValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&ScalarValue> {
        self.fields.get(field)
    }

    /// Value of a field with missing treated as Null
    pub fn value(&self, field: &str) -> ScalarValue {
        self.fields.get(field).cloned().unwrap_or(ScalarValue::Null)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ScalarValue)> {
        self.fields.iter()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Keep only the named fields (projection support)
    pub fn retain_fields(&mut self, allow: &[String]) {
        self.fields.retain(|k, _| allow.iter().any(|a| a == k));
    }

    // Typed accessors used by entity conversion. A malformed shape coming
    // back from a storage engine is an Unknown failure, not caller input.

    pub fn req_string(&self, field: &str) -> OrmResult<String> {
        match self.get(field) {
            Some(ScalarValue::String(s)) => Ok(s.clone()),
            other => Err(shape_error(field, "String", other)),
        }
    }

    pub fn opt_string(&self, field: &str) -> OrmResult<Option<String>> {
        match self.get(field) {
            Some(ScalarValue::String(s)) => Ok(Some(s.clone())),
            Some(ScalarValue::Null) | None => Ok(None),
            other => Err(shape_error(field, "String", other)),
        }
    }

    pub fn req_i64(&self, field: &str) -> OrmResult<i64> {
        match self.get(field) {
            Some(ScalarValue::Int(i)) => Ok(*i),
            other => Err(shape_error(field, "Int", other)),
        }
    }

    pub fn opt_i64(&self, field: &str) -> OrmResult<Option<i64>> {
        match self.get(field) {
            Some(ScalarValue::Int(i)) => Ok(Some(*i)),
            Some(ScalarValue::Null) | None => Ok(None),
            other => Err(shape_error(field, "Int", other)),
        }
    }

    pub fn req_bool(&self, field: &str) -> OrmResult<bool> {
        match self.get(field) {
            Some(ScalarValue::Bool(b)) => Ok(*b),
            other => Err(shape_error(field, "Bool", other)),
        }
    }

    pub fn req_datetime(&self, field: &str) -> OrmResult<DateTime<Utc>> {
        match self.get(field) {
            Some(ScalarValue::DateTime(dt)) => Ok(*dt),
            other => Err(shape_error(field, "DateTime", other)),
        }
    }

    pub fn opt_datetime(&self, field: &str) -> OrmResult<Option<DateTime<Utc>>> {
        match self.get(field) {
            Some(ScalarValue::DateTime(dt)) => Ok(Some(*dt)),
            Some(ScalarValue::Null) | None => Ok(None),
            other => Err(shape_error(field, "DateTime", other)),
        }
    }
}

impl From<&ScalarValue> for serde_json::Value {
    fn from(value: &ScalarValue) -> Self {
        match value {
            ScalarValue::String(s) => serde_json::Value::String(s.clone()),
            ScalarValue::Int(i) => serde_json::Value::from(*i),
            ScalarValue::Bool(b) => serde_json::Value::Bool(*b),
            ScalarValue::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
            ScalarValue::Float(f) => serde_json::Value::from(*f),
            ScalarValue::Null => serde_json::Value::Null,
        }
    }
}

impl Record {
    /// JSON object view of the row, for logging and API payloads
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                .collect(),
        )
    }
}

fn shape_error(field: &str, expected: &str, got: Option<&ScalarValue>) -> OrmError {
    OrmError::Unknown(format!(
        "field '{}' expected {} but storage returned {:?}",
        field, expected, got
    ))
}

impl FromIterator<(String, ScalarValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, ScalarValue)>>(iter: I) -> Self {
        Record {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_is_same_kind_only() {
        assert_eq!(
            ScalarValue::from(2i64).compare(&ScalarValue::from(3i64)),
            Some(Ordering::Less)
        );
        assert_eq!(
            ScalarValue::from("b").compare(&ScalarValue::from("a")),
            Some(Ordering::Greater)
        );
        assert_eq!(ScalarValue::from(2i64).compare(&ScalarValue::from("2")), None);
        assert_eq!(ScalarValue::Null.compare(&ScalarValue::Null), None);
    }

    #[test]
    fn record_typed_accessors() {
        let rec = Record::new()
            .set("nom", "smash")
            .set("ordre", 3i64)
            .set("notes", ScalarValue::Null);

        assert_eq!(rec.req_string("nom").unwrap(), "smash");
        assert_eq!(rec.req_i64("ordre").unwrap(), 3);
        assert_eq!(rec.opt_string("notes").unwrap(), None);
        assert_eq!(rec.opt_string("absent").unwrap(), None);
        assert!(rec.req_string("ordre").is_err());
    }

    #[test]
    fn missing_field_reads_as_null() {
        let rec = Record::new().set("a", 1i64);
        assert_eq!(rec.value("b"), ScalarValue::Null);
    }

    #[test]
    fn json_view() {
        let rec = Record::new()
            .set("nom", "smash")
            .set("ordre", 3i64)
            .set("actif", true)
            .set("notes", ScalarValue::Null);
        let json = rec.to_json();
        assert_eq!(json["nom"], serde_json::json!("smash"));
        assert_eq!(json["ordre"], serde_json::json!(3));
        assert_eq!(json["actif"], serde_json::json!(true));
        assert!(json["notes"].is_null());
    }
}
