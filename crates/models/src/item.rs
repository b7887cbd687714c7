use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A full or partial row: field name to JSON value.
pub type Item = Map<String, Value>;

/// Opaque scalar identifying one item within a collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Integer(i64),
    String(String),
}

impl PrimaryKey {
    /// Interpret a JSON value as a key. Integral numbers and strings qualify.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Integer),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Integer(i) => Value::from(*i),
            Self::String(s) => Value::from(s.clone()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::String(_) => None,
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(v: i64) -> Self { Self::Integer(v) }
}

impl From<i32> for PrimaryKey {
    fn from(v: i32) -> Self { Self::Integer(v.into()) }
}

impl From<&str> for PrimaryKey {
    fn from(v: &str) -> Self { Self::String(v.to_string()) }
}

impl From<String> for PrimaryKey {
    fn from(v: String) -> Self { Self::String(v) }
}

impl From<uuid::Uuid> for PrimaryKey {
    fn from(v: uuid::Uuid) -> Self { Self::String(v.to_string()) }
}

/// Build an [`Item`] from a `serde_json::json!({...})` object literal.
/// Non-object values yield an empty item.
pub fn item_from_json(value: Value) -> Item {
    match value {
        Value::Object(map) => map,
        _ => Item::new(),
    }
}
