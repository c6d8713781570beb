//! Primitive leaf values.

use serde::{Deserialize, Serialize};

/// A JSON scalar stored in a primitive element.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub enum PrimitiveValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    Str(String),
}

impl PrimitiveValue {
    /// Convert to a `serde_json::Value` for marshalling.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PrimitiveValue::Null => serde_json::Value::Null,
            PrimitiveValue::Bool(b) => serde_json::Value::Bool(*b),
            PrimitiveValue::Integer(i) => serde_json::Value::Number((*i).into()),
            PrimitiveValue::Double(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            PrimitiveValue::Str(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<bool> for PrimitiveValue {
    fn from(v: bool) -> Self {
        PrimitiveValue::Bool(v)
    }
}

impl From<i64> for PrimitiveValue {
    fn from(v: i64) -> Self {
        PrimitiveValue::Integer(v)
    }
}

impl From<f64> for PrimitiveValue {
    fn from(v: f64) -> Self {
        PrimitiveValue::Double(v)
    }
}

impl From<&str> for PrimitiveValue {
    fn from(v: &str) -> Self {
        PrimitiveValue::Str(v.to_string())
    }
}

impl From<String> for PrimitiveValue {
    fn from(v: String) -> Self {
        PrimitiveValue::Str(v)
    }
}
