//! Column definitions for Trellis table schemas.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Declared type of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Number,
    String,
    Null,
    Json,
}

impl ValueType {
    /// Returns whether this type may be used in a primary key.
    #[inline]
    pub fn is_key_type(&self) -> bool {
        matches!(self, ValueType::Boolean | ValueType::Number | ValueType::String)
    }

    /// Returns whether a value conforms to this type. Null conforms to every type;
    /// optionality is checked separately.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ValueType::Boolean, Value::Boolean(_)) => true,
            (ValueType::Number, Value::Number(_)) => true,
            (ValueType::String, Value::String(_)) => true,
            (ValueType::Json, _) => true,
            _ => false,
        }
    }
}

/// A column definition: its type and whether it may be null.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaValue {
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub optional: bool,
}

impl SchemaValue {
    /// A required column.
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            optional: false,
        }
    }

    /// An optional column.
    pub fn optional(value_type: ValueType) -> Self {
        Self {
            value_type,
            optional: true,
        }
    }
}

impl From<ValueType> for SchemaValue {
    fn from(value_type: ValueType) -> Self {
        SchemaValue::new(value_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_types() {
        assert!(ValueType::String.is_key_type());
        assert!(ValueType::Number.is_key_type());
        assert!(ValueType::Boolean.is_key_type());
        assert!(!ValueType::Json.is_key_type());
        assert!(!ValueType::Null.is_key_type());
    }

    #[test]
    fn test_accepts() {
        assert!(ValueType::Number.accepts(&Value::from(1)));
        assert!(!ValueType::Number.accepts(&Value::from("1")));
        assert!(ValueType::String.accepts(&Value::Null));
        assert!(ValueType::Json.accepts(&Value::from(true)));
    }

    #[test]
    fn test_schema_value_serde() {
        let v: SchemaValue = serde_json::from_str(r#"{"type":"number"}"#).unwrap();
        assert_eq!(v, SchemaValue::new(ValueType::Number));
        let v: SchemaValue = serde_json::from_str(r#"{"type":"string","optional":true}"#).unwrap();
        assert!(v.optional);
    }
}
