//! Value type definitions for Trellis.
//!
//! This module defines the `Value` enum which represents any value that can be
//! stored in a row column.

use alloc::string::{String, ToString};
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Largest integer an f64 represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// A value that can be stored in a row column.
#[derive(Clone, Debug)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Boolean(bool),
    /// Numeric value
    Number(f64),
    /// UTF-8 string
    String(String),
    /// Arbitrary JSON (arrays and objects)
    Json(serde_json::Value),
}

impl Value {
    /// Returns true if this value is null.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value if this is a Boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the numeric value if this is a Number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the numeric value as an integer if it has no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => safe_integer(*n),
            _ => None,
        }
    }

    /// Returns the string value if this is a String.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Join-key equality: null never equals anything, including null.
    ///
    /// Used for constraints and correlation keys so that rows with a null
    /// foreign key are never related.
    pub fn values_equal(&self, other: &Value) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        self == other
    }

    /// Converts this value into a `serde_json::Value`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Json(j) => j.clone(),
        }
    }

    /// Returns a type ordering value for comparing different types.
    fn type_order(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Json(_) => 4,
        }
    }
}

/// `n` as an integer when it is whole and exactly representable.
fn safe_integer(n: f64) -> Option<i64> {
    // `f64::fract` and `f64::abs` need std.
    (n % 1.0 == 0.0 && (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&n)).then_some(n as i64)
}

fn number_to_json(n: f64) -> serde_json::Value {
    match safe_integer(n) {
        Some(i) => serde_json::Value::from(i),
        None => serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => {
                // Treat NaN as greater than all other numbers
                match (a.is_nan(), b.is_nan()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
                }
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Json(a), Value::Json(b)) => a.to_string().cmp(&b.to_string()),
            // Different types: order by type discriminant
            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_order().hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Number(n) => {
                // 0.0 and -0.0 compare equal, and so do all NaNs
                let canonical = if *n == 0.0 {
                    0.0f64
                } else if n.is_nan() {
                    f64::NAN
                } else {
                    *n
                };
                canonical.to_bits().hash(state)
            }
            Value::String(s) => s.hash(state),
            Value::Json(j) => j.to_string().hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            other => Value::Json(other),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v as f64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Number(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    #[test]
    fn test_integer_conversion() {
        assert_eq!(Value::from(-7.0).as_i64(), Some(-7));
        assert_eq!(Value::from(-0.5).as_i64(), None);
        assert_eq!(Value::from(f64::NAN).as_i64(), None);
        assert_eq!(Value::from(f64::INFINITY).as_i64(), None);
        assert_eq!(Value::from(MAX_SAFE_INTEGER).as_i64(), Some(9_007_199_254_740_991));
        assert_eq!(Value::from(MAX_SAFE_INTEGER + 2.0).as_i64(), None);
        assert_eq!(Value::from(3.0).to_json(), serde_json::json!(3));
        assert_eq!(Value::from(2.5).to_json(), serde_json::json!(2.5));
        assert_eq!(Value::from(f64::INFINITY).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn test_value_accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from(42).as_i64(), Some(42));
        assert_eq!(Value::from(1.5).as_i64(), None);
        assert_eq!(Value::from(1.5).as_f64(), Some(1.5));
        assert_eq!(Value::from("abc").as_str(), Some("abc"));
    }

    #[test]
    fn test_value_ordering() {
        let mut values = vec![
            Value::from("b"),
            Value::from(2),
            Value::Null,
            Value::from(true),
            Value::from(f64::NAN),
            Value::from(-1),
            Value::from(false),
            Value::from("a"),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::from(false),
                Value::from(true),
                Value::from(-1),
                Value::from(2),
                Value::from(f64::NAN),
                Value::from("a"),
                Value::from("b"),
            ]
        );
    }

    #[test]
    fn test_values_equal_rejects_null() {
        assert!(!Value::Null.values_equal(&Value::Null));
        assert!(!Value::Null.values_equal(&Value::from(1)));
        assert!(Value::from(1).values_equal(&Value::from(1.0)));
        assert!(!Value::from(1).values_equal(&Value::from("1")));
    }

    #[test]
    fn test_value_hash_matches_eq() {
        use core::hash::BuildHasher;
        let state = hashbrown::hash_map::DefaultHashBuilder::default();
        let h = |v: &Value| state.hash_one(v);
        assert_eq!(h(&Value::from(0.0)), h(&Value::from(-0.0)));
        assert_eq!(h(&Value::from(f64::NAN)), h(&Value::from(-f64::NAN)));
    }

    #[test]
    fn test_value_json_round_trip() {
        let parsed: Vec<Value> = serde_json::from_str(r#"[null, true, 3, 2.5, "x", [1], {"a": 1}]"#).unwrap();
        assert_eq!(parsed[2], Value::from(3));
        assert!(matches!(parsed[5], Value::Json(_)));
        let back = serde_json::to_string(&parsed).unwrap();
        assert_eq!(back, r#"[null,true,3,2.5,"x",[1],{"a":1}]"#);
    }
}
