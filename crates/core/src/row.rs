//! Row structure for Trellis.
//!
//! A `Row` is an ordered mapping from column name to `Value`. Columns that are
//! not present read as `Value::Null`, which matches how optional columns are
//! represented on the wire.

use crate::value::Value;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use serde::{Deserialize, Serialize};

static NULL: Value = Value::Null;

/// A single table row.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Returns the value for a column, or `Value::Null` if it is absent.
    #[inline]
    pub fn get(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&NULL)
    }

    /// Returns true if the column is explicitly present.
    #[inline]
    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    /// Sets a column value, returning the previous one.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(column.into(), value.into())
    }

    /// Builder-style variant of [`Row::set`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Returns the number of present columns.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the row has no columns.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over present columns in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Projects the row onto the given columns.
    pub fn project<S: AsRef<str>>(&self, columns: &[S]) -> Vec<Value> {
        columns.iter().map(|c| self.get(c.as_ref()).clone()).collect()
    }

    /// Returns true if every listed column is equal between both rows,
    /// using join-key equality (null never matches).
    pub fn key_equals<S: AsRef<str>>(&self, other: &Row, columns: &[S]) -> bool {
        columns
            .iter()
            .all(|c| self.get(c.as_ref()).values_equal(other.get(c.as_ref())))
    }

    /// Converts the row into a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect::<serde_json::Map<String, serde_json::Value>>();
        serde_json::Value::Object(map)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl<K, V> FromIterator<(K, V)> for Row
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Builds a [`Row`] from `column => value` pairs.
///
/// ```
/// use trellis_core::{row, Value};
///
/// let r = row! { "id" => 1, "title" => "hello" };
/// assert_eq!(r.get("title"), &Value::from("hello"));
/// assert!(r.get("missing").is_null());
/// ```
#[macro_export]
macro_rules! row {
    () => { $crate::Row::new() };
    ($($column:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::Row::new();
        $( row.set($column, $value); )+
        row
    }};
}
