//! Materialized view entries.

use std::collections::BTreeMap;
use trellis_core::Row;

/// One materialized row plus its materialized relationships.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub row: Row,
    pub relationships: BTreeMap<String, ViewValue>,
}

/// Entries of a list level, sorted by the level's row comparator.
pub type EntryList = Vec<Entry>;

/// The contents of one view level.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewValue {
    List(EntryList),
    Single(Option<Box<Entry>>),
}

impl Entry {
    pub fn new(row: Row) -> Self {
        Self {
            row,
            relationships: BTreeMap::new(),
        }
    }

    /// Returns the materialized relationship `name`.
    #[inline]
    pub fn relationship(&self, name: &str) -> Option<&ViewValue> {
        self.relationships.get(name)
    }

    /// Renders the row columns with relationships as nested values.
    pub fn to_json(&self) -> serde_json::Value {
        let mut json = self.row.to_json();
        if let serde_json::Value::Object(map) = &mut json {
            for (name, value) in &self.relationships {
                map.insert(name.clone(), value.to_json());
            }
        }
        json
    }
}

impl ViewValue {
    /// An empty level for `singular` or list output.
    pub fn empty(singular: bool) -> Self {
        if singular {
            ViewValue::Single(None)
        } else {
            ViewValue::List(Vec::new())
        }
    }

    pub fn as_list(&self) -> Option<&[Entry]> {
        match self {
            ViewValue::List(entries) => Some(entries),
            ViewValue::Single(_) => None,
        }
    }

    pub fn as_single(&self) -> Option<&Entry> {
        match self {
            ViewValue::Single(entry) => entry.as_deref(),
            ViewValue::List(_) => None,
        }
    }

    /// Number of entries at this level.
    pub fn len(&self) -> usize {
        match self {
            ViewValue::List(entries) => entries.len(),
            ViewValue::Single(entry) => usize::from(entry.is_some()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Renders a list as an array and a single level as an object or `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ViewValue::List(entries) => {
                serde_json::Value::Array(entries.iter().map(Entry::to_json).collect())
            }
            ViewValue::Single(Some(entry)) => entry.to_json(),
            ViewValue::Single(None) => serde_json::Value::Null,
        }
    }
}
