//! Output schema of an operator.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use trellis_core::ordering::make_comparator;
use trellis_core::schema::SchemaValue;
use trellis_core::{Comparator, Row, SortOrder};

/// Describes the nodes an `Input` produces: the table they come from, the
/// order they arrive in, and the schemas of their relationships.
#[derive(Clone)]
pub struct SourceSchema {
    pub table_name: String,
    pub columns: BTreeMap<String, SchemaValue>,
    pub primary_key: Vec<String>,
    pub sort: SortOrder,
    pub relationships: BTreeMap<String, SourceSchema>,
    /// Hidden nodes are traversed but never materialized (junction hops).
    pub is_hidden: bool,
    compare: Comparator,
}

impl SourceSchema {
    /// Creates a schema with no relationships.
    pub fn new(
        table_name: impl Into<String>,
        columns: BTreeMap<String, SchemaValue>,
        primary_key: Vec<String>,
        sort: SortOrder,
    ) -> Self {
        let compare = make_comparator(&sort);
        Self {
            table_name: table_name.into(),
            columns,
            primary_key,
            sort,
            relationships: BTreeMap::new(),
            is_hidden: false,
            compare,
        }
    }

    /// Total order over rows of this schema.
    #[inline]
    pub fn compare_rows(&self, a: &Row, b: &Row) -> Ordering {
        (self.compare)(a, b)
    }

    /// Returns the shared comparator.
    #[inline]
    pub fn comparator(&self) -> Comparator {
        self.compare.clone()
    }

    /// Returns the schema of a relationship, panicking if it does not exist.
    pub fn relationship(&self, name: &str) -> &SourceSchema {
        match self.relationships.get(name) {
            Some(schema) => schema,
            None => panic!("Relationship {} not found in {}", name, self.table_name),
        }
    }
}

impl fmt::Debug for SourceSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSchema")
            .field("table_name", &self.table_name)
            .field("primary_key", &self.primary_key)
            .field("sort", &self.sort)
            .field("relationships", &self.relationships)
            .field("is_hidden", &self.is_hidden)
            .finish()
    }
}
