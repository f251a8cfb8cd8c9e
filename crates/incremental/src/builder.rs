//! Wires relationship pipelines from a normalized schema graph.

use crate::condition::Condition;
use crate::operator::Input;
use crate::operators::{Exists, Join, JoinArgs};
use crate::source::Source;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::debug;
use trellis_core::schema::{FieldHop, NormalizedRelationship, NormalizedSchema};
use trellis_core::{Error, Result, SortOrder};
use trellis_storage::{MemoryStorage, Storage};

/// Resolves table names to sources and hands out operator storage.
pub trait SourceProvider {
    /// Returns the source of a table.
    fn source(&self, table_name: &str) -> Option<Rc<dyn Source>>;

    /// Creates fresh storage for one stateful operator.
    fn create_storage(&self) -> Box<dyn Storage> {
        MemoryStorage::boxed()
    }
}

/// A [`SourceProvider`] backed by a map of sources.
#[derive(Clone, Default)]
pub struct Catalog {
    sources: BTreeMap<String, Rc<dyn Source>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source under its table name.
    pub fn add(&mut self, source: Rc<dyn Source>) -> &mut Self {
        self.sources.insert(source.table_name().to_string(), source);
        self
    }

    pub fn with(mut self, source: Rc<dyn Source>) -> Self {
        self.add(source);
        self
    }
}

impl SourceProvider for Catalog {
    fn source(&self, table_name: &str) -> Option<Rc<dyn Source>> {
        self.sources.get(table_name).cloned()
    }
}

/// Connects to a table's source.
pub fn connect_table(
    provider: &dyn SourceProvider,
    table_name: &str,
    sort: SortOrder,
    filter: Option<Condition>,
) -> Result<Rc<dyn Input>> {
    let source = provider
        .source(table_name)
        .ok_or_else(|| Error::table_not_found(table_name))?;
    source.connect(sort, filter)
}

fn hop_join(
    provider: &dyn SourceProvider,
    parent: Rc<dyn Input>,
    child: Rc<dyn Input>,
    hop: &FieldHop,
    name: &str,
    hidden: bool,
) -> Result<Rc<Join>> {
    Join::new(JoinArgs {
        parent,
        child,
        storage: provider.create_storage(),
        parent_key: hop.source_field.clone(),
        child_key: hop.dest_field.clone(),
        relationship_name: name.to_string(),
        hidden,
    })
}

/// Adds relationship `name` of `schema` to the nodes of `parent`.
///
/// A field relationship becomes one `Join` against the destination table. A
/// junction relationship joins the junction table with the destination in a
/// hidden inner `Join` under the same name, then joins that into `parent`.
/// Child tables are connected in primary key order.
pub fn join_relationship(
    provider: &dyn SourceProvider,
    parent: Rc<dyn Input>,
    schema: &NormalizedSchema,
    name: &str,
) -> Result<Rc<Join>> {
    let relationship = schema.require_relationship(name)?;
    debug!(
        table = schema.table_name(),
        relationship = name,
        junction = relationship.is_junction(),
        "join relationship"
    );
    match relationship {
        NormalizedRelationship::Field(hop) => {
            let child = connect_table(provider, hop.dest_schema.table_name(), Vec::new(), None)?;
            hop_join(provider, parent, child, &hop, name, false)
        }
        NormalizedRelationship::Junction(first, second) => {
            let junction = connect_table(provider, first.dest_schema.table_name(), Vec::new(), None)?;
            let dest = connect_table(provider, second.dest_schema.table_name(), Vec::new(), None)?;
            let inner = hop_join(provider, junction, dest, &second, name, true)?;
            hop_join(provider, parent, inner, &first, name, false)
        }
    }
}

/// Keeps only parent rows whose relationship `name` is non-empty, or empty
/// when `not` is set.
pub fn exists_relationship(
    provider: &dyn SourceProvider,
    parent: Rc<dyn Input>,
    schema: &NormalizedSchema,
    name: &str,
    not: bool,
) -> Result<Rc<Exists>> {
    let join = join_relationship(provider, parent, schema, name)?;
    Exists::new(join, provider.create_storage(), name, not)
}
