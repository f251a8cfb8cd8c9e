//! Schema normalization.
//!
//! Normalization validates primary keys, sorts columns and relationships by
//! name, and resolves lazy relationship targets into a shared graph. A
//! per-pass cache keyed by the identity of each authored `Rc<TableSchema>`
//! makes a cycle resolve to a single normalized table instead of recursing.
//!
//! ```
//! use std::rc::Rc;
//! use trellis_core::schema::*;
//!
//! let comment = Rc::new_cyclic(|me| {
//!     TableSchemaBuilder::new("comment")
//!         .column("id", ValueType::String)
//!         .optional_column("parentID", ValueType::String)
//!         .primary_key(&["id"])
//!         .field_relationship("parent", &["parentID"], &["id"], SchemaRef::weak(me.clone()))
//!         .build()
//! });
//!
//! let normalized = normalize_table_schema(&comment).unwrap();
//! let parent = normalized.relationship("parent").unwrap();
//! assert!(parent.hops()[0].dest_schema.same_table(&normalized));
//! ```

use super::column::SchemaValue;
use super::table::{FieldRelationship, Relationship, TableSchema};
use crate::error::{Error, Result};
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

type TableId = usize;

struct NormalizedTable {
    table_name: String,
    primary_key: Vec<String>,
    columns: BTreeMap<String, SchemaValue>,
    relationships: BTreeMap<String, StoredRelationship>,
}

#[derive(Clone)]
struct StoredHop {
    source_field: Vec<String>,
    dest_field: Vec<String>,
    dest: TableId,
}

#[derive(Clone)]
enum StoredRelationship {
    Field(StoredHop),
    Junction(StoredHop, StoredHop),
}

struct SchemaGraph {
    tables: Vec<NormalizedTable>,
}

/// A validated, immutable table schema inside a resolved schema graph.
///
/// Cloning is cheap; all clones share the graph.
#[derive(Clone)]
pub struct NormalizedSchema {
    graph: Rc<SchemaGraph>,
    id: TableId,
}

/// One resolved edge of a relationship.
#[derive(Clone, Debug)]
pub struct FieldHop {
    pub source_field: Vec<String>,
    pub dest_field: Vec<String>,
    pub dest_schema: NormalizedSchema,
}

/// A resolved relationship.
#[derive(Clone, Debug)]
pub enum NormalizedRelationship {
    Field(FieldHop),
    Junction(FieldHop, FieldHop),
}

impl NormalizedRelationship {
    /// Returns the hops in traversal order.
    pub fn hops(&self) -> Vec<FieldHop> {
        match self {
            NormalizedRelationship::Field(hop) => alloc::vec![hop.clone()],
            NormalizedRelationship::Junction(first, second) => alloc::vec![first.clone(), second.clone()],
        }
    }

    /// Returns true for junction relationships.
    #[inline]
    pub fn is_junction(&self) -> bool {
        matches!(self, NormalizedRelationship::Junction(..))
    }
}

impl NormalizedSchema {
    fn table(&self) -> &NormalizedTable {
        &self.graph.tables[self.id]
    }

    /// Returns the table name.
    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table().table_name
    }

    /// Returns the primary key columns.
    #[inline]
    pub fn primary_key(&self) -> &[String] {
        &self.table().primary_key
    }

    /// Returns the columns, sorted by name.
    #[inline]
    pub fn columns(&self) -> &BTreeMap<String, SchemaValue> {
        &self.table().columns
    }

    /// Returns the relationship names, sorted.
    pub fn relationship_names(&self) -> impl Iterator<Item = &str> {
        self.table().relationships.keys().map(String::as_str)
    }

    /// Resolves a relationship by name.
    pub fn relationship(&self, name: &str) -> Option<NormalizedRelationship> {
        let hop = |h: &StoredHop| FieldHop {
            source_field: h.source_field.clone(),
            dest_field: h.dest_field.clone(),
            dest_schema: NormalizedSchema {
                graph: self.graph.clone(),
                id: h.dest,
            },
        };
        self.table().relationships.get(name).map(|r| match r {
            StoredRelationship::Field(h) => NormalizedRelationship::Field(hop(h)),
            StoredRelationship::Junction(a, b) => NormalizedRelationship::Junction(hop(a), hop(b)),
        })
    }

    /// Like [`NormalizedSchema::relationship`] but fails with `RelationshipNotFound`.
    pub fn require_relationship(&self, name: &str) -> Result<NormalizedRelationship> {
        self.relationship(name)
            .ok_or_else(|| Error::relationship_not_found(self.table_name(), name))
    }

    /// Returns true if both handles denote the same normalized table instance.
    pub fn same_table(&self, other: &NormalizedSchema) -> bool {
        Rc::ptr_eq(&self.graph, &other.graph) && self.id == other.id
    }
}

impl fmt::Debug for NormalizedSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table();
        f.debug_struct("NormalizedSchema")
            .field("table_name", &table.table_name)
            .field("primary_key", &table.primary_key)
            .field("columns", &table.columns)
            .field("relationships", &table.relationships.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Types that can be normalized. Normalizing a [`NormalizedSchema`] is a no-op.
pub trait Normalize {
    fn normalize(&self) -> Result<NormalizedSchema>;
}

impl Normalize for Rc<TableSchema> {
    fn normalize(&self) -> Result<NormalizedSchema> {
        let mut normalizer = Normalizer::default();
        let id = normalizer.normalize(self, self.table_name())?;
        Ok(normalizer.finish(id))
    }
}

impl Normalize for NormalizedSchema {
    fn normalize(&self) -> Result<NormalizedSchema> {
        Ok(self.clone())
    }
}

/// Normalizes a single table schema and everything reachable from it.
pub fn normalize_table_schema<T: Normalize + ?Sized>(schema: &T) -> Result<NormalizedSchema> {
    schema.normalize()
}

/// Normalizes a set of named tables into one shared graph. Each table must
/// declare the name it is registered under.
pub fn normalize_tables(tables: &BTreeMap<String, Rc<TableSchema>>) -> Result<BTreeMap<String, NormalizedSchema>> {
    let mut normalizer = Normalizer::default();
    let mut ids = Vec::with_capacity(tables.len());
    for (name, table) in tables {
        ids.push((name.clone(), normalizer.normalize(table, name)?));
    }
    let graph = Rc::new(SchemaGraph {
        tables: normalizer.tables,
    });
    Ok(ids
        .into_iter()
        .map(|(name, id)| {
            (
                name,
                NormalizedSchema {
                    graph: graph.clone(),
                    id,
                },
            )
        })
        .collect())
}

#[derive(Default)]
struct Normalizer {
    /// Authored schema identity -> normalized table.
    cache: BTreeMap<usize, TableId>,
    /// Keeps authored schemas alive so their addresses stay unique for the pass.
    retained: Vec<Rc<TableSchema>>,
    tables: Vec<NormalizedTable>,
}

impl Normalizer {
    fn finish(self, id: TableId) -> NormalizedSchema {
        NormalizedSchema {
            graph: Rc::new(SchemaGraph { tables: self.tables }),
            id,
        }
    }

    fn normalize(&mut self, schema: &Rc<TableSchema>, expected_name: &str) -> Result<TableId> {
        if schema.table_name() != expected_name {
            return Err(Error::table_name_mismatch(expected_name, schema.table_name()));
        }
        let identity = Rc::as_ptr(schema) as usize;
        if let Some(id) = self.cache.get(&identity) {
            return Ok(*id);
        }

        let primary_key = normalize_primary_key(schema)?;
        let columns: BTreeMap<String, SchemaValue> = schema.columns().iter().cloned().collect();

        // Register before resolving relationships so cycles find this entry.
        let id = self.tables.len();
        self.tables.push(NormalizedTable {
            table_name: String::from(schema.table_name()),
            primary_key,
            columns,
            relationships: BTreeMap::new(),
        });
        self.cache.insert(identity, id);
        self.retained.push(schema.clone());

        let mut relationships = BTreeMap::new();
        for (name, relationship) in schema.relationships() {
            let stored = match relationship {
                Relationship::Field(field) => StoredRelationship::Field(self.normalize_hop(schema, name, field)?),
                Relationship::Junction(first, second) => StoredRelationship::Junction(
                    self.normalize_hop(schema, name, first)?,
                    self.normalize_hop(schema, name, second)?,
                ),
            };
            relationships.insert(name.clone(), stored);
        }
        self.tables[id].relationships = relationships;
        Ok(id)
    }

    fn normalize_hop(&mut self, owner: &TableSchema, name: &str, field: &FieldRelationship) -> Result<StoredHop> {
        if field.source_field.is_empty() || field.dest_field.is_empty() {
            return Err(Error::invalid_schema(format!(
                "Relationship {}.{}: expected at least one field",
                owner.table_name(),
                name
            )));
        }
        if field.source_field.len() != field.dest_field.len() {
            return Err(Error::invalid_schema(format!(
                "Relationship {}.{}: source and destination fields must have the same length",
                owner.table_name(),
                name
            )));
        }
        let dest = field.dest_schema.resolve().ok_or_else(|| {
            Error::invalid_schema(format!(
                "Relationship {}.{}: destination schema could not be resolved",
                owner.table_name(),
                name
            ))
        })?;
        let dest_name = String::from(dest.table_name());
        let dest = self.normalize(&dest, &dest_name)?;
        Ok(StoredHop {
            source_field: field.source_field.clone(),
            dest_field: field.dest_field.clone(),
            dest,
        })
    }
}

fn normalize_primary_key(schema: &TableSchema) -> Result<Vec<String>> {
    let table = schema.table_name();
    let primary_key = schema.primary_key();
    if primary_key.is_empty() {
        return Err(Error::invalid_primary_key(table, "Primary key must not be empty"));
    }
    for (i, pk) in primary_key.iter().enumerate() {
        if primary_key[..i].contains(pk) {
            return Err(Error::invalid_primary_key(table, "Primary key must not contain duplicates"));
        }
        let column = schema
            .columns()
            .iter()
            .rev()
            .find(|(name, _)| name == pk)
            .map(|(_, value)| value)
            .ok_or_else(|| Error::invalid_primary_key(table, format!("Primary key column \"{}\" not found", pk)))?;
        if column.optional {
            return Err(Error::invalid_primary_key(
                table,
                format!("Primary key column \"{}\" cannot be optional", pk),
            ));
        }
        if !column.value_type.is_key_type() {
            return Err(Error::invalid_primary_key(
                table,
                format!(
                    "Primary key column \"{}\" must be a string, number, or boolean. Got {:?}",
                    pk, column.value_type
                ),
            ));
        }
    }
    Ok(primary_key.to_vec())
}

impl fmt::Debug for StoredRelationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoredRelationship::Field(_) => f.write_str("Field"),
            StoredRelationship::Junction(..) => f.write_str("Junction"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaRef, TableSchemaBuilder, ValueType};
    use alloc::string::ToString;
    use core::cell::OnceCell;

    fn user() -> Rc<TableSchema> {
        TableSchemaBuilder::new("user")
            .column("name", ValueType::String)
            .column("id", ValueType::String)
            .primary_key(&["id"])
            .build_rc()
    }

    #[test]
    fn test_columns_sorted() {
        let normalized = normalize_table_schema(&user()).unwrap();
        let names: Vec<_> = normalized.columns().keys().map(|k| k.as_str()).collect();
        assert_eq!(names, ["id", "name"]);
        assert_eq!(normalized.primary_key(), ["id".to_string()]);
    }

    #[test]
    fn test_invalid_primary_keys() {
        let empty = TableSchemaBuilder::new("t").column("id", ValueType::String).build_rc();
        assert!(matches!(normalize_table_schema(&empty), Err(Error::InvalidPrimaryKey { .. })));

        let dup = TableSchemaBuilder::new("t")
            .column("id", ValueType::String)
            .primary_key(&["id", "id"])
            .build_rc();
        assert!(matches!(normalize_table_schema(&dup), Err(Error::InvalidPrimaryKey { .. })));

        let optional = TableSchemaBuilder::new("t")
            .optional_column("id", ValueType::String)
            .primary_key(&["id"])
            .build_rc();
        assert!(matches!(normalize_table_schema(&optional), Err(Error::InvalidPrimaryKey { .. })));

        let json = TableSchemaBuilder::new("t")
            .column("id", ValueType::Json)
            .primary_key(&["id"])
            .build_rc();
        let err = normalize_table_schema(&json).unwrap_err();
        assert!(err.to_string().contains("must be a string, number, or boolean"));

        let missing = TableSchemaBuilder::new("t")
            .column("id", ValueType::String)
            .primary_key(&["nope"])
            .build_rc();
        assert!(matches!(normalize_table_schema(&missing), Err(Error::InvalidPrimaryKey { .. })));
    }

    #[test]
    fn test_relationships_sorted_and_resolved() {
        let user = user();
        let issue = TableSchemaBuilder::new("issue")
            .column("id", ValueType::String)
            .column("ownerID", ValueType::String)
            .column("creatorID", ValueType::String)
            .primary_key(&["id"])
            .field_relationship("owner", &["ownerID"], &["id"], SchemaRef::eager(user.clone()))
            .field_relationship("creator", &["creatorID"], &["id"], SchemaRef::eager(user.clone()))
            .build_rc();
        let normalized = normalize_table_schema(&issue).unwrap();
        let names: Vec<_> = normalized.relationship_names().collect();
        assert_eq!(names, ["creator", "owner"]);

        let owner = normalized.relationship("owner").unwrap().hops().remove(0).dest_schema;
        let creator = normalized.relationship("creator").unwrap().hops().remove(0).dest_schema;
        assert_eq!(owner.table_name(), "user");
        // The same authored schema resolves to one normalized instance.
        assert!(owner.same_table(&creator));
    }

    #[test]
    fn test_mutual_cycle() {
        let issue_slot: Rc<OnceCell<Rc<TableSchema>>> = Rc::new(OnceCell::new());
        let comment = TableSchemaBuilder::new("comment")
            .column("id", ValueType::String)
            .column("issueID", ValueType::String)
            .primary_key(&["id"])
            .field_relationship("issue", &["issueID"], &["id"], SchemaRef::slot(&issue_slot))
            .build_rc();
        let issue = TableSchemaBuilder::new("issue")
            .column("id", ValueType::String)
            .primary_key(&["id"])
            .field_relationship("comments", &["id"], &["issueID"], SchemaRef::eager(comment))
            .build_rc();
        let _ = issue_slot.set(issue.clone());

        let normalized = normalize_table_schema(&issue).unwrap();
        let comment = normalized.relationship("comments").unwrap().hops().remove(0).dest_schema;
        let back = comment.relationship("issue").unwrap().hops().remove(0).dest_schema;
        assert!(back.same_table(&normalized));
    }

    #[test]
    fn test_unresolvable_relationship() {
        let issue = TableSchemaBuilder::new("issue")
            .column("id", ValueType::String)
            .primary_key(&["id"])
            .field_relationship("owner", &["ownerID"], &["id"], SchemaRef::lazy(|| None))
            .build_rc();
        assert!(matches!(normalize_table_schema(&issue), Err(Error::InvalidSchema { .. })));
    }

    #[test]
    fn test_field_length_mismatch() {
        let issue = TableSchemaBuilder::new("issue")
            .column("id", ValueType::String)
            .primary_key(&["id"])
            .field_relationship("owner", &["a", "b"], &["id"], SchemaRef::eager(user()))
            .build_rc();
        assert!(matches!(normalize_table_schema(&issue), Err(Error::InvalidSchema { .. })));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let normalized = normalize_table_schema(&user()).unwrap();
        let again = normalize_table_schema(&normalized).unwrap();
        assert!(again.same_table(&normalized));
    }

    #[test]
    fn test_normalize_tables_checks_names() {
        let mut tables = BTreeMap::new();
        tables.insert("users".to_string(), user());
        assert_eq!(
            normalize_tables(&tables).unwrap_err(),
            Error::table_name_mismatch("users", "user")
        );

        let mut tables = BTreeMap::new();
        tables.insert("user".to_string(), user());
        let normalized = normalize_tables(&tables).unwrap();
        assert_eq!(normalized["user"].table_name(), "user");
    }

    #[test]
    fn test_junction_relationship() {
        let label = TableSchemaBuilder::new("label")
            .column("id", ValueType::String)
            .primary_key(&["id"])
            .build_rc();
        let issue_label = TableSchemaBuilder::new("issueLabel")
            .column("issueID", ValueType::String)
            .column("labelID", ValueType::String)
            .primary_key(&["issueID", "labelID"])
            .build_rc();
        let issue = TableSchemaBuilder::new("issue")
            .column("id", ValueType::String)
            .primary_key(&["id"])
            .relationship(
                "labels",
                Relationship::Junction(
                    FieldRelationship::new(&["id"], &["issueID"], SchemaRef::eager(issue_label)),
                    FieldRelationship::new(&["labelID"], &["id"], SchemaRef::eager(label)),
                ),
            )
            .build_rc();
        let normalized = normalize_table_schema(&issue).unwrap();
        let labels = normalized.require_relationship("labels").unwrap();
        assert!(labels.is_junction());
        let hops = labels.hops();
        assert_eq!(hops[0].dest_schema.table_name(), "issueLabel");
        assert_eq!(hops[1].dest_schema.table_name(), "label");
        assert!(normalized.require_relationship("nope").is_err());
    }
}
