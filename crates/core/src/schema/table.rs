//! Table schema definitions for Trellis.

use super::column::{SchemaValue, ValueType};
use alloc::rc::{Rc, Weak};
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::OnceCell;
use core::fmt;

/// A reference to the destination schema of a relationship.
///
/// Destinations are resolved lazily so that schemas may form cycles.
#[derive(Clone)]
pub enum SchemaRef {
    /// A schema that is already built.
    Eager(Rc<TableSchema>),
    /// A thunk resolved during normalization. `None` means unresolvable.
    Lazy(Rc<dyn Fn() -> Option<Rc<TableSchema>>>),
}

impl SchemaRef {
    /// Wraps a built schema.
    pub fn eager(schema: Rc<TableSchema>) -> Self {
        SchemaRef::Eager(schema)
    }

    /// Wraps a thunk.
    pub fn lazy<F>(thunk: F) -> Self
    where
        F: Fn() -> Option<Rc<TableSchema>> + 'static,
    {
        SchemaRef::Lazy(Rc::new(thunk))
    }

    /// Refers to a schema through a weak pointer, typically the schema's own
    /// `Rc::new_cyclic` handle for self-references.
    pub fn weak(schema: Weak<TableSchema>) -> Self {
        SchemaRef::lazy(move || schema.upgrade())
    }

    /// Refers to a schema that will be stored into `slot` later.
    pub fn slot(slot: &Rc<OnceCell<Rc<TableSchema>>>) -> Self {
        let slot = slot.clone();
        SchemaRef::lazy(move || slot.get().cloned())
    }

    /// Resolves the reference.
    pub fn resolve(&self) -> Option<Rc<TableSchema>> {
        match self {
            SchemaRef::Eager(schema) => Some(schema.clone()),
            SchemaRef::Lazy(thunk) => thunk(),
        }
    }
}

impl fmt::Debug for SchemaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaRef::Eager(schema) => write!(f, "SchemaRef({})", schema.table_name()),
            SchemaRef::Lazy(_) => f.write_str("SchemaRef(<lazy>)"),
        }
    }
}

/// A foreign-key style edge: `source_field` on this table equals
/// `dest_field` on the destination table, column by column.
#[derive(Clone, Debug)]
pub struct FieldRelationship {
    pub source_field: Vec<String>,
    pub dest_field: Vec<String>,
    pub dest_schema: SchemaRef,
}

impl FieldRelationship {
    pub fn new<S: AsRef<str>, D: AsRef<str>>(source_field: &[S], dest_field: &[D], dest_schema: SchemaRef) -> Self {
        Self {
            source_field: source_field.iter().map(|s| String::from(s.as_ref())).collect(),
            dest_field: dest_field.iter().map(|s| String::from(s.as_ref())).collect(),
            dest_schema,
        }
    }
}

/// A relationship from one table to another.
#[derive(Clone, Debug)]
pub enum Relationship {
    /// A direct edge.
    Field(FieldRelationship),
    /// Two edges composed through a junction table. The first hop goes from
    /// this table to the junction table, the second from the junction table
    /// to the destination.
    Junction(FieldRelationship, FieldRelationship),
}

/// An unnormalized table schema, as authored.
#[derive(Clone, Debug)]
pub struct TableSchema {
    table_name: String,
    primary_key: Vec<String>,
    columns: Vec<(String, SchemaValue)>,
    relationships: Vec<(String, Relationship)>,
}

impl TableSchema {
    /// Returns the table name.
    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Returns the primary key columns, in declaration order.
    #[inline]
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// Returns the columns, in declaration order.
    #[inline]
    pub fn columns(&self) -> &[(String, SchemaValue)] {
        &self.columns
    }

    /// Returns the relationships, in declaration order.
    #[inline]
    pub fn relationships(&self) -> &[(String, Relationship)] {
        &self.relationships
    }
}

/// Builder for [`TableSchema`].
///
/// The builder does not validate; [`super::normalize_table_schema`] does.
pub struct TableSchemaBuilder {
    schema: TableSchema,
}

impl TableSchemaBuilder {
    /// Starts a schema for the named table.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            schema: TableSchema {
                table_name: table_name.into(),
                primary_key: Vec::new(),
                columns: Vec::new(),
                relationships: Vec::new(),
            },
        }
    }

    /// Adds a required column.
    pub fn column(self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.column_with(name, SchemaValue::new(value_type))
    }

    /// Adds an optional column.
    pub fn optional_column(self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.column_with(name, SchemaValue::optional(value_type))
    }

    /// Adds a column with an explicit definition.
    pub fn column_with(mut self, name: impl Into<String>, value: SchemaValue) -> Self {
        self.schema.columns.push((name.into(), value));
        self
    }

    /// Sets the primary key.
    pub fn primary_key<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.schema.primary_key = columns.iter().map(|c| String::from(c.as_ref())).collect();
        self
    }

    /// Adds a relationship.
    pub fn relationship(mut self, name: impl Into<String>, relationship: Relationship) -> Self {
        self.schema.relationships.push((name.into(), relationship));
        self
    }

    /// Adds a field relationship.
    pub fn field_relationship<S: AsRef<str>, D: AsRef<str>>(
        self,
        name: impl Into<String>,
        source_field: &[S],
        dest_field: &[D],
        dest_schema: SchemaRef,
    ) -> Self {
        self.relationship(
            name,
            Relationship::Field(FieldRelationship::new(source_field, dest_field, dest_schema)),
        )
    }

    /// Finishes the schema.
    pub fn build(self) -> TableSchema {
        self.schema
    }

    /// Finishes the schema behind an `Rc`.
    pub fn build_rc(self) -> Rc<TableSchema> {
        Rc::new(self.schema)
    }
}
