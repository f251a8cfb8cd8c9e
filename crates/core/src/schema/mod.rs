//! Schema module for Trellis.
//!
//! Table schemas are authored with [`TableSchemaBuilder`] and may reference
//! each other lazily, so self- and mutually-referencing tables can be
//! described. [`normalize_table_schema`] validates a schema and resolves its
//! relationship graph into an immutable [`NormalizedSchema`].

mod column;
mod normalize;
mod table;

pub use column::{SchemaValue, ValueType};
pub use normalize::{
    normalize_table_schema, normalize_tables, FieldHop, Normalize, NormalizedRelationship,
    NormalizedSchema,
};
pub use table::{FieldRelationship, Relationship, SchemaRef, TableSchema, TableSchemaBuilder};
