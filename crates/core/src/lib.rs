//! Trellis Core - Core types and schema definitions for the Trellis IVM engine.
//!
//! This crate provides the foundational types shared by every pipeline stage:
//!
//! - `Value`: A column value (null, boolean, number, string or JSON)
//! - `Row`: An ordered mapping from column name to value
//! - `ordering`: Sort orders, row comparators and index keys
//! - `schema`: Table schemas, relationships and normalization
//! - `Error`: Error types for schema and pipeline surface errors
//!
//! # Example
//!
//! ```rust
//! use trellis_core::{row, Value};
//! use trellis_core::ordering::{compare_rows, OrderPart};
//! use trellis_core::schema::{normalize_table_schema, TableSchemaBuilder, ValueType};
//!
//! let issue = TableSchemaBuilder::new("issue")
//!     .column("id", ValueType::String)
//!     .column("title", ValueType::String)
//!     .primary_key(&["id"])
//!     .build_rc();
//! let issue = normalize_table_schema(&issue).unwrap();
//! assert_eq!(issue.primary_key(), ["id".to_string()]);
//!
//! let a = row! { "id" => "1", "title" => "b" };
//! let b = row! { "id" => "2", "title" => "a" };
//! let order = vec![OrderPart::asc("title"), OrderPart::asc("id")];
//! assert!(compare_rows(&order, &b, &a).is_lt());
//! assert_eq!(a.get("title"), &Value::from("b"));
//! ```

#![no_std]

extern crate alloc;

mod error;
pub mod ordering;
mod row;
pub mod schema;
mod value;

pub use error::{Error, Result};
pub use ordering::{Comparator, Direction, IndexKey, OrderPart, SortOrder};
pub use row::Row;
pub use value::Value;
