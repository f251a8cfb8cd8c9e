//! Trellis Incremental - push-based operator pipelines over relational sources.
//!
//! A pipeline is a chain of operators rooted at one or more sources. Data flows
//! two ways through it:
//!
//! - **fetch**: a consumer pulls a lazy [`Stream`] of [`Node`]s from its input,
//!   optionally constrained by column values and started at a row.
//! - **push**: a source applies a [`SourceChange`] and pushes the resulting
//!   [`Change`] down to every connected operator, which transforms it and
//!   pushes its own changes to its single output.
//!
//! # Operators
//!
//! - [`Filter`]: keeps rows matching a predicate
//! - [`Join`]: attaches child rows as a named relationship
//! - [`Exists`]: keeps rows whose relationship is non-empty (or empty)
//! - [`Skip`]: start-bound pagination over sorted input
//! - [`Take`]: bounded, optionally partitioned, windows over sorted input
//!
//! # Example
//!
//! ```ignore
//! use trellis_incremental::{FetchRequest, Input, MemorySource, Source, SourceChange};
//! use trellis_core::row;
//!
//! let source = MemorySource::new("issue", columns, vec!["id".into()]);
//! source.push(SourceChange::Add(row! { "id" => 1 }))?;
//!
//! let input = source.connect(vec![], None)?;
//! assert_eq!(input.fetch(FetchRequest::all()).count(), 1);
//! ```

pub mod builder;
pub mod change;
pub mod condition;
pub mod memory_source;
pub mod operator;
pub mod operators;
pub mod schema;
pub mod source;
pub mod stream;

#[cfg(test)]
mod testing;

pub use builder::{connect_table, exists_relationship, join_relationship, Catalog, SourceProvider};
pub use change::{Change, ChildChange, SourceChange};
pub use condition::{CompareOp, Condition, RowPredicate, SimpleCondition};
pub use memory_source::MemorySource;
pub use operator::{
    fetch_by_primary_key, Basis, Constraint, FetchRequest, Input, Operator, Output, OutputSlot,
    Start,
};
pub use operators::{Exists, Filter, Join, JoinArgs, Skip, SkipBound, Take};
pub use schema::SourceSchema;
pub use source::Source;
pub use stream::{expand, ExpandedNode, Node, Stream};
