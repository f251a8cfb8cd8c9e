//! Trellis Reactive - materialized views over incremental pipelines.
//!
//! This crate turns the change stream at the end of a pipeline into a
//! concrete, ordered, nested result tree, and notifies listeners whenever the
//! tree changes.
//!
//! # Core Concepts
//!
//! - `Format`: whether each level of the result is a list or a single entry
//! - `Entry` / `ViewValue`: the materialized tree
//! - `apply_change`: applies one `Change` to a tree in place
//! - `ArrayView`: hydrates from a pipeline and applies its pushes
//! - `ViewRegistry`: shares identical views between subscribers
//!
//! # Example
//!
//! ```ignore
//! use trellis_reactive::{ArrayView, Format};
//!
//! let view = ArrayView::new(source.connect(vec![], None)?, Format::list())?;
//! view.add_listener(|value| println!("{}", value.to_json()));
//! view.hydrate()?;
//!
//! source.push(SourceChange::Add(row! { "id" => 1 }))?; // listener fires
//! ```

pub mod apply_change;
pub mod entry;
pub mod format;
pub mod registry;
pub mod subscription;
pub mod view;

pub use apply_change::apply_change;
pub use entry::{Entry, EntryList, ViewValue};
pub use format::Format;
pub use registry::ViewRegistry;
pub use subscription::{Listener, ListenerId, ListenerSet};
pub use view::ArrayView;
