//! Operator interfaces.
//!
//! Every pipeline stage is an [`Input`] to the stage below it and an
//! [`Output`] of the stage above it. Downstream stages own their inputs
//! through `Rc`; upstream stages refer to their output through a `Weak`, so
//! dropping the terminal view releases the whole graph.

use crate::change::Change;
use crate::schema::SourceSchema;
use crate::stream::{Node, Stream};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Weak;
use trellis_core::{Row, Value};

/// Column equality constraint of a fetch. Every entry must match.
pub type Constraint = BTreeMap<String, Value>;

/// Where a fetch starts relative to `Start::row`, in iteration direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Basis {
    /// Start one row before `row`.
    Before,
    /// Start at `row` (inclusive).
    At,
    /// Start just past `row` (exclusive).
    After,
}

/// Starting position of a fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Start {
    pub row: Row,
    pub basis: Basis,
}

/// Parameters of [`Input::fetch`] and [`Input::cleanup`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchRequest {
    pub constraint: Option<Constraint>,
    pub start: Option<Start>,
    pub reverse: bool,
}

impl FetchRequest {
    /// Fetch everything, in order.
    pub fn all() -> Self {
        Self::default()
    }

    /// Fetch only rows matching the constraint.
    pub fn constrained(constraint: Constraint) -> Self {
        Self {
            constraint: Some(constraint),
            ..Self::default()
        }
    }

    /// Sets the constraint.
    pub fn with_constraint(mut self, constraint: Option<Constraint>) -> Self {
        self.constraint = constraint;
        self
    }

    /// Sets the start position.
    pub fn starting(mut self, row: Row, basis: Basis) -> Self {
        self.start = Some(Start { row, basis });
        self
    }

    /// Iterates in reverse order.
    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }
}

/// Builds a constraint mapping `to[i]` to `row[from[i]]`.
pub fn correlate<S: AsRef<str>, T: AsRef<str>>(row: &Row, from: &[S], to: &[T]) -> Constraint {
    from.iter()
        .zip(to)
        .map(|(f, t)| (t.as_ref().to_string(), row.get(f.as_ref()).clone()))
        .collect()
}

/// Returns true if the row satisfies the constraint. Null never matches.
pub fn constraint_matches(constraint: &Constraint, row: &Row) -> bool {
    constraint.iter().all(|(column, value)| row.get(column).values_equal(value))
}

/// The upstream side of an operator.
pub trait Input {
    /// Schema of the nodes this input produces.
    fn schema(&self) -> &SourceSchema;

    /// Returns the current nodes, in schema order (or reversed).
    fn fetch(&self, req: FetchRequest) -> Stream;

    /// Like `fetch`, but also releases any state kept for the returned nodes.
    fn cleanup(&self, req: FetchRequest) -> Stream;

    /// Registers the stage that receives pushed changes.
    fn set_output(&self, output: Weak<dyn Output>);

    /// Tears down this input and everything upstream of it.
    fn destroy(&self);
}

/// The downstream side of an operator.
pub trait Output {
    /// Receives a change. Must fully propagate it before returning.
    fn push(&self, change: Change);
}

/// An operator is both.
pub trait Operator: Input + Output {}

impl<T: Input + Output> Operator for T {}

/// Fetches the current node for `row` from `input` by primary key.
///
/// Used when an operator converts an edit into an add and needs the node's
/// relationships.
pub fn fetch_by_primary_key(input: &dyn Input, row: &Row) -> Option<Node> {
    let primary_key = &input.schema().primary_key;
    let constraint = correlate(row, primary_key, primary_key);
    input.fetch(FetchRequest::constrained(constraint)).next()
}

/// Like [`fetch_by_primary_key`], falling back to a bare node.
pub(crate) fn refetch_node(input: &dyn Input, row: Row) -> Node {
    match fetch_by_primary_key(input, &row) {
        Some(node) => node,
        None => {
            tracing::debug!(table = %input.schema().table_name, %row, "row not visible upstream");
            Node::new(row)
        }
    }
}

/// Holds the registered output of an operator.
#[derive(Default)]
pub struct OutputSlot {
    output: RefCell<Option<Weak<dyn Output>>>,
}

impl OutputSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the output.
    pub fn set(&self, output: Weak<dyn Output>) {
        *self.output.borrow_mut() = Some(output);
    }

    /// Returns true if an output was registered.
    pub fn is_set(&self) -> bool {
        self.output.borrow().is_some()
    }

    /// Pushes a change to the registered output.
    ///
    /// Panics if no output was ever set. Changes for an output that has been
    /// dropped are discarded.
    pub fn push(&self, change: Change) {
        let target = match &*self.output.borrow() {
            Some(weak) => weak.upgrade(),
            None => panic!("Output not set"),
        };
        match target {
            Some(output) => output.push(change),
            None => tracing::debug!(kind = change.kind(), "output dropped, discarding change"),
        }
    }
}
