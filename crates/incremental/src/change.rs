//! Change type for Incremental View Maintenance.
//!
//! A `Change` describes how the output of an operator differs between two
//! logical instants. It is an exhaustive enum: every operator matches on all
//! four variants.

use crate::stream::Node;
use std::fmt;
use trellis_core::Row;

/// A delta exchanged between operators.
pub enum Change {
    /// A node entered the output.
    Add { node: Node },
    /// A node left the output.
    Remove { node: Node },
    /// A row changed in a way that keeps its presence in the output.
    Edit { old_row: Row, row: Row },
    /// A node stayed, but one of its relationships changed.
    Child { row: Row, child: ChildChange },
}

/// The nested part of a [`Change::Child`].
pub struct ChildChange {
    pub relationship_name: String,
    pub change: Box<Change>,
}

impl Change {
    /// Creates an add change.
    #[inline]
    pub fn add(node: Node) -> Self {
        Change::Add { node }
    }

    /// Creates a remove change.
    #[inline]
    pub fn remove(node: Node) -> Self {
        Change::Remove { node }
    }

    /// Creates an edit change.
    #[inline]
    pub fn edit(old_row: Row, row: Row) -> Self {
        Change::Edit { old_row, row }
    }

    /// Creates a child change.
    pub fn child(row: Row, relationship_name: impl Into<String>, change: Change) -> Self {
        Change::Child {
            row,
            child: ChildChange {
                relationship_name: relationship_name.into(),
                change: Box::new(change),
            },
        }
    }

    /// Returns the row this change is about. For edits this is the new row.
    pub fn row(&self) -> &Row {
        match self {
            Change::Add { node } | Change::Remove { node } => &node.row,
            Change::Edit { row, .. } => row,
            Change::Child { row, .. } => row,
        }
    }

    /// Returns a short name of the variant, used in traces.
    pub fn kind(&self) -> &'static str {
        match self {
            Change::Add { .. } => "add",
            Change::Remove { .. } => "remove",
            Change::Edit { .. } => "edit",
            Change::Child { .. } => "child",
        }
    }

    /// Splits the change into two independently consumable copies.
    ///
    /// Relationship streams are drained in the process; see [`Node::fork`].
    pub fn fork(self) -> (Change, Change) {
        match self {
            Change::Add { node } => {
                let (a, b) = node.fork();
                (Change::Add { node: a }, Change::Add { node: b })
            }
            Change::Remove { node } => {
                let (a, b) = node.fork();
                (Change::Remove { node: a }, Change::Remove { node: b })
            }
            Change::Edit { old_row, row } => (
                Change::Edit {
                    old_row: old_row.clone(),
                    row: row.clone(),
                },
                Change::Edit { old_row, row },
            ),
            Change::Child { row, child } => {
                let (a, b) = child.change.fork();
                (
                    Change::child(row.clone(), child.relationship_name.clone(), a),
                    Change::child(row, child.relationship_name, b),
                )
            }
        }
    }
}

impl fmt::Debug for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Add { node } => f.debug_struct("Add").field("node", node).finish(),
            Change::Remove { node } => f.debug_struct("Remove").field("node", node).finish(),
            Change::Edit { old_row, row } => f
                .debug_struct("Edit")
                .field("old_row", old_row)
                .field("row", row)
                .finish(),
            Change::Child { row, child } => f
                .debug_struct("Child")
                .field("row", row)
                .field("relationship_name", &child.relationship_name)
                .field("change", &child.change)
                .finish(),
        }
    }
}

/// A single-row change accepted by a source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceChange {
    Add(Row),
    Remove(Row),
    Edit { old_row: Row, row: Row },
}

impl SourceChange {
    /// Returns the row this change introduces, or removes for `Remove`.
    pub fn row(&self) -> &Row {
        match self {
            SourceChange::Add(row) | SourceChange::Remove(row) => row,
            SourceChange::Edit { row, .. } => row,
        }
    }

    /// Converts into the pipeline representation. Source rows carry no
    /// relationships.
    pub fn into_change(self) -> Change {
        match self {
            SourceChange::Add(row) => Change::add(Node::new(row)),
            SourceChange::Remove(row) => Change::remove(Node::new(row)),
            SourceChange::Edit { old_row, row } => Change::edit(old_row, row),
        }
    }
}
