//! Applies pipeline changes to a materialized view tree.
//!
//! List levels are kept sorted by the level's row comparator, so every entry
//! is located by binary search. Hidden levels (junction rows) never appear in
//! the tree: their children are applied to the slot the hidden level would
//! have occupied.
//!
//! A change that does not fit the current tree (removing a missing entry,
//! adding a duplicate, a relationship the format does not name) means the
//! upstream change stream is broken, and panics.

use std::cmp::Ordering;
use tracing::trace;
use trellis_core::Row;
use trellis_incremental::{Change, ChildChange, Node, SourceSchema};

use crate::entry::{Entry, ViewValue};
use crate::format::Format;

/// Applies `change` to `slot`, the view level produced under `schema` and
/// rendered with `format`.
pub fn apply_change(slot: &mut ViewValue, change: Change, schema: &SourceSchema, format: &Format) {
    if schema.is_hidden {
        apply_hidden(slot, change, schema, format);
        return;
    }
    trace!(table = %schema.table_name, kind = change.kind(), "apply change");
    match change {
        Change::Add { node } => add(slot, node, schema, format),
        Change::Remove { node } => remove(slot, &node.row, schema),
        Change::Edit { old_row, row } => edit(slot, old_row, row, schema),
        Change::Child { row, child } => {
            let ChildChange {
                relationship_name,
                change,
            } = child;
            let child_format = format_for(format, &relationship_name, schema);
            let entry = find_mut(slot, &row, schema);
            let child_slot = entry
                .relationships
                .entry(relationship_name.clone())
                .or_insert_with(|| ViewValue::empty(child_format.singular));
            apply_change(
                child_slot,
                *change,
                schema.relationship(&relationship_name),
                child_format,
            );
        }
    }
}

fn apply_hidden(slot: &mut ViewValue, change: Change, schema: &SourceSchema, format: &Format) {
    match change {
        Change::Add { node } => apply_hidden_children(slot, node, true, schema, format),
        Change::Remove { node } => apply_hidden_children(slot, node, false, schema, format),
        // An edit that changes relationships arrives as remove + add.
        Change::Edit { .. } => {}
        Change::Child { child, .. } => apply_change(
            slot,
            *child.change,
            schema.relationship(&child.relationship_name),
            format,
        ),
    }
}

fn apply_hidden_children(
    slot: &mut ViewValue,
    node: Node,
    is_add: bool,
    schema: &SourceSchema,
    format: &Format,
) {
    for (name, children) in node.relationships {
        let child_schema = schema.relationship(&name);
        for child in children {
            let change = if is_add {
                Change::add(child)
            } else {
                Change::remove(child)
            };
            apply_change(slot, change, child_schema, format);
        }
    }
}

fn format_for<'a>(format: &'a Format, name: &str, schema: &SourceSchema) -> &'a Format {
    format
        .relationship(name)
        .unwrap_or_else(|| panic!("relationship {} of {} missing from format", name, schema.table_name))
}

fn search(entries: &[Entry], row: &Row, schema: &SourceSchema) -> Result<usize, usize> {
    entries.binary_search_by(|entry| schema.compare_rows(&entry.row, row))
}

fn find_mut<'a>(slot: &'a mut ViewValue, row: &Row, schema: &SourceSchema) -> &'a mut Entry {
    match slot {
        ViewValue::Single(entry) => entry
            .as_deref_mut()
            .unwrap_or_else(|| panic!("node does not exist: {}", row)),
        ViewValue::List(entries) => match search(entries, row, schema) {
            Ok(pos) => &mut entries[pos],
            Err(_) => panic!("node does not exist: {}", row),
        },
    }
}

fn materialize(node: Node, schema: &SourceSchema, format: &Format) -> Entry {
    let mut entry = Entry::new(node.row);
    for (name, children) in node.relationships {
        let child_format = format_for(format, &name, schema);
        let child_schema = schema.relationship(&name);
        let mut child_slot = ViewValue::empty(child_format.singular);
        for child in children {
            apply_change(&mut child_slot, Change::add(child), child_schema, child_format);
        }
        entry.relationships.insert(name, child_slot);
    }
    entry
}

fn add(slot: &mut ViewValue, node: Node, schema: &SourceSchema, format: &Format) {
    let entry = materialize(node, schema, format);
    match slot {
        ViewValue::Single(existing) => {
            assert!(existing.is_none(), "single output already exists: {}", entry.row);
            *existing = Some(Box::new(entry));
        }
        ViewValue::List(entries) => match search(entries, &entry.row, schema) {
            Ok(_) => panic!("node already exists: {}", entry.row),
            Err(pos) => entries.insert(pos, entry),
        },
    }
}

fn remove(slot: &mut ViewValue, row: &Row, schema: &SourceSchema) {
    match slot {
        ViewValue::Single(existing) => {
            assert!(existing.is_some(), "node does not exist: {}", row);
            *existing = None;
        }
        ViewValue::List(entries) => match search(entries, row, schema) {
            Ok(pos) => {
                entries.remove(pos);
            }
            Err(_) => panic!("node does not exist: {}", row),
        },
    }
}

fn check_columns(row: &Row, schema: &SourceSchema) {
    for name in schema.relationships.keys() {
        assert!(!row.contains(name), "Relationship already exists: {}", name);
    }
}

fn edit(slot: &mut ViewValue, old_row: Row, row: Row, schema: &SourceSchema) {
    check_columns(&row, schema);
    match slot {
        ViewValue::Single(existing) => {
            let entry = existing
                .as_deref_mut()
                .unwrap_or_else(|| panic!("node does not exist: {}", old_row));
            for (column, value) in row.iter() {
                entry.row.set(column, value.clone());
            }
        }
        ViewValue::List(entries) => {
            let pos = search(entries, &old_row, schema)
                .unwrap_or_else(|_| panic!("node does not exist: {}", old_row));
            if schema.compare_rows(&old_row, &row) == Ordering::Equal {
                entries[pos].row = row;
                return;
            }
            let Entry { relationships, .. } = entries.remove(pos);
            match search(entries, &row, schema) {
                Ok(_) => panic!("node already exists: {}", row),
                Err(pos) => entries.insert(pos, Entry { row, relationships }),
            }
        }
    }
}
