//! `EXISTS` / `NOT EXISTS` over one relationship.
//!
//! The size of the tracked relationship is cached per parent row in operator
//! storage. The cache is filled by draining the relationship once, and from
//! then on child adds and removes adjust it in O(1). When a child change moves
//! the size between zero and one the parent row itself enters or leaves the
//! output, so the child change is replaced by an add or remove of the parent.

use crate::change::{Change, ChildChange};
use crate::operator::{fetch_by_primary_key, refetch_node, FetchRequest, Input, Output, OutputSlot};
use crate::schema::SourceSchema;
use crate::stream::{Node, Stream};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::trace;
use trellis_core::{Error, Result, Row, Value};
use trellis_storage::{key, Storage};

struct ExistsState {
    relationship_name: String,
    not: bool,
    primary_key: Vec<String>,
    storage: RefCell<Box<dyn Storage>>,
}

impl ExistsState {
    fn size_key(&self, row: &Row) -> String {
        key::encode("size", &row.project(&self.primary_key))
    }

    fn cached(&self, row: &Row) -> Option<usize> {
        self.storage
            .borrow()
            .get(&self.size_key(row))
            .and_then(|v| v.as_f64())
            .map(|n| n as usize)
    }

    fn set_size(&self, row: &Row, size: usize) {
        self.storage
            .borrow_mut()
            .set(&self.size_key(row), Value::from(size));
    }

    fn del_size(&self, row: &Row) {
        self.storage.borrow_mut().del(&self.size_key(row));
    }

    /// Returns the cached size, or counts the node's relationship and caches it.
    fn node_size(&self, node: &mut Node) -> usize {
        match self.cached(&node.row) {
            Some(size) => size,
            None => {
                let size = node.count_relationship(&self.relationship_name);
                self.set_size(&node.row, size);
                size
            }
        }
    }

    #[inline]
    fn passes(&self, size: usize) -> bool {
        (size > 0) != self.not
    }
}

/// Keeps rows whose relationship is non-empty (or empty, when negated).
pub struct Exists {
    input: Rc<dyn Input>,
    state: Rc<ExistsState>,
    output: OutputSlot,
}

impl Exists {
    /// Creates the operator over `relationship_name` of `input`'s nodes.
    pub fn new(
        input: Rc<dyn Input>,
        storage: Box<dyn Storage>,
        relationship_name: impl Into<String>,
        not: bool,
    ) -> Result<Rc<Self>> {
        let relationship_name = relationship_name.into();
        let schema = input.schema();
        if !schema.relationships.contains_key(&relationship_name) {
            return Err(Error::relationship_not_found(
                schema.table_name.clone(),
                relationship_name,
            ));
        }
        let state = Rc::new(ExistsState {
            relationship_name,
            not,
            primary_key: schema.primary_key.clone(),
            storage: RefCell::new(storage),
        });
        let exists = Rc::new(Self {
            input,
            state,
            output: OutputSlot::new(),
        });
        let weak: Weak<dyn Output> = Rc::downgrade(&exists) as Weak<dyn Output>;
        exists.input.set_output(weak);
        Ok(exists)
    }

    /// Current size of the tracked relationship for `row`, counted through
    /// the input when it is not cached.
    fn row_size(&self, row: &Row) -> usize {
        if let Some(size) = self.state.cached(row) {
            return size;
        }
        match fetch_by_primary_key(&*self.input, row) {
            Some(mut node) => self.state.node_size(&mut node),
            None => 0,
        }
    }

    fn push_child(&self, row: Row, child: ChildChange) {
        if child.relationship_name != self.state.relationship_name {
            if self.state.passes(self.row_size(&row)) {
                self.output.push(Change::Child { row, child });
            }
            return;
        }

        let cached = self.state.cached(&row);
        let (old_size, new_size) = match &*child.change {
            Change::Add { .. } => match cached {
                Some(size) => (size, size + 1),
                // An uncached count already includes the added child.
                None => {
                    let size = self.row_size(&row);
                    (size.saturating_sub(1), size)
                }
            },
            Change::Remove { .. } => match cached {
                Some(size) => {
                    assert!(size > 0, "Size should be greater than 0 for {}", row);
                    (size, size - 1)
                }
                None => {
                    let size = self.row_size(&row);
                    (size + 1, size)
                }
            },
            Change::Edit { .. } | Change::Child { .. } => {
                let size = self.row_size(&row);
                (size, size)
            }
        };
        self.state.set_size(&row, new_size);
        trace!(%row, old_size, new_size, not = self.state.not, "exists child");

        match (old_size, new_size) {
            (0, 1) | (1, 0) => {
                let appeared = new_size == 1;
                let node = refetch_node(&*self.input, row);
                if appeared != self.state.not {
                    self.output.push(Change::add(node));
                } else {
                    self.output.push(Change::remove(node));
                }
            }
            _ => {
                if self.state.passes(new_size) {
                    self.output.push(Change::Child { row, child });
                }
            }
        }
    }
}

impl Input for Exists {
    fn schema(&self) -> &SourceSchema {
        self.input.schema()
    }

    fn fetch(&self, req: FetchRequest) -> Stream {
        let state = self.state.clone();
        Box::new(self.input.fetch(req).filter_map(move |mut node| {
            let size = state.node_size(&mut node);
            state.passes(size).then_some(node)
        }))
    }

    fn cleanup(&self, req: FetchRequest) -> Stream {
        let state = self.state.clone();
        Box::new(self.input.cleanup(req).filter_map(move |mut node| {
            let size = state.node_size(&mut node);
            state.del_size(&node.row);
            state.passes(size).then_some(node)
        }))
    }

    fn set_output(&self, output: Weak<dyn Output>) {
        self.output.set(output);
    }

    fn destroy(&self) {
        self.input.destroy();
    }
}

impl Output for Exists {
    fn push(&self, change: Change) {
        match change {
            Change::Add { mut node } => {
                let size = node.count_relationship(&self.state.relationship_name);
                self.state.set_size(&node.row, size);
                if self.state.passes(size) {
                    self.output.push(Change::add(node));
                }
            }
            Change::Remove { mut node } => {
                let size = match self.state.cached(&node.row) {
                    Some(size) => size,
                    None if node.relationships.contains_key(&self.state.relationship_name) => {
                        node.count_relationship(&self.state.relationship_name)
                    }
                    None => 0,
                };
                self.state.del_size(&node.row);
                if self.state.passes(size) {
                    self.output.push(Change::remove(node));
                }
            }
            Change::Edit { old_row, row } => {
                let size = match self.state.cached(&old_row) {
                    Some(size) => size,
                    None => self.row_size(&row),
                };
                if !old_row.key_equals(&row, &self.state.primary_key) {
                    self.state.del_size(&old_row);
                }
                self.state.set_size(&row, size);
                if self.state.passes(size) {
                    self.output.push(Change::edit(old_row, row));
                }
            }
            Change::Child { row, child } => self.push_child(row, child),
        }
    }
}
