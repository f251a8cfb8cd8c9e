//! Hierarchical join.
//!
//! Unlike a SQL join the output is not flat: every parent node gets one more
//! relationship whose stream yields the matching child nodes. Changes on the
//! child side are delivered as `child` changes of every matching parent.

use crate::change::Change;
use crate::operator::{correlate, refetch_node, FetchRequest, Input, Output, OutputSlot};
use crate::schema::SourceSchema;
use crate::stream::{Node, Stream};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::trace;
use trellis_core::{Error, Result, Row, Value};
use trellis_storage::{key, Storage};

const PARENT_KEY_SET: &str = "pKeySet";

/// Construction parameters of a [`Join`].
pub struct JoinArgs {
    pub parent: Rc<dyn Input>,
    pub child: Rc<dyn Input>,
    pub storage: Box<dyn Storage>,
    /// Parent columns of the correlation. Matched positionally with `child_key`.
    pub parent_key: Vec<String>,
    pub child_key: Vec<String>,
    pub relationship_name: String,
    /// Marks the output as a junction hop that views skip over.
    pub hidden: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Fetch,
    Cleanup,
}

struct JoinCore {
    parent: Rc<dyn Input>,
    child: Rc<dyn Input>,
    storage: RefCell<Box<dyn Storage>>,
    parent_key: Vec<String>,
    child_key: Vec<String>,
    relationship_name: String,
    schema: SourceSchema,
    output: OutputSlot,
}

/// Joins child nodes into their parents as a named relationship.
pub struct Join {
    core: Rc<JoinCore>,
    // Both inputs only hold weak references to these.
    _parent_sink: Rc<ParentSink>,
    _child_sink: Rc<ChildSink>,
}

struct ParentSink(Rc<JoinCore>);

struct ChildSink(Rc<JoinCore>);

impl Join {
    /// Creates the join and registers it as the output of both inputs.
    pub fn new(args: JoinArgs) -> Result<Rc<Self>> {
        if Rc::ptr_eq(&args.parent, &args.child) {
            return Err(Error::invalid_schema("Parent and child must be different operators"));
        }
        if args.parent_key.len() != args.child_key.len() {
            return Err(Error::invalid_schema(
                "The parentKey and childKey keys must have same length",
            ));
        }

        let mut schema = args.parent.schema().clone();
        schema.is_hidden = args.hidden;
        schema
            .relationships
            .insert(args.relationship_name.clone(), args.child.schema().clone());

        let core = Rc::new(JoinCore {
            parent: args.parent,
            child: args.child,
            storage: RefCell::new(args.storage),
            parent_key: args.parent_key,
            child_key: args.child_key,
            relationship_name: args.relationship_name,
            schema,
            output: OutputSlot::new(),
        });
        let parent_sink = Rc::new(ParentSink(core.clone()));
        let child_sink = Rc::new(ChildSink(core.clone()));
        let weak: Weak<dyn Output> = Rc::downgrade(&parent_sink) as Weak<dyn Output>;
        core.parent.set_output(weak);
        let weak: Weak<dyn Output> = Rc::downgrade(&child_sink) as Weak<dyn Output>;
        core.child.set_output(weak);

        Ok(Rc::new(Self {
            core,
            _parent_sink: parent_sink,
            _child_sink: child_sink,
        }))
    }
}

impl JoinCore {
    fn storage_key(&self, row: &Row) -> String {
        let mut values: Vec<Value> = row.project(&self.parent_key);
        values.extend(row.project(&self.parent.schema().primary_key));
        key::encode(PARENT_KEY_SET, &values)
    }

    /// Attaches the child stream to a parent node.
    ///
    /// In cleanup mode the child side is only cleaned up when no other parent
    /// with the same join key is still live.
    fn process_parent(&self, node: Node, mode: Mode) -> Node {
        let storage_key = self.storage_key(&node.row);
        let method = match mode {
            Mode::Fetch => Mode::Fetch,
            Mode::Cleanup => {
                let prefix = key::encode(PARENT_KEY_SET, &node.row.project(&self.parent_key));
                let shared = self.storage.borrow().scan(&prefix).nth(1).is_some();
                if shared {
                    Mode::Fetch
                } else {
                    Mode::Cleanup
                }
            }
        };

        let req = FetchRequest::constrained(correlate(&node.row, &self.parent_key, &self.child_key));
        let children = match method {
            Mode::Fetch => self.child.fetch(req),
            Mode::Cleanup => self.child.cleanup(req),
        };

        match mode {
            Mode::Fetch => self.storage.borrow_mut().set(&storage_key, Value::from(true)),
            Mode::Cleanup => self.storage.borrow_mut().del(&storage_key),
        }

        node.with_relationship(self.relationship_name.clone(), children)
    }

    fn push_parent(&self, change: Change) {
        trace!(table = %self.schema.table_name, kind = change.kind(), "join parent push");
        match change {
            Change::Add { node } => {
                let node = self.process_parent(node, Mode::Fetch);
                self.output.push(Change::add(node));
            }
            Change::Remove { node } => {
                let node = self.process_parent(node, Mode::Cleanup);
                self.output.push(Change::remove(node));
            }
            Change::Child { .. } => self.output.push(change),
            Change::Edit { old_row, row } => {
                if old_row.key_equals(&row, &self.parent_key) {
                    let old_key = self.storage_key(&old_row);
                    let new_key = self.storage_key(&row);
                    if old_key != new_key {
                        let mut storage = self.storage.borrow_mut();
                        storage.del(&old_key);
                        storage.set(&new_key, Value::from(true));
                    }
                    self.output.push(Change::edit(old_row, row));
                } else {
                    self.push_parent(Change::remove(Node::new(old_row)));
                    let node = refetch_node(&*self.parent, row);
                    self.push_parent(Change::add(node));
                }
            }
        }
    }

    fn push_child(&self, change: Change) {
        trace!(table = %self.schema.table_name, kind = change.kind(), "join child push");
        match change {
            Change::Add { .. } | Change::Remove { .. } | Change::Child { .. } => {
                let row = change.row().clone();
                self.push_child_change(&row, change);
            }
            Change::Edit { old_row, row } => {
                if old_row.key_equals(&row, &self.child_key) {
                    let child_row = row.clone();
                    self.push_child_change(&child_row, Change::edit(old_row, row));
                } else {
                    let old_child_row = old_row.clone();
                    self.push_child_change(&old_child_row, Change::remove(Node::new(old_row)));
                    let node = refetch_node(&*self.child, row.clone());
                    self.push_child_change(&row, Change::add(node));
                }
            }
        }
    }

    /// Wraps `change` in a `child` change for every parent of `child_row`.
    fn push_child_change(&self, child_row: &Row, change: Change) {
        let req = FetchRequest::constrained(correlate(child_row, &self.child_key, &self.parent_key));
        let parents: Vec<Row> = self.parent.fetch(req).map(|node| node.row).collect();

        let mut remaining = Some(change);
        let last = parents.len().saturating_sub(1);
        for (i, parent) in parents.into_iter().enumerate() {
            let Some(change) = remaining.take() else {
                break;
            };
            let change = if i == last {
                change
            } else {
                let (this, rest) = change.fork();
                remaining = Some(rest);
                this
            };
            self.output
                .push(Change::child(parent, self.relationship_name.clone(), change));
        }
    }
}

impl Input for Join {
    fn schema(&self) -> &SourceSchema {
        &self.core.schema
    }

    fn fetch(&self, req: FetchRequest) -> Stream {
        let core = self.core.clone();
        Box::new(
            self.core
                .parent
                .fetch(req)
                .map(move |node| core.process_parent(node, Mode::Fetch)),
        )
    }

    fn cleanup(&self, req: FetchRequest) -> Stream {
        let core = self.core.clone();
        Box::new(
            self.core
                .parent
                .cleanup(req)
                .map(move |node| core.process_parent(node, Mode::Cleanup)),
        )
    }

    fn set_output(&self, output: Weak<dyn Output>) {
        self.core.output.set(output);
    }

    fn destroy(&self) {
        self.core.parent.destroy();
        self.core.child.destroy();
    }
}

impl Output for ParentSink {
    fn push(&self, change: Change) {
        self.0.push_parent(change);
    }
}

impl Output for ChildSink {
    fn push(&self, change: Change) {
        self.0.push_child(change);
    }
}
