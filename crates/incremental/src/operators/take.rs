//! Windowed limit.
//!
//! `Take` keeps the first `limit` rows of its input (per partition, when a
//! partition key is given) in a persistent sorted map. Only this operator may
//! drop adds that fall beyond the window and ignore removes outside of it.
//!
//! When a row inside a full window goes away, the window is refilled right
//! away by fetching the next row after the old maximum from the input, so the
//! window always equals the first `limit` rows of its partition.

use crate::change::Change;
use crate::operator::{correlate, refetch_node, Basis, Constraint, FetchRequest, Input, Output, OutputSlot, Start};
use crate::schema::SourceSchema;
use crate::stream::{empty, Node, Stream};
use hashbrown::HashMap;
use im::OrdMap;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};
use trellis_core::ordering::assert_ordering_includes_pk;
use trellis_core::{Comparator, IndexKey, Result, Row, SortOrder, Value};

#[derive(Clone, Default)]
struct Window {
    rows: OrdMap<IndexKey, Row>,
}

impl Window {
    fn bound(&self) -> Option<&Row> {
        self.rows.iter().next_back().map(|(_, row)| row)
    }

    fn max_excluding(&self, key: &IndexKey) -> Option<Row> {
        self.rows
            .iter()
            .rev()
            .find(|(k, _)| *k != key)
            .map(|(_, row)| row.clone())
    }
}

struct TakeState {
    limit: usize,
    partition_key: Option<Vec<String>>,
    sort: SortOrder,
    compare: Comparator,
    windows: RefCell<HashMap<Vec<Value>, Window>>,
    /// Largest bound of any window. Only ever grows.
    max_bound: RefCell<Option<Row>>,
}

impl TakeState {
    fn key(&self, row: &Row) -> IndexKey {
        IndexKey::from_row(&self.sort, row)
    }

    fn partition_of_row(&self, row: &Row) -> Vec<Value> {
        match &self.partition_key {
            Some(columns) => row.project(columns),
            None => Vec::new(),
        }
    }

    fn partition_of_constraint(&self, constraint: Option<&Constraint>) -> Vec<Value> {
        match (&self.partition_key, constraint) {
            (Some(columns), Some(c)) => columns
                .iter()
                .map(|k| c.get(k).cloned().unwrap_or(Value::Null))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn constraint_for(&self, row: &Row) -> Option<Constraint> {
        self.partition_key
            .as_ref()
            .map(|columns| correlate(row, columns, columns))
    }

    /// True if the constraint selects exactly one partition.
    fn selects_partition(&self, constraint: Option<&Constraint>) -> bool {
        match (&self.partition_key, constraint) {
            (None, _) => true,
            (Some(columns), Some(c)) => c.len() == columns.len() && columns.iter().all(|k| c.contains_key(k)),
            (Some(_), None) => false,
        }
    }

    fn in_window(&self, row: &Row) -> bool {
        self.windows
            .borrow()
            .get(&self.partition_of_row(row))
            .map_or(false, |w| w.rows.contains_key(&self.key(row)))
    }

    fn raise_max_bound(&self, row: &Row) {
        let mut max_bound = self.max_bound.borrow_mut();
        let raise = match &*max_bound {
            Some(max) => (self.compare)(row, max) == Ordering::Greater,
            None => true,
        };
        if raise {
            *max_bound = Some(row.clone());
        }
    }

    fn insert(&self, partition: &[Value], row: Row) {
        let key = self.key(&row);
        if let Some(window) = self.windows.borrow_mut().get_mut(partition) {
            window.rows.insert(key, row.clone());
        }
        self.raise_max_bound(&row);
    }

    fn remove(&self, partition: &[Value], row: &Row) {
        if let Some(window) = self.windows.borrow_mut().get_mut(partition) {
            window.rows.remove(&self.key(row));
        }
    }

    fn replace(&self, partition: &[Value], old_row: &Row, row: Row) {
        self.remove(partition, old_row);
        self.insert(partition, row);
    }
}

/// Limits its input to the first `limit` rows, optionally per partition.
pub struct Take {
    input: Rc<dyn Input>,
    state: Rc<TakeState>,
    output: OutputSlot,
}

impl Take {
    /// Creates the operator. The input's ordering must include its primary key.
    pub fn new(input: Rc<dyn Input>, limit: usize, partition_key: Option<Vec<String>>) -> Result<Rc<Self>> {
        let schema = input.schema();
        assert_ordering_includes_pk(&schema.sort, &schema.primary_key)?;
        let state = Rc::new(TakeState {
            limit,
            partition_key,
            sort: schema.sort.clone(),
            compare: schema.comparator(),
            windows: RefCell::new(HashMap::new()),
            max_bound: RefCell::new(None),
        });
        let take = Rc::new(Self {
            input,
            state,
            output: OutputSlot::new(),
        });
        let weak: Weak<dyn Output> = Rc::downgrade(&take) as Weak<dyn Output>;
        take.input.set_output(weak);
        Ok(take)
    }

    fn initial_fetch(&self, req: FetchRequest, partition: Vec<Value>) -> Stream {
        assert!(
            req.start.is_none() && !req.reverse,
            "Take must be hydrated with a plain forward fetch"
        );
        let nodes: Vec<Node> = self.input.fetch(req).take(self.state.limit).collect();
        let mut window = Window::default();
        for node in &nodes {
            window.rows.insert(self.state.key(&node.row), node.row.clone());
        }
        if let Some(bound) = window.bound() {
            self.state.raise_max_bound(bound);
        }
        debug!(table = %self.schema().table_name, ?partition, size = nodes.len(), "take hydrated");
        self.state.windows.borrow_mut().insert(partition, window);
        Box::new(nodes.into_iter())
    }

    fn push_add(&self, node: Node) {
        let state = &self.state;
        let partition = state.partition_of_row(&node.row);
        let evict = {
            let windows = state.windows.borrow();
            let Some(window) = windows.get(&partition) else {
                return;
            };
            // Hydrated during this push with the row already in it.
            if window.rows.contains_key(&state.key(&node.row)) {
                return;
            }
            if window.rows.len() < state.limit {
                None
            } else {
                match window.bound() {
                    Some(bound) if (state.compare)(&node.row, bound) == Ordering::Less => Some(bound.clone()),
                    _ => return,
                }
            }
        };
        match evict {
            None => {
                state.insert(&partition, node.row.clone());
                self.output.push(Change::add(node));
            }
            Some(bound) => {
                let bound_node = refetch_node(&*self.input, bound.clone());
                state.remove(&partition, &bound);
                state.insert(&partition, node.row.clone());
                self.output.push(Change::remove(bound_node));
                self.output.push(Change::add(node));
            }
        }
    }

    fn push_remove(&self, node: Node) {
        let state = &self.state;
        let partition = state.partition_of_row(&node.row);
        let bound = {
            let windows = state.windows.borrow();
            let Some(window) = windows.get(&partition) else {
                return;
            };
            if !window.rows.contains_key(&state.key(&node.row)) {
                return;
            }
            if window.rows.len() >= state.limit {
                window.bound().cloned()
            } else {
                None
            }
        };
        state.remove(&partition, &node.row);

        // A full window may have more rows waiting past its old bound.
        let refill = bound.and_then(|bound| {
            let req = FetchRequest {
                constraint: state.constraint_for(&node.row),
                start: Some(Start {
                    row: bound,
                    basis: Basis::After,
                }),
                reverse: false,
            };
            self.input.fetch(req).next()
        });
        if let Some(next) = &refill {
            state.insert(&partition, next.row.clone());
        }
        self.output.push(Change::remove(node));
        if let Some(next) = refill {
            self.output.push(Change::add(next));
        }
    }

    fn push_edit(&self, old_row: Row, row: Row) {
        let state = &self.state;
        let partition = state.partition_of_row(&row);
        if state.partition_of_row(&old_row) != partition {
            self.push_remove(Node::new(old_row));
            let node = refetch_node(&*self.input, row);
            self.push_add(node);
            return;
        }

        let old_key = state.key(&old_row);
        let (full, rest_max) = {
            let windows = state.windows.borrow();
            let Some(window) = windows.get(&partition) else {
                return;
            };
            if !window.rows.contains_key(&old_key) {
                drop(windows);
                // The old row was not visible, so this behaves like an add.
                let node = refetch_node(&*self.input, row);
                self.push_add(node);
                return;
            }
            (window.rows.len() >= state.limit, window.max_excluding(&old_key))
        };

        if !full {
            state.replace(&partition, &old_row, row.clone());
            self.output.push(Change::edit(old_row, row));
            return;
        }
        if let Some(max) = &rest_max {
            if (state.compare)(&row, max) == Ordering::Less {
                state.replace(&partition, &old_row, row.clone());
                self.output.push(Change::edit(old_row, row));
                return;
            }
        }

        // The edited row may have moved past other rows; the window keeps
        // whichever row now follows the rest of it.
        let req = FetchRequest {
            constraint: state.constraint_for(&row),
            start: rest_max.map(|max| Start {
                row: max,
                basis: Basis::After,
            }),
            reverse: false,
        };
        match self.input.fetch(req).next() {
            Some(candidate) if state.key(&candidate.row) != state.key(&row) => {
                state.replace(&partition, &old_row, candidate.row.clone());
                self.output.push(Change::remove(Node::new(old_row)));
                self.output.push(Change::add(candidate));
            }
            _ => {
                state.replace(&partition, &old_row, row.clone());
                self.output.push(Change::edit(old_row, row));
            }
        }
    }
}

fn bounded(stream: Stream, bound: Row, reverse: bool, compare: Comparator) -> Stream {
    if reverse {
        Box::new(stream.skip_while(move |node| compare(&node.row, &bound) == Ordering::Greater))
    } else {
        Box::new(stream.take_while(move |node| compare(&node.row, &bound) != Ordering::Greater))
    }
}

impl Input for Take {
    fn schema(&self) -> &SourceSchema {
        self.input.schema()
    }

    fn fetch(&self, req: FetchRequest) -> Stream {
        let state = &self.state;
        if state.limit == 0 {
            return empty();
        }
        if state.selects_partition(req.constraint.as_ref()) {
            let partition = state.partition_of_constraint(req.constraint.as_ref());
            let bound = state
                .windows
                .borrow()
                .get(&partition)
                .map(|w| w.bound().cloned());
            return match bound {
                None => self.initial_fetch(req, partition),
                Some(None) => empty(),
                // Inside a push the input already shows rows this window has
                // not taken yet, so membership is checked as well.
                Some(Some(bound)) => {
                    let reverse = req.reverse;
                    let members = state.clone();
                    Box::new(
                        bounded(self.input.fetch(req), bound, reverse, state.compare.clone())
                            .filter(move |node| members.in_window(&node.row)),
                    )
                }
            };
        }

        // Not constrained to one partition: bound by the largest window and
        // check membership row by row.
        let Some(max_bound) = state.max_bound.borrow().clone() else {
            return empty();
        };
        let reverse = req.reverse;
        let members = state.clone();
        Box::new(
            bounded(self.input.fetch(req), max_bound, reverse, state.compare.clone())
                .filter(move |node| members.in_window(&node.row)),
        )
    }

    fn cleanup(&self, req: FetchRequest) -> Stream {
        let partition = self.state.partition_of_constraint(req.constraint.as_ref());
        self.state.windows.borrow_mut().remove(&partition);
        Box::new(self.input.cleanup(req).take(self.state.limit))
    }

    fn set_output(&self, output: Weak<dyn Output>) {
        self.output.set(output);
    }

    fn destroy(&self) {
        self.input.destroy();
    }
}

impl Output for Take {
    fn push(&self, change: Change) {
        if self.state.limit == 0 {
            return;
        }
        trace!(table = %self.schema().table_name, kind = change.kind(), "take push");
        match change {
            Change::Add { node } => self.push_add(node),
            Change::Remove { node } => self.push_remove(node),
            Change::Edit { old_row, row } => self.push_edit(old_row, row),
            Change::Child { row, child } => {
                if self.state.in_window(&row) {
                    self.output.push(Change::Child { row, child });
                }
            }
        }
    }
}
