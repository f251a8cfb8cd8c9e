//! In-memory source.
//!
//! Rows are kept in a primary index ordered by primary key. Other orderings
//! are materialized lazily, the first time a connection fetches with them,
//! and dropped once no connection uses them anymore. Indexes are persistent
//! maps, so a fetch takes an O(1) snapshot and streams from it lazily.

use crate::change::SourceChange;
use crate::condition::{Condition, RowPredicate};
use crate::operator::{constraint_matches, Basis, Constraint, FetchRequest, Input, Output, Start};
use crate::operators::filter::filter_change;
use crate::schema::SourceSchema;
use crate::source::Source;
use crate::stream::{Node, Stream};
use im::OrdMap;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound as RangeBound;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};
use trellis_core::ordering::{ascending, assert_ordering_includes_pk, Bound};
use trellis_core::schema::{NormalizedSchema, SchemaValue};
use trellis_core::{Error, IndexKey, OrderPart, Result, Row, SortOrder};

type IndexData = OrdMap<IndexKey, Row>;

struct SecondaryIndex {
    data: IndexData,
    used_by: BTreeSet<u64>,
}

struct Connection {
    id: u64,
    sort: SortOrder,
    output: Option<Weak<dyn Output>>,
    filter: Option<RowPredicate>,
}

/// The change currently being delivered. Connections up to and including
/// `output_index` already observe it.
struct Overlay {
    output_index: usize,
    change: SourceChange,
}

struct SourceCore {
    table_name: String,
    columns: BTreeMap<String, SchemaValue>,
    primary_key: Vec<String>,
    primary_sort: SortOrder,
    primary: RefCell<IndexData>,
    indexes: RefCell<BTreeMap<SortOrder, SecondaryIndex>>,
    connections: RefCell<Vec<Connection>>,
    overlay: RefCell<Option<Overlay>>,
    next_id: Cell<u64>,
}

/// A [`Source`] holding all rows in memory.
#[derive(Clone)]
pub struct MemorySource {
    core: Rc<SourceCore>,
}

impl MemorySource {
    /// Creates an empty source.
    pub fn new(
        table_name: impl Into<String>,
        columns: BTreeMap<String, SchemaValue>,
        primary_key: Vec<String>,
    ) -> Self {
        let primary_sort = ascending(&primary_key);
        Self {
            core: Rc::new(SourceCore {
                table_name: table_name.into(),
                columns,
                primary_key,
                primary_sort,
                primary: RefCell::new(OrdMap::new()),
                indexes: RefCell::new(BTreeMap::new()),
                connections: RefCell::new(Vec::new()),
                overlay: RefCell::new(None),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Creates an empty source for a normalized table.
    pub fn from_schema(schema: &NormalizedSchema) -> Self {
        Self::new(
            schema.table_name(),
            schema.columns().clone(),
            schema.primary_key().to_vec(),
        )
    }

    /// Returns all rows in primary key order.
    pub fn rows(&self) -> Vec<Row> {
        self.core
            .primary
            .borrow()
            .iter()
            .map(|(_, row)| row.clone())
            .collect()
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.core.primary.borrow().len()
    }

    /// Returns true if the source holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the orderings of all live indexes, primary first.
    pub fn index_keys(&self) -> Vec<SortOrder> {
        let mut keys = vec![self.core.primary_sort.clone()];
        keys.extend(self.core.indexes.borrow().keys().cloned());
        keys
    }

    /// Returns the number of open connections.
    pub fn connection_count(&self) -> usize {
        self.core.connections.borrow().len()
    }
}

impl Source for MemorySource {
    fn table_name(&self) -> &str {
        &self.core.table_name
    }

    fn primary_key(&self) -> &[String] {
        &self.core.primary_key
    }

    fn connect(&self, sort: SortOrder, filter: Option<Condition>) -> Result<Rc<dyn Input>> {
        let input: Rc<dyn Input> = self.core.connect(sort, filter)?;
        Ok(input)
    }

    fn push(&self, change: SourceChange) -> Result<()> {
        self.core.push(change)
    }
}

impl SourceCore {
    fn connect(self: &Rc<Self>, sort: SortOrder, filter: Option<Condition>) -> Result<Rc<SourceInput>> {
        let sort = if sort.is_empty() {
            self.primary_sort.clone()
        } else {
            assert_ordering_includes_pk(&sort, &self.primary_key)?;
            sort
        };
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        debug!(table = %self.table_name, id, ?sort, "connect");
        self.connections.borrow_mut().push(Connection {
            id,
            sort: sort.clone(),
            output: None,
            filter: filter.map(Condition::predicate),
        });

        let schema = SourceSchema::new(
            self.table_name.clone(),
            self.columns.clone(),
            self.primary_key.clone(),
            sort,
        );
        Ok(Rc::new(SourceInput {
            core: self.clone(),
            id,
            schema,
        }))
    }

    fn disconnect(&self, id: u64) {
        {
            let mut connections = self.connections.borrow_mut();
            match connections.iter().position(|c| c.id == id) {
                Some(pos) => connections.remove(pos),
                None => return,
            };
        }
        debug!(table = %self.table_name, id, "disconnect");
        self.indexes.borrow_mut().retain(|sort, index| {
            index.used_by.remove(&id);
            if index.used_by.is_empty() {
                debug!(table = %self.table_name, ?sort, "drop index");
                false
            } else {
                true
            }
        });
    }

    fn set_output(&self, id: u64, output: Weak<dyn Output>) {
        let mut connections = self.connections.borrow_mut();
        match connections.iter_mut().find(|c| c.id == id) {
            Some(connection) => connection.output = Some(output),
            None => panic!("Connection not found"),
        }
    }

    /// Index ordering for a fetch: constraint columns first, then the
    /// connection's order unless the constraint already pins one row.
    fn index_sort(&self, sort: &SortOrder, constraint: Option<&Constraint>) -> SortOrder {
        let Some(constraint) = constraint else {
            return sort.clone();
        };
        let mut index_sort: SortOrder = constraint.keys().map(OrderPart::asc).collect();
        let pins_row = self.primary_key.iter().all(|k| constraint.contains_key(k));
        if !pins_row {
            index_sort.extend(sort.iter().cloned());
        }
        index_sort
    }

    fn index_data(&self, sort: &SortOrder, used_by: u64) -> IndexData {
        if *sort == self.primary_sort {
            return self.primary.borrow().clone();
        }
        let mut indexes = self.indexes.borrow_mut();
        if let Some(index) = indexes.get_mut(sort) {
            index.used_by.insert(used_by);
            return index.data.clone();
        }
        let data: IndexData = self
            .primary
            .borrow()
            .iter()
            .map(|(_, row)| (IndexKey::from_row(sort, row), row.clone()))
            .collect();
        debug!(table = %self.table_name, ?sort, rows = data.len(), "create index");
        let mut used = BTreeSet::new();
        used.insert(used_by);
        indexes.insert(
            sort.clone(),
            SecondaryIndex {
                data: data.clone(),
                used_by: used,
            },
        );
        data
    }

    fn fetch(&self, id: u64, req: FetchRequest) -> Stream {
        let (position, sort, filter) = {
            let connections = self.connections.borrow();
            let position = match connections.iter().position(|c| c.id == id) {
                Some(pos) => pos,
                None => panic!("Connection not found"),
            };
            let connection = &connections[position];
            (position, connection.sort.clone(), connection.filter.clone())
        };

        if let (Some(constraint), Some(start)) = (&req.constraint, &req.start) {
            debug_assert!(
                constraint_matches(constraint, &start.row),
                "Start row must match constraint"
            );
        }

        let index_sort = self.index_sort(&sort, req.constraint.as_ref());
        let mut data = self.index_data(&index_sort, id);
        if let Some(overlay) = &*self.overlay.borrow() {
            if position <= overlay.output_index {
                apply_change(&mut data, &index_sort, &overlay.change);
            }
        }
        trace!(table = %self.table_name, id, ?req, "fetch");
        Box::new(IndexScan::new(data, &index_sort, req, filter))
    }

    fn primary_row(&self, row: &Row) -> Option<Row> {
        self.primary
            .borrow()
            .get(&IndexKey::from_row(&self.primary_sort, row))
            .cloned()
    }

    /// Checks the change against the primary index and replaces removed rows
    /// with the stored version.
    fn validate(&self, change: SourceChange) -> Result<SourceChange> {
        let missing = |row: &Row| Error::row_not_found(self.table_name.clone(), row.to_string());
        match change {
            SourceChange::Add(row) => match self.primary_row(&row) {
                Some(_) => Err(Error::row_already_exists(self.table_name.clone(), row.to_string())),
                None => Ok(SourceChange::Add(row)),
            },
            SourceChange::Remove(row) => match self.primary_row(&row) {
                Some(stored) => Ok(SourceChange::Remove(stored)),
                None => Err(missing(&row)),
            },
            SourceChange::Edit { old_row, row } => {
                let stored = self.primary_row(&old_row).ok_or_else(|| missing(&old_row))?;
                if !old_row.key_equals(&row, &self.primary_key) && self.primary_row(&row).is_some() {
                    return Err(Error::row_already_exists(self.table_name.clone(), row.to_string()));
                }
                Ok(SourceChange::Edit { old_row: stored, row })
            }
        }
    }

    fn push(&self, change: SourceChange) -> Result<()> {
        let change = self.validate(change)?;
        trace!(table = %self.table_name, ?change, "push");

        let targets: Vec<(usize, Weak<dyn Output>, Option<RowPredicate>)> = self
            .connections
            .borrow()
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.output.clone().map(|o| (i, o, c.filter.clone())))
            .collect();

        for (output_index, output, filter) in targets {
            *self.overlay.borrow_mut() = Some(Overlay {
                output_index,
                change: change.clone(),
            });
            let Some(output) = output.upgrade() else {
                continue;
            };
            let pipeline_change = change.clone().into_change();
            let filtered = match &filter {
                Some(predicate) => filter_change(pipeline_change, &**predicate, |row| Node::new(row)),
                None => Some(pipeline_change),
            };
            if let Some(c) = filtered {
                output.push(c);
            }
        }
        *self.overlay.borrow_mut() = None;

        apply_change(&mut self.primary.borrow_mut(), &self.primary_sort, &change);
        for (sort, index) in self.indexes.borrow_mut().iter_mut() {
            apply_change(&mut index.data, sort, &change);
        }
        Ok(())
    }
}

fn apply_change(data: &mut IndexData, order: &[OrderPart], change: &SourceChange) {
    match change {
        SourceChange::Add(row) => {
            data.insert(IndexKey::from_row(order, row), row.clone());
        }
        SourceChange::Remove(row) => {
            data.remove(&IndexKey::from_row(order, row));
        }
        SourceChange::Edit { old_row, row } => {
            data.remove(&IndexKey::from_row(order, old_row));
            data.insert(IndexKey::from_row(order, row), row.clone());
        }
    }
}

/// An [`Input`] over one connection of a [`MemorySource`].
pub struct SourceInput {
    core: Rc<SourceCore>,
    id: u64,
    schema: SourceSchema,
}

impl Input for SourceInput {
    fn schema(&self) -> &SourceSchema {
        &self.schema
    }

    fn fetch(&self, req: FetchRequest) -> Stream {
        self.core.fetch(self.id, req)
    }

    fn cleanup(&self, req: FetchRequest) -> Stream {
        self.core.fetch(self.id, req)
    }

    fn set_output(&self, output: Weak<dyn Output>) {
        self.core.set_output(self.id, output);
    }

    fn destroy(&self) {
        self.core.disconnect(self.id);
    }
}

impl Drop for SourceInput {
    fn drop(&mut self) {
        self.core.disconnect(self.id);
    }
}

/// Lazy scan over a snapshot of an index.
///
/// Each step is a range query from the cursor, so the scan never holds a
/// borrow of the map between calls.
struct IndexScan {
    data: IndexData,
    cursor: RangeBound<IndexKey>,
    reverse: bool,
    constraint: Option<Constraint>,
    filter: Option<RowPredicate>,
    done: bool,
}

impl IndexScan {
    fn new(data: IndexData, order: &[OrderPart], req: FetchRequest, filter: Option<RowPredicate>) -> Self {
        let mut scan = Self {
            data,
            cursor: RangeBound::Unbounded,
            reverse: req.reverse,
            constraint: req.constraint,
            filter,
            done: false,
        };
        scan.cursor = scan.initial_cursor(order, req.start);
        scan
    }

    fn passes(&self, row: &Row) -> bool {
        self.filter.as_ref().map_or(true, |f| f(row))
    }

    fn in_constraint(&self, row: &Row) -> bool {
        self.constraint.as_ref().map_or(true, |c| constraint_matches(c, row))
    }

    fn constraint_start(&self, order: &[OrderPart]) -> RangeBound<IndexKey> {
        match &self.constraint {
            Some(constraint) => {
                let fill = if self.reverse { Bound::High } else { Bound::Low };
                let key = IndexKey::with_prefix(order, &|column| constraint.get(column).cloned(), fill);
                RangeBound::Included(key)
            }
            None => RangeBound::Unbounded,
        }
    }

    fn initial_cursor(&self, order: &[OrderPart], start: Option<Start>) -> RangeBound<IndexKey> {
        let Some(start) = start else {
            return self.constraint_start(order);
        };
        let key = IndexKey::from_row(order, &start.row);
        match start.basis {
            Basis::At => RangeBound::Included(key),
            Basis::After => RangeBound::Excluded(key),
            Basis::Before => {
                // Walk backwards to the closest visible row before `start`.
                let mut cursor = RangeBound::Excluded(key);
                while let Some((key, row)) = step(&self.data, cursor, !self.reverse) {
                    if !self.in_constraint(&row) {
                        break;
                    }
                    if self.passes(&row) {
                        return RangeBound::Included(key);
                    }
                    cursor = RangeBound::Excluded(key);
                }
                self.constraint_start(order)
            }
        }
    }
}

fn step(data: &IndexData, from: RangeBound<IndexKey>, reverse: bool) -> Option<(IndexKey, Row)> {
    let entry = if reverse {
        data.range((RangeBound::Unbounded, from)).next_back()
    } else {
        data.range((from, RangeBound::Unbounded)).next()
    };
    entry.map(|(key, row)| (key.clone(), row.clone()))
}

impl Iterator for IndexScan {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        while !self.done {
            let Some((key, row)) = step(&self.data, self.cursor.clone(), self.reverse) else {
                self.done = true;
                break;
            };
            self.cursor = RangeBound::Excluded(key);
            if !self.in_constraint(&row) {
                self.done = true;
                break;
            }
            if self.passes(&row) {
                return Some(Node::new(row));
            }
        }
        None
    }
}
