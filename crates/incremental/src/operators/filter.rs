//! Stateless row filter.

use crate::change::Change;
use crate::condition::RowPredicate;
use crate::operator::{refetch_node, FetchRequest, Input, Output, OutputSlot};
use crate::schema::SourceSchema;
use crate::stream::{Node, Stream};
use std::rc::{Rc, Weak};
use trellis_core::Row;

/// Applies a row predicate to one change.
///
/// Edits are split by whether the old and new rows pass: both pass keeps the
/// edit, only the old row passing becomes a remove and only the new row
/// passing becomes an add. The added node is produced by `refetch` so that it
/// carries its relationships.
pub(crate) fn filter_change<F>(change: Change, predicate: &dyn Fn(&Row) -> bool, refetch: F) -> Option<Change>
where
    F: FnOnce(Row) -> Node,
{
    match change {
        Change::Add { .. } | Change::Remove { .. } | Change::Child { .. } => {
            predicate(change.row()).then_some(change)
        }
        Change::Edit { old_row, row } => match (predicate(&old_row), predicate(&row)) {
            (true, true) => Some(Change::edit(old_row, row)),
            (true, false) => Some(Change::remove(Node::new(old_row))),
            (false, true) => Some(Change::add(refetch(row))),
            (false, false) => None,
        },
    }
}

/// Passes through nodes whose row satisfies a predicate.
pub struct Filter {
    input: Rc<dyn Input>,
    predicate: RowPredicate,
    output: OutputSlot,
}

impl Filter {
    /// Creates the filter and registers it as the output of `input`.
    pub fn new(input: Rc<dyn Input>, predicate: RowPredicate) -> Rc<Self> {
        let filter = Rc::new(Self {
            input,
            predicate,
            output: OutputSlot::new(),
        });
        let weak: Weak<dyn Output> = Rc::downgrade(&filter) as Weak<dyn Output>;
        filter.input.set_output(weak);
        filter
    }

    fn filtered(&self, stream: Stream) -> Stream {
        let predicate = self.predicate.clone();
        Box::new(stream.filter(move |node| predicate(&node.row)))
    }
}

impl Input for Filter {
    fn schema(&self) -> &SourceSchema {
        self.input.schema()
    }

    fn fetch(&self, req: FetchRequest) -> Stream {
        self.filtered(self.input.fetch(req))
    }

    fn cleanup(&self, req: FetchRequest) -> Stream {
        self.filtered(self.input.cleanup(req))
    }

    fn set_output(&self, output: Weak<dyn Output>) {
        self.output.set(output);
    }

    fn destroy(&self) {
        self.input.destroy();
    }
}

impl Output for Filter {
    fn push(&self, change: Change) {
        tracing::trace!(table = %self.schema().table_name, kind = change.kind(), "filter push");
        let input = &*self.input;
        if let Some(change) = filter_change(change, &*self.predicate, |row| refetch_node(input, row)) {
            self.output.push(change);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::SourceChange;
    use crate::condition::{CompareOp, Condition};
    use crate::memory_source::MemorySource;
    use crate::source::Source;
    use crate::testing::Catch;
    use trellis_core::schema::{SchemaValue, ValueType};
    use trellis_core::{row, Value};

    fn setup() -> (MemorySource, Rc<Filter>, Rc<Catch>) {
        let columns = [("id", ValueType::Number), ("n", ValueType::Number)]
            .into_iter()
            .map(|(c, t)| (c.to_string(), SchemaValue::new(t)))
            .collect();
        let source = MemorySource::new("t", columns, vec!["id".into()]);
        for (id, n) in [(1, 5), (2, 15)] {
            source.push(SourceChange::Add(row! { "id" => id, "n" => n })).unwrap();
        }
        let input = source.connect(vec![], None).unwrap();
        let filter = Filter::new(input, Condition::cmp("n", CompareOp::Gt, 10).predicate());
        let catch = Catch::attach(&*filter);
        (source, filter, catch)
    }

    #[test]
    fn test_filter_fetch() {
        let (_source, filter, _catch) = setup();
        let ids: Vec<_> = filter.fetch(FetchRequest::all()).map(|n| n.row.get("id").clone()).collect();
        assert_eq!(ids, vec![Value::from(2)]);
    }

    #[test]
    fn test_filter_push_add_remove() {
        let (source, _filter, catch) = setup();
        source.push(SourceChange::Add(row! { "id" => 3, "n" => 1 })).unwrap();
        source.push(SourceChange::Add(row! { "id" => 4, "n" => 11 })).unwrap();
        source.push(SourceChange::Remove(row! { "id" => 2 })).unwrap();
        assert_eq!(catch.log(), vec!["add {\"id\":4,\"n\":11}", "remove {\"id\":2,\"n\":15}"]);
    }

    #[test]
    fn test_filter_push_edit_matrix() {
        let (source, _filter, catch) = setup();
        let edit = |old: Row, new: Row| SourceChange::Edit { old_row: old, row: new };
        // fails -> passes
        source.push(edit(row! { "id" => 1, "n" => 5 }, row! { "id" => 1, "n" => 20 })).unwrap();
        // passes -> passes
        source.push(edit(row! { "id" => 1, "n" => 20 }, row! { "id" => 1, "n" => 30 })).unwrap();
        // passes -> fails
        source.push(edit(row! { "id" => 1, "n" => 30 }, row! { "id" => 1, "n" => 0 })).unwrap();
        // fails -> fails
        source.push(edit(row! { "id" => 1, "n" => 0 }, row! { "id" => 1, "n" => 1 })).unwrap();
        assert_eq!(
            catch.log(),
            vec![
                "add {\"id\":1,\"n\":20}",
                "edit {\"id\":1,\"n\":20} -> {\"id\":1,\"n\":30}",
                "remove {\"id\":1,\"n\":30}",
            ]
        );
    }
}
