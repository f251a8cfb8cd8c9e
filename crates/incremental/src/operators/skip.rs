//! Start-bound pagination.
//!
//! `Skip` hides every row that sorts before its bound (or at it, when the
//! bound is exclusive). Paired with `Take` it yields one page of a query.

use crate::change::Change;
use crate::operator::{refetch_node, Basis, FetchRequest, Input, Output, OutputSlot, Start};
use crate::operators::filter::filter_change;
use crate::schema::SourceSchema;
use crate::stream::{empty, Stream};
use std::cmp::Ordering;
use std::rc::{Rc, Weak};
use tracing::trace;
use trellis_core::{Comparator, Row};

/// Where a [`Skip`] starts letting rows through.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkipBound {
    pub row: Row,
    /// Also skip the row equal to `row`.
    pub exclusive: bool,
}

impl SkipBound {
    pub fn at(row: Row) -> Self {
        Self { row, exclusive: false }
    }

    pub fn after(row: Row) -> Self {
        Self { row, exclusive: true }
    }

    fn start(&self) -> Start {
        Start {
            row: self.row.clone(),
            basis: if self.exclusive { Basis::After } else { Basis::At },
        }
    }
}

#[derive(Clone)]
struct Visible {
    bound: SkipBound,
    compare: Comparator,
}

impl Visible {
    fn contains(&self, row: &Row) -> bool {
        match (self.compare)(&self.bound.row, row) {
            Ordering::Less => true,
            Ordering::Equal => !self.bound.exclusive,
            Ordering::Greater => false,
        }
    }
}

/// Drops rows ordered before a start bound.
pub struct Skip {
    input: Rc<dyn Input>,
    visible: Visible,
    output: OutputSlot,
}

impl Skip {
    pub fn new(input: Rc<dyn Input>, bound: SkipBound) -> Rc<Self> {
        let visible = Visible {
            bound,
            compare: input.schema().comparator(),
        };
        let skip = Rc::new(Self {
            input,
            visible,
            output: OutputSlot::new(),
        });
        let weak: Weak<dyn Output> = Rc::downgrade(&skip) as Weak<dyn Output>;
        skip.input.set_output(weak);
        skip
    }

    pub fn bound(&self) -> &SkipBound {
        &self.visible.bound
    }

    /// Start to request upstream, or `None` when nothing can be visible.
    fn start(&self, req: &FetchRequest) -> Option<Option<Start>> {
        let bound = &self.visible.bound;
        let Some(start) = &req.start else {
            return Some((!req.reverse).then(|| bound.start()));
        };
        let cmp = (self.visible.compare)(&bound.row, &start.row);
        if !req.reverse {
            return Some(match cmp {
                Ordering::Greater => Some(bound.start()),
                Ordering::Equal if bound.exclusive || start.basis == Basis::After => Some(Start {
                    row: bound.row.clone(),
                    basis: Basis::After,
                }),
                Ordering::Equal => Some(bound.start()),
                Ordering::Less => Some(start.clone()),
            });
        }
        match cmp {
            Ordering::Greater => None,
            Ordering::Equal if !bound.exclusive && start.basis == Basis::At => Some(Some(bound.start())),
            Ordering::Equal => None,
            Ordering::Less => Some(Some(start.clone())),
        }
    }

    fn bounded(&self, req: FetchRequest, fetch: impl FnOnce(FetchRequest) -> Stream) -> Stream {
        let Some(start) = self.start(&req) else {
            return empty();
        };
        let reverse = req.reverse;
        let stream = fetch(FetchRequest { start, ..req });
        let visible = self.visible.clone();
        if reverse {
            Box::new(stream.take_while(move |node| visible.contains(&node.row)))
        } else {
            // A `Before` start may step back across the bound.
            Box::new(stream.skip_while(move |node| !visible.contains(&node.row)))
        }
    }
}

impl Input for Skip {
    fn schema(&self) -> &SourceSchema {
        self.input.schema()
    }

    fn fetch(&self, req: FetchRequest) -> Stream {
        self.bounded(req, |req| self.input.fetch(req))
    }

    fn cleanup(&self, req: FetchRequest) -> Stream {
        self.bounded(req, |req| self.input.cleanup(req))
    }

    fn set_output(&self, output: Weak<dyn Output>) {
        self.output.set(output);
    }

    fn destroy(&self) {
        self.input.destroy();
    }
}

impl Output for Skip {
    fn push(&self, change: Change) {
        trace!(table = %self.schema().table_name, kind = change.kind(), "skip push");
        let input = &*self.input;
        let visible = |row: &Row| self.visible.contains(row);
        if let Some(change) = filter_change(change, &visible, |row| refetch_node(input, row)) {
            self.output.push(change);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::SourceChange;
    use crate::memory_source::MemorySource;
    use crate::source::Source;
    use crate::testing::Catch;
    use trellis_core::schema::{SchemaValue, ValueType};
    use trellis_core::{row, OrderPart};

    const USERS: [(i64, &str, &str); 7] = [
        (1, "Aaron", "2019-06-18"),
        (2, "Erik", "2020-08-01"),
        (3, "Greg", "2021-12-07"),
        (4, "Cesar", "2022-12-01"),
        (5, "Alex", "2023-04-01"),
        (6, "Darick", "2023-09-01"),
        (7, "Matt", "2024-06-01"),
    ];

    fn users(rows: &[(i64, &str, &str)]) -> MemorySource {
        let columns = [
            ("id", ValueType::Number),
            ("name", ValueType::String),
            ("startDate", ValueType::String),
        ]
        .into_iter()
        .map(|(c, t)| (c.to_string(), SchemaValue::new(t)))
        .collect();
        let s = MemorySource::new("users", columns, vec!["id".into()]);
        for (id, name, date) in rows {
            s.push(SourceChange::Add(row! { "id" => *id, "name" => *name, "startDate" => *date }))
                .unwrap();
        }
        s
    }

    fn skip(s: &MemorySource, bound: SkipBound) -> (Rc<Skip>, Rc<Catch>) {
        let input = s
            .connect(vec![OrderPart::asc("startDate"), OrderPart::asc("id")], None)
            .unwrap();
        let skip = Skip::new(input, bound);
        let catch = Catch::attach(&*skip);
        (skip, catch)
    }

    fn key(date: &str, id: i64) -> Row {
        row! { "startDate" => date, "id" => id }
    }

    fn ids(stream: Stream) -> Vec<i64> {
        stream.filter_map(|n| n.row.get("id").as_i64()).collect()
    }

    fn fetch(bound: SkipBound, req: FetchRequest) -> Vec<i64> {
        let s = users(&USERS);
        let (skip, _catch) = skip(&s, bound);
        ids(skip.fetch(req))
    }

    #[test]
    fn test_skip_fetch_from_bound() {
        let all = FetchRequest::all;
        assert_eq!(fetch(SkipBound::at(key("2023-03-31", 5)), all()), vec![5, 6, 7]);
        assert_eq!(fetch(SkipBound::after(key("2023-03-31", 5)), all()), vec![5, 6, 7]);
        assert_eq!(fetch(SkipBound::at(key("2023-04-01", 5)), all()), vec![5, 6, 7]);
        assert_eq!(fetch(SkipBound::after(key("2023-04-01", 5)), all()), vec![6, 7]);
        assert_eq!(fetch(SkipBound::at(key("2023-04-02", 4)), all()), vec![6, 7]);
    }

    #[test]
    fn test_skip_fetch_with_start() {
        let bound = || SkipBound::at(key("2023-04-01", 5));
        let from = |date: &str, id: i64, basis: Basis| FetchRequest::all().starting(key(date, id), basis);

        // Starts before the bound are clamped to it.
        assert_eq!(fetch(bound(), from("2023-03-30", 5, Basis::Before)), vec![5, 6, 7]);
        assert_eq!(fetch(bound(), from("2023-03-30", 5, Basis::After)), vec![5, 6, 7]);
        assert_eq!(fetch(bound(), from("2023-04-01", 5, Basis::Before)), vec![5, 6, 7]);
        assert_eq!(fetch(bound(), from("2023-04-01", 5, Basis::At)), vec![5, 6, 7]);
        assert_eq!(fetch(bound(), from("2023-04-01", 5, Basis::After)), vec![6, 7]);
        assert_eq!(
            fetch(SkipBound::after(key("2023-04-01", 5)), from("2023-04-01", 5, Basis::At)),
            vec![6, 7]
        );
        // Starts past the bound are kept.
        assert_eq!(fetch(bound(), from("2023-04-02", 5, Basis::Before)), vec![5, 6, 7]);
        assert_eq!(fetch(bound(), from("2023-09-02", 6, Basis::Before)), vec![6, 7]);
        assert!(fetch(
            SkipBound::after(key("2023-04-02", 5)),
            from("2030-04-02", 5, Basis::After)
        )
        .is_empty());
    }

    #[test]
    fn test_skip_fetch_reverse_stops_at_bound() {
        let bound = || SkipBound::at(key("2023-04-01", 5));
        assert_eq!(fetch(bound(), FetchRequest::all().reversed()), vec![7, 6, 5]);
        assert_eq!(
            fetch(SkipBound::after(key("2023-04-01", 5)), FetchRequest::all().reversed()),
            vec![7, 6]
        );
        let below = FetchRequest::all()
            .starting(key("2022-01-01", 9), Basis::At)
            .reversed();
        assert!(fetch(bound(), below).is_empty());
        let at_bound = FetchRequest::all()
            .starting(key("2023-04-01", 5), Basis::At)
            .reversed();
        assert_eq!(fetch(bound(), at_bound), vec![5]);
    }

    #[test]
    fn test_skip_push_add_around_bound() {
        let s = users(&[]);
        let (_skip, catch) = skip(&s, SkipBound::at(key("2014-01-24", 1)));
        let add = |id: i64, date: &str| SourceChange::Add(row! { "id" => id, "name" => "x", "startDate" => date });

        s.push(add(1, "2014-01-23")).unwrap();
        s.push(add(2, "2014-01-24")).unwrap();
        s.push(add(3, "2014-01-25")).unwrap();
        s.push(add(0, "2014-01-24")).unwrap();
        assert_eq!(
            catch.log(),
            vec![
                "add {\"id\":2,\"name\":\"x\",\"startDate\":\"2014-01-24\"}",
                "add {\"id\":3,\"name\":\"x\",\"startDate\":\"2014-01-25\"}",
            ]
        );

        let s = users(&[]);
        let (_skip, catch) = skip(&s, SkipBound::after(key("2014-01-24", 1)));
        s.push(add(1, "2014-01-24")).unwrap();
        s.push(add(2, "2014-01-24")).unwrap();
        assert_eq!(catch.log(), vec!["add {\"id\":2,\"name\":\"x\",\"startDate\":\"2014-01-24\"}"]);
    }

    #[test]
    fn test_skip_push_edit_across_bound() {
        let s = users(&[(1, "a", "2014-01-23"), (2, "b", "2014-01-25")]);
        let (_skip, catch) = skip(&s, SkipBound::after(key("2014-01-24", 1)));
        let edit = |id: i64, name: &str, from: &str, to: &str| SourceChange::Edit {
            old_row: row! { "id" => id, "name" => name, "startDate" => from },
            row: row! { "id" => id, "name" => name, "startDate" => to },
        };

        s.push(edit(1, "a", "2014-01-23", "2014-01-22")).unwrap();
        assert!(catch.log().is_empty());

        s.push(edit(1, "a", "2014-01-22", "2014-01-26")).unwrap();
        s.push(edit(2, "b", "2014-01-25", "2014-01-23")).unwrap();
        s.push(edit(1, "a", "2014-01-26", "2014-01-27")).unwrap();
        assert_eq!(
            catch.log(),
            vec![
                "add {\"id\":1,\"name\":\"a\",\"startDate\":\"2014-01-26\"}",
                "remove {\"id\":2,\"name\":\"b\",\"startDate\":\"2014-01-25\"}",
                "edit {\"id\":1,\"name\":\"a\",\"startDate\":\"2014-01-26\"} -> {\"id\":1,\"name\":\"a\",\"startDate\":\"2014-01-27\"}",
            ]
        );
    }

    #[test]
    fn test_skip_under_take_pages() {
        use crate::operators::Take;

        let s = users(&USERS);
        let input = s
            .connect(vec![OrderPart::asc("startDate"), OrderPart::asc("id")], None)
            .unwrap();
        let page = Take::new(Skip::new(input, SkipBound::after(key("2021-12-07", 3))), 2, None).unwrap();
        let catch = Catch::attach(&*page);
        assert_eq!(ids(page.fetch(FetchRequest::all())), vec![4, 5]);

        s.push(SourceChange::Remove(row! { "id" => 4 })).unwrap();
        assert_eq!(
            catch.log(),
            vec![
                "remove {\"id\":4,\"name\":\"Cesar\",\"startDate\":\"2022-12-01\"}",
                "add {\"id\":6,\"name\":\"Darick\",\"startDate\":\"2023-09-01\"}",
            ]
        );
    }
}
