//! Property tests: pushed changes keep downstream state equal to the source
//! contents and to a fresh fetch.

use proptest::prelude::*;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};
use trellis_core::ordering::OrderPart;
use trellis_core::schema::{SchemaValue, ValueType};
use trellis_core::{row, Row};
use trellis_incremental::{
    expand, Change, Exists, FetchRequest, Input, Join, JoinArgs, MemorySource, Output, Source,
    SourceChange, Take,
};
use trellis_storage::MemoryStorage;

/// Tracks the ids of top-level rows added and removed by pushes.
#[derive(Default)]
struct IdSet {
    ids: RefCell<BTreeSet<i64>>,
}

impl IdSet {
    fn attach(input: &dyn Input, initial: impl IntoIterator<Item = i64>) -> Rc<Self> {
        let set = Rc::new(Self::default());
        set.ids.borrow_mut().extend(initial);
        let weak: Weak<dyn Output> = Rc::downgrade(&set) as Weak<dyn Output>;
        input.set_output(weak);
        set
    }

    fn ids(&self) -> BTreeSet<i64> {
        self.ids.borrow().clone()
    }
}

impl Output for IdSet {
    fn push(&self, change: Change) {
        match change {
            Change::Add { node } => {
                assert!(self.ids.borrow_mut().insert(id(&node.row)), "duplicate add");
            }
            Change::Remove { node } => {
                assert!(self.ids.borrow_mut().remove(&id(&node.row)), "remove of absent row");
            }
            Change::Edit { old_row, row } => {
                assert!(self.ids.borrow().contains(&id(&old_row)));
                self.ids.borrow_mut().remove(&id(&old_row));
                self.ids.borrow_mut().insert(id(&row));
            }
            Change::Child { row, .. } => {
                assert!(self.ids.borrow().contains(&id(&row)), "child change of absent row");
            }
        }
    }
}

fn id(row: &Row) -> i64 {
    row.get("id").as_i64().unwrap_or(-1)
}

fn table(name: &str, cols: &[&str]) -> MemorySource {
    let columns: BTreeMap<String, SchemaValue> = cols
        .iter()
        .map(|c| (c.to_string(), SchemaValue::new(ValueType::Number)))
        .collect();
    MemorySource::new(name, columns, vec!["id".into()])
}

fn fetched_ids(input: &dyn Input) -> BTreeSet<i64> {
    input.fetch(FetchRequest::all()).map(|n| id(&n.row)).collect()
}

/// Toggles `id` in `model`, returning the source change that does the same.
fn toggle(model: &mut BTreeMap<i64, Row>, id: i64, make: impl Fn(i64) -> Row) -> SourceChange {
    match model.remove(&id) {
        Some(row) => SourceChange::Remove(row),
        None => {
            let row = make(id);
            model.insert(id, row.clone());
            SourceChange::Add(row)
        }
    }
}

fn issues_with_comments() -> (MemorySource, MemorySource, Rc<Join>) {
    let issue = table("issue", &["id"]);
    let comment = table("comment", &["id", "issueID"]);
    for id in 0..6 {
        issue.push(SourceChange::Add(row! { "id" => id })).unwrap();
    }
    let join = Join::new(JoinArgs {
        parent: issue.connect(vec![], None).unwrap(),
        child: comment.connect(vec![], None).unwrap(),
        storage: MemoryStorage::boxed(),
        parent_key: vec!["id".into()],
        child_key: vec!["issueID".into()],
        relationship_name: "comments".into(),
        hidden: false,
    })
    .unwrap();
    (issue, comment, join)
}

proptest! {
    /// A join's fetch reflects every pushed child change.
    #[test]
    fn prop_join_children_complete(ops in prop::collection::vec((0i64..20, 0i64..6), 1..40)) {
        let (_issue, comment, join) = issues_with_comments();
        let _sink = IdSet::attach(&*join, 0..6);
        let mut model = BTreeMap::new();

        for (comment_id, issue_id) in ops {
            let change = toggle(&mut model, comment_id, |id| row! { "id" => id, "issueID" => issue_id });
            comment.push(change).unwrap();

            for node in expand(join.fetch(FetchRequest::all())) {
                let got: Vec<i64> = node.relationships["comments"].iter().map(|c| id(&c.row)).collect();
                let expected: Vec<i64> = model
                    .values()
                    .filter(|c| c.get("issueID").as_i64() == Some(id(&node.row)))
                    .map(id)
                    .collect();
                prop_assert_eq!(got, expected);
            }
        }
    }

    /// An issue is pushed out of `Exists` iff it currently has a comment in
    /// the source (or has none, when negated), and fetch agrees.
    #[test]
    fn prop_exists_tracks_source(
        not in any::<bool>(),
        hydrate in any::<bool>(),
        ops in prop::collection::vec((0i64..12, 0i64..6, any::<bool>()), 1..40),
    ) {
        let (_issue, comment, join) = issues_with_comments();
        let exists = Exists::new(join, MemoryStorage::boxed(), "comments", not).unwrap();
        let initial = if hydrate { fetched_ids(&*exists) } else { BTreeSet::new() };
        let expected_for = |model: &BTreeMap<i64, Row>| -> BTreeSet<i64> {
            (0..6)
                .filter(|issue_id| {
                    let has = model.values().any(|c| c.get("issueID").as_i64() == Some(*issue_id));
                    has != not
                })
                .collect()
        };
        let mut model = BTreeMap::new();
        prop_assume!(hydrate || expected_for(&model).is_empty());
        prop_assert_eq!(&initial, &expected_for(&model));
        let sink = IdSet::attach(&*exists, initial);

        for (comment_id, issue_id, edit) in ops {
            let change = match model.get(&comment_id).cloned() {
                Some(old_row) if edit => {
                    let row = row! { "id" => comment_id, "issueID" => issue_id };
                    model.insert(comment_id, row.clone());
                    SourceChange::Edit { old_row, row }
                }
                _ => toggle(&mut model, comment_id, |id| row! { "id" => id, "issueID" => issue_id }),
            };
            comment.push(change).unwrap();
            let expected = expected_for(&model);
            prop_assert_eq!(sink.ids(), expected.clone());
            prop_assert_eq!(fetched_ids(&*exists), expected);
        }
    }

    /// A take window always holds the first `limit` rows of its input.
    #[test]
    fn prop_take_window(
        limit in 0usize..6,
        seed in prop::collection::btree_set(0i64..30, 0..12),
        ops in prop::collection::vec(0i64..30, 1..40),
    ) {
        let source = table("issue", &["id"]);
        let mut model = BTreeMap::new();
        for id in seed {
            model.insert(id, row! { "id" => id });
            source.push(SourceChange::Add(row! { "id" => id })).unwrap();
        }
        let take = Take::new(source.connect(vec![OrderPart::asc("id")], None).unwrap(), limit, None).unwrap();
        let sink = IdSet::attach(&*take, fetched_ids(&*take));

        for id in ops {
            let change = toggle(&mut model, id, |id| row! { "id" => id });
            source.push(change).unwrap();
            let expected: BTreeSet<i64> = model.keys().take(limit).copied().collect();
            prop_assert_eq!(sink.ids(), expected.clone());
            prop_assert_eq!(fetched_ids(&*take), expected);
        }
    }
}
