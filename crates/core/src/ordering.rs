//! Sort orders, row comparators and index keys.
//!
//! Every ordering used inside a pipeline ends with the primary key columns, so
//! a comparator built from it is a total order over the rows of one table.
//!
//! `IndexKey` is the key type of sorted indexes. It carries the direction of
//! each part so that plain `Ord` on the key agrees with the comparator, and it
//! supports `Low`/`High` sentinels to position a scan at "the first row whose
//! leading columns equal X" regardless of how the remaining columns sort.

use crate::error::{Error, Result};
use crate::row::Row;
use crate::value::Value;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;
use serde::{Deserialize, Serialize};

/// Sort direction of one ordering column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// One `(column, direction)` part of an ordering.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderPart {
    pub column: String,
    pub direction: Direction,
}

impl OrderPart {
    /// Ascending part.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    /// Descending part.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
        }
    }
}

/// An ordering: compared part by part, left to right.
pub type SortOrder = Vec<OrderPart>;

/// Builds an all-ascending ordering over the given columns.
pub fn ascending<S: AsRef<str>>(columns: &[S]) -> SortOrder {
    columns.iter().map(|c| OrderPart::asc(c.as_ref())).collect()
}

/// Total order over rows.
pub type Comparator = Rc<dyn Fn(&Row, &Row) -> Ordering>;

/// Compares two rows by an ordering.
pub fn compare_rows(order: &[OrderPart], a: &Row, b: &Row) -> Ordering {
    for part in order {
        let cmp = a.get(&part.column).cmp(b.get(&part.column));
        if cmp != Ordering::Equal {
            return match part.direction {
                Direction::Asc => cmp,
                Direction::Desc => cmp.reverse(),
            };
        }
    }
    Ordering::Equal
}

/// Builds a shareable comparator for an ordering.
pub fn make_comparator(order: &[OrderPart]) -> Comparator {
    let order: SortOrder = order.to_vec();
    Rc::new(move |a, b| compare_rows(&order, a, b))
}

/// Checks that every primary key column appears in the ordering.
pub fn assert_ordering_includes_pk<S: AsRef<str>>(order: &[OrderPart], primary_key: &[S]) -> Result<()> {
    for pk in primary_key {
        let pk = pk.as_ref();
        if !order.iter().any(|p| p.column == pk) {
            return Err(Error::ordering_missing_primary_key(pk));
        }
    }
    Ok(())
}

/// Position of one key part relative to real values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Bound {
    /// Sorts before every value.
    Low,
    /// A concrete value.
    Value(Value),
    /// Sorts after every value.
    High,
}

/// One part of an [`IndexKey`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPart {
    pub bound: Bound,
    pub direction: Direction,
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.bound, &other.bound) {
            (Bound::Low, Bound::Low) | (Bound::High, Bound::High) => Ordering::Equal,
            (Bound::Low, _) | (_, Bound::High) => Ordering::Less,
            (_, Bound::Low) | (Bound::High, _) => Ordering::Greater,
            (Bound::Value(a), Bound::Value(b)) => match self.direction {
                Direction::Asc => a.cmp(b),
                Direction::Desc => b.cmp(a),
            },
        }
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Key of a sorted index, ordered consistently with [`compare_rows`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexKey(Vec<KeyPart>);

impl IndexKey {
    /// Projects a row onto an ordering.
    pub fn from_row(order: &[OrderPart], row: &Row) -> Self {
        IndexKey(
            order
                .iter()
                .map(|p| KeyPart {
                    bound: Bound::Value(row.get(&p.column).clone()),
                    direction: p.direction,
                })
                .collect(),
        )
    }

    /// A key whose leading parts are taken from `prefix` (by column) and whose
    /// remaining parts are `fill` (`Low` or `High`).
    pub fn with_prefix(order: &[OrderPart], prefix: &dyn Fn(&str) -> Option<Value>, fill: Bound) -> Self {
        IndexKey(
            order
                .iter()
                .map(|p| KeyPart {
                    bound: prefix(&p.column).map(Bound::Value).unwrap_or_else(|| fill.clone()),
                    direction: p.direction,
                })
                .collect(),
        )
    }

    /// Returns the key parts.
    #[inline]
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }
}

impl fmt::Debug for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for part in &self.0 {
            match &part.bound {
                Bound::Low => list.entry(&"<low>"),
                Bound::High => list.entry(&"<high>"),
                Bound::Value(v) => list.entry(v),
            };
        }
        list.finish()
    }
}
