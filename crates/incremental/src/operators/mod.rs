//! Pipeline operators.
//!
//! Every operator wraps one or two upstream inputs and is itself an input for
//! the stage below it:
//! - `Filter`: passes rows matching a predicate
//! - `Exists`: passes rows whose relationship is non-empty (or empty)
//! - `Join`: nests matching child rows into each parent row
//! - `Skip`: drops rows ordered before a start bound
//! - `Take`: keeps the first `limit` rows, optionally per partition

mod exists;
pub(crate) mod filter;
mod join;
mod skip;
mod take;

pub use exists::Exists;
pub use filter::Filter;
pub use join::{Join, JoinArgs};
pub use skip::{Skip, SkipBound};
pub use take::Take;
