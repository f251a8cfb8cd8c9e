//! The root of every pipeline.

use crate::change::SourceChange;
use crate::condition::Condition;
use crate::operator::Input;
use std::rc::Rc;
use trellis_core::{Result, SortOrder};

/// One logical table, exposed as any number of independently sorted inputs.
///
/// A source is the only producer of changes in a pipeline. Rows are written
/// with [`Source::push`], which synchronously delivers the change to every
/// connected output before returning.
pub trait Source {
    /// Name of the table this source serves.
    fn table_name(&self) -> &str;

    /// Primary key columns of the table.
    fn primary_key(&self) -> &[String];

    /// Opens a connection that yields rows in `sort` order.
    ///
    /// An empty `sort` means primary key order. Otherwise `sort` must contain
    /// every primary key column. `filter` restricts both the fetched and the
    /// pushed rows of this connection.
    fn connect(&self, sort: SortOrder, filter: Option<Condition>) -> Result<Rc<dyn Input>>;

    /// Applies a change and propagates it to every connection.
    fn push(&self, change: SourceChange) -> Result<()>;
}
