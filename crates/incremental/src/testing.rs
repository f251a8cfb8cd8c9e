//! Test helpers shared by operator tests.

use crate::change::Change;
use crate::operator::{Input, Output};
use crate::stream::ExpandedNode;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// An output that records everything pushed to it.
#[derive(Default)]
pub(crate) struct Catch {
    log: RefCell<Vec<String>>,
    added: RefCell<Vec<ExpandedNode>>,
}

impl Catch {
    pub(crate) fn attach(input: &dyn Input) -> Rc<Self> {
        let catch = Rc::new(Self::default());
        let weak: Weak<dyn Output> = Rc::downgrade(&catch) as Weak<dyn Output>;
        input.set_output(weak);
        catch
    }

    /// One line per change, e.g. `add {"id":1}`.
    pub(crate) fn log(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    /// Expanded nodes of every top-level add, in push order.
    pub(crate) fn added(&self) -> Vec<ExpandedNode> {
        self.added.borrow().clone()
    }

    pub(crate) fn clear(&self) {
        self.log.borrow_mut().clear();
        self.added.borrow_mut().clear();
    }
}

fn describe(change: Change, added: &mut Vec<ExpandedNode>) -> String {
    match change {
        Change::Add { node } => {
            let line = format!("add {}", node.row);
            added.push(ExpandedNode::from(node));
            line
        }
        Change::Remove { node } => format!("remove {}", node.row),
        Change::Edit { old_row, row } => format!("edit {} -> {}", old_row, row),
        Change::Child { row, child } => {
            let mut nested = Vec::new();
            let inner = describe(*child.change, &mut nested);
            format!("child {} {}: {}", row, child.relationship_name, inner)
        }
    }
}

impl Output for Catch {
    fn push(&self, change: Change) {
        let line = describe(change, &mut self.added.borrow_mut());
        self.log.borrow_mut().push(line);
    }
}
