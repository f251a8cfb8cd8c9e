//! Nodes and streams.
//!
//! A `Stream` is an owned, lazy iterator of nodes. Streams are consumed by
//! moving them, so a relationship can only ever be iterated once; there is no
//! way to observe an exhausted stream again.

use std::collections::BTreeMap;
use std::fmt;
use trellis_core::Row;

/// A lazy, single-use sequence of nodes.
pub type Stream = Box<dyn Iterator<Item = Node>>;

/// Returns an empty stream.
pub fn empty() -> Stream {
    Box::new(std::iter::empty())
}

/// A row plus the streams of its related child nodes.
pub struct Node {
    pub row: Row,
    pub relationships: BTreeMap<String, Stream>,
}

impl Node {
    /// Creates a node without relationships.
    pub fn new(row: Row) -> Self {
        Self {
            row,
            relationships: BTreeMap::new(),
        }
    }

    /// Attaches a relationship stream.
    pub fn with_relationship(mut self, name: impl Into<String>, stream: Stream) -> Self {
        self.relationships.insert(name.into(), stream);
        self
    }

    /// Moves a relationship stream out of the node.
    pub fn take_relationship(&mut self, name: &str) -> Option<Stream> {
        self.relationships.remove(name)
    }

    /// Drains a relationship and puts a replayable copy back, returning the
    /// number of child nodes.
    ///
    /// Panics if the relationship is missing.
    pub fn count_relationship(&mut self, name: &str) -> usize {
        let stream = match self.relationships.remove(name) {
            Some(stream) => stream,
            None => panic!("Relationship {} not found on node {}", name, self.row),
        };
        let children: Vec<Node> = stream.collect();
        let size = children.len();
        self.relationships
            .insert(name.to_string(), Box::new(children.into_iter()));
        size
    }

    /// Splits the node into two independently consumable copies, draining
    /// every relationship stream recursively.
    pub fn fork(self) -> (Node, Node) {
        let mut left = Node::new(self.row.clone());
        let mut right = Node::new(self.row);
        for (name, stream) in self.relationships {
            let (l, r): (Vec<Node>, Vec<Node>) = stream.map(Node::fork).unzip();
            left.relationships
                .insert(name.clone(), Box::new(l.into_iter()));
            right.relationships.insert(name, Box::new(r.into_iter()));
        }
        (left, right)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("row", &self.row)
            .field("relationships", &self.relationships.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Fully drains a stream into rows, recursing into relationships. Mostly
/// useful in tests and diagnostics.
pub fn expand(stream: Stream) -> Vec<ExpandedNode> {
    stream.map(ExpandedNode::from).collect()
}

/// An eagerly materialized [`Node`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpandedNode {
    pub row: Row,
    pub relationships: BTreeMap<String, Vec<ExpandedNode>>,
}

impl From<Node> for ExpandedNode {
    fn from(node: Node) -> Self {
        Self {
            row: node.row,
            relationships: node
                .relationships
                .into_iter()
                .map(|(name, stream)| (name, expand(stream)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::row;

    fn tree() -> Node {
        let grandchild = Node::new(row! { "id" => 3 });
        let child = Node::new(row! { "id" => 2 })
            .with_relationship("g", Box::new(vec![grandchild].into_iter()));
        Node::new(row! { "id" => 1 }).with_relationship("c", Box::new(vec![child].into_iter()))
    }

    #[test]
    fn test_fork_copies_nested_relationships() {
        let (a, b) = tree().fork();
        let a = ExpandedNode::from(a);
        let b = ExpandedNode::from(b);
        assert_eq!(a, b);
        assert_eq!(a.relationships["c"][0].relationships["g"][0].row, row! { "id" => 3 });
    }

    #[test]
    fn test_count_relationship_keeps_children() {
        let mut node = tree();
        assert_eq!(node.count_relationship("c"), 1);
        assert_eq!(node.count_relationship("c"), 1);
        let expanded = ExpandedNode::from(node);
        assert_eq!(expanded.relationships["c"].len(), 1);
    }

    #[test]
    #[should_panic(expected = "Relationship missing not found")]
    fn test_count_missing_relationship_panics() {
        tree().count_relationship("missing");
    }

    #[test]
    fn test_take_relationship_moves_stream() {
        let mut node = tree();
        let stream = node.take_relationship("c").unwrap();
        assert_eq!(stream.count(), 1);
        assert!(node.take_relationship("c").is_none());
    }
}
