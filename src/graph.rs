//! Knowledge graph sink.
//!
//! The engine talks to the graph only through [`GraphSink`]: create or reuse
//! a node by `(class, key)` and attach relations to it. [`KnowledgeGraph`] is
//! the in-memory implementation. Both operations are idempotent per key, so
//! lines can be typed concurrently and typing the same value twice converges
//! on one node.

use std::fmt;

use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};

/// Node reference of the form `Class/key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeRef(String);

impl NodeRef {
    pub fn new(class: &str, key: &str) -> Self {
        NodeRef(format!("{}/{}", class, key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn class(&self) -> &str {
        self.0.split_once('/').map_or(self.0.as_str(), |(class, _)| class)
    }

    pub fn key(&self) -> &str {
        self.0.split_once('/').map_or("", |(_, key)| key)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Object of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Object {
    Node(NodeRef),
    Literal(String),
}

/// A `subject --predicate--> object` edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relation {
    pub subject: NodeRef,
    pub predicate: String,
    pub object: Object,
}

/// A graph node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeRef,
    pub class: String,
    pub key: String,
}

/// Narrow interface to a graph store.
///
/// Implementations must make both operations idempotent per key and safe to
/// call from several threads at once.
pub trait GraphSink: Sync {
    /// Create the node for `(class, key)`, or return the existing one.
    fn create_or_get_node(&self, class: &str, key: &str) -> NodeRef;

    /// Attach a relation. Adding the same relation twice has no effect.
    fn add_relation(&self, subject: &NodeRef, predicate: &str, object: Object);
}

/// In-memory graph with a concurrent node table and relation set.
#[derive(Debug, Default)]
pub struct KnowledgeGraph {
    nodes: DashMap<NodeRef, Node>,
    relations: DashSet<Relation>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub fn node(&self, id: &NodeRef) -> Option<Node> {
        self.nodes.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains_node(&self, id: &NodeRef) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn contains_relation(&self, subject: &NodeRef, predicate: &str, object: &Object) -> bool {
        self.relations.contains(&Relation {
            subject: subject.clone(),
            predicate: predicate.to_string(),
            object: object.clone(),
        })
    }

    /// Nodes of one class, sorted by id.
    pub fn nodes_of_class(&self, class: &str) -> Vec<Node> {
        let mut nodes: Vec<Node> = self
            .nodes
            .iter()
            .filter(|entry| entry.value().class == class)
            .map(|entry| entry.value().clone())
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    /// Relations leaving `subject`, sorted.
    pub fn relations_from(&self, subject: &NodeRef) -> Vec<Relation> {
        let mut relations: Vec<Relation> = self
            .relations
            .iter()
            .filter(|relation| &relation.subject == subject)
            .map(|relation| relation.key().clone())
            .collect();
        relations.sort();
        relations
    }

    /// All nodes, sorted by id.
    pub fn sorted_nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self
            .nodes
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    /// All relations, sorted.
    pub fn sorted_relations(&self) -> Vec<Relation> {
        let mut relations: Vec<Relation> = self
            .relations
            .iter()
            .map(|relation| relation.key().clone())
            .collect();
        relations.sort();
        relations
    }
}

impl GraphSink for KnowledgeGraph {
    fn create_or_get_node(&self, class: &str, key: &str) -> NodeRef {
        let id = NodeRef::new(class, key);
        self.nodes.entry(id.clone()).or_insert_with(|| Node {
            id: id.clone(),
            class: class.to_string(),
            key: key.to_string(),
        });
        id
    }

    fn add_relation(&self, subject: &NodeRef, predicate: &str, object: Object) {
        self.relations.insert(Relation {
            subject: subject.clone(),
            predicate: predicate.to_string(),
            object,
        });
    }
}

/// Make a raw value safe to use as a node key.
///
/// Whitespace, brackets, dots, path separators and quoting characters are
/// replaced with `_`, so the same raw value always yields the same key.
///
/// # Example
///
/// ```
/// use loggraph::graph::normalize_key;
///
/// assert_eq!(normalize_key("10.0.0.5"), "10_0_0_5");
/// assert_eq!(normalize_key("[a b]"), "_a_b_");
/// ```
pub fn normalize_key(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_whitespace() || is_unsafe_key_char(c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

fn is_unsafe_key_char(c: char) -> bool {
    matches!(
        c,
        '.' | '[' | ']' | '(' | ')' | '{' | '}' | '<' | '>' | '/' | '\\' | '"' | '\'' | '`'
            | '#' | '?' | '|' | '^'
    )
}
