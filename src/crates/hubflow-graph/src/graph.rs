//! Core graph data structures
//!
//! A [`Graph`] is a finite state machine: named nodes, each with exactly one
//! outgoing [`Edge`]. Execution starts at the virtual [`START`] node and
//! stops when an edge leads to the virtual [`END`] node.
//!
//! ```text
//!   START ──► init ──► invoke ──┬── "complete" ──► END
//!                       ▲       │
//!                       │       └── "continue" ──► advance
//!                       └────────────────────────────┘
//! ```
//!
//! Cycles are allowed. The runtime imposes no iteration cap; a graph that
//! loops forever is the caller's bug to bound.
//!
//! Typically you won't create `Graph` directly. Use
//! [`StateGraph`](crate::StateGraph), which validates the structure when it
//! compiles.

use crate::error::{GraphError, Result};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Node identifier - unique name for each node in the graph
pub type NodeId = String;

/// Special node identifier for graph entry point
pub const START: &str = "__start__";

/// Special node identifier for graph termination
pub const END: &str = "__end__";

/// Future returned by a node executor
pub type NodeFuture<S> = Pin<Box<dyn Future<Output = Result<S>> + Send>>;

/// Node executor: takes ownership of the state and returns the next state
pub type NodeExecutor<S> = Arc<dyn Fn(S) -> NodeFuture<S> + Send + Sync>;

/// Router for a conditional edge: inspects the state and returns a branch label
pub type Router<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

/// Edge type defining the transition out of a node
pub enum Edge<S> {
    /// Unconditional edge to a specific node (or [`END`])
    Direct(NodeId),

    /// Conditional edge with dynamic routing
    ///
    /// The router is called with the state produced by the source node. Its
    /// label is looked up in `branches`; a label that is not present is a
    /// [`GraphError::Routing`] error.
    Conditional {
        /// Router function that picks a branch label
        router: Router<S>,

        /// Exhaustive map of branch labels to target nodes
        ///
        /// A `BTreeMap` keeps introspection output stable.
        branches: BTreeMap<String, NodeId>,
    },
}

impl<S> Clone for Edge<S> {
    fn clone(&self) -> Self {
        match self {
            Edge::Direct(target) => Edge::Direct(target.clone()),
            Edge::Conditional { router, branches } => Edge::Conditional {
                router: router.clone(),
                branches: branches.clone(),
            },
        }
    }
}

impl<S> std::fmt::Debug for Edge<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Direct(node_id) => f.debug_tuple("Direct").field(node_id).finish(),
            Edge::Conditional { branches, .. } => f
                .debug_struct("Conditional")
                .field("router", &"<function>")
                .field("branches", branches)
                .finish(),
        }
    }
}

impl<S> Edge<S> {
    /// All nodes this edge may lead to
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Edge::Direct(target) => vec![target.as_str()],
            Edge::Conditional { branches, .. } => branches.values().map(String::as_str).collect(),
        }
    }
}

/// Core graph structure: node executors plus one outgoing edge per node
pub struct Graph<S> {
    /// All nodes in the graph mapped by their unique IDs
    pub nodes: HashMap<NodeId, NodeExecutor<S>>,

    /// Outgoing edge of each node, keyed by source. `START` has an entry too.
    pub edges: HashMap<NodeId, Edge<S>>,
}

impl<S> Default for Graph<S> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
        }
    }
}

impl<S> Clone for Graph<S> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }
}

impl<S> std::fmt::Debug for Graph<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut nodes: Vec<&NodeId> = self.nodes.keys().collect();
        nodes.sort();
        f.debug_struct("Graph")
            .field("nodes", &nodes)
            .field("edges", &self.edges)
            .finish()
    }
}

impl<S> Graph<S> {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the structure is a well-formed state machine.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] when:
    /// - `START` has no outgoing edge
    /// - a node has no outgoing edge
    /// - an edge is declared for an unknown source node
    /// - an edge or branch targets an unknown node
    /// - a conditional edge has no branches
    pub fn validate(&self) -> Result<()> {
        if !self.edges.contains_key(START) {
            return Err(GraphError::Validation(
                "Graph has no entry edge from START".to_string(),
            ));
        }

        for name in self.nodes.keys() {
            if !self.edges.contains_key(name) {
                return Err(GraphError::Validation(format!(
                    "Node '{}' has no outgoing edge",
                    name
                )));
            }
        }

        for (source, edge) in &self.edges {
            if source != START && !self.nodes.contains_key(source) {
                return Err(GraphError::Validation(format!(
                    "Edge source '{}' does not exist",
                    source
                )));
            }

            if let Edge::Conditional { branches, .. } = edge {
                if branches.is_empty() {
                    return Err(GraphError::Validation(format!(
                        "Conditional edge from '{}' has no branches",
                        source
                    )));
                }
            }

            for target in edge.targets() {
                if target == START {
                    return Err(GraphError::Validation(format!(
                        "Edge from '{}' targets START",
                        source
                    )));
                }
                if target != END && !self.nodes.contains_key(target) {
                    return Err(GraphError::Validation(format!(
                        "Edge target '{}' (from '{}') does not exist",
                        target, source
                    )));
                }
            }
        }

        Ok(())
    }

    /// Nodes that cannot be reached from `START`, sorted by name
    pub fn unreachable_nodes(&self) -> Vec<NodeId> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([START]);

        while let Some(current) = queue.pop_front() {
            if let Some(edge) = self.edges.get(current) {
                for target in edge.targets() {
                    if target != END && seen.insert(target) {
                        queue.push_back(target);
                    }
                }
            }
        }

        let mut unreachable: Vec<NodeId> = self
            .nodes
            .keys()
            .filter(|name| !seen.contains(name.as_str()))
            .cloned()
            .collect();
        unreachable.sort();
        unreachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passthrough() -> NodeExecutor<u32> {
        Arc::new(|state| Box::pin(async move { Ok(state) }))
    }

    #[test]
    fn test_validate_linear_graph() {
        let mut graph: Graph<u32> = Graph::new();
        graph.nodes.insert("a".to_string(), passthrough());
        graph.edges.insert(START.to_string(), Edge::Direct("a".to_string()));
        graph.edges.insert("a".to_string(), Edge::Direct(END.to_string()));

        assert!(graph.validate().is_ok());
        assert!(graph.unreachable_nodes().is_empty());
    }

    #[test]
    fn test_validate_missing_target() {
        let mut graph: Graph<u32> = Graph::new();
        graph.nodes.insert("a".to_string(), passthrough());
        graph.edges.insert(START.to_string(), Edge::Direct("a".to_string()));
        graph.edges.insert("a".to_string(), Edge::Direct("ghost".to_string()));

        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("'ghost'"));
    }

    #[test]
    fn test_validate_dead_end_node() {
        let mut graph: Graph<u32> = Graph::new();
        graph.nodes.insert("a".to_string(), passthrough());
        graph.edges.insert(START.to_string(), Edge::Direct("a".to_string()));

        let err = graph.validate().unwrap_err();
        assert_eq!(
            err,
            GraphError::Validation("Node 'a' has no outgoing edge".to_string())
        );
    }

    #[test]
    fn test_unreachable_nodes_reported() {
        let mut graph: Graph<u32> = Graph::new();
        graph.nodes.insert("a".to_string(), passthrough());
        graph.nodes.insert("orphan".to_string(), passthrough());
        graph.edges.insert(START.to_string(), Edge::Direct("a".to_string()));
        graph.edges.insert("a".to_string(), Edge::Direct(END.to_string()));
        graph.edges.insert("orphan".to_string(), Edge::Direct("a".to_string()));

        assert!(graph.validate().is_ok());
        assert_eq!(graph.unreachable_nodes(), vec!["orphan".to_string()]);
    }

    #[test]
    fn test_edge_debug_hides_router() {
        let edge: Edge<u32> = Edge::Conditional {
            router: Arc::new(|_| "x".to_string()),
            branches: BTreeMap::from([("x".to_string(), END.to_string())]),
        };
        let rendered = format!("{:?}", edge);
        assert!(rendered.contains("<function>"));
        assert!(rendered.contains("__end__"));
    }
}
